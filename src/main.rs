mod api;
mod config;
mod database;
mod middleware;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::dev::Service;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::services::email_service::{LogMailer, SmtpMailer};
use crate::services::media_service::CloudinaryStore;
use crate::services::{Mailer, MediaStore, RazorpayClient};

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    log::error!("❌ {}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

fn build_mailer(config: &AppConfig) -> std::io::Result<Arc<dyn Mailer>> {
    match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::new(smtp).map_err(|e| startup_error("Invalid SMTP configuration", e))?;
            log::info!("📧 SMTP mailer configured ({}:{})", smtp.host, smtp.port);
            Ok(Arc::new(mailer))
        }
        None => {
            log::warn!("⚠️  SMTP not configured, emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    log::info!("🚀 Starting Learning Service...");

    // Initialize MongoDB connection
    let db = database::MongoDB::new(&config.database_url)
        .await
        .map_err(|e| startup_error("Failed to connect to MongoDB", e))?;
    log::info!("✅ MongoDB connected successfully");

    if config.razorpay.key_id.is_empty() || config.razorpay.webhook_secret.is_empty() {
        log::warn!("⚠️  Razorpay credentials incomplete, paid checkout and webhooks will be rejected");
    }

    let mailer = build_mailer(&config)?;
    let media: Arc<dyn MediaStore> = Arc::new(CloudinaryStore::new(config.cloudinary.clone()));

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config.clone());
    let mailer_data: web::Data<dyn Mailer> = web::Data::from(mailer);
    let media_data: web::Data<dyn MediaStore> = web::Data::from(media);
    let razorpay_data = web::Data::new(RazorpayClient::new(config.razorpay.clone()));

    let bind_address = config.bind_address();
    log::info!("🌐 Server starting on {}", bind_address);
    log::info!("📚 Swagger UI available at: http://{}/swagger-ui/", bind_address);
    log::info!("📄 OpenAPI spec at: http://{}/api-docs/openapi.json", bind_address);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
                actix_web::http::header::CACHE_CONTROL,
            ])
            .expose_headers(vec![actix_web::http::header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(mailer_data.clone())
            .app_data(media_data.clone())
            .app_data(razorpay_data.clone())
            .wrap_fn(|req, srv| {
                let fut = srv.call(req);
                async move {
                    let res = fut.await;
                    match &res {
                        Ok(response) => api::metrics::record_response(response.status()),
                        Err(e) => api::metrics::record_response(e.as_response_error().status_code()),
                    }
                    res
                }
            })
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi))
            .configure(api::configure)
    })
    .bind(&bind_address)?
    .run()
    .await
}
