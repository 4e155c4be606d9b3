pub mod admin;
pub mod attendance;
pub mod auth;
pub mod contact;
pub mod courses;
pub mod health;
pub mod metrics;
pub mod offline_courses;
pub mod payment;
pub mod swagger;
pub mod videos;

use actix_multipart::form::MultipartFormConfig;
use actix_web::web;

use crate::middleware::auth::AuthMiddleware;
use crate::utils::AppError;

const MULTIPART_TOTAL_LIMIT: usize = 600 * 1024 * 1024;
const MULTIPART_MEMORY_LIMIT: usize = 2 * 1024 * 1024;

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid JSON body: {}", err)).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid query string: {}", err)).into())
}

fn multipart_config() -> MultipartFormConfig {
    MultipartFormConfig::default()
        .total_limit(MULTIPART_TOTAL_LIMIT)
        .memory_limit(MULTIPART_MEMORY_LIMIT)
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid form data: {}", err)).into())
}

/// Registers extractor configs and every route. Shared state (`MongoDB`,
/// `AppConfig`, `Mailer`, `MediaStore`, `RazorpayClient`) is added by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(multipart_config())
        // Health check & metrics
        .route("/health", web::get().to(health::health_check))
        .route("/health/ready", web::get().to(health::readiness))
        .route("/metrics", web::get().to(metrics::get_metrics))
        // ==================== AUTH ====================
        .service(
            web::scope("/api/auth")
                .route("/register", web::post().to(auth::register))
                .route("/login", web::post().to(auth::login))
                .route("/logout", web::post().to(auth::logout))
                .route("/google", web::get().to(auth::google_auth))
                .route("/google/callback", web::get().to(auth::google_callback))
                .route("/instructor/send-otp", web::post().to(auth::send_otp))
                .route("/instructor/verify-otp", web::post().to(auth::verify_otp))
                .route("/instructor/complete-profile", web::post().to(auth::complete_profile))
                .service(
                    web::resource("/me")
                        .wrap(AuthMiddleware)
                        .route(web::get().to(auth::get_me)),
                )
                .service(
                    web::resource("/profile")
                        .wrap(AuthMiddleware)
                        .route(web::put().to(auth::update_profile)),
                )
                .service(
                    web::resource("/instructor/profile")
                        .wrap(AuthMiddleware)
                        .route(web::put().to(auth::resubmit_profile)),
                ),
        )
        // ==================== COURSES ====================
        .service(
            web::scope("/api/course")
                // Public catalogue
                .route("", web::get().to(courses::list_courses))
                // Protected endpoints requiring JWT authentication
                .service(
                    web::resource("/create")
                        .wrap(AuthMiddleware)
                        .route(web::post().to(courses::create_course)),
                )
                .service(
                    web::resource("/enrolled")
                        .wrap(AuthMiddleware)
                        .route(web::get().to(courses::enrolled_courses)),
                )
                .service(
                    web::resource("/instructor/mine")
                        .wrap(AuthMiddleware)
                        .route(web::get().to(courses::instructor_courses)),
                )
                .service(
                    web::resource("/update/{id}")
                        .wrap(AuthMiddleware)
                        .route(web::put().to(courses::update_course)),
                )
                .service(
                    web::resource("/delete/{id}")
                        .wrap(AuthMiddleware)
                        .route(web::delete().to(courses::delete_course)),
                )
                .service(
                    web::resource("/{id}/progress")
                        .wrap(AuthMiddleware)
                        .route(web::put().to(courses::update_progress)),
                )
                .route("/{id}", web::get().to(courses::get_course)), // must stay last (catch-all)
        )
        // ==================== VIDEOS ====================
        .service(
            web::scope("/api/video")
                .wrap(AuthMiddleware)
                .route("/upload", web::post().to(videos::upload_video))
                .route("/course/{course_id}", web::get().to(videos::course_videos))
                .route("/{id}", web::put().to(videos::update_video))
                .route("/{id}", web::delete().to(videos::delete_video)),
        )
        // ==================== ADMIN ====================
        .service(
            web::scope("/api/admin")
                .wrap(AuthMiddleware)
                .route("/instructors", web::get().to(admin::list_instructors))
                .route("/instructors/{id}/approve", web::put().to(admin::approve_instructor))
                .route("/instructors/{id}/reject", web::put().to(admin::reject_instructor))
                .route("/courses", web::get().to(admin::list_courses))
                .route("/courses/{id}/approve", web::put().to(admin::approve_course))
                .route("/courses/{id}/reject", web::put().to(admin::reject_course))
                .route("/videos", web::get().to(admin::list_videos))
                .route("/videos/{id}/approve", web::put().to(admin::approve_video))
                .route("/videos/{id}/reject", web::put().to(admin::reject_video))
                .route("/users", web::get().to(admin::list_users))
                .route("/users/{id}", web::delete().to(admin::delete_user))
                .route("/admins", web::post().to(admin::create_admin))
                .route("/stats", web::get().to(admin::stats)),
        )
        // ==================== PAYMENT ====================
        .service(
            web::scope("/api/payment")
                // Razorpay calls this directly; authenticated by HMAC signature
                .route("/webhook", web::post().to(payment::webhook))
                .service(
                    web::resource("/create-order")
                        .wrap(AuthMiddleware)
                        .route(web::post().to(payment::create_order)),
                )
                .service(
                    web::resource("/verify")
                        .wrap(AuthMiddleware)
                        .route(web::post().to(payment::verify_payment)),
                ),
        )
        // ==================== OFFLINE COURSES ====================
        .service(
            web::scope("/api/offline-course")
                .wrap(AuthMiddleware)
                .route("", web::post().to(offline_courses::create_course))
                .route("", web::get().to(offline_courses::list_courses))
                .route("/students/{id}/installments", web::post().to(offline_courses::record_installment))
                .route("/students/{id}", web::delete().to(offline_courses::delete_student))
                .route("/{id}/students", web::post().to(offline_courses::enroll_student))
                .route("/{id}/students", web::get().to(offline_courses::list_students))
                .route("/{id}", web::get().to(offline_courses::get_course))
                .route("/{id}", web::put().to(offline_courses::update_course))
                .route("/{id}", web::delete().to(offline_courses::delete_course)),
        )
        // ==================== ATTENDANCE ====================
        .service(
            web::scope("/api/attendance")
                .wrap(AuthMiddleware)
                .route("/employees", web::post().to(attendance::create_employee))
                .route("/employees", web::get().to(attendance::list_employees))
                .route("/employees/{id}", web::get().to(attendance::monthly_report))
                .route("/employees/{id}", web::delete().to(attendance::delete_employee))
                .route("/mark", web::post().to(attendance::mark)),
        )
        // ==================== CONTACT ====================
        .service(
            web::scope("/api/contact")
                .route("", web::post().to(contact::submit))
                .service(
                    web::resource("/all")
                        .wrap(AuthMiddleware)
                        .route(web::get().to(contact::list)),
                )
                .service(
                    web::resource("/{id}/resolve")
                        .wrap(AuthMiddleware)
                        .route(web::put().to(contact::resolve)),
                )
                .service(
                    web::resource("/{id}")
                        .wrap(AuthMiddleware)
                        .route(web::delete().to(contact::delete)),
                ),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::dev::{Service, ServiceResponse};
    use actix_web::http::{header, StatusCode};
    use actix_web::{test, App, Error};
    use mongodb::bson::oid::ObjectId;
    use std::sync::Arc;

    use crate::api::auth::OAUTH_STATE_COOKIE;
    use crate::config::{AppConfig, GoogleOAuthConfig};
    use crate::database::MongoDB;
    use crate::models::{Role, User};
    use crate::services::auth_service;
    use crate::services::email_service::testing::RecordingMailer;
    use crate::services::media_service::testing::FakeStore;
    use crate::services::payment_service::hmac_hex;
    use crate::services::{Mailer, MediaStore, RazorpayClient};

    // None of these requests reach MongoDB: every one is rejected by
    // authentication, validation or signature checks first.
    macro_rules! test_app {
        () => {
            test_app!(AppConfig::for_tests())
        };
        ($config:expr) => {{
            let config: AppConfig = $config;
            let client = mongodb::Client::with_uri_str(&config.database_url).await.unwrap();
            let db = MongoDB::from_client(client, "learning_test");
            let mailer: Arc<dyn Mailer> = Arc::new(RecordingMailer::default());
            let media: Arc<dyn MediaStore> = Arc::new(FakeStore::default());
            let razorpay = RazorpayClient::new(config.razorpay.clone());

            test::init_service(
                App::new()
                    .app_data(web::Data::new(config))
                    .app_data(web::Data::new(db))
                    .app_data(web::Data::from(mailer))
                    .app_data(web::Data::from(media))
                    .app_data(web::Data::new(razorpay))
                    .configure(configure),
            )
            .await
        }};
    }

    async fn status_of<S, R>(app: &S, req: R) -> StatusCode
    where
        S: Service<R, Response = ServiceResponse, Error = Error>,
    {
        match test::try_call_service(app, req).await {
            Ok(res) => res.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    fn token_for(role: Role) -> String {
        let mut user = User::new("Test".into(), "test@example.com".into(), role);
        user.id = Some(ObjectId::new());
        auth_service::generate_jwt(&user, &AppConfig::for_tests().jwt).unwrap()
    }

    #[actix_rt::test]
    async fn health_is_public() {
        let app = test_app!();
        let req = test::TestRequest::get().uri("/health").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["service"], "learning-service");
    }

    #[actix_rt::test]
    async fn protected_routes_need_a_token() {
        let app = test_app!();
        for uri in ["/api/auth/me", "/api/course/enrolled", "/api/admin/stats", "/api/video/course/abc"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[actix_rt::test]
    async fn instructor_profile_edit_needs_an_instructor_token() {
        let app = test_app!();
        let req = test::TestRequest::put().uri("/api/auth/instructor/profile").to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::put()
            .uri("/api/auth/instructor/profile")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token_for(Role::Student))))
            .insert_header((header::CONTENT_TYPE, "multipart/form-data; boundary=xyz"))
            .set_payload("--xyz\r\nContent-Disposition: form-data; name=\"bio\"\r\n\r\nHello\r\n--xyz--\r\n")
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn garbage_token_is_rejected() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header((header::AUTHORIZATION, "Bearer not.a.jwt"))
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn students_cannot_reach_admin_routes() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/admin/stats")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token_for(Role::Student))))
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn token_cookie_is_accepted() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/offline-course")
            .cookie(actix_web::cookie::Cookie::new("token", token_for(Role::Instructor)))
            .to_request();
        // Authenticated, but instructors are not admins
        assert_eq!(status_of(&app, req).await, StatusCode::FORBIDDEN);
    }

    #[actix_rt::test]
    async fn webhook_with_bad_signature_is_rejected() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .insert_header(("X-Razorpay-Signature", "deadbeef"))
            .set_payload(r#"{"event":"payment.captured"}"#)
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn webhook_without_signature_is_rejected() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .set_payload(r#"{"event":"payment.captured"}"#)
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn signed_webhook_for_other_events_is_acknowledged() {
        let app = test_app!();
        let body = r#"{"event":"refund.created","payload":{}}"#;
        let signature = hmac_hex(&AppConfig::for_tests().razorpay.webhook_secret, body.as_bytes()).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .insert_header(("X-Razorpay-Signature", signature))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let json: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(json["status"], "ignored: refund.created");
    }

    #[actix_rt::test]
    async fn captured_payment_with_empty_notes_array_is_acknowledged() {
        let app = test_app!();
        let body = r#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_1","notes":[]}}}}"#;
        let signature = hmac_hex(&AppConfig::for_tests().razorpay.webhook_secret, body.as_bytes()).unwrap();
        let req = test::TestRequest::post()
            .uri("/api/payment/webhook")
            .insert_header(("X-Razorpay-Signature", signature))
            .set_payload(body)
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let json: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(json["status"], "ignored: payment without enrollment notes");
    }

    fn location(res: &ServiceResponse) -> String {
        res.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[actix_rt::test]
    async fn google_auth_stores_state_in_a_cookie() {
        let mut config = AppConfig::for_tests();
        config.google = Some(GoogleOAuthConfig {
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:8080/api/auth/google/callback".into(),
        });
        let app = test_app!(config);
        let req = test::TestRequest::get().uri("/api/auth/google").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let cookie = res
            .response()
            .cookies()
            .find(|c| c.name() == OAUTH_STATE_COOKIE)
            .map(|c| c.value().to_string())
            .unwrap();
        let json: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(json["state"], cookie);
    }

    #[actix_rt::test]
    async fn google_callback_without_state_cookie_is_refused() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/auth/google/callback?code=abc&state=attacker")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert!(location(&res).ends_with("/login?error=invalid_state"));
    }

    #[actix_rt::test]
    async fn google_callback_with_mismatched_state_is_refused() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/auth/google/callback?code=abc&state=attacker")
            .cookie(actix_web::cookie::Cookie::new(OAUTH_STATE_COOKIE, "expected"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::FOUND);
        assert!(location(&res).ends_with("/login?error=invalid_state"));
        let cleared = res.response().cookies().find(|c| c.name() == OAUTH_STATE_COOKIE).unwrap();
        assert_eq!(cleared.value(), "");
    }

    #[actix_rt::test]
    async fn forged_payment_verification_fails_closed() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/payment/verify")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token_for(Role::Student))))
            .set_json(serde_json::json!({
                "razorpay_order_id": "order_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": "00",
                "course_id": ObjectId::new().to_hex(),
            }))
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn malformed_json_is_a_bad_request() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(json["success"], false);
    }

    #[actix_rt::test]
    async fn invalid_course_id_is_a_bad_request() {
        let app = test_app!();
        let req = test::TestRequest::get().uri("/api/course/not-an-id").to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn blank_contact_message_is_rejected() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/contact")
            .set_json(serde_json::json!({
                "name": "Riya",
                "email": "riya@example.com",
                "message": "   "
            }))
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::BAD_REQUEST);
    }
}
