use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::database::MongoDB;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: i64,
}

fn health(status: &str) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        service: "learning-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(health("healthy"))
}

/// Readiness: the process is up and MongoDB answers a ping.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn readiness(db: web::Data<MongoDB>) -> HttpResponse {
    match db.ping().await {
        Ok(()) => HttpResponse::Ok().json(health("ready")),
        Err(e) => {
            log::error!("❌ Readiness check failed: {}", e);
            HttpResponse::ServiceUnavailable().json(health("unavailable"))
        }
    }
}
