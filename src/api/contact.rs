use actix_web::{web, HttpResponse, ResponseError};

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{ContactResponse, CreateContactRequest};
use crate::services::contact_service;

#[utoipa::path(
    post,
    path = "/api/contact",
    tag = "Contact",
    request_body = CreateContactRequest,
    responses(
        (status = 201, description = "Message stored", body = ContactResponse),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn submit(db: web::Data<MongoDB>, request: web::Json<CreateContactRequest>) -> HttpResponse {
    log::info!("📨 POST /contact - {}", request.email);

    match contact_service::submit(&db, &request).await {
        Ok(contact) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "contact": contact
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn list(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match contact_service::list(&db).await {
        Ok(contacts) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": contacts.len(),
            "contacts": contacts
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn resolve(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match contact_service::resolve(&db, &path).await {
        Ok(contact) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "contact": contact
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn delete(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match contact_service::delete(&db, &path).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Contact deleted"
        })),
        Err(e) => e.error_response(),
    }
}
