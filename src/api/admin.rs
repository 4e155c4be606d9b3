use actix_web::{web, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::ModerationAction;
use crate::services::admin_service::{self, AdminStats, CreateAdminRequest, RejectRequest, StatusQuery};
use crate::services::moderation_service::{self, ModerationTarget};
use crate::services::Mailer;
use crate::utils::parse_object_id;

// ==================== REVIEW QUEUES ====================

async fn review_queue(db: &MongoDB, claims: &Claims, target: ModerationTarget, query: &StatusQuery) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    let status = match admin_service::requested_status(query) {
        Ok(status) => status,
        Err(e) => return e.error_response(),
    };
    log::info!("🗂️ Admin {} listing {:?} queue ({})", claims.email, target, status);

    let items = match target {
        ModerationTarget::Instructor => admin_service::list_instructors(db, status)
            .await
            .map(|v| serde_json::json!(v)),
        ModerationTarget::Course => admin_service::list_courses(db, status)
            .await
            .map(|v| serde_json::json!(v)),
        ModerationTarget::Video => admin_service::list_videos(db, status)
            .await
            .map(|v| serde_json::json!(v)),
    };

    match items {
        Ok(items) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "status": status,
            "items": items
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn list_instructors(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<StatusQuery>,
) -> HttpResponse {
    review_queue(&db, &claims, ModerationTarget::Instructor, &query).await
}

pub async fn list_courses(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<StatusQuery>,
) -> HttpResponse {
    review_queue(&db, &claims, ModerationTarget::Course, &query).await
}

pub async fn list_videos(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<StatusQuery>,
) -> HttpResponse {
    review_queue(&db, &claims, ModerationTarget::Video, &query).await
}

// ==================== APPROVE / REJECT ====================

async fn decide(
    db: &MongoDB,
    mailer: &dyn Mailer,
    claims: &Claims,
    target: ModerationTarget,
    raw_id: &str,
    action: ModerationAction,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    let id = match parse_object_id(raw_id, "record") {
        Ok(id) => id,
        Err(e) => return e.error_response(),
    };

    match moderation_service::moderate(db, mailer, target, id, action).await {
        Ok(approval) => {
            log::info!("✅ {:?} {} is now {} (by {})", target, raw_id, approval.status, claims.email);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "id": raw_id,
                "approval": approval
            }))
        }
        Err(e) => {
            log::warn!("❌ Moderation of {:?} {} failed: {}", target, raw_id, e);
            e.error_response()
        }
    }
}

fn rejection(body: Option<web::Json<RejectRequest>>) -> ModerationAction {
    ModerationAction::Reject(body.and_then(|b| b.into_inner().reason).unwrap_or_default())
}

pub async fn approve_instructor(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    decide(&db, mailer.get_ref(), &claims, ModerationTarget::Instructor, &path, ModerationAction::Approve).await
}

pub async fn reject_instructor(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    body: Option<web::Json<RejectRequest>>,
) -> HttpResponse {
    decide(&db, mailer.get_ref(), &claims, ModerationTarget::Instructor, &path, rejection(body)).await
}

pub async fn approve_course(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    decide(&db, mailer.get_ref(), &claims, ModerationTarget::Course, &path, ModerationAction::Approve).await
}

pub async fn reject_course(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    body: Option<web::Json<RejectRequest>>,
) -> HttpResponse {
    decide(&db, mailer.get_ref(), &claims, ModerationTarget::Course, &path, rejection(body)).await
}

pub async fn approve_video(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    decide(&db, mailer.get_ref(), &claims, ModerationTarget::Video, &path, ModerationAction::Approve).await
}

pub async fn reject_video(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    body: Option<web::Json<RejectRequest>>,
) -> HttpResponse {
    decide(&db, mailer.get_ref(), &claims, ModerationTarget::Video, &path, rejection(body)).await
}

// ==================== USERS ====================

#[derive(Deserialize)]
pub struct UsersQuery {
    role: Option<String>,
}

pub async fn list_users(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    query: web::Query<UsersQuery>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("👥 GET /admin/users - {}", claims.email);

    match admin_service::list_users(&db, query.role.as_deref()).await {
        Ok(users) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": users.len(),
            "users": users
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn delete_user(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    let id = path.into_inner();
    log::info!("🗑️ DELETE /admin/users/{} - by {}", id, claims.email);

    match admin_service::delete_user(&db, &claims, &id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "User deleted"
        })),
        Err(e) => {
            log::warn!("❌ User deletion failed for {}: {}", id, e);
            e.error_response()
        }
    }
}

pub async fn create_admin(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateAdminRequest>,
) -> HttpResponse {
    log::info!("👑 POST /admin/admins - {} by {}", request.email, claims.email);

    match admin_service::create_admin(&db, &claims, &request).await {
        Ok(user) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "user": user
        })),
        Err(e) => {
            log::warn!("❌ Admin creation failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    tag = "Admin",
    responses(
        (status = 200, description = "Dashboard figures", body = AdminStats),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn stats(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match admin_service::stats(&db).await {
        Ok(stats) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "stats": stats
        })),
        Err(e) => e.error_response(),
    }
}
