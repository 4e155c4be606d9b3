use actix_web::{web, HttpResponse, ResponseError};

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{EnrollOfflineStudentRequest, InstallmentRequest, OfflineCourseRequest};
use crate::services::offline_service;

// Every route in this module is admin-only.

pub async fn create_course(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<OfflineCourseRequest>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("🏫 POST /offline-course - by {}", claims.email);

    match offline_service::create_course(&db, &request).await {
        Ok(course) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "course": course
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn list_courses(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match offline_service::list_courses(&db).await {
        Ok(courses) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": courses.len(),
            "courses": courses
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn get_course(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match offline_service::get_course(&db, &path).await {
        Ok(course) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "course": course
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn update_course(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<OfflineCourseRequest>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("✏️ PUT /offline-course/{} - by {}", path.as_str(), claims.email);

    match offline_service::update_course(&db, &path, &request).await {
        Ok(course) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "course": course
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn delete_course(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("🗑️ DELETE /offline-course/{} - by {}", path.as_str(), claims.email);

    match offline_service::delete_course(&db, &path).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Offline course and its students deleted"
        })),
        Err(e) => {
            log::warn!("❌ Offline course deletion failed: {}", e);
            e.error_response()
        }
    }
}

// ==================== STUDENTS ====================

pub async fn enroll_student(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<EnrollOfflineStudentRequest>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("🧑‍🎓 POST /offline-course/{}/students - {}", path.as_str(), request.email);

    match offline_service::enroll_student(&db, &path, &request).await {
        Ok(student) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "student": student
        })),
        Err(e) => {
            log::warn!("❌ Offline enrollment failed: {}", e);
            e.error_response()
        }
    }
}

pub async fn list_students(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match offline_service::list_students(&db, &path).await {
        Ok(students) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": students.len(),
            "students": students
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn record_installment(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<InstallmentRequest>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("💰 POST /offline-course/students/{}/installments - {}", path.as_str(), request.amount);

    match offline_service::record_installment(&db, &path, &request).await {
        Ok(student) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "student": student
        })),
        Err(e) => {
            log::warn!("❌ Installment rejected: {}", e);
            e.error_response()
        }
    }
}

pub async fn delete_student(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match offline_service::delete_student(&db, &path).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Student removed"
        })),
        Err(e) => e.error_response(),
    }
}
