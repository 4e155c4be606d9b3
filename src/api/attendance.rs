use actix_web::{web, HttpResponse, ResponseError};

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{CreateEmployeeRequest, MarkAttendanceRequest, MonthQuery};
use crate::services::attendance_service;

pub async fn create_employee(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateEmployeeRequest>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("👷 POST /attendance/employees - {}", request.email);

    match attendance_service::create_employee(&db, &request).await {
        Ok(employee) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "employee": employee
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn list_employees(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match attendance_service::list_employees(&db).await {
        Ok(employees) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": employees.len(),
            "employees": employees
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn delete_employee(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }
    log::info!("🗑️ DELETE /attendance/employees/{} - by {}", path.as_str(), claims.email);

    match attendance_service::delete_employee(&db, &path).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Employee deleted"
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn mark(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<MarkAttendanceRequest>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match attendance_service::mark_attendance(&db, &request).await {
        Ok(entry) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "attendance": entry
        })),
        Err(e) => {
            log::warn!("❌ Attendance not recorded: {}", e);
            e.error_response()
        }
    }
}

pub async fn monthly_report(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    if let Err(e) = claims.require_admin() {
        return e.error_response();
    }

    match attendance_service::monthly_report(&db, &path, query.month.as_deref()).await {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "report": report
        })),
        Err(e) => e.error_response(),
    }
}
