use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::{web, HttpResponse, ResponseError};

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{CourseInput, CourseQuery, CourseResponse, ProgressRequest};
use crate::services::course_service;
use crate::services::media_service::LocalUpload;
use crate::services::MediaStore;
use crate::utils::AppResult;

/// Multipart body shared by course create and update.
#[derive(MultipartForm)]
pub struct CourseForm {
    pub title: Option<Text<String>>,
    pub description: Option<Text<String>>,
    pub price: Option<Text<i64>>,
    pub category: Option<Text<String>>,
    pub instructor_id: Option<Text<String>>,
    #[multipart(limit = "10MB")]
    pub thumbnail: Option<TempFile>,
}

impl CourseForm {
    fn into_parts(self) -> AppResult<(CourseInput, Option<LocalUpload>)> {
        let thumbnail = self.thumbnail.map(LocalUpload::from_temp_file).transpose()?;
        let input = CourseInput {
            title: self.title.map(Text::into_inner),
            description: self.description.map(Text::into_inner),
            price: self.price.map(Text::into_inner),
            category: self.category.map(Text::into_inner),
            instructor_id: self.instructor_id.map(Text::into_inner),
        };
        Ok((input, thumbnail))
    }
}

#[utoipa::path(
    get,
    path = "/api/course",
    tag = "Courses",
    params(
        ("category" = Option<String>, Query, description = "Exact category"),
        ("search" = Option<String>, Query, description = "Case-insensitive title search")
    ),
    responses((status = 200, description = "Approved courses", body = [CourseResponse]))
)]
pub async fn list_courses(db: web::Data<MongoDB>, query: web::Query<CourseQuery>) -> HttpResponse {
    log::info!("📚 GET /course");

    match course_service::list_approved(&db, &query).await {
        Ok(courses) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": courses.len(),
            "courses": courses
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/course/{id}",
    tag = "Courses",
    params(("id" = String, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Approved course with its approved videos"),
        (status = 404, description = "Course not found or not approved")
    )
)]
pub async fn get_course(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let id = path.into_inner();
    log::info!("📖 GET /course/{}", id);

    match course_service::get_public_course(&db, &id).await {
        Ok(course) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "course": course
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn create_course(
    db: web::Data<MongoDB>,
    media: web::Data<dyn MediaStore>,
    claims: web::ReqData<Claims>,
    MultipartForm(form): MultipartForm<CourseForm>,
) -> HttpResponse {
    log::info!("➕ POST /course/create - by {}", claims.email);

    let (input, thumbnail) = match form.into_parts() {
        Ok(parts) => parts,
        Err(e) => return e.error_response(),
    };

    match course_service::create_course(&db, media.get_ref(), &claims, input, thumbnail).await {
        Ok(course) => {
            log::info!("✅ Course created: {}", course.id);
            HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "course": course
            }))
        }
        Err(e) => {
            log::warn!("❌ Course creation failed: {}", e);
            e.error_response()
        }
    }
}

pub async fn update_course(
    db: web::Data<MongoDB>,
    media: web::Data<dyn MediaStore>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    MultipartForm(form): MultipartForm<CourseForm>,
) -> HttpResponse {
    let id = path.into_inner();
    log::info!("✏️ PUT /course/update/{} - by {}", id, claims.email);

    let (input, thumbnail) = match form.into_parts() {
        Ok(parts) => parts,
        Err(e) => return e.error_response(),
    };

    match course_service::update_course(&db, media.get_ref(), &claims, &id, input, thumbnail).await {
        Ok(course) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "course": course
        })),
        Err(e) => {
            log::warn!("❌ Course update failed for {}: {}", id, e);
            e.error_response()
        }
    }
}

pub async fn delete_course(
    db: web::Data<MongoDB>,
    media: web::Data<dyn MediaStore>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = path.into_inner();
    log::info!("🗑️ DELETE /course/delete/{} - by {}", id, claims.email);

    match course_service::delete_course(&db, media.get_ref(), &claims, &id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Course deleted"
        })),
        Err(e) => {
            log::warn!("❌ Course deletion failed for {}: {}", id, e);
            e.error_response()
        }
    }
}

pub async fn instructor_courses(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🧑‍🏫 GET /course/instructor/mine - {}", claims.email);

    match course_service::list_instructor_courses(&db, &claims).await {
        Ok(courses) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": courses.len(),
            "courses": courses
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn enrolled_courses(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🎒 GET /course/enrolled - {}", claims.email);

    match course_service::list_enrolled(&db, &claims).await {
        Ok(courses) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": courses.len(),
            "courses": courses
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn update_progress(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<ProgressRequest>,
) -> HttpResponse {
    let id = path.into_inner();

    match course_service::update_progress(&db, &claims, &id, request.progress).await {
        Ok(progress) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "course_id": id,
            "progress": progress
        })),
        Err(e) => e.error_response(),
    }
}
