use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::{web, HttpResponse, ResponseError};

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::UpdateVideoRequest;
use crate::services::media_service::LocalUpload;
use crate::services::video_service::{self, VideoSubmission};
use crate::services::MediaStore;

#[derive(MultipartForm)]
pub struct VideoUploadForm {
    pub title: Text<String>,
    pub description: Option<Text<String>>,
    pub course_id: Text<String>,
    #[multipart(limit = "500MB")]
    pub video: TempFile,
}

pub async fn upload_video(
    db: web::Data<MongoDB>,
    media: web::Data<dyn MediaStore>,
    claims: web::ReqData<Claims>,
    MultipartForm(form): MultipartForm<VideoUploadForm>,
) -> HttpResponse {
    log::info!("🎬 POST /video/upload - course {} by {}", form.course_id.as_str(), claims.email);

    let upload = match LocalUpload::from_temp_file(form.video) {
        Ok(upload) => upload,
        Err(e) => return e.error_response(),
    };
    let submission = VideoSubmission {
        title: form.title.into_inner(),
        description: form.description.map(Text::into_inner),
        course_id: form.course_id.into_inner(),
    };

    match video_service::upload_video(&db, media.get_ref(), &claims, submission, upload).await {
        Ok(video) => {
            log::info!("✅ Video uploaded: {}", video.id);
            HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "video": video
            }))
        }
        Err(e) => {
            log::warn!("❌ Video upload failed: {}", e);
            e.error_response()
        }
    }
}

pub async fn course_videos(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let course_id = path.into_inner();
    log::info!("🎞️ GET /video/course/{} - {}", course_id, claims.email);

    match video_service::list_course_videos(&db, &claims, &course_id).await {
        Ok(videos) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "total": videos.len(),
            "videos": videos
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn update_video(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateVideoRequest>,
) -> HttpResponse {
    let id = path.into_inner();
    log::info!("✏️ PUT /video/{} - by {}", id, claims.email);

    match video_service::update_video(&db, &claims, &id, &request).await {
        Ok(video) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "video": video
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn delete_video(
    db: web::Data<MongoDB>,
    media: web::Data<dyn MediaStore>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = path.into_inner();
    log::info!("🗑️ DELETE /video/{} - by {}", id, claims.email);

    match video_service::delete_video(&db, media.get_ref(), &claims, &id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Video deleted"
        })),
        Err(e) => {
            log::warn!("❌ Video deletion failed for {}: {}", id, e);
            e.error_response()
        }
    }
}
