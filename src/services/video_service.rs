use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};
use mongodb::options::ReturnDocument;
use mongodb::ClientSession;

use crate::database::{finish_transaction, MongoDB};
use crate::middleware::auth::Claims;
use crate::models::{Approval, ApprovalStatus, Course, ModerationAction, Role, UpdateVideoRequest, Video, VideoResponse};
use crate::services::course_service::{can_manage, find_course};
use crate::services::media_service::{self, LocalUpload, MediaStore, ResourceType};
use crate::utils::{parse_object_id, require_text, AppError, AppResult};

/// Text fields that accompany an uploaded video file.
#[derive(Debug, Default)]
pub struct VideoSubmission {
    pub title: String,
    pub description: Option<String>,
    pub course_id: String,
}

/// What a caller may see of a course's videos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoAccess {
    All,
    ApprovedOnly,
}

pub fn video_access(claims: &Claims, course: &Course) -> AppResult<VideoAccess> {
    if can_manage(claims, course) {
        return Ok(VideoAccess::All);
    }
    let user_id = claims.user_id()?;
    if course.enrolled_students.contains(&user_id) {
        return Ok(VideoAccess::ApprovedOnly);
    }
    Err(AppError::Forbidden("Enroll in this course to watch its videos".to_string()))
}

async fn find_video(db: &MongoDB, id: ObjectId) -> AppResult<Video> {
    db.videos()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Video"))
}

async fn checked_course(db: &MongoDB, claims: &Claims, submission: &VideoSubmission, upload: &LocalUpload) -> AppResult<(String, Course)> {
    claims.require_role(&[Role::Instructor, Role::Admin, Role::SuperAdmin])?;
    let title = require_text(&submission.title, "Title")?;
    if !upload.is_video() {
        return Err(AppError::BadRequest("Only video files can be uploaded".to_string()));
    }
    let course_id = parse_object_id(&submission.course_id, "course")?;
    let course = find_course(db, course_id).await?;
    if !can_manage(claims, &course) {
        return Err(AppError::Forbidden("You cannot add videos to this course".to_string()));
    }
    Ok((title, course))
}

async fn insert_in_session(db: &MongoDB, session: &mut ClientSession, video: &Video) -> AppResult<ObjectId> {
    let inserted = db.videos().insert_one(video).session(&mut *session).await?;
    let video_id = inserted
        .inserted_id
        .as_object_id()
        .ok_or_else(|| AppError::Internal("Video insert returned no ObjectId".to_string()))?;

    let pushed = db
        .courses()
        .update_one(
            doc! { "_id": video.course_id },
            doc! { "$push": { "videos": video_id }, "$set": { "updated_at": BsonDateTime::now() } },
        )
        .session(&mut *session)
        .await?;

    if pushed.matched_count == 0 {
        return Err(AppError::not_found("Course"));
    }
    Ok(video_id)
}

pub async fn upload_video(
    db: &MongoDB,
    media: &dyn MediaStore,
    claims: &Claims,
    submission: VideoSubmission,
    upload: LocalUpload,
) -> AppResult<VideoResponse> {
    let (title, course) = match checked_course(db, claims, &submission, &upload).await {
        Ok(values) => values,
        Err(e) => {
            media_service::discard(Some(upload)).await;
            return Err(e);
        }
    };

    let course_id = course
        .id
        .ok_or_else(|| AppError::Internal("Course without id".to_string()))?;
    let stored = media_service::ingest(media, upload, ResourceType::Video).await?;

    let now = BsonDateTime::now();
    let mut video = Video {
        id: None,
        title,
        description: submission.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        url: stored.url.clone(),
        public_id: stored.public_id.clone(),
        duration: stored.duration,
        course_id,
        uploaded_by: claims.user_id()?,
        is_approved: if claims.is_admin() { Approval::approved() } else { Approval::pending() },
        created_at: Some(now),
        updated_at: Some(now),
    };

    let inserted = async {
        let mut session = db.start_transaction().await?;
        let result = insert_in_session(db, &mut session, &video).await;
        finish_transaction(&mut session, result).await
    }
    .await;

    video.id = Some(media_service::release_on_error(media, Some(&stored), ResourceType::Video, inserted).await?);

    log::info!("🎬 Video '{}' added to course {}", video.title, course_id.to_hex());
    Ok(VideoResponse::from(video))
}

pub async fn list_course_videos(db: &MongoDB, claims: &Claims, course_id: &str) -> AppResult<Vec<VideoResponse>> {
    let course_id = parse_object_id(course_id, "course")?;
    let course = find_course(db, course_id).await?;

    let mut filter = doc! { "course_id": course_id };
    if video_access(claims, &course)? == VideoAccess::ApprovedOnly {
        filter.insert("is_approved.status", ApprovalStatus::Approved.as_str());
    }

    let videos: Vec<Video> = db
        .videos()
        .find(filter)
        .sort(doc! { "created_at": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(videos.into_iter().map(VideoResponse::from).collect())
}

pub async fn update_video(db: &MongoDB, claims: &Claims, id: &str, request: &UpdateVideoRequest) -> AppResult<VideoResponse> {
    let video_id = parse_object_id(id, "video")?;
    let video = find_video(db, video_id).await?;
    let course = find_course(db, video.course_id).await?;
    if !can_manage(claims, &course) {
        return Err(AppError::Forbidden("You cannot edit this video".to_string()));
    }

    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(title) = &request.title {
        set.insert("title", require_text(title, "Title")?);
    }
    if let Some(description) = &request.description {
        set.insert("description", description.trim());
    }
    if !claims.is_admin() {
        let next = video.is_approved.apply(&ModerationAction::Resubmit)?;
        set.insert("is_approved", to_bson(&next)?);
    }

    let updated = db
        .videos()
        .find_one_and_update(doc! { "_id": video_id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Video"))?;

    Ok(VideoResponse::from(updated))
}

async fn delete_in_session(db: &MongoDB, session: &mut ClientSession, video: &Video, video_id: ObjectId) -> AppResult<()> {
    let deleted = db
        .videos()
        .delete_one(doc! { "_id": video_id })
        .session(&mut *session)
        .await?;
    if deleted.deleted_count == 0 {
        return Err(AppError::not_found("Video"));
    }

    db.courses()
        .update_one(
            doc! { "_id": video.course_id },
            doc! { "$pull": { "videos": video_id }, "$set": { "updated_at": BsonDateTime::now() } },
        )
        .session(&mut *session)
        .await?;
    Ok(())
}

pub async fn delete_video(db: &MongoDB, media: &dyn MediaStore, claims: &Claims, id: &str) -> AppResult<()> {
    let video_id = parse_object_id(id, "video")?;
    let video = find_video(db, video_id).await?;
    let course = find_course(db, video.course_id).await?;
    if !can_manage(claims, &course) {
        return Err(AppError::Forbidden("You cannot delete this video".to_string()));
    }

    let mut session = db.start_transaction().await?;
    let result = delete_in_session(db, &mut session, &video, video_id).await;
    finish_transaction(&mut session, result).await?;

    media_service::destroy_quietly(media, &video.public_id, ResourceType::Video).await;
    log::info!("🗑️ Video {} deleted", video_id.to_hex());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role, id: ObjectId) -> Claims {
        Claims {
            sub: id.to_hex(),
            email: "v@example.com".into(),
            name: "V".into(),
            role,
            iat: 0,
            exp: 0,
            jti: "j".into(),
            aud: "a".into(),
            iss: "i".into(),
        }
    }

    fn course(owner: ObjectId, students: Vec<ObjectId>) -> Course {
        Course {
            id: Some(ObjectId::new()),
            title: "Async Rust".into(),
            description: "Futures".into(),
            price: 0,
            category: None,
            thumbnail: None,
            instructor_id: Some(owner),
            is_approved: Approval::approved(),
            videos: vec![],
            enrolled_students: students,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn owner_and_admin_see_every_video() {
        let owner = ObjectId::new();
        let c = course(owner, vec![]);
        assert_eq!(video_access(&claims(Role::Instructor, owner), &c).unwrap(), VideoAccess::All);
        assert_eq!(video_access(&claims(Role::SuperAdmin, ObjectId::new()), &c).unwrap(), VideoAccess::All);
    }

    #[test]
    fn enrolled_students_see_approved_videos_only() {
        let student = ObjectId::new();
        let c = course(ObjectId::new(), vec![student]);
        assert_eq!(
            video_access(&claims(Role::Student, student), &c).unwrap(),
            VideoAccess::ApprovedOnly
        );
    }

    #[test]
    fn strangers_are_forbidden() {
        let c = course(ObjectId::new(), vec![]);
        let err = video_access(&claims(Role::Student, ObjectId::new()), &c).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
