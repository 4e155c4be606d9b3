// ==================== ADMINISTRATION ====================
// Review queues, user management and dashboard figures. Approve/reject
// itself lives in moderation_service.

use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::ClientSession;
use serde::{Deserialize, Serialize};

use crate::database::{finish_transaction, is_duplicate_key, MongoDB};
use crate::middleware::auth::Claims;
use crate::models::{
    ApprovalStatus, Course, CourseResponse, Role, User, UserResponse, Video, VideoResponse,
};
use crate::services::auth_service;
use crate::services::moderation_service::{status_guard, ModerationTarget};
use crate::utils::{normalize_email, parse_object_id, require_text, AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateAdminRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Serialize, utoipa::ToSchema)]
pub struct AdminStats {
    pub students: u64,
    pub instructors: u64,
    pub admins: u64,
    pub pending_instructors: u64,
    pub courses: u64,
    pub pending_courses: u64,
    pub pending_videos: u64,
    pub enrollments: i64,
    /// Sum of course price times enrolled students.
    pub revenue: i64,
    pub unresolved_contacts: u64,
}

/// Queue filter: `?status=` defaults to pending.
pub fn requested_status(query: &StatusQuery) -> AppResult<ApprovalStatus> {
    match query.status.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw.parse().map_err(AppError::BadRequest),
        None => Ok(ApprovalStatus::Pending),
    }
}

pub(crate) fn queue_filter(target: ModerationTarget, status: ApprovalStatus) -> Document {
    let mut filter = target.scope();
    filter.insert(format!("{}.status", target.approval_path()), status_guard(status));
    filter
}

pub async fn list_instructors(db: &MongoDB, status: ApprovalStatus) -> AppResult<Vec<UserResponse>> {
    let users: Vec<User> = db
        .users()
        .find(queue_filter(ModerationTarget::Instructor, status))
        .sort(doc! { "instructor_profile.submitted_at": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(users.into_iter().map(UserResponse::from).collect())
}

pub async fn list_courses(db: &MongoDB, status: ApprovalStatus) -> AppResult<Vec<CourseResponse>> {
    let courses: Vec<Course> = db
        .courses()
        .find(queue_filter(ModerationTarget::Course, status))
        .sort(doc! { "updated_at": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(courses.into_iter().map(CourseResponse::from).collect())
}

pub async fn list_videos(db: &MongoDB, status: ApprovalStatus) -> AppResult<Vec<VideoResponse>> {
    let videos: Vec<Video> = db
        .videos()
        .find(queue_filter(ModerationTarget::Video, status))
        .sort(doc! { "updated_at": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(videos.into_iter().map(VideoResponse::from).collect())
}

pub async fn list_users(db: &MongoDB, role: Option<&str>) -> AppResult<Vec<UserResponse>> {
    let filter = match role.filter(|r| !r.trim().is_empty()) {
        Some(role) => doc! { "role": role.trim() },
        None => doc! {},
    };

    let users: Vec<User> = db
        .users()
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(users.into_iter().map(UserResponse::from).collect())
}

/// Nobody deletes themselves or a superAdmin; only a superAdmin deletes admins.
pub fn check_deletable(actor: &Claims, target: &User) -> AppResult<()> {
    if target.id.map(|id| id.to_hex()).as_deref() == Some(actor.sub.as_str()) {
        return Err(AppError::BadRequest("You cannot delete your own account".to_string()));
    }
    match target.role {
        Role::SuperAdmin => Err(AppError::Forbidden("Super admin accounts cannot be deleted".to_string())),
        Role::Admin if actor.role != Role::SuperAdmin => {
            Err(AppError::Forbidden("Only a super admin can delete admins".to_string()))
        }
        _ => Ok(()),
    }
}

async fn delete_user_in_session(db: &MongoDB, session: &mut ClientSession, user_id: ObjectId) -> AppResult<()> {
    db.courses()
        .update_many(
            doc! { "enrolled_students": user_id },
            doc! { "$pull": { "enrolled_students": user_id } },
        )
        .session(&mut *session)
        .await?;

    db.courses()
        .update_many(
            doc! { "instructor_id": user_id },
            doc! { "$set": { "instructor_id": Bson::Null, "updated_at": BsonDateTime::now() } },
        )
        .session(&mut *session)
        .await?;

    let deleted = db
        .users()
        .delete_one(doc! { "_id": user_id })
        .session(&mut *session)
        .await?;

    if deleted.deleted_count == 0 {
        return Err(AppError::not_found("User"));
    }
    Ok(())
}

/// Removes the user, takes them off every course roster and detaches the
/// courses they taught, in a single transaction.
pub async fn delete_user(db: &MongoDB, actor: &Claims, id: &str) -> AppResult<()> {
    let user_id = parse_object_id(id, "user")?;
    let target = db
        .users()
        .find_one(doc! { "_id": user_id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    check_deletable(actor, &target)?;

    let mut session = db.start_transaction().await?;
    let result = delete_user_in_session(db, &mut session, user_id).await;
    finish_transaction(&mut session, result).await?;

    log::info!("🗑️ User {} ({}) deleted by {}", target.email, target.role.as_str(), actor.email);
    Ok(())
}

pub async fn create_admin(db: &MongoDB, actor: &Claims, request: &CreateAdminRequest) -> AppResult<UserResponse> {
    actor.require_role(&[Role::SuperAdmin])?;

    let name = require_text(&request.name, "Name")?;
    let email = normalize_email(&request.email)?;
    let password_hash = auth_service::hash_password(&request.password)?;

    let mut admin = User::new(name, email, Role::Admin);
    admin.password = Some(password_hash);
    admin.provider = Some("local".to_string());

    let result = match db.users().insert_one(&admin).await {
        Ok(result) => result,
        Err(e) if is_duplicate_key(&e) => {
            return Err(AppError::Conflict("A user with this email already exists".to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    admin.id = result.inserted_id.as_object_id();

    log::info!("👑 Admin {} created by {}", admin.email, actor.email);
    Ok(UserResponse::from(admin))
}

fn number(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

pub(crate) fn enrollment_totals_pipeline() -> Vec<Document> {
    let roster_size = doc! { "$size": { "$ifNull": ["$enrolled_students", []] } };
    vec![doc! {
        "$group": {
            "_id": Bson::Null,
            "enrollments": { "$sum": roster_size.clone() },
            "revenue": { "$sum": { "$multiply": ["$price", roster_size] } },
        }
    }]
}

pub async fn stats(db: &MongoDB) -> AppResult<AdminStats> {
    let users = db.users();
    let courses = db.courses();

    let mut stats = AdminStats {
        students: users.count_documents(doc! { "role": Role::Student.as_str() }).await?,
        instructors: users.count_documents(doc! { "role": Role::Instructor.as_str() }).await?,
        admins: users
            .count_documents(doc! { "role": { "$in": [Role::Admin.as_str(), Role::SuperAdmin.as_str()] } })
            .await?,
        pending_instructors: users
            .count_documents(queue_filter(ModerationTarget::Instructor, ApprovalStatus::Pending))
            .await?,
        courses: courses.count_documents(doc! {}).await?,
        pending_courses: courses
            .count_documents(queue_filter(ModerationTarget::Course, ApprovalStatus::Pending))
            .await?,
        pending_videos: db
            .videos()
            .count_documents(queue_filter(ModerationTarget::Video, ApprovalStatus::Pending))
            .await?,
        unresolved_contacts: db.contacts().count_documents(doc! { "resolved": false }).await?,
        ..Default::default()
    };

    let mut totals = courses.aggregate(enrollment_totals_pipeline()).await?;
    if let Some(row) = totals.try_next().await? {
        stats.enrollments = number(&row, "enrollments");
        stats.revenue = number(&row, "revenue");
    }

    Ok(stats)
}
