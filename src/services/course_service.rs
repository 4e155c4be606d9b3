use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document, Regex};
use mongodb::options::ReturnDocument;
use mongodb::ClientSession;

use crate::database::{finish_transaction, MongoDB};
use crate::middleware::auth::Claims;
use crate::models::{
    Approval, ApprovalStatus, Course, CourseDetail, CourseInput, CourseQuery, CourseResponse,
    EnrolledCourseView, ModerationAction, Role, VideoResponse, MAX_COURSE_PRICE,
};
use crate::services::media_service::{self, LocalUpload, MediaStore, ResourceType};
use crate::utils::{parse_object_id, require_text, AppError, AppResult};

/// Filters and updates that make up a course deletion.
#[derive(Debug, PartialEq)]
pub struct CourseCascade {
    pub videos_filter: Document,
    pub users_filter: Document,
    pub users_update: Document,
    pub course_filter: Document,
}

impl CourseCascade {
    pub fn for_course(course_id: ObjectId) -> Self {
        Self {
            videos_filter: doc! { "course_id": course_id },
            users_filter: doc! { "enrolled_courses.course_id": course_id },
            users_update: doc! { "$pull": { "enrolled_courses": { "course_id": course_id } } },
            course_filter: doc! { "_id": course_id },
        }
    }
}

pub fn can_manage(claims: &Claims, course: &Course) -> bool {
    if claims.is_admin() {
        return true;
    }
    match (claims.user_id(), course.instructor_id) {
        (Ok(user_id), Some(owner)) => claims.role == Role::Instructor && user_id == owner,
        _ => false,
    }
}

pub(crate) fn check_price(price: i64) -> AppResult<i64> {
    if price < 0 {
        return Err(AppError::BadRequest("Price cannot be negative".to_string()));
    }
    if price > MAX_COURSE_PRICE {
        return Err(AppError::BadRequest(format!("Price cannot exceed {}", MAX_COURSE_PRICE)));
    }
    Ok(price)
}

pub async fn find_course(db: &MongoDB, id: ObjectId) -> AppResult<Course> {
    db.courses()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Course"))
}

pub(crate) fn catalogue_filter(query: &CourseQuery) -> Document {
    let mut filter = doc! { "is_approved.status": ApprovalStatus::Approved.as_str() };
    if let Some(category) = query.category.as_deref().filter(|c| !c.trim().is_empty()) {
        filter.insert("category", category.trim());
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        filter.insert(
            "title",
            Regex {
                pattern: escape_regex(search.trim()),
                options: "i".to_string(),
            },
        );
    }
    filter
}

fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Public catalogue: approved courses only.
pub async fn list_approved(db: &MongoDB, query: &CourseQuery) -> AppResult<Vec<CourseResponse>> {
    let courses: Vec<Course> = db
        .courses()
        .find(catalogue_filter(query))
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(courses.into_iter().map(CourseResponse::from).collect())
}

pub async fn get_public_course(db: &MongoDB, id: &str) -> AppResult<CourseDetail> {
    let course_id = parse_object_id(id, "course")?;
    let course = db
        .courses()
        .find_one(doc! { "_id": course_id, "is_approved.status": ApprovalStatus::Approved.as_str() })
        .await?
        .ok_or_else(|| AppError::not_found("Course"))?;

    let videos: Vec<VideoResponse> = db
        .videos()
        .find(doc! { "course_id": course_id, "is_approved.status": ApprovalStatus::Approved.as_str() })
        .sort(doc! { "created_at": 1 })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .map(VideoResponse::from)
        .collect();

    let instructor_name = match course.instructor_id {
        Some(instructor_id) => db
            .users()
            .find_one(doc! { "_id": instructor_id })
            .await?
            .map(|u| u.name),
        None => None,
    };

    Ok(CourseDetail {
        course: CourseResponse::from(course),
        instructor_name,
        videos,
    })
}

async fn resolve_owner(db: &MongoDB, claims: &Claims, requested: Option<&str>) -> AppResult<(Option<ObjectId>, Approval)> {
    match claims.role {
        Role::Admin | Role::SuperAdmin => {
            let instructor_id = match requested.filter(|s| !s.trim().is_empty()) {
                Some(raw) => {
                    let id = parse_object_id(raw, "instructor")?;
                    db.users()
                        .find_one(doc! { "_id": id, "role": Role::Instructor.as_str() })
                        .await?
                        .ok_or_else(|| AppError::not_found("Instructor"))?;
                    Some(id)
                }
                None => None,
            };
            // Admin-published courses skip the review queue
            Ok((instructor_id, Approval::approved()))
        }
        Role::Instructor => {
            let instructor_id = claims.user_id()?;
            let instructor = db
                .users()
                .find_one(doc! { "_id": instructor_id })
                .await?
                .ok_or_else(|| AppError::not_found("Instructor"))?;

            let approved = instructor
                .instructor_profile
                .map(|p| p.approval.status == ApprovalStatus::Approved)
                .unwrap_or(false);
            if !approved {
                return Err(AppError::Forbidden(
                    "Your instructor application must be approved before publishing courses".to_string(),
                ));
            }
            Ok((Some(instructor_id), Approval::pending()))
        }
        Role::Student => Err(AppError::Forbidden("Only instructors and admins can create courses".to_string())),
    }
}

pub async fn create_course(
    db: &MongoDB,
    media: &dyn MediaStore,
    claims: &Claims,
    input: CourseInput,
    thumbnail: Option<LocalUpload>,
) -> AppResult<CourseResponse> {
    let checked = async {
        let title = require_text(input.title.as_deref().unwrap_or_default(), "Title")?;
        let description = require_text(input.description.as_deref().unwrap_or_default(), "Description")?;
        let price = check_price(input.price.unwrap_or(0))?;
        let (instructor_id, approval) = resolve_owner(db, claims, input.instructor_id.as_deref()).await?;
        Ok::<_, AppError>((title, description, price, instructor_id, approval))
    }
    .await;

    let (title, description, price, instructor_id, approval) = match checked {
        Ok(values) => values,
        Err(e) => {
            media_service::discard(thumbnail).await;
            return Err(e);
        }
    };

    let stored = match thumbnail {
        Some(upload) => Some(media_service::ingest(media, upload, ResourceType::Image).await?),
        None => None,
    };

    let now = BsonDateTime::now();
    let mut course = Course {
        id: None,
        title,
        description,
        price,
        category: input.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        thumbnail: stored.as_ref().map(|m| m.url.clone()),
        instructor_id,
        is_approved: approval,
        videos: vec![],
        enrolled_students: vec![],
        created_at: Some(now),
        updated_at: Some(now),
    };

    let inserted = db.courses().insert_one(&course).await.map_err(AppError::from);
    let result = media_service::release_on_error(media, stored.as_ref(), ResourceType::Image, inserted).await?;
    course.id = result.inserted_id.as_object_id();

    log::info!("📚 Course created: {} ({})", course.title, course.is_approved.status);
    Ok(CourseResponse::from(course))
}

pub async fn update_course(
    db: &MongoDB,
    media: &dyn MediaStore,
    claims: &Claims,
    id: &str,
    input: CourseInput,
    thumbnail: Option<LocalUpload>,
) -> AppResult<CourseResponse> {
    let checked = async {
        let course_id = parse_object_id(id, "course")?;
        let course = find_course(db, course_id).await?;
        if !can_manage(claims, &course) {
            return Err(AppError::Forbidden("You cannot edit this course".to_string()));
        }

        let mut set = doc! { "updated_at": BsonDateTime::now() };
        if let Some(title) = &input.title {
            set.insert("title", require_text(title, "Title")?);
        }
        if let Some(description) = &input.description {
            set.insert("description", require_text(description, "Description")?);
        }
        if let Some(price) = input.price {
            set.insert("price", check_price(price)?);
        }
        if let Some(category) = &input.category {
            set.insert("category", category.trim());
        }
        if claims.is_admin() {
            if let Some(raw) = input.instructor_id.as_deref().filter(|s| !s.trim().is_empty()) {
                set.insert("instructor_id", parse_object_id(raw, "instructor")?);
            }
        } else {
            // Owner edits go back into the review queue
            let next = course.is_approved.apply(&ModerationAction::Resubmit)?;
            set.insert("is_approved", to_bson(&next)?);
        }
        Ok::<_, AppError>((course_id, set))
    }
    .await;

    let (course_id, mut set) = match checked {
        Ok(values) => values,
        Err(e) => {
            media_service::discard(thumbnail).await;
            return Err(e);
        }
    };

    let stored = match thumbnail {
        Some(upload) => Some(media_service::ingest(media, upload, ResourceType::Image).await?),
        None => None,
    };
    if let Some(stored) = &stored {
        set.insert("thumbnail", stored.url.clone());
    }

    let written = db
        .courses()
        .find_one_and_update(doc! { "_id": course_id }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await
        .map_err(AppError::from)
        .and_then(|updated| updated.ok_or_else(|| AppError::not_found("Course")));
    let updated = media_service::release_on_error(media, stored.as_ref(), ResourceType::Image, written).await?;

    log::info!("✏️ Course updated: {}", course_id.to_hex());
    Ok(CourseResponse::from(updated))
}

async fn delete_course_in_session(
    db: &MongoDB,
    session: &mut ClientSession,
    cascade: &CourseCascade,
) -> AppResult<(u64, u64)> {
    let videos = db
        .videos()
        .delete_many(cascade.videos_filter.clone())
        .session(&mut *session)
        .await?;

    let users = db
        .users()
        .update_many(cascade.users_filter.clone(), cascade.users_update.clone())
        .session(&mut *session)
        .await?;

    let course = db
        .courses()
        .delete_one(cascade.course_filter.clone())
        .session(&mut *session)
        .await?;

    if course.deleted_count == 0 {
        return Err(AppError::not_found("Course"));
    }

    Ok((videos.deleted_count, users.modified_count))
}

/// Deletes the course, its videos and every user's enrollment in it, all in
/// one transaction. Remote video assets are removed afterwards, best-effort.
pub async fn delete_course(db: &MongoDB, media: &dyn MediaStore, claims: &Claims, id: &str) -> AppResult<()> {
    let course_id = parse_object_id(id, "course")?;
    let course = find_course(db, course_id).await?;
    if !can_manage(claims, &course) {
        return Err(AppError::Forbidden("You cannot delete this course".to_string()));
    }

    let public_ids: Vec<String> = db
        .videos()
        .find(doc! { "course_id": course_id })
        .await?
        .try_collect::<Vec<_>>()
        .await?
        .into_iter()
        .map(|v| v.public_id)
        .collect();

    let cascade = CourseCascade::for_course(course_id);
    let mut session = db.start_transaction().await?;
    let result = delete_course_in_session(db, &mut session, &cascade).await;
    let (videos, users) = finish_transaction(&mut session, result).await?;

    log::info!(
        "🗑️ Course {} deleted with {} videos, unenrolled {} users",
        course_id.to_hex(),
        videos,
        users
    );

    for public_id in public_ids {
        media_service::destroy_quietly(media, &public_id, ResourceType::Video).await;
    }

    Ok(())
}

/// Instructors see their own courses in every status; admins manage all of them.
pub(crate) fn managed_courses_filter(claims: &Claims) -> AppResult<Document> {
    claims.require_role(&[Role::Instructor, Role::Admin, Role::SuperAdmin])?;
    if claims.is_admin() {
        return Ok(doc! {});
    }
    Ok(doc! { "instructor_id": claims.user_id()? })
}

pub async fn list_instructor_courses(db: &MongoDB, claims: &Claims) -> AppResult<Vec<CourseResponse>> {
    let filter = managed_courses_filter(claims)?;
    let courses: Vec<Course> = db
        .courses()
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(courses.into_iter().map(CourseResponse::from).collect())
}

pub async fn list_enrolled(db: &MongoDB, claims: &Claims) -> AppResult<Vec<EnrolledCourseView>> {
    let user = db
        .users()
        .find_one(doc! { "_id": claims.user_id()? })
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let ids: Vec<ObjectId> = user.enrolled_courses.iter().map(|e| e.course_id).collect();
    let courses: Vec<Course> = db
        .courses()
        .find(doc! { "_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;

    let views = user
        .enrolled_courses
        .into_iter()
        .filter_map(|enrollment| {
            courses
                .iter()
                .find(|c| c.id == Some(enrollment.course_id))
                .map(|course| EnrolledCourseView {
                    course: CourseResponse::from(course.clone()),
                    progress: enrollment.progress,
                    enrolled_at: enrollment.enrolled_at.timestamp_millis(),
                })
        })
        .collect();

    Ok(views)
}

pub async fn update_progress(db: &MongoDB, claims: &Claims, id: &str, progress: i32) -> AppResult<i32> {
    if !(0..=100).contains(&progress) {
        return Err(AppError::BadRequest("Progress must be between 0 and 100".to_string()));
    }
    let course_id = parse_object_id(id, "course")?;

    let result = db
        .users()
        .update_one(
            doc! { "_id": claims.user_id()?, "enrolled_courses.course_id": course_id },
            doc! { "$set": { "enrolled_courses.$.progress": progress, "updated_at": BsonDateTime::now() } },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::NotFound("You are not enrolled in this course".to_string()));
    }
    Ok(progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Approval;
    use mongodb::bson::Bson;

    fn claims(role: Role, id: ObjectId) -> Claims {
        Claims {
            sub: id.to_hex(),
            email: "x@example.com".into(),
            name: "X".into(),
            role,
            iat: 0,
            exp: 0,
            jti: "j".into(),
            aud: "a".into(),
            iss: "i".into(),
        }
    }

    fn course(owner: Option<ObjectId>) -> Course {
        Course {
            id: Some(ObjectId::new()),
            title: "Rust".into(),
            description: "Systems".into(),
            price: 499,
            category: None,
            thumbnail: None,
            instructor_id: owner,
            is_approved: Approval::pending(),
            videos: vec![],
            enrolled_students: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn cascade_targets_children_and_enrollments() {
        let id = ObjectId::new();
        let cascade = CourseCascade::for_course(id);

        assert_eq!(cascade.videos_filter, doc! { "course_id": id });
        assert_eq!(cascade.users_filter, doc! { "enrolled_courses.course_id": id });
        assert_eq!(
            cascade.users_update,
            doc! { "$pull": { "enrolled_courses": { "course_id": id } } }
        );
        assert_eq!(cascade.course_filter, doc! { "_id": id });
    }

    #[test]
    fn only_owner_or_admin_can_manage() {
        let owner = ObjectId::new();
        let c = course(Some(owner));

        assert!(can_manage(&claims(Role::Instructor, owner), &c));
        assert!(can_manage(&claims(Role::Admin, ObjectId::new()), &c));
        assert!(!can_manage(&claims(Role::Instructor, ObjectId::new()), &c));
        assert!(!can_manage(&claims(Role::Student, owner), &c));
        assert!(!can_manage(&claims(Role::Instructor, owner), &course(None)));
    }

    #[test]
    fn catalogue_only_lists_approved_courses() {
        let filter = catalogue_filter(&CourseQuery::default());
        assert_eq!(filter, doc! { "is_approved.status": "approved" });
    }

    #[test]
    fn catalogue_search_is_escaped() {
        let filter = catalogue_filter(&CourseQuery {
            category: Some(" web ".into()),
            search: Some("c++ (basics)".into()),
        });
        assert_eq!(filter.get_str("category").unwrap(), "web");
        match filter.get("title") {
            Some(Bson::RegularExpression(regex)) => {
                assert_eq!(regex.pattern, "c\\+\\+ \\(basics\\)");
                assert_eq!(regex.options, "i");
            }
            other => panic!("expected regex, got {:?}", other),
        }
    }

    #[test]
    fn managed_courses_scope_by_role() {
        let id = ObjectId::new();
        assert_eq!(
            managed_courses_filter(&claims(Role::Instructor, id)).unwrap(),
            doc! { "instructor_id": id }
        );
        assert_eq!(managed_courses_filter(&claims(Role::Admin, id)).unwrap(), doc! {});
        assert_eq!(managed_courses_filter(&claims(Role::SuperAdmin, id)).unwrap(), doc! {});
        assert!(matches!(
            managed_courses_filter(&claims(Role::Student, id)),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn order_amount_is_in_minor_units() {
        assert_eq!(course(None).amount_in_minor_units(), Some(49_900));
    }

    #[test]
    fn oversized_prices_never_turn_into_free_orders() {
        let mut huge = course(None);
        huge.price = i64::MAX / 50;
        assert_eq!(huge.amount_in_minor_units(), None);

        huge.price = -5;
        assert_eq!(huge.amount_in_minor_units(), None);

        huge.price = MAX_COURSE_PRICE;
        assert_eq!(huge.amount_in_minor_units(), Some(MAX_COURSE_PRICE * 100));
    }

    #[test]
    fn prices_are_bounded_on_input() {
        assert_eq!(check_price(0).unwrap(), 0);
        assert_eq!(check_price(MAX_COURSE_PRICE).unwrap(), MAX_COURSE_PRICE);
        assert!(matches!(check_price(-1), Err(AppError::BadRequest(_))));
        assert!(matches!(check_price(MAX_COURSE_PRICE + 1), Err(AppError::BadRequest(_))));
        assert!(matches!(check_price(i64::MAX / 50), Err(AppError::BadRequest(_))));
    }
}
