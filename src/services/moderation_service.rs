// ==================== MODERATION ====================
// Admin approve/reject for instructor applications, courses and videos.
// The next state is computed in `Approval::apply`, then written with a filter
// on the previous status so two admins cannot both decide the same record.
// The owner is emailed afterwards; a failed email never undoes the decision.

use mongodb::bson::{doc, from_document, oid::ObjectId, to_bson, Bson, DateTime as BsonDateTime, Document};

use crate::database::{self, MongoDB};
use crate::models::{Approval, ApprovalStatus, ApplicationStatus, ModerationAction, TransitionError};
use crate::services::email_service::{self, Mailer};
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationTarget {
    Instructor,
    Course,
    Video,
}

impl ModerationTarget {
    fn collection(&self) -> &'static str {
        match self {
            ModerationTarget::Instructor => database::USERS,
            ModerationTarget::Course => database::COURSES,
            ModerationTarget::Video => database::VIDEOS,
        }
    }

    pub fn approval_path(&self) -> &'static str {
        match self {
            ModerationTarget::Instructor => "instructor_profile.approval",
            ModerationTarget::Course | ModerationTarget::Video => "is_approved",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ModerationTarget::Instructor => "Instructor application",
            ModerationTarget::Course => "Course",
            ModerationTarget::Video => "Video",
        }
    }

    /// Conditions a record must meet before it can be moderated at all.
    pub(crate) fn scope(&self) -> Document {
        match self {
            ModerationTarget::Instructor => doc! {
                "instructor_profile.application_status": ApplicationStatus::Completed.as_str()
            },
            ModerationTarget::Course | ModerationTarget::Video => doc! {},
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::MissingReason => AppError::BadRequest(e.to_string()),
            TransitionError::InvalidTransition { .. } => AppError::Conflict(e.to_string()),
        }
    }
}

/// Reads the embedded approval at `path`; records without one are pending.
pub fn read_approval(document: &Document, path: &str) -> AppResult<Approval> {
    let mut current = document;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        match current.get(segment) {
            Some(Bson::Document(inner)) if segments.peek().is_some() => current = inner,
            Some(Bson::Document(inner)) => return Ok(from_document(inner.clone())?),
            _ => return Ok(Approval::pending()),
        }
    }

    Ok(Approval::pending())
}

/// Filter value matching `status`. Legacy records may lack the field and
/// still count as pending.
pub(crate) fn status_guard(status: ApprovalStatus) -> Bson {
    match status {
        ApprovalStatus::Pending => Bson::Document(doc! { "$in": ["pending", Bson::Null] }),
        other => Bson::String(other.as_str().to_string()),
    }
}

pub async fn moderate(
    db: &MongoDB,
    mailer: &dyn Mailer,
    target: ModerationTarget,
    id: ObjectId,
    action: ModerationAction,
) -> AppResult<Approval> {
    let collection = db.collection::<Document>(target.collection());
    let path = target.approval_path();

    let mut filter = target.scope();
    filter.insert("_id", id);

    let record = collection
        .find_one(filter.clone())
        .await?
        .ok_or_else(|| AppError::not_found(target.label()))?;

    let current = read_approval(&record, path)?;
    let next = current.apply(&action)?;

    filter.insert(format!("{}.status", path), status_guard(current.status));
    let result = collection
        .update_one(
            filter,
            doc! { "$set": { path: to_bson(&next)?, "updated_at": BsonDateTime::now() } },
        )
        .await?;

    if result.matched_count == 0 {
        return Err(AppError::Conflict(format!(
            "{} was modified by another request, reload and try again",
            target.label()
        )));
    }

    log::info!(
        "🛡️ {} {} moved {} -> {}",
        target.label(),
        id.to_hex(),
        current.status,
        next.status
    );

    match owner_contact(db, target, &record).await {
        Ok(Some((email, name, title))) => {
            let kind = target.label().to_lowercase();
            email_service::notify(mailer, email_service::moderation_email(&email, &name, &kind, &title, &next)).await;
        }
        Ok(None) => log::debug!("No owner to notify for {} {}", target.label(), id.to_hex()),
        Err(e) => log::warn!("⚠️ Could not resolve owner of {} {}: {}", target.label(), id.to_hex(), e),
    }

    Ok(next)
}

/// (email, name, title) of whoever owns the moderated record.
async fn owner_contact(
    db: &MongoDB,
    target: ModerationTarget,
    record: &Document,
) -> AppResult<Option<(String, String, String)>> {
    let text = |doc: &Document, key: &str| doc.get_str(key).map(str::to_string).ok();

    let (owner_id, title) = match target {
        ModerationTarget::Instructor => {
            return Ok(text(record, "email").map(|email| {
                let name = text(record, "name").unwrap_or_default();
                (email, name.clone(), name)
            }))
        }
        ModerationTarget::Course => (record.get_object_id("instructor_id").ok(), text(record, "title")),
        ModerationTarget::Video => (record.get_object_id("uploaded_by").ok(), text(record, "title")),
    };

    let owner_id = match owner_id {
        Some(id) => id,
        None => return Ok(None),
    };

    let owner = db.users().find_one(doc! { "_id": owner_id }).await?;
    Ok(owner.map(|u| (u.email, u.name, title.unwrap_or_default())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_instructor_approval() {
        let record = doc! {
            "email": "i@example.com",
            "instructor_profile": {
                "application_status": "completed",
                "approval": { "status": "rejected", "reason": "no documents" }
            }
        };
        let approval = read_approval(&record, ModerationTarget::Instructor.approval_path()).unwrap();
        assert_eq!(approval.status, ApprovalStatus::Rejected);
        assert_eq!(approval.reason.as_deref(), Some("no documents"));
    }

    #[test]
    fn reads_top_level_course_approval() {
        let record = doc! { "title": "Rust", "is_approved": { "status": "approved", "reason": Bson::Null } };
        let approval = read_approval(&record, ModerationTarget::Course.approval_path()).unwrap();
        assert_eq!(approval, Approval::approved());
    }

    #[test]
    fn missing_approval_counts_as_pending() {
        let record = doc! { "title": "Legacy" };
        assert_eq!(read_approval(&record, "is_approved").unwrap(), Approval::pending());
        assert_eq!(
            read_approval(&record, "instructor_profile.approval").unwrap(),
            Approval::pending()
        );
    }

    #[test]
    fn instructor_moderation_is_scoped_to_completed_applications() {
        let scope = ModerationTarget::Instructor.scope();
        assert_eq!(scope.get_str("instructor_profile.application_status").unwrap(), "completed");
        assert!(ModerationTarget::Video.scope().is_empty());
    }

    #[test]
    fn pending_guard_also_matches_missing_field() {
        assert_eq!(status_guard(ApprovalStatus::Pending), Bson::Document(doc! { "$in": ["pending", Bson::Null] }));
        assert_eq!(status_guard(ApprovalStatus::Approved), Bson::String("approved".into()));
    }

    #[test]
    fn transition_errors_map_to_http_errors() {
        assert!(matches!(AppError::from(TransitionError::MissingReason), AppError::BadRequest(_)));
        let invalid = TransitionError::InvalidTransition {
            from: ApprovalStatus::Approved,
            action: "approve",
        };
        assert!(matches!(AppError::from(invalid), AppError::Conflict(_)));
    }
}
