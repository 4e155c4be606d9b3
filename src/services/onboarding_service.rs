// ==================== INSTRUCTOR ONBOARDING ====================
// Three steps: email -> OTP -> profile. Steps 2 and 3 are single conditional
// updates keyed on the current application status, so concurrent duplicate
// submissions cannot both advance the record.

use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document};
use mongodb::options::ReturnDocument;
use rand::Rng;
use serde::Deserialize;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::models::{
    Approval, ApplicationStatus, ApprovalStatus, InstructorProfile, ModerationAction, Role, User, UserResponse,
};
use crate::services::auth_service::{self, AuthResponse};
use crate::services::email_service::{self, Mailer};
use crate::services::media_service::{self, LocalUpload, MediaStore, ResourceType};
use crate::utils::{normalize_email, require_text, AppError, AppResult};

pub const OTP_TTL_MINUTES: i64 = 10;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SendOtpRequest {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

/// Text fields of the final onboarding step.
#[derive(Debug, Default)]
pub struct ProfileSubmission {
    pub email: String,
    pub name: String,
    pub password: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub expertise: Vec<String>,
    pub experience_years: Option<i32>,
    pub qualification: Option<String>,
    pub linkedin: Option<String>,
}

/// Edits to a submitted application. `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub bio: Option<String>,
    pub expertise: Option<Vec<String>>,
    pub experience_years: Option<i32>,
    pub qualification: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("No instructor application found for this email")]
    NoApplication,
    #[error("Email is not awaiting verification")]
    WrongStatus,
    #[error("Invalid OTP")]
    Mismatch,
    #[error("OTP has expired")]
    Expired,
}

impl From<OtpError> for AppError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::NoApplication => AppError::NotFound(e.to_string()),
            OtpError::WrongStatus => AppError::Conflict(e.to_string()),
            OtpError::Mismatch | OtpError::Expired => AppError::BadRequest(e.to_string()),
        }
    }
}

pub fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub fn otp_expiry(now: BsonDateTime) -> BsonDateTime {
    BsonDateTime::from_millis(now.timestamp_millis() + OTP_TTL_MINUTES * 60 * 1000)
}

/// Same predicate the verification update filters on, used to explain why
/// a verification did not match.
pub fn check_otp(profile: Option<&InstructorProfile>, otp: &str, now: BsonDateTime) -> Result<(), OtpError> {
    let profile = profile.ok_or(OtpError::NoApplication)?;
    if profile.application_status != ApplicationStatus::PendingVerification {
        return Err(OtpError::WrongStatus);
    }
    if profile.otp.as_deref() != Some(otp.trim()) {
        return Err(OtpError::Mismatch);
    }
    match profile.otp_expires_at {
        Some(expires_at) if expires_at > now => Ok(()),
        _ => Err(OtpError::Expired),
    }
}

/// Step 1: create or reset the application and email a fresh OTP.
pub async fn send_otp(db: &MongoDB, mailer: &dyn Mailer, request: &SendOtpRequest) -> AppResult<()> {
    let email = normalize_email(&request.email)?;
    let users = db.users();
    let now = BsonDateTime::now();
    let otp = generate_otp();
    let expires_at = otp_expiry(now);

    let name = match users.find_one(doc! { "email": &email }).await? {
        Some(user) => {
            if user.role.is_admin() {
                return Err(AppError::Forbidden("Admin accounts cannot apply as instructors".to_string()));
            }
            if user.application_status() == Some(ApplicationStatus::Completed) {
                return Err(AppError::Conflict("Instructor application already submitted".to_string()));
            }

            users
                .update_one(
                    doc! { "_id": user.id },
                    doc! { "$set": {
                        "instructor_profile.application_status": ApplicationStatus::PendingVerification.as_str(),
                        "instructor_profile.approval": to_bson(&Approval::pending())?,
                        "instructor_profile.otp": &otp,
                        "instructor_profile.otp_expires_at": expires_at,
                        "updated_at": now,
                    }},
                )
                .await?;
            user.name
        }
        None => {
            let name = request
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or("Instructor")
                .to_string();

            let mut applicant = User::new(name.clone(), email.clone(), Role::Student);
            applicant.instructor_profile = Some(InstructorProfile::awaiting_verification(otp.clone(), expires_at));
            users.insert_one(&applicant).await?;
            name
        }
    };

    log::info!("🔑 OTP issued for instructor applicant {}", email);

    // Unlike notifications, a failed OTP delivery fails the request.
    mailer
        .send(email_service::otp_email(&email, &name, &otp, OTP_TTL_MINUTES))
        .await
}

/// Step 2: advance `pending_verification -> email_verified` when the OTP
/// matches and has not expired.
pub async fn verify_otp(db: &MongoDB, request: &VerifyOtpRequest) -> AppResult<()> {
    let email = normalize_email(&request.email)?;
    let otp = request.otp.trim();
    let now = BsonDateTime::now();
    let users = db.users();

    let updated = users
        .find_one_and_update(
            doc! {
                "email": &email,
                "instructor_profile.application_status": ApplicationStatus::PendingVerification.as_str(),
                "instructor_profile.otp": otp,
                "instructor_profile.otp_expires_at": { "$gt": now },
            },
            doc! {
                "$set": {
                    "instructor_profile.application_status": ApplicationStatus::EmailVerified.as_str(),
                    "updated_at": now,
                },
                "$unset": { "instructor_profile.otp": "", "instructor_profile.otp_expires_at": "" },
            },
        )
        .await?;

    if updated.is_some() {
        log::info!("✅ Email verified for instructor applicant {}", email);
        return Ok(());
    }

    let user = users.find_one(doc! { "email": &email }).await?;
    let profile = user.as_ref().and_then(|u| u.instructor_profile.as_ref());
    check_otp(profile, otp, now)?;

    // The record matched when re-read but not during the update: a concurrent
    // request consumed the OTP first.
    Err(OtpError::WrongStatus.into())
}

/// Step 3: store the profile, hash the password, promote to instructor and
/// queue the application for review.
pub async fn complete_profile(
    db: &MongoDB,
    config: &AppConfig,
    media: &dyn MediaStore,
    mailer: &dyn Mailer,
    submission: ProfileSubmission,
    document: Option<LocalUpload>,
) -> AppResult<AuthResponse> {
    let prepared = prepare_profile(db, &submission).await;
    let (email, name, password_hash) = match prepared {
        Ok(values) => values,
        Err(e) => {
            media_service::discard(document).await;
            return Err(e);
        }
    };

    let stored = match document {
        Some(upload) => Some(media_service::ingest(media, upload, ResourceType::Raw).await?),
        None => None,
    };
    let document_url = stored.as_ref().map(|m| m.url.clone());

    let now = BsonDateTime::now();
    let written = async {
        let approval = to_bson(&Approval::pending())?;
        db.users()
            .find_one_and_update(
                doc! {
                    "email": &email,
                    "role": Role::Student.as_str(),
                    "instructor_profile.application_status": ApplicationStatus::EmailVerified.as_str(),
                },
                doc! { "$set": {
                    "name": &name,
                    "password": password_hash,
                    "phone": submission.phone.clone(),
                    "role": Role::Instructor.as_str(),
                    "instructor_profile.application_status": ApplicationStatus::Completed.as_str(),
                    "instructor_profile.approval": approval,
                    "instructor_profile.bio": submission.bio.clone(),
                    "instructor_profile.expertise": submission.expertise.clone(),
                    "instructor_profile.experience_years": submission.experience_years,
                    "instructor_profile.qualification": submission.qualification.clone(),
                    "instructor_profile.linkedin": submission.linkedin.clone(),
                    "instructor_profile.document_url": document_url,
                    "instructor_profile.submitted_at": now,
                    "updated_at": now,
                }},
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| AppError::Conflict("Application was already submitted".to_string()))
    }
    .await;
    let user = media_service::release_on_error(media, stored.as_ref(), ResourceType::Raw, written).await?;

    log::info!("🎓 Instructor application completed: {}", email);

    if let Some(admin_email) = &config.admin_notify_email {
        email_service::notify(mailer, email_service::new_application_email(admin_email, &name, &email)).await;
    }

    auth_service::auth_response(user, &config.jwt)
}

async fn prepare_profile(db: &MongoDB, submission: &ProfileSubmission) -> AppResult<(String, String, String)> {
    let email = normalize_email(&submission.email)?;
    let name = require_text(&submission.name, "Name")?;

    let user = db
        .users()
        .find_one(doc! { "email": &email })
        .await?
        .ok_or(OtpError::NoApplication)?;

    match user.application_status() {
        Some(ApplicationStatus::EmailVerified) => {}
        Some(ApplicationStatus::Completed) => {
            return Err(AppError::Conflict("Application was already submitted".to_string()))
        }
        Some(ApplicationStatus::PendingVerification) => {
            return Err(AppError::Conflict("Verify your email before completing the profile".to_string()))
        }
        None => return Err(OtpError::NoApplication.into()),
    }

    let password_hash = auth_service::hash_password(&submission.password)?;
    Ok((email, name, password_hash))
}

/// Matches the instructor only while the application is submitted and still
/// in the moderation state it was read in.
pub(crate) fn resubmission_filter(user_id: ObjectId, current: ApprovalStatus) -> Document {
    doc! {
        "_id": user_id,
        "role": Role::Instructor.as_str(),
        "instructor_profile.application_status": ApplicationStatus::Completed.as_str(),
        "instructor_profile.approval.status": current.as_str(),
    }
}

pub(crate) fn resubmission_update(
    changes: &ProfileChanges,
    next: &Approval,
    document_url: Option<&str>,
    now: BsonDateTime,
) -> AppResult<Document> {
    let mut set = doc! {
        "instructor_profile.approval": to_bson(next)?,
        "instructor_profile.submitted_at": now,
        "updated_at": now,
    };
    if let Some(bio) = &changes.bio {
        set.insert("instructor_profile.bio", bio.as_str());
    }
    if let Some(expertise) = &changes.expertise {
        set.insert("instructor_profile.expertise", expertise.clone());
    }
    if let Some(years) = changes.experience_years {
        if years < 0 {
            return Err(AppError::BadRequest("Experience cannot be negative".to_string()));
        }
        set.insert("instructor_profile.experience_years", years);
    }
    if let Some(qualification) = &changes.qualification {
        set.insert("instructor_profile.qualification", qualification.as_str());
    }
    if let Some(linkedin) = &changes.linkedin {
        set.insert("instructor_profile.linkedin", linkedin.as_str());
    }
    if let Some(url) = document_url {
        set.insert("instructor_profile.document_url", url);
    }
    Ok(doc! { "$set": set })
}

/// Lets an instructor edit a submitted application. Any edit, including one
/// after a rejection, puts the application back into the review queue.
pub async fn resubmit_profile(
    db: &MongoDB,
    config: &AppConfig,
    media: &dyn MediaStore,
    mailer: &dyn Mailer,
    claims: &Claims,
    changes: ProfileChanges,
    document: Option<LocalUpload>,
) -> AppResult<UserResponse> {
    let checked = async {
        claims.require_role(&[Role::Instructor])?;
        let user_id = claims.user_id()?;
        let user = db
            .users()
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        let profile = user
            .instructor_profile
            .as_ref()
            .filter(|p| p.application_status == ApplicationStatus::Completed)
            .ok_or_else(|| AppError::Conflict("Complete the instructor application first".to_string()))?;
        let current = profile.approval.status;
        let next = profile.approval.apply(&ModerationAction::Resubmit)?;
        let update = resubmission_update(&changes, &next, None, BsonDateTime::now())?;
        Ok::<_, AppError>((user_id, current, next, update))
    }
    .await;

    let (user_id, current, next, mut update) = match checked {
        Ok(values) => values,
        Err(e) => {
            media_service::discard(document).await;
            return Err(e);
        }
    };

    let stored = match document {
        Some(upload) => Some(media_service::ingest(media, upload, ResourceType::Raw).await?),
        None => None,
    };
    if let Some(stored) = &stored {
        update = resubmission_update(&changes, &next, Some(&stored.url), BsonDateTime::now())?;
    }

    let written = db
        .users()
        .find_one_and_update(resubmission_filter(user_id, current), update)
        .return_document(ReturnDocument::After)
        .await
        .map_err(AppError::from)
        .and_then(|u| {
            u.ok_or_else(|| AppError::Conflict("Application changed while saving, reload and retry".to_string()))
        });
    let user = media_service::release_on_error(media, stored.as_ref(), ResourceType::Raw, written).await?;

    log::info!("🔁 Instructor application resubmitted: {} (was {})", user.email, current.as_str());

    if let Some(admin_email) = &config.admin_notify_email {
        email_service::notify(mailer, email_service::new_application_email(admin_email, &user.name, &user.email))
            .await;
    }

    Ok(UserResponse::from(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_profile(otp: &str, expires_in_ms: i64) -> InstructorProfile {
        let now = BsonDateTime::now();
        InstructorProfile::awaiting_verification(
            otp.to_string(),
            BsonDateTime::from_millis(now.timestamp_millis() + expires_in_ms),
        )
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..200 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn expiry_is_ten_minutes_out() {
        let now = BsonDateTime::from_millis(1_000_000);
        assert_eq!(otp_expiry(now).timestamp_millis(), 1_000_000 + 600_000);
    }

    #[test]
    fn matching_unexpired_otp_passes() {
        let profile = pending_profile("482913", 60_000);
        assert_eq!(check_otp(Some(&profile), " 482913 ", BsonDateTime::now()), Ok(()));
    }

    #[test]
    fn wrong_otp_is_rejected() {
        let profile = pending_profile("482913", 60_000);
        assert_eq!(check_otp(Some(&profile), "000000", BsonDateTime::now()), Err(OtpError::Mismatch));
    }

    #[test]
    fn expired_otp_is_rejected() {
        let profile = pending_profile("482913", -1);
        assert_eq!(check_otp(Some(&profile), "482913", BsonDateTime::now()), Err(OtpError::Expired));
    }

    #[test]
    fn status_must_be_pending_verification() {
        let mut profile = pending_profile("482913", 60_000);
        profile.application_status = ApplicationStatus::EmailVerified;
        assert_eq!(check_otp(Some(&profile), "482913", BsonDateTime::now()), Err(OtpError::WrongStatus));

        profile.application_status = ApplicationStatus::Completed;
        assert_eq!(check_otp(Some(&profile), "482913", BsonDateTime::now()), Err(OtpError::WrongStatus));
    }

    #[test]
    fn missing_application_is_reported() {
        assert_eq!(check_otp(None, "482913", BsonDateTime::now()), Err(OtpError::NoApplication));
    }

    #[test]
    fn otp_errors_map_to_http_semantics() {
        assert!(matches!(AppError::from(OtpError::Expired), AppError::BadRequest(_)));
        assert!(matches!(AppError::from(OtpError::WrongStatus), AppError::Conflict(_)));
        assert!(matches!(AppError::from(OtpError::NoApplication), AppError::NotFound(_)));
    }

    fn changes() -> ProfileChanges {
        ProfileChanges {
            bio: Some("Ten years of backend work".into()),
            expertise: Some(vec!["rust".into(), "databases".into()]),
            experience_years: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn rejected_application_goes_back_to_pending_on_resubmit() {
        let rejected = Approval {
            status: ApprovalStatus::Rejected,
            reason: Some("Missing documents".into()),
        };
        let next = rejected.apply(&ModerationAction::Resubmit).unwrap();
        let update = resubmission_update(&changes(), &next, Some("https://cdn/doc.pdf"), BsonDateTime::now()).unwrap();

        let set = update.get_document("$set").unwrap();
        let approval = set.get_document("instructor_profile.approval").unwrap();
        assert_eq!(approval.get_str("status").unwrap(), "pending");
        assert!(approval.get("reason").map_or(true, |r| r.as_null().is_some()));
        assert_eq!(set.get_str("instructor_profile.document_url").unwrap(), "https://cdn/doc.pdf");
        assert_eq!(set.get_str("instructor_profile.bio").unwrap(), "Ten years of backend work");
        assert!(!set.contains_key("instructor_profile.qualification"));
        assert!(!set.contains_key("instructor_profile.application_status"));
    }

    #[test]
    fn resubmission_is_guarded_by_the_status_it_was_read_in() {
        let id = ObjectId::new();
        let filter = resubmission_filter(id, ApprovalStatus::Rejected);
        assert_eq!(
            filter,
            doc! {
                "_id": id,
                "role": "instructor",
                "instructor_profile.application_status": "completed",
                "instructor_profile.approval.status": "rejected",
            }
        );
    }

    #[test]
    fn negative_experience_is_refused() {
        let bad = ProfileChanges {
            experience_years: Some(-2),
            ..Default::default()
        };
        let err = resubmission_update(&bad, &Approval::pending(), None, BsonDateTime::now()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
