use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::approval::Approval;
use crate::utils::to_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    #[default]
    Student,
    Instructor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
            Role::SuperAdmin => "superAdmin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }
}

/// Where a user stands in the three-step instructor onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    PendingVerification,
    EmailVerified,
    Completed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::PendingVerification => "pending_verification",
            ApplicationStatus::EmailVerified => "email_verified",
            ApplicationStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledCourse {
    pub course_id: ObjectId,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    #[serde(default)]
    pub progress: i32,
    pub enrolled_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructorProfile {
    pub application_status: ApplicationStatus,
    #[serde(default)]
    pub approval: Approval,
    pub otp: Option<String>,
    pub otp_expires_at: Option<BsonDateTime>,
    pub bio: Option<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
    pub experience_years: Option<i32>,
    pub qualification: Option<String>,
    pub linkedin: Option<String>,
    pub document_url: Option<String>,
    pub submitted_at: Option<BsonDateTime>,
}

impl InstructorProfile {
    pub fn awaiting_verification(otp: String, expires_at: BsonDateTime) -> Self {
        Self {
            application_status: ApplicationStatus::PendingVerification,
            approval: Approval::pending(),
            otp: Some(otp),
            otp_expires_at: Some(expires_at),
            bio: None,
            expertise: vec![],
            experience_years: None,
            qualification: None,
            linkedin: None,
            document_url: None,
            submitted_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>, // None for OAuth users and mid-onboarding applicants
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub google_id: Option<String>,
    pub provider: Option<String>, // "local" or "google"
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub enrolled_courses: Vec<EnrolledCourse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructor_profile: Option<InstructorProfile>,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

impl User {
    pub fn new(name: String, email: String, role: Role) -> Self {
        let now = BsonDateTime::now();
        Self {
            id: None,
            name,
            email,
            password: None,
            phone: None,
            avatar: None,
            google_id: None,
            provider: Some("local".to_string()),
            role,
            enrolled_courses: vec![],
            instructor_profile: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn is_enrolled(&self, course_id: &ObjectId) -> bool {
        self.enrolled_courses.iter().any(|e| &e.course_id == course_id)
    }

    pub fn application_status(&self) -> Option<ApplicationStatus> {
        self.instructor_profile.as_ref().map(|p| p.application_status)
    }
}

// ==================== RESPONSES ====================

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct EnrolledCourseInfo {
    pub course_id: String,
    pub progress: i32,
    pub enrolled_at: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct InstructorProfileInfo {
    pub application_status: ApplicationStatus,
    pub approval: Approval,
    pub bio: Option<String>,
    pub expertise: Vec<String>,
    pub experience_years: Option<i32>,
    pub qualification: Option<String>,
    pub linkedin: Option<String>,
    pub document_url: Option<String>,
}

/// Public view of a user. Never carries the password hash or OTP.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub enrolled_courses: Vec<EnrolledCourseInfo>,
    pub instructor_profile: Option<InstructorProfileInfo>,
    pub created_at: i64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            avatar: user.avatar,
            role: user.role,
            enrolled_courses: user
                .enrolled_courses
                .into_iter()
                .map(|e| EnrolledCourseInfo {
                    course_id: e.course_id.to_hex(),
                    progress: e.progress,
                    enrolled_at: e.enrolled_at.timestamp_millis(),
                })
                .collect(),
            instructor_profile: user.instructor_profile.map(|p| InstructorProfileInfo {
                application_status: p.application_status,
                approval: p.approval,
                bio: p.bio,
                expertise: p.expertise,
                experience_years: p.experience_years,
                qualification: p.qualification,
                linkedin: p.linkedin,
                document_url: p.document_url,
            }),
            created_at: to_millis(user.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_use_the_stored_spelling() {
        assert_eq!(serde_json::to_value(Role::SuperAdmin).unwrap(), "superAdmin");
        assert_eq!(Role::SuperAdmin.as_str(), "superAdmin");
        let parsed: Role = serde_json::from_value(serde_json::json!("instructor")).unwrap();
        assert_eq!(parsed, Role::Instructor);
        assert!(Role::Admin.is_admin() && Role::SuperAdmin.is_admin());
        assert!(!Role::Instructor.is_admin());
    }

    #[test]
    fn application_status_matches_its_string_form() {
        for status in [
            ApplicationStatus::PendingVerification,
            ApplicationStatus::EmailVerified,
            ApplicationStatus::Completed,
        ] {
            assert_eq!(serde_json::to_value(status).unwrap(), status.as_str());
        }
    }

    #[test]
    fn response_hides_secrets() {
        let mut user = User::new("Asha".into(), "asha@example.com".into(), Role::Student);
        user.id = Some(ObjectId::new());
        user.password = Some("$2b$12$hash".into());
        user.instructor_profile = Some(InstructorProfile::awaiting_verification(
            "123456".into(),
            BsonDateTime::now(),
        ));

        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        let text = json.to_string();
        assert!(!text.contains("$2b$12$hash"));
        assert!(!text.contains("123456"));
        assert_eq!(json["instructor_profile"]["application_status"], "pending_verification");
    }

    #[test]
    fn enrollment_lookup_matches_course_id() {
        let course = ObjectId::new();
        let mut user = User::new("Ravi".into(), "ravi@example.com".into(), Role::Student);
        assert!(!user.is_enrolled(&course));

        user.enrolled_courses.push(EnrolledCourse {
            course_id: course,
            order_id: None,
            payment_id: None,
            progress: 0,
            enrolled_at: BsonDateTime::now(),
        });
        assert!(user.is_enrolled(&course));
        assert!(!user.is_enrolled(&ObjectId::new()));
    }
}
