use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::approval::Approval;
use super::video::VideoResponse;
use crate::utils::to_millis;

/// Highest accepted course price, in whole currency units.
pub const MAX_COURSE_PRICE: i64 = 10_000_000;

/// Online course (stored in MongoDB)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    /// Price in whole currency units; orders are created in the smallest unit.
    pub price: i64,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    /// Owning instructor. None for courses published by admins.
    pub instructor_id: Option<ObjectId>,
    #[serde(default)]
    pub is_approved: Approval,
    #[serde(default)]
    pub videos: Vec<ObjectId>,
    #[serde(default)]
    pub enrolled_students: Vec<ObjectId>,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

impl Course {
    /// Order amount in the provider's smallest currency unit (paise for INR).
    /// None for negative prices or prices that overflow once converted.
    pub fn amount_in_minor_units(&self) -> Option<i64> {
        self.price.checked_mul(100).filter(|amount| *amount >= 0)
    }
}

/// Text fields of the course form (multipart or JSON).
#[derive(Debug, Default, Deserialize)]
pub struct CourseInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub category: Option<String>,
    /// Admins may assign a course to an instructor.
    pub instructor_id: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CourseResponse {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub instructor_id: Option<String>,
    pub is_approved: Approval,
    pub video_count: usize,
    pub student_count: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Course> for CourseResponse {
    fn from(course: Course) -> Self {
        CourseResponse {
            id: course.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: course.title,
            description: course.description,
            price: course.price,
            category: course.category,
            thumbnail: course.thumbnail,
            instructor_id: course.instructor_id.map(|id| id.to_hex()),
            is_approved: course.is_approved,
            video_count: course.videos.len(),
            student_count: course.enrolled_students.len(),
            created_at: to_millis(course.created_at),
            updated_at: to_millis(course.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: CourseResponse,
    pub instructor_name: Option<String>,
    pub videos: Vec<VideoResponse>,
}

#[derive(Debug, Serialize)]
pub struct EnrolledCourseView {
    pub course: CourseResponse,
    pub progress: i32,
    pub enrolled_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CourseQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}
