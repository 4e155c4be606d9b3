use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use super::approval::Approval;
use crate::utils::to_millis;

/// Lesson video. Belongs to exactly one course and one uploader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    /// Identifier of the asset in remote storage.
    pub public_id: String,
    pub duration: Option<f64>,
    pub course_id: ObjectId,
    pub uploaded_by: ObjectId,
    #[serde(default)]
    pub is_approved: Approval,
    pub created_at: Option<BsonDateTime>,
    pub updated_at: Option<BsonDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVideoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VideoResponse {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub url: String,
    pub duration: Option<f64>,
    pub course_id: String,
    pub uploaded_by: String,
    pub is_approved: Approval,
    pub created_at: i64,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        VideoResponse {
            id: video.id.map(|id| id.to_hex()).unwrap_or_default(),
            title: video.title,
            description: video.description,
            url: video.url,
            duration: video.duration,
            course_id: video.course_id.to_hex(),
            uploaded_by: video.uploaded_by.to_hex(),
            is_approved: video.is_approved,
            created_at: to_millis(video.created_at),
        }
    }
}
