// ==================== MEDIA INGESTION ====================
// Uploads arrive as multipart temp files, get relayed to Cloudinary and the
// local copy is removed whatever the outcome.

use actix_multipart::form::tempfile::TempFile;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::CloudinaryConfig;
use crate::utils::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }
}

/// A file persisted on local disk that we own and must delete.
#[derive(Debug)]
pub struct LocalUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub content_type: Option<String>,
}

impl LocalUpload {
    /// Takes ownership of the multipart temp file so cleanup is explicit.
    pub fn from_temp_file(file: TempFile) -> AppResult<Self> {
        let file_name = file.file_name.clone().unwrap_or_else(|| "upload".to_string());
        let content_type = file.content_type.as_ref().map(|m| m.to_string());
        let (_, path) = file
            .file
            .keep()
            .map_err(|e| AppError::Internal(format!("Failed to keep uploaded file: {}", e)))?;

        Ok(Self {
            path,
            file_name,
            content_type,
        })
    }

    pub fn is_video(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.starts_with("video/"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    pub duration: Option<f64>,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, local: &Path, file_name: &str, resource_type: ResourceType) -> AppResult<UploadedMedia>;
    async fn destroy(&self, public_id: &str, resource_type: ResourceType) -> AppResult<()>;
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Debug, Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
    duration: Option<f64>,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, resource_type: ResourceType, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            resource_type.as_str(),
            action
        )
    }
}

/// Cloudinary request signature: params sorted by key, joined as
/// `k=v&k2=v2`, suffixed with the API secret, hashed with SHA-256.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    hex::encode(Sha256::digest(format!("{}{}", to_sign, api_secret).as_bytes()))
}

/// Multipart part that streams `local` from disk instead of buffering it.
pub async fn file_part(local: &Path, file_name: &str) -> AppResult<reqwest::multipart::Part> {
    let file = tokio::fs::File::open(local).await?;
    let length = file.metadata().await?.len();
    Ok(reqwest::multipart::Part::stream_with_length(reqwest::Body::from(file), length).file_name(file_name.to_string()))
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, local: &Path, file_name: &str, resource_type: ResourceType) -> AppResult<UploadedMedia> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [("folder", self.config.folder.clone()), ("timestamp", timestamp.clone())];
        let signature = sign_params(&params, &self.config.api_secret);

        let part = file_part(local, file_name).await?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("folder", self.config.folder.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        log::info!("☁️  Uploading {} to Cloudinary ({})", file_name, resource_type.as_str());

        let response = self
            .client
            .post(self.endpoint(resource_type, "upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!("Cloudinary upload failed ({}): {}", status, body)));
        }

        let uploaded: CloudinaryUploadResponse = response.json().await?;
        log::info!("✅ Uploaded {} as {}", file_name, uploaded.public_id);

        Ok(UploadedMedia {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            duration: uploaded.duration,
        })
    }

    async fn destroy(&self, public_id: &str, resource_type: ResourceType) -> AppResult<()> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let params = [("public_id", public_id.to_string()), ("timestamp", timestamp.clone())];
        let signature = sign_params(&params, &self.config.api_secret);

        let response = self
            .client
            .post(self.endpoint(resource_type, "destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "Cloudinary destroy failed for {} ({})",
                public_id,
                response.status()
            )));
        }

        Ok(())
    }
}

async fn remove_local(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("⚠️ Could not remove temp file {}: {}", path.display(), e);
    }
}

/// Relays `upload` to remote storage, then deletes the local file on both
/// the success and the error path.
pub async fn ingest(store: &dyn MediaStore, upload: LocalUpload, resource_type: ResourceType) -> AppResult<UploadedMedia> {
    let result = store.upload(&upload.path, &upload.file_name, resource_type).await;
    remove_local(&upload.path).await;
    result
}

/// Drops an upload that will not be forwarded (request rejected early).
pub async fn discard(upload: Option<LocalUpload>) {
    if let Some(upload) = upload {
        remove_local(&upload.path).await;
    }
}

/// Removes a remote asset without failing the caller.
pub async fn destroy_quietly(store: &dyn MediaStore, public_id: &str, resource_type: ResourceType) {
    if let Err(e) = store.destroy(public_id, resource_type).await {
        log::warn!("⚠️ Remote asset {} was not removed: {}", public_id, e);
    }
}

/// Passes `result` through. When it is an error, the asset stored for the
/// failed write is removed first since nothing references it.
pub async fn release_on_error<T>(
    store: &dyn MediaStore,
    stored: Option<&UploadedMedia>,
    resource_type: ResourceType,
    result: AppResult<T>,
) -> AppResult<T> {
    if let (Err(e), Some(stored)) = (&result, stored) {
        log::warn!("↩️ Removing {} after failed write: {}", stored.public_id, e);
        destroy_quietly(store, &stored.public_id, resource_type).await;
    }
    result
}


#[cfg(test)]
mod tests {
    use super::testing::{local_file, FakeStore};
    use super::*;

    #[actix_rt::test]
    async fn ingest_removes_local_file_after_success() {
        let store = FakeStore::default();
        let upload = local_file("lesson.mp4");
        let path = upload.path.clone();

        let media = ingest(&store, upload, ResourceType::Video).await.unwrap();
        assert_eq!(media.public_id, "learning/lesson.mp4");
        assert!(!path.exists());
    }

    #[actix_rt::test]
    async fn ingest_removes_local_file_after_failure() {
        let store = FakeStore {
            fail: true,
            ..Default::default()
        };
        let upload = local_file("broken.mp4");
        let path = upload.path.clone();

        let err = ingest(&store, upload, ResourceType::Video).await.unwrap_err();
        assert!(matches!(err, AppError::External(_)));
        assert!(!path.exists());
    }

    #[actix_rt::test]
    async fn discard_removes_file() {
        let upload = local_file("unused.pdf");
        let path = upload.path.clone();
        discard(Some(upload)).await;
        assert!(!path.exists());
    }

    #[actix_rt::test]
    async fn failed_write_releases_the_stored_asset() {
        let store = FakeStore::default();
        let stored = ingest(&store, local_file("thumb.png"), ResourceType::Image).await.unwrap();

        let failed: AppResult<()> = Err(AppError::Internal("write conflict".to_string()));
        let result = release_on_error(&store, Some(&stored), ResourceType::Image, failed).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(*store.destroyed.lock().unwrap(), vec!["learning/thumb.png".to_string()]);
    }

    #[actix_rt::test]
    async fn successful_write_keeps_the_asset() {
        let store = FakeStore::default();
        let stored = ingest(&store, local_file("doc.pdf"), ResourceType::Raw).await.unwrap();

        let result = release_on_error(&store, Some(&stored), ResourceType::Raw, Ok(7)).await;
        assert_eq!(result.unwrap(), 7);
        let none: AppResult<()> = Err(AppError::Internal("boom".to_string()));
        assert!(release_on_error(&store, None, ResourceType::Raw, none).await.is_err());
        assert!(store.destroyed.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn file_part_streams_existing_files_only() {
        let upload = local_file("lecture.mp4");
        assert!(file_part(&upload.path, "lecture.mp4").await.is_ok());
        std::fs::remove_file(&upload.path).unwrap();

        assert!(file_part(&upload.path, "lecture.mp4").await.is_err());
    }

    #[test]
    fn signature_sorts_params_and_appends_secret() {
        let params = [("timestamp", "1700000000".to_string()), ("folder", "learning".to_string())];
        let expected = hex::encode(Sha256::digest(b"folder=learning&timestamp=1700000000s3cr3t"));
        assert_eq!(sign_params(&params, "s3cr3t"), expected);
    }

    #[test]
    fn video_detection_uses_content_type() {
        let mut upload = local_file("x.mp4");
        assert!(upload.is_video());
        upload.content_type = Some("application/pdf".to_string());
        assert!(!upload.is_video());
        std::fs::remove_file(&upload.path).unwrap();
    }
}
