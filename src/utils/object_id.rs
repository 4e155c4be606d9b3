use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};

use super::error::{AppError, AppResult};

/// Parses a hex id from a path segment or request body.
pub fn parse_object_id(raw: &str, what: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|_| AppError::BadRequest(format!("Invalid {} ID", what)))
}

pub fn to_millis(dt: Option<BsonDateTime>) -> i64 {
    dt.map(|d| d.timestamp_millis()).unwrap_or_default()
}

/// Lowercases and trims an email, rejecting obviously malformed input.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(AppError::BadRequest("A valid email is required".to_string()))
    }
}

pub fn require_text(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}
