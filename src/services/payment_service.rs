// ==================== PAYMENTS ====================
// Razorpay checkout: create an order, verify the client-side signature, and
// enroll. The webhook is the server-to-server fallback for the same enrollment.

use hmac::{Hmac, Mac};
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime, Document};
use mongodb::ClientSession;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

use crate::config::RazorpayConfig;
use crate::database::{finish_transaction, MongoDB};
use crate::middleware::auth::Claims;
use crate::models::{ApprovalStatus, Course, EnrolledCourse};
use crate::services::email_service::{self, Mailer};
use crate::utils::{parse_object_id, AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

pub const PAYMENT_CAPTURED: &str = "payment.captured";

// ==================== SIGNATURES ====================

pub fn hmac_hex(secret: &str, payload: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of `signature_hex` against HMAC-SHA256(secret, payload).
/// An empty secret, malformed hex or any mismatch is a failure.
pub fn verify_signature(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let expected = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Checkout signature covers `"{order_id}|{payment_id}"`.
pub fn verify_payment_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let payload = format!("{}|{}", order_id, payment_id);
    verify_signature(secret, payload.as_bytes(), signature)
}

// ==================== RAZORPAY API ====================

/// Razorpay sends empty notes as `[]` rather than `{}`. Non-string values
/// are kept in their JSON form.
fn deserialize_notes<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let notes = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect(),
        _ => HashMap::new(),
    };
    Ok(notes)
}

#[derive(Debug, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default, deserialize_with = "deserialize_notes")]
    pub notes: HashMap<String, String>,
}

pub struct RazorpayClient {
    client: reqwest::Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    pub fn key_secret(&self) -> &str {
        &self.config.key_secret
    }

    pub fn webhook_secret(&self) -> &str {
        &self.config.webhook_secret
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    pub async fn create_order(&self, amount: i64, receipt: &str, notes: HashMap<&str, String>) -> AppResult<RazorpayOrder> {
        let body = serde_json::json!({
            "amount": amount,
            "currency": self.config.currency,
            "receipt": receipt,
            "notes": notes,
        });

        let response = self
            .client
            .post(self.url("orders"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!("Razorpay order creation failed ({}): {}", status, text)));
        }

        Ok(response.json().await?)
    }

    pub async fn fetch_order(&self, order_id: &str) -> AppResult<RazorpayOrder> {
        let response = self
            .client
            .get(self.url(&format!("orders/{}", urlencoding::encode(order_id))))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json().await?),
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::BAD_REQUEST => {
                Err(AppError::BadRequest("Unknown payment order".to_string()))
            }
            s => Err(AppError::External(format!("Razorpay order lookup failed ({})", s))),
        }
    }
}

// ==================== REQUESTS / RESPONSES ====================

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateOrderRequest {
    pub course_id: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct OrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub course_id: String,
    pub course_title: String,
}

/// Free courses enroll immediately and carry no order.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CheckoutResponse {
    pub enrolled: bool,
    pub order: Option<OrderResponse>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookEntity>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntity {
    pub entity: PaymentEntity,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_notes")]
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Enrolled,
    AlreadyEnrolled,
    Ignored(String),
}

// ==================== ENROLLMENT ====================

async fn purchasable_course(db: &MongoDB, course_id: ObjectId) -> AppResult<Course> {
    db.courses()
        .find_one(doc! { "_id": course_id, "is_approved.status": ApprovalStatus::Approved.as_str() })
        .await?
        .ok_or_else(|| AppError::not_found("Course"))
}

async fn ensure_not_enrolled(db: &MongoDB, user_id: ObjectId, course_id: ObjectId) -> AppResult<()> {
    let enrolled = db
        .users()
        .count_documents(doc! { "_id": user_id, "enrolled_courses.course_id": course_id })
        .await?;
    if enrolled > 0 {
        return Err(AppError::Conflict("You are already enrolled in this course".to_string()));
    }
    Ok(())
}

/// Filter that only matches the user while `course_id` is not yet in their enrollments.
pub(crate) fn enrollment_guard(user_id: ObjectId, course_id: ObjectId) -> Document {
    doc! { "_id": user_id, "enrolled_courses.course_id": { "$ne": course_id } }
}

async fn enroll_in_session(
    db: &MongoDB,
    session: &mut ClientSession,
    user_id: ObjectId,
    course_id: ObjectId,
    entry: &EnrolledCourse,
) -> AppResult<EnrollOutcome> {
    let pushed = db
        .users()
        .update_one(
            enrollment_guard(user_id, course_id),
            doc! {
                "$push": { "enrolled_courses": to_bson(entry)? },
                "$set": { "updated_at": BsonDateTime::now() },
            },
        )
        .session(&mut *session)
        .await?;

    if pushed.matched_count == 0 {
        let exists = db
            .users()
            .count_documents(doc! { "_id": user_id })
            .session(&mut *session)
            .await?;
        if exists == 0 {
            return Err(AppError::not_found("User"));
        }
        return Ok(EnrollOutcome::AlreadyEnrolled);
    }

    let roster = db
        .courses()
        .update_one(
            doc! { "_id": course_id },
            doc! { "$addToSet": { "enrolled_students": user_id } },
        )
        .session(&mut *session)
        .await?;

    if roster.matched_count == 0 {
        return Err(AppError::not_found("Course"));
    }

    Ok(EnrollOutcome::Enrolled)
}

/// Adds the course to the user's enrollments and the user to the course
/// roster in one transaction. A second call for the same pair changes nothing.
pub async fn enroll(
    db: &MongoDB,
    user_id: ObjectId,
    course_id: ObjectId,
    order_id: Option<String>,
    payment_id: Option<String>,
) -> AppResult<EnrollOutcome> {
    let entry = EnrolledCourse {
        course_id,
        order_id,
        payment_id,
        progress: 0,
        enrolled_at: BsonDateTime::now(),
    };

    let mut session = db.start_transaction().await?;
    let result = enroll_in_session(db, &mut session, user_id, course_id, &entry).await;
    let outcome = finish_transaction(&mut session, result).await?;

    log::info!(
        "🎟️ Enrollment {} -> {}: {:?}",
        user_id.to_hex(),
        course_id.to_hex(),
        outcome
    );
    Ok(outcome)
}

async fn send_enrollment_email(db: &MongoDB, mailer: &dyn Mailer, user_id: ObjectId, course_title: &str) {
    match db.users().find_one(doc! { "_id": user_id }).await {
        Ok(Some(user)) => {
            email_service::notify(mailer, email_service::enrollment_email(&user.email, &user.name, course_title)).await
        }
        Ok(None) => {}
        Err(e) => log::warn!("⚠️ Could not load user {} for enrollment email: {}", user_id.to_hex(), e),
    }
}

/// Amount to charge in minor units; prices that cannot be converted are
/// refused instead of falling through to free enrollment.
pub fn checkout_amount(course: &Course) -> AppResult<i64> {
    course
        .amount_in_minor_units()
        .ok_or_else(|| AppError::BadRequest("Course price is out of range".to_string()))
}

pub fn receipt_for(course_id: &ObjectId) -> String {
    // Razorpay caps receipts at 40 characters
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    format!("rcpt_{}_{}", course_id.to_hex(), suffix)
}

pub async fn create_order(
    db: &MongoDB,
    razorpay: &RazorpayClient,
    mailer: &dyn Mailer,
    claims: &Claims,
    request: &CreateOrderRequest,
) -> AppResult<CheckoutResponse> {
    let user_id = claims.user_id()?;
    let course_id = parse_object_id(&request.course_id, "course")?;
    let course = purchasable_course(db, course_id).await?;
    ensure_not_enrolled(db, user_id, course_id).await?;

    let amount = checkout_amount(&course)?;
    if amount == 0 {
        let outcome = enroll(db, user_id, course_id, None, None).await?;
        if outcome == EnrollOutcome::AlreadyEnrolled {
            return Err(AppError::Conflict("You are already enrolled in this course".to_string()));
        }
        send_enrollment_email(db, mailer, user_id, &course.title).await;
        return Ok(CheckoutResponse {
            enrolled: true,
            order: None,
        });
    }

    let mut notes = HashMap::new();
    notes.insert("user_id", user_id.to_hex());
    notes.insert("course_id", course_id.to_hex());

    let order = razorpay.create_order(amount, &receipt_for(&course_id), notes).await?;
    log::info!("💳 Razorpay order {} created for course {}", order.id, course_id.to_hex());

    Ok(CheckoutResponse {
        enrolled: false,
        order: Some(OrderResponse {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: razorpay.key_id().to_string(),
            course_id: course_id.to_hex(),
            course_title: course.title,
        }),
    })
}

/// The order's notes must name the same user and course the client claims.
pub fn order_matches(order: &RazorpayOrder, user_id: &ObjectId, course_id: &ObjectId) -> bool {
    order.notes.get("user_id").map(String::as_str) == Some(user_id.to_hex().as_str())
        && order.notes.get("course_id").map(String::as_str) == Some(course_id.to_hex().as_str())
}

pub async fn verify_and_enroll(
    db: &MongoDB,
    razorpay: &RazorpayClient,
    mailer: &dyn Mailer,
    claims: &Claims,
    request: &VerifyPaymentRequest,
) -> AppResult<()> {
    let user_id = claims.user_id()?;
    let course_id = parse_object_id(&request.course_id, "course")?;

    if !verify_payment_signature(
        razorpay.key_secret(),
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
    ) {
        log::warn!("🚫 Payment signature mismatch for order {}", request.razorpay_order_id);
        return Err(AppError::BadRequest("Invalid payment signature".to_string()));
    }

    let order = razorpay.fetch_order(&request.razorpay_order_id).await?;
    if !order_matches(&order, &user_id, &course_id) {
        log::warn!("🚫 Order {} does not belong to this checkout", order.id);
        return Err(AppError::BadRequest("Payment does not match this course".to_string()));
    }

    let course = purchasable_course(db, course_id).await?;
    let outcome = enroll(
        db,
        user_id,
        course_id,
        Some(request.razorpay_order_id.clone()),
        Some(request.razorpay_payment_id.clone()),
    )
    .await?;

    if outcome == EnrollOutcome::AlreadyEnrolled {
        return Err(AppError::Conflict("You are already enrolled in this course".to_string()));
    }

    send_enrollment_email(db, mailer, user_id, &course.title).await;
    Ok(())
}

/// Authenticates the raw body with the webhook secret, then enrolls on
/// `payment.captured`. Other events are acknowledged and ignored.
pub async fn handle_webhook(
    db: &MongoDB,
    razorpay: &RazorpayClient,
    mailer: &dyn Mailer,
    body: &[u8],
    signature: Option<&str>,
) -> AppResult<WebhookOutcome> {
    let signature = signature.ok_or_else(|| AppError::BadRequest("Missing webhook signature".to_string()))?;
    if !verify_signature(razorpay.webhook_secret(), body, signature) {
        log::warn!("🚫 Rejected webhook with invalid signature");
        return Err(AppError::BadRequest("Invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Malformed webhook payload: {}", e)))?;

    if event.event != PAYMENT_CAPTURED {
        return Ok(WebhookOutcome::Ignored(event.event));
    }

    let payment = match event.payload.payment {
        Some(p) => p.entity,
        None => return Ok(WebhookOutcome::Ignored("payment.captured without payment".to_string())),
    };

    let (user_id, course_id) = match (payment.notes.get("user_id"), payment.notes.get("course_id")) {
        (Some(u), Some(c)) => (parse_object_id(u, "user")?, parse_object_id(c, "course")?),
        _ => return Ok(WebhookOutcome::Ignored("payment without enrollment notes".to_string())),
    };

    let course = purchasable_course(db, course_id).await?;
    let outcome = enroll(db, user_id, course_id, payment.order_id, Some(payment.id)).await?;

    match outcome {
        EnrollOutcome::Enrolled => {
            send_enrollment_email(db, mailer, user_id, &course.title).await;
            Ok(WebhookOutcome::Enrolled)
        }
        EnrollOutcome::AlreadyEnrolled => Ok(WebhookOutcome::AlreadyEnrolled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_guard_excludes_existing_enrollments() {
        let user_id = ObjectId::new();
        let course_id = ObjectId::new();
        let guard = enrollment_guard(user_id, course_id);

        assert_eq!(guard.get_object_id("_id").unwrap(), user_id);
        let clause = guard.get_document("enrolled_courses.course_id").unwrap();
        assert_eq!(clause.get_object_id("$ne").unwrap(), course_id);
        assert_eq!(guard.len(), 2);
    }

    #[test]
    fn hmac_matches_known_vector() {
        let mac = hmac_hex("key", b"The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(mac, "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8");
    }

    #[test]
    fn payment_signature_roundtrip() {
        let sig = hmac_hex("rzp_secret", b"order_123|pay_456").unwrap();
        assert!(verify_payment_signature("rzp_secret", "order_123", "pay_456", &sig));
    }

    #[test]
    fn tampered_payment_is_rejected() {
        let sig = hmac_hex("rzp_secret", b"order_123|pay_456").unwrap();
        assert!(!verify_payment_signature("rzp_secret", "order_123", "pay_999", &sig));
        assert!(!verify_payment_signature("other_secret", "order_123", "pay_456", &sig));
    }

    #[test]
    fn malformed_or_empty_signatures_fail_closed() {
        assert!(!verify_signature("secret", b"body", "not-hex"));
        assert!(!verify_signature("secret", b"body", ""));
        let sig = hmac_hex("", b"body").unwrap();
        assert!(!verify_signature("", b"body", &sig));
    }

    #[test]
    fn order_notes_must_match_checkout() {
        let user = ObjectId::new();
        let course = ObjectId::new();
        let mut notes = HashMap::new();
        notes.insert("user_id".to_string(), user.to_hex());
        notes.insert("course_id".to_string(), course.to_hex());
        let order = RazorpayOrder {
            id: "order_1".into(),
            amount: 49_900,
            currency: "INR".into(),
            notes,
        };

        assert!(order_matches(&order, &user, &course));
        assert!(!order_matches(&order, &user, &ObjectId::new()));
        assert!(!order_matches(&order, &ObjectId::new(), &course));
    }

    fn priced(price: i64) -> Course {
        Course {
            id: Some(ObjectId::new()),
            title: "Rust".into(),
            description: "Ownership".into(),
            price,
            category: None,
            thumbnail: None,
            instructor_id: None,
            is_approved: crate::models::Approval::approved(),
            videos: vec![],
            enrolled_students: vec![],
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn checkout_amount_refuses_overflowing_prices() {
        assert_eq!(checkout_amount(&priced(499)).unwrap(), 49_900);
        assert_eq!(checkout_amount(&priced(0)).unwrap(), 0);
        assert!(matches!(checkout_amount(&priced(i64::MAX / 50)), Err(AppError::BadRequest(_))));
        assert!(matches!(checkout_amount(&priced(-1)), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn receipt_fits_razorpay_limit() {
        let receipt = receipt_for(&ObjectId::new());
        assert!(receipt.len() <= 40);
        assert!(receipt.starts_with("rcpt_"));
    }

    #[test]
    fn webhook_payload_parses_captured_payment() {
        let body = br#"{
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_1", "order_id": "order_1",
                "notes": { "user_id": "u", "course_id": "c" }
            } } }
        }"#;
        let event: WebhookEvent = serde_json::from_slice(body).unwrap();
        assert_eq!(event.event, PAYMENT_CAPTURED);
        let entity = event.payload.payment.unwrap().entity;
        assert_eq!(entity.id, "pay_1");
        assert_eq!(entity.order_id.as_deref(), Some("order_1"));
        assert_eq!(entity.notes.get("course_id").map(String::as_str), Some("c"));
    }

    #[test]
    fn empty_notes_array_parses_as_no_notes() {
        let body = br#"{"event":"payment.captured","payload":{"payment":{"entity":{"id":"pay_1","order_id":"order_1","notes":[]}}}}"#;
        let event: WebhookEvent = serde_json::from_slice(body).unwrap();
        assert!(event.payload.payment.unwrap().entity.notes.is_empty());

        let order: RazorpayOrder =
            serde_json::from_str(r#"{"id":"order_1","amount":100,"currency":"INR","notes":[]}"#).unwrap();
        assert!(order.notes.is_empty());
        assert!(!order_matches(&order, &ObjectId::new(), &ObjectId::new()));
    }

    #[test]
    fn missing_or_null_notes_parse_as_no_notes() {
        let order: RazorpayOrder = serde_json::from_str(r#"{"id":"order_1","amount":100,"currency":"INR"}"#).unwrap();
        assert!(order.notes.is_empty());
        let order: RazorpayOrder =
            serde_json::from_str(r#"{"id":"order_1","amount":100,"currency":"INR","notes":null}"#).unwrap();
        assert!(order.notes.is_empty());
    }

    #[test]
    fn non_string_note_values_are_kept() {
        let order: RazorpayOrder = serde_json::from_str(
            r#"{"id":"order_1","amount":100,"currency":"INR","notes":{"course_id":"c","attempt":2}}"#,
        )
        .unwrap();
        assert_eq!(order.notes.get("course_id").map(String::as_str), Some("c"));
        assert_eq!(order.notes.get("attempt").map(String::as_str), Some("2"));
    }
}
