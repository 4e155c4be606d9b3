use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::database::MongoDB;
use crate::middleware::auth::Claims;
use crate::services::payment_service::{self, CheckoutResponse, CreateOrderRequest, VerifyPaymentRequest, WebhookOutcome};
use crate::services::{Mailer, RazorpayClient};

pub const SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

#[utoipa::path(
    post,
    path = "/api/payment/create-order",
    tag = "Payment",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Razorpay order created, or free course enrolled", body = CheckoutResponse),
        (status = 404, description = "Course not found or not approved"),
        (status = 409, description = "Already enrolled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_order(
    db: web::Data<MongoDB>,
    razorpay: web::Data<RazorpayClient>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateOrderRequest>,
) -> HttpResponse {
    log::info!("💳 POST /payment/create-order - course {} by {}", request.course_id, claims.email);

    match payment_service::create_order(&db, &razorpay, mailer.get_ref(), &claims, &request).await {
        Ok(checkout) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "checkout": checkout
        })),
        Err(e) => {
            log::warn!("❌ Order creation failed: {}", e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/payment/verify",
    tag = "Payment",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified and enrollment recorded"),
        (status = 400, description = "Signature mismatch"),
        (status = 409, description = "Already enrolled")
    ),
    security(("bearer_auth" = []))
)]
pub async fn verify_payment(
    db: web::Data<MongoDB>,
    razorpay: web::Data<RazorpayClient>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    request: web::Json<VerifyPaymentRequest>,
) -> HttpResponse {
    log::info!("🔏 POST /payment/verify - order {}", request.razorpay_order_id);

    match payment_service::verify_and_enroll(&db, &razorpay, mailer.get_ref(), &claims, &request).await {
        Ok(()) => {
            log::info!("✅ Payment verified: {}", request.razorpay_payment_id);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "Payment verified, you are now enrolled"
            }))
        }
        Err(e) => {
            log::warn!("❌ Payment verification failed for {}: {}", request.razorpay_order_id, e);
            e.error_response()
        }
    }
}

/// Server-to-server callback. The body is read raw because the signature
/// covers the exact bytes Razorpay sent.
pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    db: web::Data<MongoDB>,
    razorpay: web::Data<RazorpayClient>,
    mailer: web::Data<dyn Mailer>,
) -> HttpResponse {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match payment_service::handle_webhook(&db, &razorpay, mailer.get_ref(), &body, signature).await {
        Ok(outcome) => {
            let status = match &outcome {
                WebhookOutcome::Enrolled => "enrolled".to_string(),
                WebhookOutcome::AlreadyEnrolled => "already_enrolled".to_string(),
                WebhookOutcome::Ignored(reason) => format!("ignored: {}", reason),
            };
            log::info!("🪝 Webhook processed: {}", status);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "status": status
            }))
        }
        Err(e) => {
            log::warn!("❌ Webhook rejected: {}", e);
            e.error_response()
        }
    }
}
