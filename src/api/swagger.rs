use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Learning Service API",
        version = "1.0.0",
        description = "API documentation for the e-learning backend. \n\n**Authentication:** protected endpoints accept a JWT as `Authorization: Bearer <token>` or in the `token` cookie set at login.\n\n**Features:**\n- Student accounts with email/password and Google sign-in\n- Instructor onboarding (email OTP, profile, document upload)\n- Course and video publishing with admin moderation\n- Razorpay checkout and webhook enrollment\n- Offline batches, staff attendance and contact inbox for admins",
        contact(
            name = "Learning Service Team",
            email = "support@learning-service.dev"
        )
    ),
    paths(
        // Auth
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::auth::get_me,

        // Courses
        crate::api::courses::list_courses,
        crate::api::courses::get_course,

        // Payment
        crate::api::payment::create_order,
        crate::api::payment::verify_payment,

        // Admin
        crate::api::admin::stats,

        // Contact
        crate::api::contact::submit,

        // Health & Metrics
        crate::api::health::health_check,
        crate::api::health::readiness,
        crate::api::metrics::get_metrics,
    ),
    components(
        schemas(
            // Auth
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::UpdateProfileRequest,
            crate::services::auth_service::AuthResponse,
            crate::services::onboarding_service::SendOtpRequest,
            crate::services::onboarding_service::VerifyOtpRequest,
            crate::models::UserResponse,
            crate::models::Role,

            // Catalogue & moderation
            crate::models::CourseResponse,
            crate::models::VideoResponse,
            crate::models::Approval,
            crate::models::ApprovalStatus,

            // Payment
            crate::services::payment_service::CreateOrderRequest,
            crate::services::payment_service::OrderResponse,
            crate::services::payment_service::CheckoutResponse,
            crate::services::payment_service::VerifyPaymentRequest,

            // Admin
            crate::services::admin_service::CreateAdminRequest,
            crate::services::admin_service::AdminStats,

            // Contact
            crate::models::CreateContactRequest,
            crate::models::ContactResponse,

            // Health & Metrics
            crate::api::health::HealthResponse,
            crate::api::metrics::MetricsResponse,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login, Google sign-in and instructor onboarding."),
        (name = "Courses", description = "Public catalogue of approved courses."),
        (name = "Payment", description = "Razorpay checkout and signature verification."),
        (name = "Admin", description = "Moderation queues, user management and dashboard figures."),
        (name = "Contact", description = "Public contact form."),
        (name = "Health", description = "Liveness, readiness and request metrics."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT issued by /api/auth/login"))
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_routes_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/auth/login"));
        assert!(doc.paths.paths.contains_key("/api/payment/verify"));
        assert!(doc.paths.paths.contains_key("/health"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
        assert!(components.schemas.contains_key("AdminStats"));
    }
}
