use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::database::MongoDB;
use crate::middleware::auth::{Claims, TOKEN_COOKIE};
use crate::services::auth_service::{self, AuthResponse, LoginRequest, RegisterRequest, UpdateProfileRequest};
use crate::services::media_service::LocalUpload;
use crate::services::onboarding_service::{self, ProfileChanges, ProfileSubmission, SendOtpRequest, VerifyOtpRequest};
use crate::services::{Mailer, MediaStore};

/// HttpOnly session cookie carrying the JWT.
pub fn session_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::hours(config.jwt.ttl_hours))
        .finish()
}

/// Short-lived cookie binding the Google OAuth `state` to the browser that started the flow.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";
const OAUTH_STATE_MINUTES: i64 = 10;

fn oauth_state_cookie(state: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build(OAUTH_STATE_COOKIE, state)
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::minutes(OAUTH_STATE_MINUTES))
        .finish()
}

fn removal_cookie(config: &AppConfig) -> Cookie<'static> {
    expired_cookie(TOKEN_COOKIE, config)
}

fn expired_cookie(name: &'static str, config: &AppConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "")
        .path("/")
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .finish();
    cookie.make_removal();
    cookie
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Student account created", body = AuthResponse),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<RegisterRequest>,
) -> HttpResponse {
    log::info!("📝 POST /auth/register - email: {}", request.email);

    match auth_service::register(&db, &config.jwt, &request).await {
        Ok(response) => {
            log::info!("✅ Registration successful: {}", request.email);
            HttpResponse::Created()
                .cookie(session_cookie(response.token.clone(), &config))
                .json(response)
        }
        Err(e) => {
            log::warn!("❌ Registration failed: {} - {}", request.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    request: web::Json<LoginRequest>,
) -> HttpResponse {
    log::info!("🔐 POST /auth/login - email: {}", request.email);

    match auth_service::login(&db, &config.jwt, &request).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", request.email);
            HttpResponse::Ok()
                .cookie(session_cookie(response.token.clone(), &config))
                .json(response)
        }
        Err(e) => {
            log::warn!("❌ Login failed: {} - {}", request.email, e);
            e.error_response()
        }
    }
}

pub async fn logout(config: web::Data<AppConfig>) -> HttpResponse {
    log::info!("👋 POST /auth/logout");
    HttpResponse::Ok().cookie(removal_cookie(&config)).json(serde_json::json!({
        "success": true,
        "message": "Logged out"
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("👤 GET /auth/me - {}", claims.email);

    match auth_service::get_current_user(&db, &claims).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user": user
        })),
        Err(e) => e.error_response(),
    }
}

pub async fn update_profile(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UpdateProfileRequest>,
) -> HttpResponse {
    log::info!("✏️ PUT /auth/profile - {}", claims.email);

    match auth_service::update_profile(&db, &claims, &request).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "user": user
        })),
        Err(e) => e.error_response(),
    }
}

// ==================== GOOGLE OAUTH ====================

pub async fn google_auth(config: web::Data<AppConfig>) -> HttpResponse {
    log::info!("🔐 GET /auth/google - Generating OAuth URL");

    match auth_service::generate_google_oauth_url(config.google.as_ref()) {
        Ok(response) => HttpResponse::Ok()
            .cookie(oauth_state_cookie(response.state.clone(), &config))
            .json(response),
        Err(e) => {
            log::error!("❌ Failed to generate Google OAuth URL: {}", e);
            e.error_response()
        }
    }
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// The callback `state` must echo the one stored in the browser's cookie.
fn state_matches(cookie: Option<&str>, query: Option<&str>) -> bool {
    match (cookie, query) {
        (Some(expected), Some(received)) => !expected.is_empty() && expected == received,
        _ => false,
    }
}

fn redirect(location: String, config: &AppConfig) -> HttpResponse {
    HttpResponse::Found()
        .cookie(expired_cookie(OAUTH_STATE_COOKIE, config))
        .append_header(("Location", location))
        .finish()
}

pub async fn google_callback(
    req: HttpRequest,
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    log::info!("🔐 GET /auth/google/callback - Processing Google OAuth");
    let frontend_url = config.frontend_url.trim_end_matches('/');

    if let Some(error) = &query.error {
        log::error!("❌ OAuth error: {}", error);
        return redirect(format!("{}/login?error={}", frontend_url, urlencoding::encode(error)), &config);
    }

    let stored_state = req.cookie(OAUTH_STATE_COOKIE);
    if !state_matches(stored_state.as_ref().map(|c| c.value()), query.state.as_deref()) {
        log::warn!("⚠️ OAuth callback rejected: state does not match the session");
        return redirect(format!("{}/login?error=invalid_state", frontend_url), &config);
    }

    let code = match &query.code {
        Some(c) => c,
        None => {
            log::error!("❌ No authorization code provided");
            return redirect(format!("{}/login?error=no_code", frontend_url), &config);
        }
    };

    match auth_service::handle_google_callback(&db, &config.jwt, config.google.as_ref(), code).await {
        Ok(response) => {
            log::info!("✅ Google OAuth successful: {}", response.user.email);
            HttpResponse::Found()
                .cookie(session_cookie(response.token, &config))
                .cookie(expired_cookie(OAUTH_STATE_COOKIE, &config))
                .append_header(("Location", format!("{}/auth/callback", frontend_url)))
                .finish()
        }
        Err(e) => {
            log::error!("❌ Google OAuth failed: {}", e);
            redirect(format!("{}/login?error=oauth_failed", frontend_url), &config)
        }
    }
}

// ==================== INSTRUCTOR ONBOARDING ====================

pub async fn send_otp(
    db: web::Data<MongoDB>,
    mailer: web::Data<dyn Mailer>,
    request: web::Json<SendOtpRequest>,
) -> HttpResponse {
    log::info!("📧 POST /auth/instructor/send-otp - {}", request.email);

    match onboarding_service::send_otp(&db, mailer.get_ref(), &request).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "OTP sent to your email"
        })),
        Err(e) => {
            log::warn!("❌ OTP request failed for {}: {}", request.email, e);
            e.error_response()
        }
    }
}

pub async fn verify_otp(db: web::Data<MongoDB>, request: web::Json<VerifyOtpRequest>) -> HttpResponse {
    log::info!("🔢 POST /auth/instructor/verify-otp - {}", request.email);

    match onboarding_service::verify_otp(&db, &request).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Email verified"
        })),
        Err(e) => {
            log::warn!("❌ OTP verification failed for {}: {}", request.email, e);
            e.error_response()
        }
    }
}

#[derive(MultipartForm)]
pub struct CompleteProfileForm {
    pub email: Text<String>,
    pub name: Text<String>,
    pub password: Text<String>,
    pub phone: Option<Text<String>>,
    pub bio: Option<Text<String>>,
    /// Comma-separated list.
    pub expertise: Option<Text<String>>,
    pub experience_years: Option<Text<i32>>,
    pub qualification: Option<Text<String>>,
    pub linkedin: Option<Text<String>>,
    #[multipart(limit = "20MB")]
    pub document: Option<TempFile>,
}

fn split_expertise(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional_text(field: Option<Text<String>>) -> Option<String> {
    field.map(Text::into_inner).map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub async fn complete_profile(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    media: web::Data<dyn MediaStore>,
    mailer: web::Data<dyn Mailer>,
    MultipartForm(form): MultipartForm<CompleteProfileForm>,
) -> HttpResponse {
    log::info!("🎓 POST /auth/instructor/complete-profile - {}", form.email.as_str());

    let document = match form.document.map(LocalUpload::from_temp_file).transpose() {
        Ok(document) => document,
        Err(e) => return e.error_response(),
    };

    let submission = ProfileSubmission {
        email: form.email.into_inner(),
        name: form.name.into_inner(),
        password: form.password.into_inner(),
        phone: optional_text(form.phone),
        bio: optional_text(form.bio),
        expertise: form.expertise.map(|e| split_expertise(&e)).unwrap_or_default(),
        experience_years: form.experience_years.map(Text::into_inner),
        qualification: optional_text(form.qualification),
        linkedin: optional_text(form.linkedin),
    };
    let email = submission.email.clone();

    match onboarding_service::complete_profile(&db, &config, media.get_ref(), mailer.get_ref(), submission, document).await
    {
        Ok(response) => HttpResponse::Ok()
            .cookie(session_cookie(response.token.clone(), &config))
            .json(response),
        Err(e) => {
            log::warn!("❌ Profile completion failed for {}: {}", email, e);
            e.error_response()
        }
    }
}

#[derive(MultipartForm)]
pub struct ResubmitProfileForm {
    pub bio: Option<Text<String>>,
    /// Comma-separated list.
    pub expertise: Option<Text<String>>,
    pub experience_years: Option<Text<i32>>,
    pub qualification: Option<Text<String>>,
    pub linkedin: Option<Text<String>>,
    #[multipart(limit = "20MB")]
    pub document: Option<TempFile>,
}

pub async fn resubmit_profile(
    db: web::Data<MongoDB>,
    config: web::Data<AppConfig>,
    media: web::Data<dyn MediaStore>,
    mailer: web::Data<dyn Mailer>,
    claims: web::ReqData<Claims>,
    MultipartForm(form): MultipartForm<ResubmitProfileForm>,
) -> HttpResponse {
    log::info!("🔁 PUT /auth/instructor/profile - {}", claims.email);

    let document = match form.document.map(LocalUpload::from_temp_file).transpose() {
        Ok(document) => document,
        Err(e) => return e.error_response(),
    };

    let changes = ProfileChanges {
        bio: optional_text(form.bio),
        expertise: form.expertise.map(|e| split_expertise(&e)),
        experience_years: form.experience_years.map(Text::into_inner),
        qualification: optional_text(form.qualification),
        linkedin: optional_text(form.linkedin),
    };

    match onboarding_service::resubmit_profile(&db, &config, media.get_ref(), mailer.get_ref(), &claims, changes, document)
        .await
    {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Application resubmitted for review",
            "user": user
        })),
        Err(e) => {
            log::warn!("❌ Application resubmission failed for {}: {}", claims.email, e);
            e.error_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expertise_is_split_and_trimmed() {
        assert_eq!(split_expertise(" rust, ,web ,ml"), vec!["rust", "web", "ml"]);
        assert!(split_expertise("").is_empty());
    }

    #[test]
    fn session_cookie_is_http_only() {
        let config = AppConfig::for_tests();
        let cookie = session_cookie("jwt".to_string(), &config);
        assert_eq!(cookie.name(), TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::hours(config.jwt.ttl_hours)));
    }

    #[test]
    fn oauth_state_cookie_is_short_lived_and_http_only() {
        let cookie = oauth_state_cookie("state-123".to_string(), &AppConfig::for_tests());
        assert_eq!(cookie.name(), OAUTH_STATE_COOKIE);
        assert_eq!(cookie.value(), "state-123");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(CookieDuration::minutes(10)));
    }

    #[test]
    fn oauth_state_must_match_the_cookie() {
        assert!(state_matches(Some("abc"), Some("abc")));
        assert!(!state_matches(Some("abc"), Some("abd")));
        assert!(!state_matches(None, Some("abc")));
        assert!(!state_matches(Some("abc"), None));
        assert!(!state_matches(Some(""), Some("")));
        assert!(!state_matches(None, None));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let cookie = removal_cookie(&AppConfig::for_tests());
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(CookieDuration::ZERO));
    }
}
