use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::{GoogleOAuthConfig, JwtConfig};
use crate::database::{is_duplicate_key, MongoDB};
use crate::middleware::auth::Claims;
use crate::models::{Role, User, UserResponse};
use crate::utils::{normalize_email, require_text, AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 6;

// Request/Response structures

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct GoogleAuthUrlResponse {
    pub success: bool,
    pub auth_url: String,
    pub state: String,
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> AppResult<String> {
    validate_password(password)?;
    Ok(hash(password, DEFAULT_COST)?)
}

// Generate JWT token
pub fn generate_jwt(user: &User, config: &JwtConfig) -> AppResult<String> {
    let user_id = user
        .id
        .ok_or_else(|| AppError::Internal("Cannot issue a token for an unsaved user".to_string()))?;

    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_hex(),
        email: user.email.clone(),
        name: user.name.clone(),
        role: user.role,
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(config.ttl_hours)).timestamp() as usize,
        jti: Uuid::new_v4().to_string(),
        aud: config.audience.clone(),
        iss: config.issuer.clone(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_ref()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))
}

// Verify JWT token
pub fn verify_token(token: &str, config: &JwtConfig) -> AppResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[config.audience.as_str()]);

    let mut issuers = HashSet::new();
    issuers.insert(config.issuer.clone());
    validation.iss = Some(issuers);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

pub fn auth_response(user: User, config: &JwtConfig) -> AppResult<AuthResponse> {
    let token = generate_jwt(&user, config)?;
    Ok(AuthResponse {
        success: true,
        token,
        user: UserResponse::from(user),
    })
}

// Student registration
pub async fn register(db: &MongoDB, config: &JwtConfig, request: &RegisterRequest) -> AppResult<AuthResponse> {
    let name = require_text(&request.name, "Name")?;
    let email = normalize_email(&request.email)?;
    let password = hash_password(&request.password)?;

    let users = db.users();
    if users.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(AppError::Conflict("User already exists".to_string()));
    }

    let mut user = User::new(name, email, Role::Student);
    user.password = Some(password);
    user.phone = request.phone.clone();

    let result = users.insert_one(&user).await.map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::Conflict("User already exists".to_string())
        } else {
            AppError::Database(e)
        }
    })?;
    user.id = result.inserted_id.as_object_id();

    log::info!("✅ User registered successfully: {}", user.email);

    auth_response(user, config)
}

// User login
pub async fn login(db: &MongoDB, config: &JwtConfig, request: &LoginRequest) -> AppResult<AuthResponse> {
    let email = normalize_email(&request.email)
        .map_err(|_| AppError::Unauthorized("Invalid credentials".to_string()))?;

    let user = db
        .users()
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    // Check if user has a password (not OAuth-only account)
    let stored_password = user.password.as_ref().ok_or_else(|| {
        AppError::Unauthorized("This account has no password. Sign in with Google or finish onboarding.".to_string())
    })?;

    if !verify(&request.password, stored_password)? {
        return Err(AppError::Unauthorized("Invalid credentials".to_string()));
    }

    auth_response(user, config)
}

// Get current user
pub async fn get_current_user(db: &MongoDB, claims: &Claims) -> AppResult<UserResponse> {
    let user = db
        .users()
        .find_one(doc! { "_id": claims.user_id()? })
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(UserResponse::from(user))
}

pub async fn update_profile(db: &MongoDB, claims: &Claims, request: &UpdateProfileRequest) -> AppResult<UserResponse> {
    let mut set = doc! { "updated_at": BsonDateTime::now() };
    if let Some(name) = &request.name {
        set.insert("name", require_text(name, "Name")?);
    }
    if let Some(phone) = &request.phone {
        set.insert("phone", phone.trim());
    }
    if let Some(avatar) = &request.avatar {
        set.insert("avatar", avatar.trim());
    }

    let user = db
        .users()
        .find_one_and_update(doc! { "_id": claims.user_id()? }, doc! { "$set": set })
        .return_document(mongodb::options::ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(UserResponse::from(user))
}

// ==================== GOOGLE OAUTH ====================

fn google_config(config: Option<&GoogleOAuthConfig>) -> AppResult<&GoogleOAuthConfig> {
    config.ok_or_else(|| AppError::BadRequest("Google sign-in is not configured".to_string()))
}

// Generate Google OAuth URL
pub fn generate_google_oauth_url(config: Option<&GoogleOAuthConfig>) -> AppResult<GoogleAuthUrlResponse> {
    let google = google_config(config)?;

    // Echoed back on the callback and checked against the oauth_state cookie
    let state = Uuid::new_v4().to_string();

    let params = [
        ("client_id", google.client_id.as_str()),
        ("redirect_uri", google.redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", "openid email profile"),
        ("state", state.as_str()),
        ("access_type", "offline"),
        ("prompt", "select_account"),
    ];

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Ok(GoogleAuthUrlResponse {
        success: true,
        auth_url: format!("https://accounts.google.com/o/oauth2/v2/auth?{}", query_string),
        state,
    })
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    name: Option<String>,
    picture: Option<String>,
}

// Handle Google OAuth callback: find by google_id, then by email, else create a student
pub async fn handle_google_callback(
    db: &MongoDB,
    jwt: &JwtConfig,
    config: Option<&GoogleOAuthConfig>,
    code: &str,
) -> AppResult<AuthResponse> {
    let google = google_config(config)?;

    // Exchange code for tokens
    let client = reqwest::Client::new();
    let token_response = client
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("code", code),
            ("client_id", google.client_id.as_str()),
            ("client_secret", google.client_secret.as_str()),
            ("redirect_uri", google.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    if !token_response.status().is_success() {
        return Err(AppError::Unauthorized("Failed to exchange authorization code".to_string()));
    }

    let tokens: GoogleTokenResponse = token_response.json().await?;

    let info: GoogleUserInfo = client
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .bearer_auth(&tokens.access_token)
        .send()
        .await?
        .json()
        .await?;

    let email = normalize_email(&info.email)?;
    let users = db.users();

    let existing = match users.find_one(doc! { "google_id": &info.id }).await? {
        Some(user) => Some(user),
        None => users.find_one(doc! { "email": &email }).await?,
    };

    let user = match existing {
        Some(user) => {
            log::info!("✅ Google sign-in for existing user: {}", email);
            users
                .find_one_and_update(
                    doc! { "_id": user.id },
                    doc! { "$set": {
                        "google_id": &info.id,
                        "avatar": user.avatar.clone().or(info.picture.clone()),
                        "updated_at": BsonDateTime::now(),
                    }},
                )
                .return_document(mongodb::options::ReturnDocument::After)
                .await?
                .ok_or_else(|| AppError::not_found("User"))?
        }
        None => {
            let name = info.name.clone().unwrap_or_else(|| email.clone());
            let mut user = User::new(name, email.clone(), Role::Student);
            user.google_id = Some(info.id.clone());
            user.avatar = info.picture.clone();
            user.provider = Some("google".to_string());

            let result = users.insert_one(&user).await?;
            user.id = result.inserted_id.as_object_id();
            log::info!("✅ Created user from Google sign-in: {}", email);
            user
        }
    };

    auth_response(user, jwt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "unit-test-secret".to_string(),
            issuer: "learning-service".to_string(),
            audience: "learning-api".to_string(),
            ttl_hours: 1,
        }
    }

    fn saved_user(role: Role) -> User {
        let mut user = User::new("Nia".into(), "nia@example.com".into(), role);
        user.id = Some(ObjectId::new());
        user
    }

    #[test]
    fn issued_tokens_verify_and_carry_role() {
        let user = saved_user(Role::Instructor);
        let token = generate_jwt(&user, &jwt_config()).unwrap();

        let claims = verify_token(&token, &jwt_config()).unwrap();
        assert_eq!(claims.sub, user.id.unwrap().to_hex());
        assert_eq!(claims.role, Role::Instructor);
        assert_eq!(claims.email, "nia@example.com");
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let token = generate_jwt(&saved_user(Role::Student), &jwt_config()).unwrap();
        let mut other = jwt_config();
        other.secret = "different".to_string();
        assert!(matches!(verify_token(&token, &other), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn tokens_for_another_audience_are_rejected() {
        let token = generate_jwt(&saved_user(Role::Student), &jwt_config()).unwrap();
        let mut other = jwt_config();
        other.audience = "someone-else".to_string();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn unsaved_users_get_no_token() {
        let user = User::new("X".into(), "x@example.com".into(), Role::Student);
        assert!(generate_jwt(&user, &jwt_config()).is_err());
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(hash_password("12345").is_err());
        let hashed = hash_password("correct horse").unwrap();
        assert!(verify("correct horse", &hashed).unwrap());
    }

    #[test]
    fn google_url_requires_configuration() {
        assert!(generate_google_oauth_url(None).is_err());

        let google = GoogleOAuthConfig {
            client_id: "cid".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://localhost:5000/api/auth/google/callback".into(),
        };
        let response = generate_google_oauth_url(Some(&google)).unwrap();
        assert!(response.auth_url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(response.auth_url.contains("client_id=cid"));
        assert!(response.auth_url.contains(&format!("state={}", response.state)));
        assert!(response
            .auth_url
            .contains("redirect_uri=http%3A%2F%2Flocalhost%3A5000%2Fapi%2Fauth%2Fgoogle%2Fcallback"));
    }
}
