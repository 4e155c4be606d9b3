use std::env;

use crate::utils::{AppError, AppResult};

/// Runtime configuration, read once at startup from the environment
/// (after `.env` has been loaded) and shared with handlers as `web::Data`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub frontend_url: String,
    pub cookie_secure: bool,
    pub admin_notify_email: Option<String>,
    pub jwt: JwtConfig,
    pub razorpay: RazorpayConfig,
    pub cloudinary: CloudinaryConfig,
    pub smtp: Option<SmtpConfig>,
    pub google: Option<GoogleOAuthConfig>,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub currency: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match optional(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Internal(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let database_url = optional("DATABASE_URL")
            .ok_or_else(|| AppError::Internal("DATABASE_URL must be set".to_string()))?;

        let smtp = match (optional("SMTP_HOST"), optional("SMTP_USER"), optional("SMTP_PASS")) {
            (Some(host), Some(username), Some(password)) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                from: var_or("SMTP_FROM", &username),
                username,
                password,
            }),
            _ => None,
        };

        let google = match (optional("GOOGLE_CLIENT_ID"), optional("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                redirect_uri: var_or(
                    "GOOGLE_REDIRECT_URI",
                    "http://localhost:5000/api/auth/google/callback",
                ),
            }),
            _ => None,
        };

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parse_or("PORT", 5000)?,
            database_url,
            frontend_url: var_or("FRONTEND_URL", "http://localhost:3000"),
            cookie_secure: parse_or("COOKIE_SECURE", false)?,
            admin_notify_email: optional("ADMIN_NOTIFY_EMAIL"),
            jwt: JwtConfig {
                secret: var_or("JWT_SECRET", "default-secret-change-me"),
                issuer: var_or("JWT_ISSUER", "learning-service"),
                audience: var_or("JWT_AUDIENCE", "learning-api"),
                ttl_hours: parse_or("JWT_TTL_HOURS", 24)?,
            },
            razorpay: RazorpayConfig {
                key_id: var_or("RAZORPAY_KEY_ID", ""),
                key_secret: var_or("RAZORPAY_KEY_SECRET", ""),
                webhook_secret: var_or("RAZORPAY_WEBHOOK_SECRET", ""),
                currency: var_or("RAZORPAY_CURRENCY", "INR"),
                api_base: var_or("RAZORPAY_API_BASE", "https://api.razorpay.com"),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: var_or("CLOUDINARY_CLOUD_NAME", ""),
                api_key: var_or("CLOUDINARY_API_KEY", ""),
                api_secret: var_or("CLOUDINARY_API_SECRET", ""),
                folder: var_or("CLOUDINARY_FOLDER", "learning"),
                api_base: var_or("CLOUDINARY_API_BASE", "https://api.cloudinary.com/v1_1"),
            },
            smtp,
            google,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "mongodb://127.0.0.1:27017/learning_test".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
            cookie_secure: false,
            admin_notify_email: None,
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: "learning-service".to_string(),
                audience: "learning-api".to_string(),
                ttl_hours: 1,
            },
            razorpay: RazorpayConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: "rzp_test_secret".to_string(),
                webhook_secret: "whsec_test".to_string(),
                currency: "INR".to_string(),
                api_base: "http://127.0.0.1:9".to_string(),
            },
            cloudinary: CloudinaryConfig {
                cloud_name: "demo".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                folder: "learning-test".to_string(),
                api_base: "http://127.0.0.1:9".to_string(),
            },
            smtp: None,
            google: None,
        }
    }
}
