use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::config::AppConfig;
use crate::models::Role;
use crate::services::auth_service;
use crate::utils::{parse_object_id, AppError, AppResult};

pub const TOKEN_COOKIE: &str = "token";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id (ObjectId hex)
    pub email: String,
    pub name: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
    pub aud: String,
    pub iss: String,
}

impl Claims {
    pub fn user_id(&self) -> AppResult<ObjectId> {
        parse_object_id(&self.sub, "user")
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }

    pub fn require_role(&self, roles: &[Role]) -> AppResult<()> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Role '{}' is not allowed to perform this action",
                self.role.as_str()
            )))
        }
    }
}

/// Pulls the session token from `Authorization: Bearer` or the `token` cookie.
pub fn extract_token(req: &ServiceRequest) -> Option<String> {
    if let Some(header_value) = req.headers().get("Authorization") {
        if let Ok(header_str) = header_value.to_str() {
            if let Some(token) = header_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    req.cookie(TOKEN_COOKIE).map(|c| c.value().to_string())
}

/// Verifies the JWT and inserts its `Claims` into request extensions so
/// handlers can take `web::ReqData<Claims>`.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService { service }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let config = match req.app_data::<web::Data<AppConfig>>() {
            Some(config) => config.clone(),
            None => {
                return Box::pin(async move {
                    Err(AppError::Internal("AppConfig not registered".to_string()).into())
                })
            }
        };

        let token = match extract_token(&req) {
            Some(token) => token,
            None => {
                return Box::pin(async move {
                    Err(AppError::Unauthorized("Missing authorization token".to_string()).into())
                })
            }
        };

        match auth_service::verify_token(&token, &config.jwt) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res)
                })
            }
            Err(e) => {
                log::warn!("❌ Rejected token on {}: {}", req.path(), e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> Claims {
        Claims {
            sub: ObjectId::new().to_hex(),
            email: "a@example.com".into(),
            name: "A".into(),
            role,
            iat: 0,
            exp: 0,
            jti: "j".into(),
            aud: "learning-api".into(),
            iss: "learning-service".into(),
        }
    }

    #[test]
    fn admin_checks_follow_role() {
        assert!(claims(Role::Admin).require_admin().is_ok());
        assert!(claims(Role::SuperAdmin).require_admin().is_ok());
        assert!(matches!(
            claims(Role::Instructor).require_admin(),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn role_lists_are_exact() {
        let instructor = claims(Role::Instructor);
        assert!(instructor.require_role(&[Role::Instructor, Role::Admin]).is_ok());
        assert!(instructor.require_role(&[Role::Student]).is_err());
    }

    #[test]
    fn subject_parses_as_object_id() {
        let c = claims(Role::Student);
        assert_eq!(c.user_id().unwrap().to_hex(), c.sub);
    }
}
