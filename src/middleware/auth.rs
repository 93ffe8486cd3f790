use axum::{extract::FromRequestParts, http::header, http::request::Parts};

use crate::{clients::ClientError, error::AppError, state::AppState};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub role: String,
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, ADMIN_ROLE)
}

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("invalid authorization header".into()))?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("invalid authorization scheme".into()))?;
    Ok(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let identity = match state.identity.validate_token(token).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Err(AppError::Unauthorized("invalid or expired token".into())),
            Err(ClientError::Unavailable(reason)) => {
                return Err(AppError::Unavailable {
                    service: "identity",
                    reason,
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "token validation failed");
                return Err(AppError::Unauthorized("invalid or expired token".into()));
            }
        };

        Ok(AuthUser {
            user_id: identity.user_id,
            role: identity.role,
        })
    }
}
