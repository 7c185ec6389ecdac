use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::warn;

use super::{claims::Claims, jwt::JwtKeys, repo_types::Role};
use crate::{error::AuthError, state::AppState};

pub const TOKEN_HEADER: &str = "x-auth-token";

/// Validates the bearer token and hands the decoded claims to the handler.
///
/// The token is read from `x-auth-token`, falling back to
/// `Authorization: Bearer <token>`.
pub struct AuthUser(pub Claims);

fn token_from_parts(parts: &Parts) -> Option<&str> {
    if let Some(v) = parts.headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        let v = v.trim();
        if !v.is_empty() {
            return Some(v);
        }
    }
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(AuthError::Unauthorized)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AuthError::InvalidToken
        })?;

        Ok(AuthUser(claims))
    }
}

/// Like [`AuthUser`] but additionally requires the admin role.
///
/// The role is re-read from the credential store so a token issued before a
/// demotion or deletion no longer grants admin access.
pub struct AdminUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        let current = state.users.find_by_id(claims.id).await?;
        match current {
            Some(user) if user.role == Role::Admin && claims.role == Role::Admin => {
                Ok(AdminUser(claims))
            }
            Some(_) => {
                warn!(user_id = %claims.id, "admin role required");
                Err(AuthError::Forbidden)
            }
            None => {
                warn!(user_id = %claims.id, "token for unknown user");
                Err(AuthError::InvalidToken)
            }
        }
    }
}
