use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{LoginRequest, LoginResponse, MessageResponse, ProtectedResponse, RegisterRequest},
    extractors::AuthUser,
    jwt::JwtKeys,
    services::{login_user, register_user},
};
use crate::{error::AuthError, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/protected", get(protected))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Json(payload) = payload?;
    register_user(state.users.as_ref(), &state.config.admin_emails, payload).await?;
    Ok(Json(MessageResponse {
        msg: "User registered successfully!".into(),
    }))
}

#[instrument(skip(state, keys, payload))]
pub async fn login(
    State(state): State<AppState>,
    State(keys): State<JwtKeys>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Json(payload) = payload?;
    let res = login_user(state.users.as_ref(), &keys, payload).await?;
    Ok(Json(res))
}

#[instrument(skip_all)]
pub async fn protected(AuthUser(claims): AuthUser) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        msg: "Access granted".into(),
        user: claims,
    })
}
