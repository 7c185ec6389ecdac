use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use bytes::BytesMut;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    dto::{FeedbackPage, SearchQuery, SubmitResponse, UpdateStatusRequest},
    repo_types::Feedback,
    services::{list_feedback, search_feedback, submit_feedback, update_status, NewFeedback},
};
use crate::{
    auth::extractors::AdminUser, error::FeedbackError, images::services::ImageUpload,
    state::AppState,
};

/// Slack on top of the image cap for the text fields and multipart framing.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/feedback", get(list))
        .route("/feedback/search", get(search))
}

pub fn write_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/submit-feedback", post(submit))
        .route("/feedback/:id/status", patch(set_status))
        .layer(DefaultBodyLimit::max(form_limit(max_upload_bytes)))
}

fn form_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes + FORM_OVERHEAD_BYTES
}

/// Maps a multipart read failure; a body-limit hit is reported against the whole form.
fn multipart_error(max_upload_bytes: usize) -> impl Fn(MultipartError) -> FeedbackError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            FeedbackError::FormTooLarge {
                limit: form_limit(max_upload_bytes),
            }
        } else {
            FeedbackError::Validation(e.body_text())
        }
    }
}

async fn read_image(mut field: Field<'_>, limit: usize) -> Result<Option<ImageUpload>, FeedbackError> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);

    let mut body = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error(limit))? {
        if body.len() + chunk.len() > limit {
            warn!(limit, "image upload over limit");
            return Err(FeedbackError::PayloadTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    // Browsers send an empty part when no file was picked.
    if body.is_empty() && file_name.as_deref().map_or(true, str::is_empty) {
        return Ok(None);
    }
    Ok(Some(ImageUpload {
        file_name,
        content_type,
        body: body.freeze(),
    }))
}

/// POST /submit-feedback (multipart)
/// Fields: category, description, location (optional), image (optional file)
#[instrument(skip(state, mp))]
pub async fn submit(
    State(state): State<AppState>,
    mp: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), FeedbackError> {
    let mut mp = mp?;
    let limit = state.config.max_upload_bytes;
    let mut input = NewFeedback::default();

    while let Some(field) = mp.next_field().await.map_err(multipart_error(limit))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => input.image = read_image(field, limit).await?,
            "category" => input.category = Some(field.text().await.map_err(multipart_error(limit))?),
            "description" => {
                input.description = Some(field.text().await.map_err(multipart_error(limit))?)
            }
            "location" => input.location = Some(field.text().await.map_err(multipart_error(limit))?),
            _ => {}
        }
    }

    let feedback = submit_feedback(
        state.feedback.as_ref(),
        state.uploads.as_ref(),
        limit,
        input,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: "Feedback submitted".into(),
            feedback,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list(State(state): State<AppState>) -> Json<Vec<Feedback>> {
    Json(list_feedback(state.feedback.as_ref()).await)
}

#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    q: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<FeedbackPage>, FeedbackError> {
    let Query(q) = q?;
    let items = list_feedback(state.feedback.as_ref()).await;
    Ok(Json(search_feedback(items, &q)?))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn set_status(
    State(state): State<AppState>,
    admin: AdminUser,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Feedback>, FeedbackError> {
    let Path(id) = id?;
    let Json(body) = body?;
    let updated = update_status(state.feedback.as_ref(), id, body.status).await?;
    Ok(Json(updated))
}
