use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::{error, instrument};

use crate::{state::AppState, storage::StoredObject};

pub fn uploads_routes() -> Router<AppState> {
    Router::new().route("/uploads/:file", get(get_upload))
}

/// Public, unauthenticated access to uploaded images.
#[instrument(skip(state))]
pub async fn get_upload(State(state): State<AppState>, Path(file): Path<String>) -> Response {
    match state.uploads.fetch(&file).await {
        Ok(Some(StoredObject::Inline { body, content_type })) => {
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
                ],
                body,
            )
                .into_response()
        }
        Ok(Some(StoredObject::Redirect(url))) => Redirect::temporary(&url).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        Err(e) => {
            error!(error = %format!("{e:#}"), %file, "upload fetch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "upload fetch failed").into_response()
        }
    }
}
