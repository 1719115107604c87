use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::engine::FileMeta;
use crate::error::ServerError;
use crate::state::AppState;

/// Buffered decrypted chunks between the engine task and the response body.
const STREAM_BUFFER: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub password: String,
    /// Set by the browser helper on /file; switches errors to plain text.
    #[serde(default)]
    pub ajax: Option<String>,
}

fn validate_pass_key(req: &RetrieveRequest) -> Result<Uuid, ServerError> {
    if req.password.is_empty() {
        return Err(ServerError::EmptyPassword);
    }
    if req.key.is_empty() {
        return Err(ServerError::BadKey);
    }
    Uuid::parse_str(&req.key).map_err(|_| ServerError::BadKey)
}

/// GET /{key}: the download landing page.
///
/// Advisory only: it races with counter updates and never touches them. It
/// reveals which aspects remain, never their content.
pub async fn landing(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            state.pages.error(404, "not found"),
        )
            .into_response()
    };

    if Uuid::parse_str(&key).is_err() {
        return not_found();
    }
    match state.store.exists(&key).await {
        Ok(Some(presence)) => state
            .pages
            .download(&key, presence.has_text, presence.has_file)
            .into_response(),
        Ok(None) => not_found(),
        Err(e) => {
            tracing::error!(key = %key, error = %e, "exists probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                state.pages.error(500, "internal error"),
            )
                .into_response()
        }
    }
}

/// POST /api/text: the note plus file metadata, JSON.
pub async fn text_api(
    State(state): State<Arc<AppState>>,
    Form(req): Form<RetrieveRequest>,
) -> Result<Response, ServerError> {
    let key = validate_pass_key(&req)?;
    let outcome = state.engine.read_text(&key, &req.password).await?;
    Ok(Json(json!({
        "text": outcome.text,
        "file": outcome.meta,
    }))
    .into_response())
}

/// POST /file: the decrypted file bytes.
///
/// The engine runs in its own task holding the read transaction; metadata
/// arrives first so the headers can be written, then decrypted chunks are
/// streamed straight through. A mid-stream failure truncates the body and
/// rolls the transaction back, so the budget is not spent.
pub async fn file(
    State(state): State<Arc<AppState>>,
    Form(req): Form<RetrieveRequest>,
) -> Response {
    let ajax = req.ajax.as_deref().is_some_and(|v| !v.is_empty());
    let key = match validate_pass_key(&req) {
        Ok(key) => key,
        Err(e) => return render_error(&state, e, ajax),
    };

    let (meta_tx, meta_rx) = oneshot::channel::<FileMeta>();
    let (body_tx, body_rx) = mpsc::channel::<Bytes>(STREAM_BUFFER);

    let engine = state.engine.clone();
    let password = req.password.clone();
    let task = tokio::spawn(async move {
        engine.read_file(&key, &password, meta_tx, body_tx).await
    });

    match meta_rx.await {
        Ok(meta) => {
            let stream = ReceiverStream::new(body_rx).map(Ok::<_, std::io::Error>);
            let disposition = format!(
                "attachment; filename=\"{}\"",
                meta.name.replace(['"', '\\'], "_")
            );
            match Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, meta.content_type.as_str())
                .header(header::CONTENT_LENGTH, meta.size)
                .header(header::CONTENT_DISPOSITION, disposition)
                .body(Body::from_stream(stream))
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(error = %e, "file response build failed");
                    render_error(
                        &state,
                        ServerError::Internal(e.to_string()),
                        ajax,
                    )
                }
            }
        }
        // the engine dropped the metadata sender: it failed before streaming
        Err(_) => {
            let err = match task.await {
                Ok(Err(e)) => e,
                Ok(Ok(())) => ServerError::Internal("file read finished without metadata".into()),
                Err(join) => ServerError::Internal(format!("file read task: {join}")),
            };
            render_error(&state, err, ajax)
        }
    }
}

/// Error rendering for the /file route: plain text for the browser helper,
/// an HTML page otherwise. `NoFile` is a bare 204.
fn render_error(state: &AppState, err: ServerError, ajax: bool) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(error = %err, "file retrieval failed");
    }
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    if ajax {
        (status, err.public_message().to_string()).into_response()
    } else {
        (status, state.pages.error(status.as_u16(), err.public_message())).into_response()
    }
}
