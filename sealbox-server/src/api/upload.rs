use std::sync::Arc;

use axum::extract::multipart::Multipart;
use axum::extract::{Host, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use serde_json::json;
use tokio_util::io::StreamReader;

use crate::engine::{CreateRequest, CreatedItem, FileUpload};
use crate::error::{Result, ServerError};
use crate::state::AppState;

/// POST /upload, browser flow. Success renders the result page, validation
/// failures re-render the form with a message.
pub async fn upload_html(
    State(state): State<Arc<AppState>>,
    Host(host): Host,
    multipart: Multipart,
) -> Response {
    match process_upload(&state, multipart).await {
        Ok(created) => {
            let url = state.url_for(&host, &created.key);
            (
                StatusCode::CREATED,
                state
                    .pages
                    .result(&url, &created.password_to_show, created.auto_password),
            )
                .into_response()
        }
        Err(err) => {
            let status = err.status();
            if status.is_client_error() || status == StatusCode::INSUFFICIENT_STORAGE {
                (
                    status,
                    state
                        .pages
                        .index(state.max_file_megabytes, Some(err.public_message())),
                )
                    .into_response()
            } else {
                tracing::error!(error = %err, "upload failed");
                (status, state.pages.error(status.as_u16(), err.public_message()))
                    .into_response()
            }
        }
    }
}

/// POST /api/upload, JSON flow.
pub async fn upload_api(
    State(state): State<Arc<AppState>>,
    Host(host): Host,
    multipart: Multipart,
) -> Result<Response> {
    let created = process_upload(&state, multipart).await?;
    let url = state.url_for(&host, &created.key);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "url": url,
            "password": created.password_to_show,
            "pwd_disable": !created.auto_password,
        })),
    )
        .into_response())
}

/// Walk the multipart fields and hand them to the engine.
///
/// Scalar fields are collected as they arrive; the file part is consumed as
/// a stream the moment it appears and therefore has to be the final field,
/// which is how the upload form is laid out.
async fn process_upload(state: &AppState, mut multipart: Multipart) -> Result<CreatedItem> {
    let mut text: Option<String> = None;
    let mut ttl: Option<String> = None;
    let mut times: Option<String> = None;
    let mut password: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Internal(format!("multipart: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "text" => text = Some(read_value(field).await?),
            "ttl" => ttl = Some(read_value(field).await?),
            "times" => times = Some(read_value(field).await?),
            "password" => password = Some(read_value(field).await?),
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                if file_name.is_empty() {
                    // browsers send an empty file part when none was chosen
                    continue;
                }
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let (ttl_seconds, times_value) = validate_limits(state, &ttl, &times)?;

                let mut reader = StreamReader::new(
                    field.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
                );
                return state
                    .engine
                    .create(CreateRequest {
                        text: text.take(),
                        file: Some(FileUpload {
                            name: file_name,
                            content_type,
                            reader: &mut reader,
                        }),
                        ttl_seconds,
                        times: times_value,
                        password: password.take().filter(|p| !p.is_empty()),
                    })
                    .await;
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown upload field");
            }
        }
    }

    let (ttl_seconds, times_value) = validate_limits(state, &ttl, &times)?;
    state
        .engine
        .create(CreateRequest {
            text,
            file: None,
            ttl_seconds,
            times: times_value,
            password: password.filter(|p| !p.is_empty()),
        })
        .await
}

async fn read_value(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| ServerError::Internal(format!("multipart field: {e}")))
}

/// Check `ttl` and `times` against `[1; max]`.
fn validate_limits(
    state: &AppState,
    ttl: &Option<String>,
    times: &Option<String>,
) -> Result<(i64, i64)> {
    let ttl_seconds = parse_bounded(ttl.as_deref(), state.ttl_max).ok_or(ServerError::BadTtl)?;
    let times_value =
        parse_bounded(times.as_deref(), state.times_max).ok_or(ServerError::BadTimes)?;
    Ok((ttl_seconds, times_value))
}

fn parse_bounded(value: Option<&str>, max: i64) -> Option<i64> {
    let parsed: i64 = value?.trim().parse().ok()?;
    (1..=max).contains(&parsed).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::parse_bounded;

    #[test]
    fn test_parse_bounded() {
        assert_eq!(parse_bounded(Some("5"), 10), Some(5));
        assert_eq!(parse_bounded(Some("10"), 10), Some(10));
        assert_eq!(parse_bounded(Some(" 3 "), 10), Some(3));
        assert_eq!(parse_bounded(Some("0"), 10), None);
        assert_eq!(parse_bounded(Some("11"), 10), None);
        assert_eq!(parse_bounded(Some("-1"), 10), None);
        assert_eq!(parse_bounded(Some("abc"), 10), None);
        assert_eq!(parse_bounded(None, 10), None);
    }
}
