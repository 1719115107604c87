pub mod download;
pub mod upload;
pub mod version;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Slack on top of the max file size for the other multipart fields.
const BODY_LIMIT_SLACK: usize = 1 << 20;

/// Build the Axum router with all routes and the tracing middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = (state.max_file_megabytes as usize) * (1 << 20) + BODY_LIMIT_SLACK;

    let mut router = Router::new()
        .route("/", get(index))
        .route("/upload", post(upload::upload_html))
        .route("/file", post(download::file))
        .route("/api/upload", post(upload::upload_api))
        .route("/api/text", post(download::text_api))
        .route("/api/version", get(version::version))
        .route("/:key", get(download::landing));

    if let Some(dir) = &state.static_dir {
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    let request_timeout = state.request_timeout;
    router
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /: the upload form.
async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.pages.index(state.max_file_megabytes, None)
}
