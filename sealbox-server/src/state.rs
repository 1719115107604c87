use std::path::PathBuf;
use std::time::Duration;

use crate::db::items::Store;
use crate::engine::Engine;
use crate::pages::Pages;

/// Shared application state passed to all handlers via Axum's State extractor.
pub struct AppState {
    pub engine: Engine,
    /// Direct repository handle for the advisory landing-page probe.
    pub store: Store,
    pub pages: Pages,
    /// Upper bound accepted for the `ttl` form field, seconds.
    pub ttl_max: i64,
    /// Upper bound accepted for the `times` form field.
    pub times_max: i64,
    /// Shown on the upload form, MiB.
    pub max_file_megabytes: u64,
    /// Scheme of returned URLs.
    pub secure: bool,
    /// Optional static asset directory served under `/static`.
    pub static_dir: Option<PathBuf>,
    /// Per-request deadline.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn url_for(&self, host: &str, key: &uuid::Uuid) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{host}/{key}")
    }
}
