use axum::Json;
use serde::Serialize;

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git revision, injected by the build environment when available.
pub const REVISION: &str = match option_env!("SEALBOX_REVISION") {
    Some(revision) => revision,
    None => "unknown",
};

/// Build timestamp, injected by the build environment when available.
pub const BUILD: &str = match option_env!("SEALBOX_BUILD_DATE") {
    Some(build) => build,
    None => "unknown",
};

/// Toolchain description, injected by the build environment when available.
pub const ENVIRONMENT: &str = match option_env!("SEALBOX_RUSTC") {
    Some(environment) => environment,
    None => "rust",
};

/// Application build metadata.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub revision: &'static str,
    pub build: &'static str,
    pub environment: &'static str,
}

impl VersionInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            revision: REVISION,
            build: BUILD,
            environment: ENVIRONMENT,
        }
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "version: {}\nrevision: {}\nbuild date: {}\nenvironment: {}",
            self.version, self.revision, self.build, self.environment
        )
    }
}

/// GET /api/version
pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo::current())
}
