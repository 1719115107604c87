use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ServerError};

const MIB: u64 = 1 << 20;

/// Service configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: Server,
    pub storage: Storage,
    pub settings: Settings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
    /// Toggles the scheme of returned URLs; TLS itself terminates upstream.
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    /// SQLite database file.
    pub file: String,
    /// Blob directory.
    pub dir: PathBuf,
    pub timeout_seconds: u64,
    /// Total blob capacity in MiB.
    pub size_megabytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub ttl_max_seconds: i64,
    pub times_max: i64,
    pub max_file_size_megabytes: u64,
    /// Appended to every user password before key derivation.
    pub salt: String,
    pub gc_period_seconds: u64,
    pub password_length: usize,
    pub shutdown_timeout_seconds: u64,
    /// Optional on-disk page overrides; embedded pages are used when unset.
    pub templates_dir: Option<PathBuf>,
    /// Optional static asset directory, served under `/static`.
    pub static_dir: Option<PathBuf>,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Internal(format!("config read {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&data)
            .map_err(|e| ServerError::Internal(format!("config parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_positive(self.server.port as i64, "server.port")?;
        check_positive(self.server.timeout_seconds as i64, "server.timeout_seconds")?;
        check_positive(self.storage.timeout_seconds as i64, "storage.timeout_seconds")?;
        check_positive(self.storage.size_megabytes as i64, "storage.size_megabytes")?;
        check_positive(self.settings.ttl_max_seconds, "settings.ttl_max_seconds")?;
        check_positive(self.settings.times_max, "settings.times_max")?;
        check_positive(
            self.settings.max_file_size_megabytes as i64,
            "settings.max_file_size_megabytes",
        )?;
        check_positive(self.settings.gc_period_seconds as i64, "settings.gc_period_seconds")?;
        check_positive(self.settings.password_length as i64, "settings.password_length")?;
        check_positive(
            self.settings.shutdown_timeout_seconds as i64,
            "settings.shutdown_timeout_seconds",
        )?;

        check_directory(&self.storage.dir, "storage.dir")?;
        if let Some(dir) = &self.settings.templates_dir {
            check_directory(dir, "settings.templates_dir")?;
        }
        if let Some(dir) = &self.settings.static_dir {
            check_directory(dir, "settings.static_dir")?;
        }
        Ok(())
    }

    /// Listen address, `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_seconds)
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.timeout_seconds)
    }

    /// Blob store capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.storage.size_megabytes * MIB
    }

    /// Maximum accepted file size in bytes.
    pub fn max_file_bytes(&self) -> u64 {
        self.settings.max_file_size_megabytes * MIB
    }

    pub fn gc_period(&self) -> Duration {
        Duration::from_secs(self.settings.gc_period_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.shutdown_timeout_seconds)
    }

    /// The secret actually fed to the KDF: the user password with the
    /// configured salt appended (domain separation from the raw string).
    pub fn secret(&self, password: &str) -> String {
        format!("{password}{}", self.settings.salt)
    }
}

fn check_positive(value: i64, name: &str) -> Result<()> {
    if value < 1 {
        return Err(ServerError::Internal(format!(
            "config: {name}={value} must be greater than zero"
        )));
    }
    Ok(())
}

fn check_directory(path: &Path, name: &str) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| {
        ServerError::Internal(format!("config: {name} '{}': {e}", path.display()))
    })?;
    if !meta.is_dir() {
        return Err(ServerError::Internal(format!(
            "config: {name} '{}' is not a directory",
            path.display()
        )));
    }
    Ok(())
}
