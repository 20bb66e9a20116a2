//! Launcher configuration
//!
//! Where data lives, where the catalog comes from, and how builds are run
//! and downloaded.

use std::path::PathBuf;
use std::time::Duration;

use crate::downloaders::http::{HttpClient, CONNECT_TIMEOUT, READ_TIMEOUT, STALL_TIMEOUT};
use crate::launcher::DEFAULT_COMPAT_RUNNER;
use crate::paths::LauncherPaths;

/// Catalog file name inside the data directory
pub const CATALOG_FILE_NAME: &str = "versions.json";

/// Configuration for the launcher backend
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Root of versions/, mods/ and settings.json
    pub data_dir: PathBuf,

    /// Local catalog file, also the fallback when the remote one fails
    pub catalog_path: PathBuf,

    /// Remote catalog, tried first when set
    pub catalog_url: Option<String>,

    /// Program used to run Windows builds on Linux
    pub compat_runner: String,

    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    /// Abort a download when no data arrives for this long
    pub stall_timeout: Duration,
}

impl LauncherConfig {
    /// Defaults for a data directory
    ///
    /// A relative `data_dir` is resolved against the current directory now,
    /// since games run with their install folder as working directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let data_dir = std::path::absolute(&data_dir).unwrap_or(data_dir);
        Self {
            catalog_path: data_dir.join(CATALOG_FILE_NAME),
            data_dir,
            catalog_url: None,
            compat_runner: DEFAULT_COMPAT_RUNNER.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            read_timeout: READ_TIMEOUT,
            stall_timeout: STALL_TIMEOUT,
        }
    }

    pub fn paths(&self) -> LauncherPaths {
        LauncherPaths::new(&self.data_dir)
    }

    /// HTTP client using the configured timeouts
    pub fn http_client(&self) -> anyhow::Result<HttpClient> {
        HttpClient::with_timeouts(self.connect_timeout, self.read_timeout, self.stall_timeout)
    }

    /// Validate everything except the catalog source
    pub fn validate_runtime(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }

        if self.compat_runner.trim().is_empty() {
            return Err(ConfigError::EmptyCompatRunner);
        }

        for (name, value) in [
            ("connect", self.connect_timeout),
            ("read", self.read_timeout),
            ("stall", self.stall_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_runtime()?;

        if self.catalog_url.is_none() && !self.catalog_path.exists() {
            return Err(ConfigError::CatalogNotFound(self.catalog_path.clone()));
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Data directory is empty")]
    EmptyDataDir,

    #[error("Compatibility runner command is empty")]
    EmptyCompatRunner,

    #[error("The {0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("Catalog not found: {} (and no catalog URL set)", .0.display())]
    CatalogNotFound(PathBuf),
}
