//! Host platform detection
//!
//! Engine builds ship per-platform archives and executables. Only Windows and
//! Linux can run anything; Linux may also run Windows builds through a
//! compatibility layer (Wine).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform the launcher is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Other,
}

impl Platform {
    /// Platform of the current process
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }

    /// Whether Windows (`.exe`) builds can be run on this platform, natively or not
    pub fn runs_windows_builds(self) -> bool {
        matches!(self, Platform::Windows | Platform::Linux)
    }

    /// Whether extensionless native binaries can be run on this platform
    pub fn runs_native_builds(self) -> bool {
        self == Platform::Linux
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::Other => std::env::consts::OS,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
