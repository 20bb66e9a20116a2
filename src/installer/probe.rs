//! Install state detection
//!
//! An install counts only if its folder exists and holds a binary this host
//! can run: the extensionless native build on Linux, or `<exe>.exe` on
//! Windows and Linux (through the compatibility layer). A folder without one
//! is treated as not installed and downloaded into again.

use std::path::{Path, PathBuf};

use crate::platform::Platform;

/// Candidate binaries for an executable base name
pub fn native_executable(install_dir: &Path, exe_name: &str) -> PathBuf {
    install_dir.join(exe_name)
}

pub fn windows_executable(install_dir: &Path, exe_name: &str) -> PathBuf {
    install_dir.join(format!("{}.exe", exe_name))
}

/// Blocking check
pub fn is_installed(install_dir: &Path, exe_name: &str, platform: Platform) -> bool {
    let native = platform.runs_native_builds()
        && native_executable(install_dir, exe_name).is_file();
    let compat = platform.runs_windows_builds()
        && windows_executable(install_dir, exe_name).is_file();

    install_dir.is_dir() && (native || compat)
}

/// Same policy as [`is_installed`] without blocking the runtime
pub async fn is_installed_async(install_dir: &Path, exe_name: &str, platform: Platform) -> bool {
    async fn is_file(path: PathBuf) -> bool {
        matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file())
    }

    let dir_exists = matches!(tokio::fs::metadata(install_dir).await, Ok(meta) if meta.is_dir());
    if !dir_exists {
        return false;
    }

    let native = platform.runs_native_builds()
        && is_file(native_executable(install_dir, exe_name)).await;
    let compat = platform.runs_windows_builds()
        && is_file(windows_executable(install_dir, exe_name)).await;

    native || compat
}
