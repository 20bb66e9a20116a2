//! On-disk layout of the launcher data directory
//!
//! ```text
//! <data_dir>/
//!   versions/<engine>/<version>/   extracted engine builds (+ a `mods` folder)
//!   mods/<folder>/                 canonical mod library
//!   settings.json                  settings blob
//!   logs/                          rolling log files
//! ```

use std::path::{Path, PathBuf};

/// Folder name under the platform data dir
pub const LAUNCHER_DIR_NAME: &str = "genesislauncher";

/// File name used for a build archive while it is being downloaded
pub const ARCHIVE_FILE_NAME: &str = "funkin.zip";

/// Name of the mods folder inside an install directory
pub const INSTALL_MODS_DIR: &str = "mods";

/// Resolved launcher directories
#[derive(Debug, Clone)]
pub struct LauncherPaths {
    root: PathBuf,
}

impl LauncherPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Platform default (`~/.local/share/genesislauncher` on Linux)
    pub fn default_root() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(LAUNCHER_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join("mods")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// `versions/<engine>/<version>`
    ///
    /// Callers taking ids from outside should check them with
    /// [`is_safe_component`] first.
    pub fn install_dir(&self, engine_id: &str, version: &str) -> PathBuf {
        self.versions_dir().join(engine_id).join(version)
    }

    /// Where the build archive for an install directory is downloaded to
    pub fn archive_path(install_dir: &Path) -> PathBuf {
        install_dir.join(ARCHIVE_FILE_NAME)
    }
}

/// Check that a user-supplied name is a single, plain path component
///
/// Rejects empty names, `.`/`..` and anything containing a separator, so an
/// engine id, version or mod folder name can never escape its parent folder.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}
