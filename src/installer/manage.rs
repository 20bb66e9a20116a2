//! Installed-version housekeeping: listing, opening and removing install folders

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::catalog::{natural_cmp, Catalog};
use crate::installer::probe::is_installed;
use crate::paths::{is_safe_component, LauncherPaths};
use crate::platform::Platform;

/// An engine with at least one playable install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledEngine {
    pub key: String,
    pub name: String,
    pub icon: Option<String>,
    /// Newest first
    pub versions: Vec<String>,
}

/// Playable installs of catalog engines, in catalog order
///
/// Folders of engines the catalog doesn't know, and folders without a
/// runnable binary, are ignored.
pub fn installed_versions(
    paths: &LauncherPaths,
    catalog: &Catalog,
    platform: Platform,
) -> Result<Vec<InstalledEngine>> {
    let mut installed = Vec::new();

    for engine in &catalog.engines {
        let engine_dir = paths.versions_dir().join(&engine.id);
        let entries = match fs::read_dir(&engine_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", engine_dir.display()))
            }
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read {}", engine_dir.display()))?;
            let version = entry.file_name().to_string_lossy().into_owned();
            if is_installed(&entry.path(), &engine.executable_name, platform) {
                versions.push(version);
            } else {
                debug!("Ignoring incomplete install {}/{}", engine.id, version);
            }
        }

        if versions.is_empty() {
            continue;
        }
        versions.sort_by(|a, b| natural_cmp(b, a));

        installed.push(InstalledEngine {
            key: engine.id.clone(),
            name: engine.name.clone(),
            icon: engine.icon.clone(),
            versions,
        });
    }

    Ok(installed)
}

/// Open an install folder in the system file manager
///
/// Returns once the opener is started; its exit is reaped in the background.
pub async fn open_install_path(
    paths: &LauncherPaths,
    engine_id: &str,
    version: &str,
) -> Result<PathBuf> {
    if !is_safe_component(engine_id) || !is_safe_component(version) {
        bail!("Invalid engine id or version: {}/{}", engine_id, version);
    }

    let dir = paths.install_dir(engine_id, version);
    if !dir.is_dir() {
        bail!("Folder does not exist: {}", dir.display());
    }

    let opener = file_manager_command();
    let mut child = tokio::process::Command::new(opener)
        .arg(&dir)
        .spawn()
        .with_context(|| format!("Failed to open {}", dir.display()))?;

    // explorer exits non-zero even on success
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!("{} exited with {}", opener, status),
            Err(e) => debug!("Failed to wait for {}: {}", opener, e),
        }
    });

    Ok(dir)
}

fn file_manager_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "explorer"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Delete an install folder; returns false if there was nothing to delete
pub async fn remove_install_dir(dir: &Path) -> io::Result<bool> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            info!("Deleted {}", dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CATALOG: &str = r#"{"engines":[
        {"id":"psych","name":"Psych Engine","executable_name":"PsychEngine"},
        {"id":"codename","name":"Codename Engine","icon":"codename.png","executable_name":"CodenameEngine"},
        {"id":"vslice","name":"V-Slice","executable_name":"Funkin"}
    ]}"#;

    fn install(paths: &LauncherPaths, engine: &str, version: &str, file: &str) {
        let dir = paths.install_dir(engine, version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), b"bin").unwrap();
    }

    #[test]
    fn test_installed_versions() {
        let dir = tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path());
        let catalog = Catalog::from_json_str(CATALOG).unwrap();

        install(&paths, "codename", "0.9", "CodenameEngine.exe");
        install(&paths, "codename", "0.10", "CodenameEngine.exe");
        install(&paths, "codename", "1.0", "readme.txt");
        install(&paths, "psych", "0.7.3", "PsychEngine");
        install(&paths, "unknown", "1.0", "Game.exe");

        let linux = installed_versions(&paths, &catalog, Platform::Linux).unwrap();
        assert_eq!(
            linux,
            vec![
                InstalledEngine {
                    key: "psych".into(),
                    name: "Psych Engine".into(),
                    icon: None,
                    versions: vec!["0.7.3".into()],
                },
                InstalledEngine {
                    key: "codename".into(),
                    name: "Codename Engine".into(),
                    icon: Some("codename.png".into()),
                    versions: vec!["0.10".into(), "0.9".into()],
                },
            ]
        );

        // The native Linux build doesn't count on Windows
        let windows = installed_versions(&paths, &catalog, Platform::Windows).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].key, "codename");
    }

    #[test]
    fn test_installed_versions_empty_data_dir() {
        let dir = tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path());
        let catalog = Catalog::from_json_str(CATALOG).unwrap();
        assert!(installed_versions(&paths, &catalog, Platform::Linux).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_folder_fails() {
        let dir = tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path());
        let err = open_install_path(&paths, "codename", "1.0").await.unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        assert!(open_install_path(&paths, "..", "1.0").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_install_dir() {
        let dir = tempdir().unwrap();
        let paths = LauncherPaths::new(dir.path());
        install(&paths, "codename", "1.0", "CodenameEngine.exe");

        let target = paths.install_dir("codename", "1.0");
        assert!(remove_install_dir(&target).await.unwrap());
        assert!(!target.exists());
        assert!(!remove_install_dir(&target).await.unwrap());
    }
}
