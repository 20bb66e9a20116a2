//! Expose the mod library to an engine build
//!
//! Each install gets a fresh `mods` folder holding one directory link per
//! visible mod, pointing back at the canonical copy in the library. Symlinks
//! on unix, junctions on Windows (no admin rights needed).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::mods::list_mod_folders;
use crate::paths::INSTALL_MODS_DIR;
use crate::settings::ModVisibility;

/// Failures that leave the install without a usable `mods` folder
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to create mods library {}: {source}", path.display())]
    ModsRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to reset {}: {source}", path.display())]
    InstallMods {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a link pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    /// Mods now linked into the install
    pub linked: Vec<String>,
    /// Mods in the library, visible or not
    pub total: usize,
    /// Visible mods whose link could not be created
    pub failed: Vec<String>,
}

/// Rebuild `install_dir/mods` from the library and the visibility map
///
/// The old `mods` entry is removed whatever it is (folder, file or link),
/// without touching what a link points at. A single mod that fails to link
/// is logged and skipped.
pub fn materialize_links(
    install_dir: &Path,
    mods_root: &Path,
    visibility: &ModVisibility,
) -> Result<LinkReport, LinkError> {
    fs::create_dir_all(mods_root).map_err(|source| LinkError::ModsRoot {
        path: mods_root.to_path_buf(),
        source,
    })?;
    // Link targets must not depend on the game's working directory
    let mods_root = std::path::absolute(mods_root).map_err(|source| LinkError::ModsRoot {
        path: mods_root.to_path_buf(),
        source,
    })?;

    let install_mods = install_dir.join(INSTALL_MODS_DIR);
    let reset_err = |source| LinkError::InstallMods {
        path: install_mods.clone(),
        source,
    };
    remove_entry(&install_mods).map_err(reset_err)?;
    fs::create_dir_all(&install_mods).map_err(reset_err)?;

    let folders = list_mod_folders(&mods_root).map_err(|source| LinkError::ModsRoot {
        path: mods_root.clone(),
        source,
    })?;

    let mut report = LinkReport {
        total: folders.len(),
        ..Default::default()
    };

    for name in folders {
        if !visibility.is_visible(&name) {
            debug!("Mod hidden, not linking: {}", name);
            continue;
        }

        let target = mods_root.join(&name);
        let link = install_mods.join(&name);
        match create_dir_link(&link, &target) {
            Ok(()) => report.linked.push(name),
            Err(e) => {
                warn!("Failed to link mod {} into {}: {}", name, install_mods.display(), e);
                report.failed.push(name);
            }
        }
    }

    info!(
        "Linked {}/{} mods into {}",
        report.linked.len(),
        report.total,
        install_mods.display()
    );
    Ok(report)
}

/// Remove a file, folder or link at `path`; missing is fine
fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if is_link(&meta) {
        // Directory links and junctions are removed as (empty) directories on Windows
        #[cfg(windows)]
        if fs::remove_dir(path).is_ok() {
            return Ok(());
        }
        fs::remove_file(path)
    } else if meta.is_dir() {
        // Does not follow links inside, so linked mods are left intact
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(windows)]
fn is_link(meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;
    meta.file_type().is_symlink() || meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0
}

#[cfg(not(windows))]
fn is_link(meta: &fs::Metadata) -> bool {
    meta.file_type().is_symlink()
}

#[cfg(unix)]
fn create_dir_link(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_dir_link(link: &Path, target: &Path) -> io::Result<()> {
    let out = std::process::Command::new("cmd")
        .args(["/C", "mklink", "/J"])
        .arg(link)
        .arg(target)
        .output()?;

    if !out.status.success() {
        return Err(io::Error::other(format!(
            "mklink /J failed: {}{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )));
    }
    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn create_dir_link(_link: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "directory links are not supported on this platform",
    ))
}
