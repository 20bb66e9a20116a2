//! Shared mod library
//!
//! Every mod lives once under `<data_dir>/mods/<folder>`; the folder name is
//! its identity. A mod is classified by which metadata file it carries:
//!
//! | File                 | Variant  | Engine tag |
//! |----------------------|----------|------------|
//! | `_polymod_meta.json` | Polymod  | `V-Slice`  |
//! | `pack.json`          | Psych    | `psych`    |
//! | neither              | Fallback | `codee`    |
//!
//! Installing a mod copies it into the library; exposing it to an engine
//! build is done separately by [`link::materialize_links`].

pub mod link;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::paths::is_safe_component;

pub use link::{materialize_links, LinkError, LinkReport};

pub const POLYMOD_META_FILE: &str = "_polymod_meta.json";
pub const PSYCH_PACK_FILE: &str = "pack.json";
pub const PSYCH_ICON_FILE: &str = "pack.png";

/// Description shown for mods without metadata
pub const FALLBACK_DESCRIPTION: &str = "no description";

#[derive(Debug, thiserror::Error)]
pub enum ModLibraryError {
    #[error("Invalid mod folder name: {0:?}")]
    InvalidName(String),

    #[error("Mod \"{0}\" is already installed")]
    AlreadyInstalled(String),

    #[error("Not a mod folder: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a mod's metadata says about it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModVariant {
    Polymod {
        title: String,
        description: String,
        version: String,
    },
    Psych {
        title: String,
        description: String,
        icon: Option<PathBuf>,
    },
    Fallback {
        title: String,
    },
}

#[derive(Deserialize)]
struct PolymodMeta {
    title: Option<String>,
    description: Option<String>,
    mod_version: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct PsychPack {
    name: Option<String>,
    description: Option<String>,
}

/// Non-empty string field, the way the metadata files are checked in practice
fn present(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

fn parse_polymod(text: &str) -> Option<ModVariant> {
    let meta: PolymodMeta = serde_json::from_str(text).ok()?;
    // Some mods write the version as a bare number
    let version = match meta.mod_version? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(ModVariant::Polymod {
        title: present(meta.title)?,
        description: present(meta.description)?,
        version: present(Some(version))?,
    })
}

fn parse_psych(text: &str, icon: Option<PathBuf>) -> Option<ModVariant> {
    let pack: PsychPack = serde_json::from_str(text).ok()?;
    Some(ModVariant::Psych {
        title: present(pack.name)?,
        description: present(pack.description)?,
        icon,
    })
}

/// Classify a mod from the raw contents of its metadata files
///
/// Probes run in priority order and the first valid one wins; unreadable or
/// incomplete metadata falls through to the next probe.
pub fn classify(
    folder_name: &str,
    polymod_meta: Option<&str>,
    psych_pack: Option<&str>,
    psych_icon: Option<PathBuf>,
) -> ModVariant {
    polymod_meta
        .and_then(parse_polymod)
        .or_else(|| psych_pack.and_then(|text| parse_psych(text, psych_icon)))
        .unwrap_or_else(|| ModVariant::Fallback {
            title: folder_name.to_string(),
        })
}

/// A classified mod folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInfo {
    pub folder_name: String,
    pub variant: ModVariant,
}

impl ModInfo {
    pub fn title(&self) -> &str {
        match &self.variant {
            ModVariant::Polymod { title, .. }
            | ModVariant::Psych { title, .. }
            | ModVariant::Fallback { title } => title,
        }
    }

    pub fn description(&self) -> &str {
        match &self.variant {
            ModVariant::Polymod { description, .. } | ModVariant::Psych { description, .. } => {
                description
            }
            ModVariant::Fallback { .. } => FALLBACK_DESCRIPTION,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match &self.variant {
            ModVariant::Polymod { version, .. } => Some(version),
            _ => None,
        }
    }

    pub fn icon(&self) -> Option<&Path> {
        match &self.variant {
            ModVariant::Psych { icon, .. } => icon.as_deref(),
            _ => None,
        }
    }

    /// Engine family the mod is meant for
    pub fn engine_tag(&self) -> &'static str {
        match self.variant {
            ModVariant::Polymod { .. } => "V-Slice",
            ModVariant::Psych { .. } => "psych",
            ModVariant::Fallback { .. } => "codee",
        }
    }

    pub fn mod_type(&self) -> &'static str {
        match self.variant {
            ModVariant::Polymod { .. } => "polymod",
            ModVariant::Psych { .. } => "psych",
            ModVariant::Fallback { .. } => "codename",
        }
    }

    /// Flat view for JSON output
    pub fn summary(&self) -> ModSummary {
        ModSummary {
            folder_name: self.folder_name.clone(),
            title: self.title().to_string(),
            description: self.description().to_string(),
            version: self.version().map(str::to_string),
            mod_type: self.mod_type(),
            engine_key: self.engine_tag(),
            icon_path: self.icon().map(Path::to_path_buf),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSummary {
    pub folder_name: String,
    pub title: String,
    pub description: String,
    pub version: Option<String>,
    pub mod_type: &'static str,
    pub engine_key: &'static str,
    pub icon_path: Option<PathBuf>,
}

/// Read the metadata files of a mod folder and classify it
pub fn read_mod(mod_dir: &Path) -> Option<ModInfo> {
    let folder_name = mod_dir.file_name()?.to_string_lossy().into_owned();
    let polymod = fs::read_to_string(mod_dir.join(POLYMOD_META_FILE)).ok();
    let pack = fs::read_to_string(mod_dir.join(PSYCH_PACK_FILE)).ok();
    let icon = Some(mod_dir.join(PSYCH_ICON_FILE)).filter(|p| p.is_file());

    let variant = classify(&folder_name, polymod.as_deref(), pack.as_deref(), icon);
    Some(ModInfo {
        folder_name,
        variant,
    })
}

/// Immediate subdirectories of `mods_root`, sorted by name
pub fn list_mod_folders(mods_root: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(mods_root)? {
        let entry = entry?;
        // Follows symlinks, so a linked-in mod folder counts
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Classify every mod in the library
///
/// Folders are read concurrently. A folder that can't be classified is left
/// out rather than failing the whole scan, and an unreadable library yields
/// an empty list.
pub async fn scan_library(mods_root: &Path) -> Vec<ModInfo> {
    let root = mods_root.to_path_buf();
    let folders = match tokio::task::spawn_blocking(move || list_mod_folders(&root)).await {
        Ok(Ok(folders)) => folders,
        Ok(Err(e)) => {
            warn!("Could not scan mods folder {}: {}", mods_root.display(), e);
            return Vec::new();
        }
        Err(e) => {
            warn!("Mods scan task failed: {}", e);
            return Vec::new();
        }
    };

    let mut tasks = JoinSet::new();
    for name in folders {
        let mod_dir = mods_root.join(name);
        tasks.spawn_blocking(move || read_mod(&mod_dir));
    }

    let mut mods = Vec::new();
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Some(info)) => mods.push(info),
            Ok(None) => {}
            Err(e) => warn!("Mod classification task failed: {}", e),
        }
    }

    mods.sort_by(|a, b| a.folder_name.cmp(&b.folder_name));
    debug!("Found {} mods in {}", mods.len(), mods_root.display());
    mods
}

/// A folder the user picked, checked and classified but not yet copied
#[derive(Debug, Clone)]
pub struct ModCandidate {
    pub source: PathBuf,
    pub info: ModInfo,
}

/// Check that `source` can be installed as a new mod
///
/// The library folder is `folder_name` when given, else the source folder's
/// own name; it must not be taken yet.
pub fn validate_mod(
    source: &Path,
    folder_name: Option<&str>,
    mods_root: &Path,
) -> Result<ModCandidate, ModLibraryError> {
    if !source.is_dir() {
        return Err(ModLibraryError::NotADirectory(source.to_path_buf()));
    }

    let folder_name = match folder_name {
        Some(name) => name.to_string(),
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    if !is_safe_component(&folder_name) {
        return Err(ModLibraryError::InvalidName(folder_name));
    }

    if fs::symlink_metadata(mods_root.join(&folder_name)).is_ok() {
        return Err(ModLibraryError::AlreadyInstalled(folder_name));
    }

    let mut info =
        read_mod(source).ok_or_else(|| ModLibraryError::InvalidName(folder_name.clone()))?;
    info.folder_name = folder_name;
    Ok(ModCandidate {
        source: source.to_path_buf(),
        info,
    })
}

/// Copy a mod folder into the library as `mods_root/folder_name`
///
/// Refuses to overwrite an existing mod. A failed copy removes whatever was
/// copied so far.
pub fn install_mod(
    source: &Path,
    folder_name: &str,
    mods_root: &Path,
) -> Result<PathBuf, ModLibraryError> {
    if !is_safe_component(folder_name) {
        return Err(ModLibraryError::InvalidName(folder_name.to_string()));
    }
    if !source.is_dir() {
        return Err(ModLibraryError::NotADirectory(source.to_path_buf()));
    }

    let target = mods_root.join(folder_name);
    if fs::symlink_metadata(&target).is_ok() {
        return Err(ModLibraryError::AlreadyInstalled(folder_name.to_string()));
    }

    fs::create_dir_all(mods_root).map_err(|source| ModLibraryError::Io {
        path: mods_root.to_path_buf(),
        source,
    })?;

    if let Err(e) = copy_dir_recursive(source, &target) {
        if let Err(cleanup) = fs::remove_dir_all(&target) {
            debug!("Cleanup of {} failed: {}", target.display(), cleanup);
        }
        return Err(e);
    }

    info!("Installed mod {} from {}", folder_name, source.display());
    Ok(target)
}

fn copy_dir_recursive(source: &Path, target: &Path) -> Result<(), ModLibraryError> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| ModLibraryError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf()),
            source: e.into(),
        })?;

        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let dest = target.join(relative);
        let io_err = |source| ModLibraryError::Io {
            path: dest.clone(),
            source,
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(io_err)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &dest).map_err(io_err)?;
        } else {
            warn!("Skipping non-regular file in mod: {}", entry.path().display());
        }
    }
    Ok(())
}

/// Remove a mod from the library; a mod that is already gone is not an error
pub fn delete_mod(folder_name: &str, mods_root: &Path) -> Result<(), ModLibraryError> {
    if !is_safe_component(folder_name) {
        return Err(ModLibraryError::InvalidName(folder_name.to_string()));
    }

    let target = mods_root.join(folder_name);
    let io_err = |source| ModLibraryError::Io {
        path: target.clone(),
        source,
    };

    let meta = match fs::symlink_metadata(&target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(e)),
    };

    if meta.is_dir() {
        fs::remove_dir_all(&target).map_err(io_err)?;
    } else {
        fs::remove_file(&target).map_err(io_err)?;
    }

    info!("Deleted mod {}", folder_name);
    Ok(())
}
