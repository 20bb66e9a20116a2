//! Settings management
//!
//! Stores user preferences in `<data_dir>/settings.json`. The file is shared
//! with the presentation layer, so keys this crate doesn't know are kept
//! as-is when saving, and a known key holding an unexpected value is left
//! untouched on disk unless this crate changes it.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// User settings blob
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: String,

    pub language: String,

    /// Launch the game right after a fresh install
    pub auto_launch: bool,

    pub sound_effects: bool,

    pub custom_cursor: bool,

    /// Mod folder name -> visible. Missing entries are visible.
    pub mod_visibility: ModVisibility,

    /// Everything else the UI stores
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "funkin".to_string(),
            language: "es".to_string(),
            auto_launch: true,
            sound_effects: true,
            custom_cursor: true,
            mod_visibility: ModVisibility::default(),
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Build settings from a parsed file, key by key over the defaults
    ///
    /// A known key with the wrong type keeps its default here and is logged.
    pub fn from_object(object: Map<String, Value>) -> Self {
        let mut settings = Self::default();
        for (key, value) in object {
            match key.as_str() {
                "theme" => read_field(&key, value, &mut settings.theme),
                "language" => read_field(&key, value, &mut settings.language),
                "autoLaunch" => read_field(&key, value, &mut settings.auto_launch),
                "soundEffects" => read_field(&key, value, &mut settings.sound_effects),
                "customCursor" => read_field(&key, value, &mut settings.custom_cursor),
                "modVisibility" => match value {
                    Value::Object(entries) => {
                        settings.mod_visibility = entries
                            .into_iter()
                            .filter_map(|(name, visible)| visible.as_bool().map(|v| (name, v)))
                            .collect();
                    }
                    other => warn!("Ignoring settings key modVisibility: expected an object, got {}", other),
                },
                _ => {
                    settings.extra.insert(key, value);
                }
            }
        }
        settings
    }

    fn to_object(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).context("Failed to serialize settings")? {
            Value::Object(object) => Ok(object),
            _ => bail!("Settings did not serialize to an object"),
        }
    }
}

fn read_field<T: DeserializeOwned>(key: &str, value: Value, slot: &mut T) {
    match serde_json::from_value(value) {
        Ok(parsed) => *slot = parsed,
        Err(e) => warn!("Ignoring settings key {}: {}", key, e),
    }
}

/// Per-mod visibility flags, global across all installs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModVisibility(BTreeMap<String, bool>);

impl ModVisibility {
    pub fn is_visible(&self, folder_name: &str) -> bool {
        self.0.get(folder_name) != Some(&false)
    }

    pub fn set(&mut self, folder_name: impl Into<String>, visible: bool) {
        self.0.insert(folder_name.into(), visible);
    }

    pub fn remove(&mut self, folder_name: &str) {
        self.0.remove(folder_name);
    }
}

impl FromIterator<(String, bool)> for ModVisibility {
    fn from_iter<I: IntoIterator<Item = (String, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Shared, lock-protected settings file
///
/// Reads take a snapshot. Writes hold the lock, re-read the file (the UI may
/// have changed it), apply only the keys that changed and replace the file,
/// so two writers never interleave.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from disk, or use defaults if missing or unreadable
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_object(&path) {
            Ok(Some(object)) => Settings::from_object(object),
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("Could not load settings: {:#}. Using defaults.", e);
                Settings::default()
            }
        };
        Self {
            path,
            settings: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the current mod visibility map
    pub fn mod_visibility(&self) -> ModVisibility {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mod_visibility
            .clone()
    }

    /// Apply a change and persist it
    ///
    /// Fails without touching the file when it exists but can't be parsed.
    pub fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Settings),
    {
        let mut guard = self.settings.write().unwrap_or_else(PoisonError::into_inner);

        let on_disk = read_object(&self.path)
            .context("Refusing to overwrite a settings file that could not be read")?
            .unwrap_or_default();

        let mut merged = Settings::default().to_object()?;
        merged.extend(on_disk);

        let current = Settings::from_object(merged.clone());
        let before = current.to_object()?;
        let mut next = current;
        change(&mut next);
        let after = next.to_object()?;

        for key in before.keys().filter(|key| !after.contains_key(*key)) {
            merged.remove(key);
        }
        for (key, value) in after {
            if before.get(&key) != Some(&value) {
                merged.insert(key, value);
            }
        }

        write_atomic(&self.path, &merged)?;
        *guard = Settings::from_object(merged);
        Ok(())
    }

    pub fn set_mod_visible(&self, folder_name: &str, visible: bool) -> Result<()> {
        debug!("Mod visibility: {} -> {}", folder_name, visible);
        self.update(|s| s.mod_visibility.set(folder_name, visible))
    }

    /// Drop the visibility entry of a deleted mod
    pub fn forget_mod(&self, folder_name: &str) -> Result<()> {
        self.update(|s| s.mod_visibility.remove(folder_name))
    }
}

/// Parse the settings file as a JSON object; `None` when it doesn't exist
fn read_object(path: &Path) -> Result<Option<Map<String, Value>>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

    let value: Value =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

    match value {
        Value::Object(object) => Ok(Some(object)),
        _ => bail!("{:?} does not contain a JSON object", path),
    }
}

/// Write settings to a temp file next to `path` and rename it over
fn write_atomic(path: &Path, settings: &Map<String, Value>) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;

    let content = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    tmp.write_all(content.as_bytes())
        .context("Failed to write settings")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {:?}", path))?;

    Ok(())
}
