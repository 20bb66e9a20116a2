//! Engine version catalog
//!
//! The catalog lists every engine the launcher knows about and, per version,
//! the download link for each platform:
//!
//! ```json
//! { "engines": [ { "id": "codename", "name": "Codename Engine",
//!     "executable_name": "CodenameEngine",
//!     "versions": [ { "version": "1.0", "download_urls": { "windows": "https://..." } } ] } ] }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use crate::downloaders::http::HttpClient;
use crate::platform::Platform;

/// Parsed catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub engines: Vec<EngineEntry>,
}

/// One engine family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEntry {
    pub id: String,
    pub name: String,
    #[serde(default, alias = "icon_path")]
    pub icon: Option<String>,
    /// Base name of the game binary, without `.exe`
    pub executable_name: String,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

/// One downloadable version of an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: String,
    #[serde(default, alias = "links")]
    pub download_urls: DownloadLinks,
}

/// Per-platform archive URLs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linux: Option<String>,
}

impl DownloadLinks {
    /// Link built for the given platform, if any
    pub fn for_platform(&self, platform: Platform) -> Option<&str> {
        match platform {
            Platform::Windows => self.windows.as_deref(),
            Platform::Linux => self.linux.as_deref(),
            Platform::Other => None,
        }
    }
}

impl Catalog {
    /// Parse a catalog from JSON text and check engine ids are unique
    pub fn from_json_str(text: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(text).context("Failed to parse catalog")?;
        catalog.check_unique_ids()?;
        Ok(catalog)
    }

    /// Load a local catalog file
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid catalog {}", path.display()))
    }

    /// Fetch the remote catalog, falling back to the local file on any failure
    pub async fn fetch_or_load(client: &HttpClient, url: &str, fallback: &Path) -> Result<Self> {
        match Self::fetch(client, url).await {
            Ok(catalog) => {
                info!("Catalog loaded from {}", url);
                Ok(catalog)
            }
            Err(e) => {
                warn!("Remote catalog unavailable ({:#}), using {}", e, fallback.display());
                Self::load_file(fallback)
            }
        }
    }

    async fn fetch(client: &HttpClient, url: &str) -> Result<Self> {
        let response = client
            .inner()
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} fetching catalog", status.as_u16());
        }
        let text = response.text().await.context("Failed to read catalog body")?;
        Self::from_json_str(&text)
    }

    fn check_unique_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for engine in &self.engines {
            if !seen.insert(engine.id.as_str()) {
                bail!("Duplicate engine id in catalog: {}", engine.id);
            }
        }
        Ok(())
    }

    pub fn engine(&self, id: &str) -> Option<&EngineEntry> {
        self.engines.iter().find(|e| e.id == id)
    }
}

impl EngineEntry {
    pub fn version(&self, version: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Versions that can be installed on `platform`, newest first
    pub fn available_versions(&self, platform: Platform) -> Vec<&VersionEntry> {
        let mut versions: Vec<&VersionEntry> = self
            .versions
            .iter()
            .filter(|v| v.is_available_on(platform))
            .collect();
        versions.sort_by(|a, b| natural_cmp(&b.version, &a.version));
        versions
    }

    /// Highest version installable on `platform`
    pub fn latest_version(&self, platform: Platform) -> Option<&VersionEntry> {
        self.available_versions(platform).into_iter().next()
    }
}

impl VersionEntry {
    /// A Linux host can fall back to the Windows build
    pub fn is_available_on(&self, platform: Platform) -> bool {
        self.download_urls.for_platform(platform).is_some()
            || (platform == Platform::Linux && self.download_urls.windows.is_some())
    }
}

/// Compare version strings with numeric runs compared by value
///
/// `"0.10" > "0.9"` and `"1.0.10" > "1.0.2"`, unlike a plain string compare.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_number(&mut a_chars);
                let nb = take_number(&mut b_chars);
                // Compare by length after stripping leading zeros, then lexically
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca
                    .to_ascii_lowercase()
                    .cmp(&cb.to_ascii_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "engines": [
            {
                "id": "codename",
                "name": "Codename Engine",
                "icon": "icons/codename.png",
                "executable_name": "CodenameEngine",
                "versions": [
                    { "version": "0.9", "download_urls": { "windows": "https://x/0.9-win.zip" } },
                    { "version": "0.10", "links": { "windows": "https://x/0.10-win.zip", "linux": "https://x/0.10-linux.zip" } },
                    { "version": "0.2", "download_urls": { "linux": "https://x/0.2-linux.zip" } }
                ]
            },
            { "id": "psych", "name": "Psych Engine", "executable_name": "PsychEngine", "versions": [] }
        ]
    }"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = Catalog::from_json_str(SAMPLE).unwrap();
        assert_eq!(catalog.engines.len(), 2);
        let engine = catalog.engine("codename").unwrap();
        assert_eq!(engine.executable_name, "CodenameEngine");
        let v = engine.version("0.10").unwrap();
        assert_eq!(v.download_urls.linux.as_deref(), Some("https://x/0.10-linux.zip"));
        assert!(catalog.engine("missing").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let text = r#"{"engines":[
            {"id":"a","name":"A","executable_name":"A"},
            {"id":"a","name":"A2","executable_name":"A"}]}"#;
        assert!(Catalog::from_json_str(text).is_err());
    }

    #[test]
    fn test_natural_cmp() {
        assert_eq!(natural_cmp("0.10", "0.9"), Ordering::Greater);
        assert_eq!(natural_cmp("1.0.2", "1.0.10"), Ordering::Less);
        assert_eq!(natural_cmp("1.0", "1.0"), Ordering::Equal);
        assert_eq!(natural_cmp("1.0", "1.0.1"), Ordering::Less);
        assert_eq!(natural_cmp("v2", "v10"), Ordering::Less);
        assert_eq!(natural_cmp("007", "7"), Ordering::Equal);
    }

    #[test]
    fn test_available_versions_per_platform() {
        let catalog = Catalog::from_json_str(SAMPLE).unwrap();
        let engine = catalog.engine("codename").unwrap();

        let linux: Vec<&str> = engine
            .available_versions(Platform::Linux)
            .iter()
            .map(|v| v.version.as_str())
            .collect();
        assert_eq!(linux, vec!["0.10", "0.9", "0.2"]);

        let windows: Vec<&str> = engine
            .available_versions(Platform::Windows)
            .iter()
            .map(|v| v.version.as_str())
            .collect();
        assert_eq!(windows, vec!["0.10", "0.9"]);

        assert!(engine.available_versions(Platform::Other).is_empty());
        assert_eq!(engine.latest_version(Platform::Windows).unwrap().version, "0.10");
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let catalog = Catalog::load_file(&path).unwrap();
        assert_eq!(catalog.engines[0].id, "codename");
        assert!(Catalog::load_file(&dir.path().join("missing.json")).is_err());
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_local() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/versions.json")
            .with_status(500)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("versions.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let client = HttpClient::new().unwrap();
        let url = format!("{}/versions.json", server.url());
        let catalog = Catalog::fetch_or_load(&client, &url, &path).await.unwrap();
        assert_eq!(catalog.engines.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_remote() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/versions.json")
            .with_status(200)
            .with_body(r#"{"engines":[{"id":"remote","name":"R","executable_name":"R"}]}"#)
            .create_async()
            .await;

        let client = HttpClient::new().unwrap();
        let url = format!("{}/versions.json", server.url());
        let catalog = Catalog::fetch_or_load(&client, &url, Path::new("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(catalog.engines[0].id, "remote");
    }
}
