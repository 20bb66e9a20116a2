//! Install/launch orchestrator
//!
//! Drives a single "play" request through its stages:
//! 1. Probe: is a runnable build already in `versions/<engine>/<version>`?
//! 2. Download: platform build, or the Windows build as a fallback on Linux
//! 3. Extract: unpack `funkin.zip` over the install folder
//! 4. Link: rebuild the install's `mods` folder from the library
//! 5. Launch: always for existing installs, on request after a fresh one
//!
//! Every stage reports to the UI through [`Signal`]s. A terminal failure is
//! reported exactly once as [`Signal::DownloadError`] and returned.

pub mod config;
pub mod manage;
pub mod probe;

pub use config::{ConfigError, LauncherConfig};

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::archive::{extract_archive, ArchiveError};
use crate::catalog::{DownloadLinks, EngineEntry, VersionEntry};
use crate::downloaders::http::{
    download_file_with_callback, DownloadError, HttpClient, ProgressCallback, TransferProgress,
};
use crate::launcher::{HostWindow, LaunchError, ProcessLauncher};
use crate::mods::link::materialize_links;
use crate::paths::{is_safe_component, LauncherPaths};
use crate::platform::Platform;
use crate::settings::SettingsStore;

/// Status updates sent to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Signal {
    DownloadProgress {
        percent: f64,
        received_bytes: u64,
        /// `None` when the server didn't say
        total_bytes: Option<u64>,
        /// Which source is being downloaded, or a notice
        url: String,
    },
    #[serde(rename = "unzip-start")]
    UnzipStarted,
    /// Fresh install finished
    DownloadComplete { name: String, path: PathBuf },
    /// Existing install is about to launch
    GameReady { name: String, path: PathBuf },
    DownloadError { error: String },
    DeleteSuccess { engine: String, version: String },
}

/// Receives signals; called from whatever task produced them
pub type SignalCallback = Arc<dyn Fn(Signal) + Send + Sync>;

/// Everything needed to play one engine version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Display name used in signals
    pub name: String,
    pub engine_id: String,
    pub version: String,
    pub links: DownloadLinks,
    /// Executable base name, without `.exe`
    pub exe_name: String,
    /// Start the game right after a fresh install
    pub auto_launch: bool,
}

impl LaunchRequest {
    pub fn from_catalog(engine: &EngineEntry, version: &VersionEntry, auto_launch: bool) -> Self {
        Self {
            name: engine.name.clone(),
            engine_id: engine.id.clone(),
            version: version.version.clone(),
            links: version.download_urls.clone(),
            exe_name: engine.executable_name.clone(),
            auto_launch,
        }
    }
}

/// How a successful request ended
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The game ran and exited
    Played {
        install_dir: PathBuf,
        status: ExitStatus,
        fresh_install: bool,
    },
    /// Freshly installed, not launched
    Installed { install_dir: PathBuf },
}

/// Terminal pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{engine} {version} is already being installed or launched")]
    Busy { engine: String, version: String },

    #[error("Invalid engine id or version: {engine:?} / {version:?}")]
    InvalidKey { engine: String, version: String },

    #[error("No download link for {0}")]
    NoDownloadLink(Platform),

    #[error(transparent)]
    Download(DownloadError),

    #[error("Windows fallback failed: {0}")]
    FallbackDownload(#[source] DownloadError),

    #[error("Failed to extract: {0}")]
    Extract(#[source] ArchiveError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("Failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

type BusyKey = (String, String);

/// Marks an (engine, version) pair busy until dropped
struct BusyGuard<'a> {
    busy: &'a Mutex<HashSet<BusyKey>>,
    key: BusyKey,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Main install/launch orchestrator
///
/// Share it behind an `Arc` to serve several requests at once; requests for
/// the same engine version are rejected while one is in flight.
pub struct Installer {
    paths: LauncherPaths,
    platform: Platform,
    client: HttpClient,
    settings: Arc<SettingsStore>,
    compat_runner: String,
    window: Arc<dyn HostWindow>,
    signals: SignalCallback,
    busy: Mutex<HashSet<BusyKey>>,
}

impl Installer {
    /// Create an installer for the current platform
    pub fn new(
        config: &LauncherConfig,
        settings: Arc<SettingsStore>,
        window: Arc<dyn HostWindow>,
        signals: SignalCallback,
    ) -> anyhow::Result<Self> {
        config.validate_runtime()?;

        Ok(Self {
            paths: config.paths(),
            platform: Platform::current(),
            client: config.http_client()?,
            settings,
            compat_runner: config.compat_runner.clone(),
            window,
            signals,
            busy: Mutex::new(HashSet::new()),
        })
    }

    /// Act as if running on another platform
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn emit(&self, signal: Signal) {
        (self.signals)(signal);
    }

    fn acquire(&self, engine: &str, version: &str) -> Result<BusyGuard<'_>, PipelineError> {
        if !is_safe_component(engine) || !is_safe_component(version) {
            return Err(PipelineError::InvalidKey {
                engine: engine.to_string(),
                version: version.to_string(),
            });
        }

        let key = (engine.to_string(), version.to_string());
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(key.clone()) {
            return Err(PipelineError::Busy {
                engine: key.0,
                version: key.1,
            });
        }
        Ok(BusyGuard {
            busy: &self.busy,
            key,
        })
    }

    /// Handle a play request from start to finish
    pub async fn launch(&self, request: &LaunchRequest) -> Result<LaunchOutcome, PipelineError> {
        let result = self.run_pipeline(request).await;
        if let Err(e) = &result {
            error!(
                engine = %request.engine_id,
                version = %request.version,
                "Launch failed: {}",
                e
            );
            self.emit(Signal::DownloadError {
                error: e.to_string(),
            });
        }
        result
    }

    async fn run_pipeline(&self, request: &LaunchRequest) -> Result<LaunchOutcome, PipelineError> {
        let _busy = self.acquire(&request.engine_id, &request.version)?;
        let install_dir = self.paths.install_dir(&request.engine_id, &request.version);

        debug!(engine = %request.engine_id, version = %request.version, "Probing");
        if probe::is_installed_async(&install_dir, &request.exe_name, self.platform).await {
            debug!(engine = %request.engine_id, version = %request.version, "Linking");
            self.link_mods(&install_dir).await;

            self.emit(Signal::GameReady {
                name: request.name.clone(),
                path: install_dir.clone(),
            });

            let status = self.run_game(request, &install_dir).await?;
            return Ok(LaunchOutcome::Played {
                install_dir,
                status,
                fresh_install: false,
            });
        }

        debug!(engine = %request.engine_id, version = %request.version, "Downloading");
        self.download_build(request, &install_dir).await?;

        debug!(engine = %request.engine_id, version = %request.version, "Extracting");
        self.emit(Signal::UnzipStarted);
        let archive = LauncherPaths::archive_path(&install_dir);
        let target = install_dir.clone();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
            .await?
            .map_err(PipelineError::Extract)?;

        debug!(engine = %request.engine_id, version = %request.version, "Linking");
        self.link_mods(&install_dir).await;

        self.emit(Signal::DownloadComplete {
            name: request.name.clone(),
            path: install_dir.clone(),
        });
        info!("Installed {} {} in {}", request.name, request.version, install_dir.display());

        if !request.auto_launch {
            return Ok(LaunchOutcome::Installed { install_dir });
        }

        let status = self.run_game(request, &install_dir).await?;
        Ok(LaunchOutcome::Played {
            install_dir,
            status,
            fresh_install: true,
        })
    }

    /// Download the build archive into the install folder
    async fn download_build(
        &self,
        request: &LaunchRequest,
        install_dir: &Path,
    ) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(install_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: install_dir.to_path_buf(),
                source,
            })?;

        let archive = LauncherPaths::archive_path(install_dir);
        let (primary, fallback) = select_sources(&request.links, self.platform);

        match (primary, fallback) {
            (None, None) => Err(PipelineError::NoDownloadLink(self.platform)),
            (None, Some(fallback)) => {
                info!("No {} build of {} {}, using the Windows build", self.platform, request.name, request.version);
                self.download(fallback, &archive)
                    .await
                    .map_err(PipelineError::FallbackDownload)
            }
            (Some(primary), fallback) => match self.download(primary, &archive).await {
                Ok(()) => Ok(()),
                Err(e) if e.is_missing_build() => match fallback {
                    Some(fallback) => {
                        warn!("{} build unavailable ({}), trying the Windows build", self.platform, e);
                        self.emit(Signal::DownloadProgress {
                            percent: 0.0,
                            received_bytes: 0,
                            total_bytes: None,
                            url: format!("{} build unavailable, trying Windows build...", self.platform),
                        });
                        self.download(fallback, &archive)
                            .await
                            .map_err(PipelineError::FallbackDownload)
                    }
                    None => Err(PipelineError::Download(e)),
                },
                Err(e) => Err(PipelineError::Download(e)),
            },
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let signals = self.signals.clone();
        let source = url.to_string();
        let callback: ProgressCallback = Box::new(move |progress: &TransferProgress| {
            signals(Signal::DownloadProgress {
                percent: progress.percent(),
                received_bytes: progress.received_bytes,
                total_bytes: progress.total_bytes,
                url: source.clone(),
            })
        });

        let bytes = download_file_with_callback(&self.client, url, dest, Some(&callback)).await?;
        info!("Downloaded {} ({} bytes)", url, bytes);
        Ok(())
    }

    /// Rebuild the install's mods folder; failures only produce a warning
    async fn link_mods(&self, install_dir: &Path) {
        let visibility = self.settings.mod_visibility();
        let install_dir = install_dir.to_path_buf();
        let mods_root = self.paths.mods_dir();

        let result =
            tokio::task::spawn_blocking(move || materialize_links(&install_dir, &mods_root, &visibility))
                .await;

        let message = match result {
            Ok(Ok(report)) => {
                if !report.failed.is_empty() {
                    warn!("Mods not linked: {}", report.failed.join(", "));
                }
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        warn!("Continuing without mods: {}", message);
        self.emit(Signal::DownloadError {
            error: format!("Failed to link mods: {}", message),
        });
    }

    async fn run_game(
        &self,
        request: &LaunchRequest,
        install_dir: &Path,
    ) -> Result<ExitStatus, PipelineError> {
        debug!(engine = %request.engine_id, version = %request.version, "Launching");
        let launcher = ProcessLauncher::new(self.platform, self.compat_runner.clone(), self.window.clone());
        Ok(launcher.launch(install_dir, &request.exe_name).await?)
    }

    /// Whether a runnable build of this version is installed
    pub async fn check_install_status(&self, engine_id: &str, version: &str, exe_name: &str) -> bool {
        if !is_safe_component(engine_id) || !is_safe_component(version) {
            return false;
        }
        let install_dir = self.paths.install_dir(engine_id, version);
        probe::is_installed_async(&install_dir, exe_name, self.platform).await
    }

    /// Delete an install folder
    ///
    /// Succeeds when the folder is already gone. Refused while the same
    /// version is being installed or played.
    pub async fn delete_install(&self, engine_id: &str, version: &str) -> Result<(), PipelineError> {
        match self.remove_install(engine_id, version).await {
            Ok(()) => {
                self.emit(Signal::DeleteSuccess {
                    engine: engine_id.to_string(),
                    version: version.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                error!("Delete failed: {}", e);
                self.emit(Signal::DownloadError {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn remove_install(&self, engine_id: &str, version: &str) -> Result<(), PipelineError> {
        let _busy = self.acquire(engine_id, version)?;
        let install_dir = self.paths.install_dir(engine_id, version);
        manage::remove_install_dir(&install_dir)
            .await
            .map_err(|source| PipelineError::Io {
                path: install_dir.clone(),
                source,
            })?;
        Ok(())
    }
}

/// Pick `(primary, fallback)` download URLs for a platform
///
/// The primary is the platform's own build. On Linux the Windows build is
/// the fallback, unless it is the same link.
pub fn select_sources(links: &DownloadLinks, platform: Platform) -> (Option<&str>, Option<&str>) {
    let primary = links.for_platform(platform);
    let fallback = match platform {
        Platform::Linux => links.windows.as_deref().filter(|w| Some(*w) != primary),
        _ => None,
    };
    (primary, fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::write_test_zip;
    use crate::launcher::{HeadlessWindow, WindowBounds};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Harness {
        _dir: TempDir,
        data_dir: PathBuf,
        installer: Arc<Installer>,
        signals: Arc<Mutex<Vec<Signal>>>,
    }

    impl Harness {
        fn new(window: Arc<dyn HostWindow>) -> Self {
            let dir = tempdir().unwrap();
            let data_dir = dir.path().join("data");
            let mut config = LauncherConfig::new(&data_dir);
            config.compat_runner = "true".into();

            let settings = Arc::new(SettingsStore::load(config.paths().settings_file()));
            let signals = Arc::new(Mutex::new(Vec::new()));
            let sink = signals.clone();
            let callback: SignalCallback = Arc::new(move |s: Signal| sink.lock().unwrap().push(s));

            let installer = Installer::new(&config, settings, window, callback)
                .unwrap()
                .with_platform(Platform::Linux);

            Self {
                _dir: dir,
                data_dir,
                installer: Arc::new(installer),
                signals,
            }
        }

        fn signals(&self) -> Vec<Signal> {
            self.signals.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.signals()
                .into_iter()
                .filter_map(|s| match s {
                    Signal::DownloadError { error } => Some(error),
                    _ => None,
                })
                .collect()
        }

        fn install_dir(&self) -> PathBuf {
            self.data_dir.join("versions/codename/1.0")
        }
    }

    fn build_zip() -> Vec<u8> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("build.zip");
        write_test_zip(
            &path,
            &[
                ("CodenameEngine.exe", b"MZ"),
                ("assets/data/config.json", b"{}"),
            ],
        );
        fs::read(path).unwrap()
    }

    fn request(links: DownloadLinks, auto_launch: bool) -> LaunchRequest {
        LaunchRequest {
            name: "Codename Engine".into(),
            engine_id: "codename".into(),
            version: "1.0".into(),
            links,
            exe_name: "CodenameEngine".into(),
            auto_launch,
        }
    }

    #[test]
    fn test_select_sources() {
        let both = DownloadLinks {
            windows: Some("w".into()),
            linux: Some("l".into()),
        };
        assert_eq!(select_sources(&both, Platform::Linux), (Some("l"), Some("w")));
        assert_eq!(select_sources(&both, Platform::Windows), (Some("w"), None));
        assert_eq!(select_sources(&both, Platform::Other), (None, None));

        let windows_only = DownloadLinks {
            windows: Some("w".into()),
            linux: None,
        };
        assert_eq!(select_sources(&windows_only, Platform::Linux), (None, Some("w")));

        let same = DownloadLinks {
            windows: Some("x".into()),
            linux: Some("x".into()),
        };
        assert_eq!(select_sources(&same, Platform::Linux), (Some("x"), None));
    }

    #[test]
    fn test_signal_wire_format() {
        let json = serde_json::to_value(Signal::DownloadProgress {
            percent: 50.0,
            received_bytes: 5,
            total_bytes: Some(10),
            url: "u".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "download-progress");
        assert_eq!(json["receivedBytes"], 5);
        assert_eq!(json["totalBytes"], 10);

        let json = serde_json::to_value(Signal::UnzipStarted).unwrap();
        assert_eq!(json["event"], "unzip-start");
    }

    #[tokio::test]
    async fn test_404_falls_back_to_windows_once() {
        let mut server = mockito::Server::new_async().await;
        let linux = server
            .mock("GET", "/linux.zip")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let windows = server
            .mock("GET", "/windows.zip")
            .with_status(200)
            .with_body(build_zip())
            .expect(1)
            .create_async()
            .await;

        let h = Harness::new(Arc::new(HeadlessWindow));
        let links = DownloadLinks {
            windows: Some(format!("{}/windows.zip", server.url())),
            linux: Some(format!("{}/linux.zip", server.url())),
        };

        let outcome = h.installer.launch(&request(links, false)).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Installed { .. }));

        linux.assert_async().await;
        windows.assert_async().await;
        assert!(h.errors().is_empty());

        let install = h.install_dir();
        assert!(install.join("CodenameEngine.exe").is_file());
        assert!(!install.join("funkin.zip").exists());
        assert!(install.join("mods").is_dir());

        let signals = h.signals();
        assert!(signals.iter().any(|s| matches!(
            s,
            Signal::DownloadProgress { url, .. } if url.contains("trying Windows build")
        )));
        assert!(signals.contains(&Signal::UnzipStarted));
        assert_eq!(
            signals.last(),
            Some(&Signal::DownloadComplete {
                name: "Codename Engine".into(),
                path: install,
            })
        );
    }

    #[tokio::test]
    async fn test_403_does_not_fall_back() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux.zip")
            .with_status(403)
            .create_async()
            .await;
        let windows = server
            .mock("GET", "/windows.zip")
            .expect(0)
            .create_async()
            .await;

        let h = Harness::new(Arc::new(HeadlessWindow));
        let links = DownloadLinks {
            windows: Some(format!("{}/windows.zip", server.url())),
            linux: Some(format!("{}/linux.zip", server.url())),
        };

        let err = h.installer.launch(&request(links, false)).await.unwrap_err();
        assert!(matches!(&err, PipelineError::Download(e) if e.status() == Some(403)));
        windows.assert_async().await;

        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("403"));
        assert!(!h.install_dir().join("funkin.zip").exists());
    }

    #[tokio::test]
    async fn test_failed_fallback_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux.zip")
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/windows.zip")
            .with_status(404)
            .create_async()
            .await;

        let h = Harness::new(Arc::new(HeadlessWindow));
        let links = DownloadLinks {
            windows: Some(format!("{}/windows.zip", server.url())),
            linux: Some(format!("{}/linux.zip", server.url())),
        };

        let err = h.installer.launch(&request(links, false)).await.unwrap_err();
        assert!(matches!(err, PipelineError::FallbackDownload(_)));
        let errors = h.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Windows fallback failed"));
    }

    #[tokio::test]
    async fn test_no_links() {
        let h = Harness::new(Arc::new(HeadlessWindow));
        let err = h
            .installer
            .launch(&request(DownloadLinks::default(), true))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoDownloadLink(Platform::Linux)));
        assert_eq!(h.errors(), vec!["No download link for linux".to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_kept() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/linux.zip")
            .with_status(200)
            .with_body("definitely not a zip")
            .create_async()
            .await;

        let h = Harness::new(Arc::new(HeadlessWindow));
        let links = DownloadLinks {
            windows: None,
            linux: Some(format!("{}/linux.zip", server.url())),
        };

        let err = h.installer.launch(&request(links, false)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extract(_)));
        assert!(h.install_dir().join("funkin.zip").exists());
        assert!(h.signals().contains(&Signal::UnzipStarted));
    }

    #[tokio::test]
    async fn test_busy_key_is_rejected() {
        let h = Harness::new(Arc::new(HeadlessWindow));
        let guard = h.installer.acquire("codename", "1.0").unwrap();

        let err = h
            .installer
            .launch(&request(DownloadLinks::default(), false))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Busy { .. }));

        assert!(matches!(
            h.installer.delete_install("codename", "1.0").await,
            Err(PipelineError::Busy { .. })
        ));

        // Other versions are unaffected
        assert!(h.installer.acquire("codename", "0.9").is_ok());

        drop(guard);
        assert!(h.installer.acquire("codename", "1.0").is_ok());
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let h = Harness::new(Arc::new(HeadlessWindow));
        let mut req = request(DownloadLinks::default(), false);
        req.version = "../../etc".into();
        let err = h.installer.launch(&req).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidKey { .. }));
        assert!(!h.installer.check_install_status("codename", "..", "CodenameEngine").await);
    }

    #[tokio::test]
    async fn test_delete_install() {
        let h = Harness::new(Arc::new(HeadlessWindow));
        fs::create_dir_all(h.install_dir()).unwrap();
        fs::write(h.install_dir().join("CodenameEngine.exe"), b"MZ").unwrap();
        assert!(h.installer.check_install_status("codename", "1.0", "CodenameEngine").await);

        h.installer.delete_install("codename", "1.0").await.unwrap();
        assert!(!h.install_dir().exists());
        assert!(!h.installer.check_install_status("codename", "1.0", "CodenameEngine").await);

        // Deleting again still succeeds
        h.installer.delete_install("codename", "1.0").await.unwrap();

        let deletes = h
            .signals()
            .into_iter()
            .filter(|s| matches!(s, Signal::DeleteSuccess { .. }))
            .count();
        assert_eq!(deletes, 2);
    }

    #[cfg(unix)]
    mod launching {
        use super::*;

        #[derive(Default)]
        struct RecordingWindow {
            events: Mutex<Vec<&'static str>>,
        }

        impl HostWindow for RecordingWindow {
            fn bounds(&self) -> WindowBounds {
                WindowBounds::default()
            }

            fn hide(&self) {
                self.events.lock().unwrap().push("hide");
            }

            fn restore(&self, _bounds: WindowBounds) {
                self.events.lock().unwrap().push("restore");
            }
        }

        #[tokio::test]
        async fn test_windows_only_build_on_linux_installs_and_launches() {
            let mut server = mockito::Server::new_async().await;
            let build = server
                .mock("GET", "/build.zip")
                .with_status(200)
                .with_body(build_zip())
                .expect(1)
                .create_async()
                .await;

            let window = Arc::new(RecordingWindow::default());
            let h = Harness::new(window.clone());

            let mods = h.data_dir.join("mods");
            fs::create_dir_all(mods.join("A")).unwrap();

            let links = DownloadLinks {
                windows: Some(format!("{}/build.zip", server.url())),
                linux: None,
            };
            let outcome = h.installer.launch(&request(links, true)).await.unwrap();
            build.assert_async().await;

            match outcome {
                LaunchOutcome::Played {
                    status,
                    fresh_install,
                    ..
                } => {
                    assert!(status.success());
                    assert!(fresh_install);
                }
                other => panic!("unexpected outcome: {:?}", other),
            }

            assert_eq!(*window.events.lock().unwrap(), vec!["hide", "restore"]);
            assert!(h.errors().is_empty());
            let link = h.install_dir().join("mods/A");
            assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());

            let signals = h.signals();
            let unzip = signals.iter().position(|s| *s == Signal::UnzipStarted).unwrap();
            let complete = signals
                .iter()
                .position(|s| matches!(s, Signal::DownloadComplete { .. }))
                .unwrap();
            assert!(unzip < complete);
        }

        #[tokio::test]
        async fn test_existing_install_launches_without_download() {
            let window = Arc::new(RecordingWindow::default());
            let h = Harness::new(window.clone());
            fs::create_dir_all(h.install_dir()).unwrap();
            fs::write(h.install_dir().join("CodenameEngine.exe"), b"MZ").unwrap();

            // No links at all: a download attempt would fail
            let outcome = h
                .installer
                .launch(&request(DownloadLinks::default(), false))
                .await
                .unwrap();
            assert!(matches!(
                outcome,
                LaunchOutcome::Played {
                    fresh_install: false,
                    ..
                }
            ));

            assert_eq!(
                h.signals(),
                vec![Signal::GameReady {
                    name: "Codename Engine".into(),
                    path: h.install_dir(),
                }]
            );
            assert_eq!(*window.events.lock().unwrap(), vec!["hide", "restore"]);
        }
    }
}
