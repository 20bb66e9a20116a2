//! Game process launching
//!
//! Picks the binary to run for an install, starts it with the install folder
//! as working directory (games resolve `assets/` and `mods/` relative to it)
//! and keeps the launcher window hidden while the game runs.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::installer::probe::{native_executable, windows_executable};
use crate::platform::Platform;

/// Default compatibility layer for Windows builds on Linux
pub const DEFAULT_COMPAT_RUNNER: &str = "wine";

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Executable not found in {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("Failed to start {} with {runner} (is it installed?): {source}", exe.display())]
    CompatLayer {
        runner: String,
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {}: {source}", exe.display())]
    Spawn {
        exe: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Position and size of the host window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowBounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// The few things the launcher needs from its UI window
pub trait HostWindow: Send + Sync {
    fn bounds(&self) -> WindowBounds;
    fn hide(&self);
    fn restore(&self, bounds: WindowBounds);
}

/// No window at all (CLI use)
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessWindow;

impl HostWindow for HeadlessWindow {
    fn bounds(&self) -> WindowBounds {
        WindowBounds::default()
    }

    fn hide(&self) {}

    fn restore(&self, _bounds: WindowBounds) {}
}

/// Hides the window on creation and puts it back on drop
struct HiddenWindow<'a> {
    window: &'a dyn HostWindow,
    bounds: WindowBounds,
}

impl<'a> HiddenWindow<'a> {
    fn hide(window: &'a dyn HostWindow) -> Self {
        let bounds = window.bounds();
        window.hide();
        Self { window, bounds }
    }
}

impl Drop for HiddenWindow<'_> {
    fn drop(&mut self) {
        self.window.restore(self.bounds);
    }
}

/// What will actually be executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// Run the binary directly
    Native(PathBuf),
    /// Run a Windows binary through the compatibility layer
    Compat(PathBuf),
}

impl LaunchTarget {
    pub fn path(&self) -> &Path {
        match self {
            LaunchTarget::Native(path) | LaunchTarget::Compat(path) => path,
        }
    }
}

/// Pick the binary for this platform
///
/// Linux prefers the native build and falls back to the `.exe` under the
/// compatibility layer; Windows only runs the `.exe`.
pub fn resolve_executable(
    install_dir: &Path,
    exe_name: &str,
    platform: Platform,
) -> Option<LaunchTarget> {
    let native = native_executable(install_dir, exe_name);
    let windows = windows_executable(install_dir, exe_name);

    match platform {
        Platform::Linux if native.is_file() => Some(LaunchTarget::Native(native)),
        Platform::Linux if windows.is_file() => Some(LaunchTarget::Compat(windows)),
        Platform::Windows if windows.is_file() => Some(LaunchTarget::Native(windows)),
        _ => None,
    }
}

/// Set 0755 on a native binary; failure is only logged
pub fn ensure_executable(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let result = std::fs::metadata(path).and_then(|meta| {
            let mut perms = meta.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(path, perms)
        });
        if let Err(e) = result {
            warn!("Could not make {} executable: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

/// Starts games and waits for them to exit
pub struct ProcessLauncher {
    platform: Platform,
    compat_runner: String,
    window: Arc<dyn HostWindow>,
}

impl ProcessLauncher {
    pub fn new(platform: Platform, compat_runner: impl Into<String>, window: Arc<dyn HostWindow>) -> Self {
        Self {
            platform,
            compat_runner: compat_runner.into(),
            window,
        }
    }

    /// Run the game in `install_dir` until it exits
    ///
    /// The host window is hidden for the lifetime of the child and restored
    /// to its previous bounds afterwards, including when the spawn fails. A
    /// non-zero exit code is logged but is not an error.
    pub async fn launch(&self, install_dir: &Path, exe_name: &str) -> Result<ExitStatus, LaunchError> {
        // Paths handed to the child must not depend on its working directory
        let install_dir = std::path::absolute(install_dir).map_err(|source| LaunchError::Spawn {
            exe: install_dir.to_path_buf(),
            source,
        })?;
        let install_dir = install_dir.as_path();

        let target = resolve_executable(install_dir, exe_name, self.platform)
            .ok_or_else(|| LaunchError::ExecutableNotFound(install_dir.to_path_buf()))?;

        let mut cmd = match &target {
            LaunchTarget::Native(exe) => {
                if self.platform == Platform::Linux {
                    ensure_executable(exe);
                }
                Command::new(exe)
            }
            LaunchTarget::Compat(exe) => {
                let mut cmd = Command::new(&self.compat_runner);
                cmd.arg(exe);
                cmd
            }
        };
        cmd.current_dir(install_dir);

        info!("Launching {} (cwd {})", target.path().display(), install_dir.display());

        let _hidden = HiddenWindow::hide(self.window.as_ref());

        let mut child = cmd.spawn().map_err(|source| match &target {
            LaunchTarget::Compat(exe) => LaunchError::CompatLayer {
                runner: self.compat_runner.clone(),
                exe: exe.clone(),
                source,
            },
            LaunchTarget::Native(exe) => LaunchError::Spawn {
                exe: exe.clone(),
                source,
            },
        })?;

        let status = child.wait().await.map_err(|source| LaunchError::Spawn {
            exe: target.path().to_path_buf(),
            source,
        })?;

        if status.success() {
            debug!("Game exited normally");
        } else {
            warn!("Game exited with {}", status);
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    enum WindowEvent {
        Hide,
        Restore(WindowBounds),
    }

    #[derive(Default)]
    struct RecordingWindow {
        events: Mutex<Vec<WindowEvent>>,
    }

    const BOUNDS: WindowBounds = WindowBounds {
        x: 10,
        y: 20,
        width: 1280,
        height: 720,
    };

    impl HostWindow for RecordingWindow {
        fn bounds(&self) -> WindowBounds {
            BOUNDS
        }

        fn hide(&self) {
            self.events.lock().unwrap().push(WindowEvent::Hide);
        }

        fn restore(&self, bounds: WindowBounds) {
            self.events.lock().unwrap().push(WindowEvent::Restore(bounds));
        }
    }

    #[test]
    fn test_resolve_executable() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Funkin.exe"), b"MZ").unwrap();

        assert_eq!(
            resolve_executable(dir.path(), "Funkin", Platform::Linux),
            Some(LaunchTarget::Compat(dir.path().join("Funkin.exe")))
        );
        assert_eq!(
            resolve_executable(dir.path(), "Funkin", Platform::Windows),
            Some(LaunchTarget::Native(dir.path().join("Funkin.exe")))
        );
        assert_eq!(resolve_executable(dir.path(), "Funkin", Platform::Other), None);

        fs::write(dir.path().join("Funkin"), b"elf").unwrap();
        assert_eq!(
            resolve_executable(dir.path(), "Funkin", Platform::Linux),
            Some(LaunchTarget::Native(dir.path().join("Funkin")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let exe = dir.path().join("Funkin");
        fs::write(&exe, b"elf").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o644)).unwrap();

        ensure_executable(&exe);
        assert_eq!(fs::metadata(&exe).unwrap().permissions().mode() & 0o777, 0o755);

        // Missing file is only logged
        ensure_executable(&dir.path().join("missing"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_window_restored_after_exit() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Funkin.exe"), b"MZ").unwrap();

        let window = Arc::new(RecordingWindow::default());
        let launcher = ProcessLauncher::new(Platform::Linux, "true", window.clone());

        let status = launcher.launch(dir.path(), "Funkin").await.unwrap();
        assert!(status.success());
        assert_eq!(
            *window.events.lock().unwrap(),
            vec![WindowEvent::Hide, WindowEvent::Restore(BOUNDS)]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_window_restored_after_spawn_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Funkin.exe"), b"MZ").unwrap();

        let window = Arc::new(RecordingWindow::default());
        let launcher =
            ProcessLauncher::new(Platform::Linux, "/nonexistent/genesis-wine", window.clone());

        let err = launcher.launch(dir.path(), "Funkin").await.unwrap_err();
        assert!(matches!(err, LaunchError::CompatLayer { .. }));
        assert!(err.to_string().contains("is it installed?"));
        assert_eq!(
            *window.events.lock().unwrap(),
            vec![WindowEvent::Hide, WindowEvent::Restore(BOUNDS)]
        );
    }

    #[tokio::test]
    async fn test_missing_executable_leaves_window_alone() {
        let dir = tempdir().unwrap();
        let window = Arc::new(RecordingWindow::default());
        let launcher = ProcessLauncher::new(Platform::Linux, "true", window.clone());

        let err = launcher.launch(dir.path(), "Funkin").await.unwrap_err();
        assert!(matches!(err, LaunchError::ExecutableNotFound(_)));
        assert!(window.events.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_in_install_dir() {
        let dir = tempdir().unwrap();
        // `sh Funkin.exe` reads the file as a script, nothing gets exec'd
        fs::write(dir.path().join("Funkin.exe"), "pwd > cwd.txt\n").unwrap();

        let launcher = ProcessLauncher::new(Platform::Linux, "sh", Arc::new(HeadlessWindow));
        launcher.launch(dir.path(), "Funkin").await.unwrap();

        let cwd = fs::read_to_string(dir.path().join("cwd.txt")).unwrap();
        assert_eq!(
            fs::canonicalize(cwd.trim()).unwrap(),
            fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relative_install_dir() {
        // Relative to the test's working directory
        let dir = tempfile::tempdir_in(".").unwrap();
        assert!(dir.path().is_relative());
        fs::write(dir.path().join("Funkin.exe"), "touch ran.txt\n").unwrap();

        let launcher = ProcessLauncher::new(Platform::Linux, "sh", Arc::new(HeadlessWindow));
        let status = launcher.launch(dir.path(), "Funkin").await.unwrap();

        assert!(status.success());
        assert!(dir.path().join("ran.txt").is_file());
    }
}
