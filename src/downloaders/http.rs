//! HTTP client with manual redirect handling, stall detection and progress tracking
//!
//! Redirects are followed by hand rather than by reqwest so that every hop
//! restarts the destination file from scratch and the chain length is capped.

use futures::StreamExt;
use reqwest::header::LOCATION;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Maximum number of redirects followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Connection timeout: time to establish TCP connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read timeout: maximum time to wait for data between chunks
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Stall detection: fail if no chunk arrives for this duration
pub const STALL_TIMEOUT: Duration = Duration::from_secs(180);

/// Overall ceiling for a single request. Engine builds are a few hundred MB
/// at most; stall detection catches dead links long before this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// How often to invoke the progress callback (in milliseconds)
const CALLBACK_INTERVAL_MS: u128 = 100;

/// Errors from a single download
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Server answered with something other than 200 or a followable redirect
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Too many redirects (more than {max}) starting at {url}")]
    TooManyRedirects { url: String, max: usize },

    #[error("Stalled: no data for {secs}s from {url}")]
    Stalled { url: String, secs: u64 },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// HTTP status that ended the download, if that is what happened
    pub fn status(&self) -> Option<u16> {
        match self {
            DownloadError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 404 and 500 mean the build is missing upstream (GitHub answers 500 for
    /// some missing release assets), so another platform's build may be tried
    pub fn is_missing_build(&self) -> bool {
        matches!(self.status(), Some(404) | Some(500))
    }
}

/// Global HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    stall_timeout: Duration,
}

impl HttpClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_timeouts(CONNECT_TIMEOUT, READ_TIMEOUT, STALL_TIMEOUT)
    }

    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
        stall_timeout: Duration,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = reqwest::Client::builder()
            .user_agent(concat!("genesis-launcher/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            stall_timeout,
        })
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

/// Snapshot of an in-flight transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    /// URL currently being read (the last hop of a redirect chain)
    pub url: String,
    pub received_bytes: u64,
    /// `None` when the server sent no usable `Content-Length`
    pub total_bytes: Option<u64>,
}

impl TransferProgress {
    /// 0..=100, or 0 when the total is unknown
    pub fn percent(&self) -> f64 {
        match self.total_bytes {
            Some(total) if total > 0 => self.received_bytes as f64 / total as f64 * 100.0,
            _ => 0.0,
        }
    }
}

/// Progress callback type for UI updates
pub type ProgressCallback = Box<dyn Fn(&TransferProgress) + Send + Sync>;

/// Download a file without progress reporting
pub async fn download_file(
    client: &HttpClient,
    url: &str,
    output_path: &Path,
) -> Result<u64, DownloadError> {
    download_file_with_callback(client, url, output_path, None).await
}

/// Stream `url` into `output_path`, following redirects
///
/// The destination is (re)created before each request and removed on every
/// failure path, so a failed or redirected attempt never leaves a partial
/// file behind. Returns the number of bytes written.
pub async fn download_file_with_callback(
    client: &HttpClient,
    url: &str,
    output_path: &Path,
    progress_callback: Option<&ProgressCallback>,
) -> Result<u64, DownloadError> {
    let mut current_url = url.to_string();

    for hop in 0..=MAX_REDIRECTS {
        let mut file = File::create(output_path)
            .await
            .map_err(|source| DownloadError::Io {
                path: output_path.to_path_buf(),
                source,
            })?;

        let response = match client.inner().get(&current_url).send().await {
            Ok(resp) => resp,
            Err(source) => {
                drop(file);
                remove_partial(output_path).await;
                return Err(DownloadError::Request {
                    url: current_url,
                    source,
                });
            }
        };

        let status = response.status();

        if status.is_redirection() {
            if let Some(next) = redirect_target(&response) {
                drop(file);
                remove_partial(output_path).await;
                debug!("Redirect {} ({}): {} -> {}", hop + 1, status.as_u16(), current_url, next);
                current_url = next;
                continue;
            }
        }

        if status != StatusCode::OK {
            drop(file);
            remove_partial(output_path).await;
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: current_url,
            });
        }

        let result = stream_body(
            response,
            &mut file,
            &current_url,
            output_path,
            client.stall_timeout,
            progress_callback,
        )
        .await;
        drop(file);

        if result.is_err() {
            remove_partial(output_path).await;
        }
        return result;
    }

    remove_partial(output_path).await;
    Err(DownloadError::TooManyRedirects {
        url: url.to_string(),
        max: MAX_REDIRECTS,
    })
}

/// Resolve the `Location` header against the response URL
fn redirect_target(response: &reqwest::Response) -> Option<String> {
    let location = response.headers().get(LOCATION)?.to_str().ok()?;
    match response.url().join(location) {
        Ok(next) => Some(next.to_string()),
        Err(e) => {
            warn!("Ignoring invalid redirect location {:?}: {}", location, e);
            None
        }
    }
}

async fn stream_body(
    response: reqwest::Response,
    file: &mut File,
    url: &str,
    output_path: &Path,
    stall_timeout: Duration,
    progress_callback: Option<&ProgressCallback>,
) -> Result<u64, DownloadError> {
    let io_err = |source| DownloadError::Io {
        path: output_path.to_path_buf(),
        source,
    };

    let mut progress = TransferProgress {
        url: url.to_string(),
        received_bytes: 0,
        total_bytes: response.content_length().filter(|&len| len > 0),
    };

    let mut last_callback_time = Instant::now();
    let mut stream = response.bytes_stream();

    loop {
        let next = match tokio::time::timeout(stall_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!("Download stalled - no data for {:?}: {}", stall_timeout, url);
                return Err(DownloadError::Stalled {
                    url: url.to_string(),
                    secs: stall_timeout.as_secs(),
                });
            }
        };

        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|source| DownloadError::Request {
            url: url.to_string(),
            source,
        })?;

        file.write_all(&chunk).await.map_err(io_err)?;
        progress.received_bytes += chunk.len() as u64;

        if let Some(callback) = progress_callback {
            let now = Instant::now();
            if now.duration_since(last_callback_time).as_millis() >= CALLBACK_INTERVAL_MS {
                callback(&progress);
                last_callback_time = now;
            }
        }
    }

    file.flush().await.map_err(io_err)?;

    if let Some(callback) = progress_callback {
        callback(&progress);
    }

    debug!("Downloaded {} bytes from {}", progress.received_bytes, url);
    Ok(progress.received_bytes)
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial file {}: {}", path.display(), e);
        }
    }
}
