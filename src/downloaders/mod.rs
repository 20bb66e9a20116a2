//! Download handlers
//!
//! Engine builds are plain HTTP(S) archives, usually GitHub release assets
//! behind one or more redirects.

pub mod http;

pub use http::{
    download_file, download_file_with_callback, DownloadError, HttpClient, ProgressCallback,
    TransferProgress,
};
