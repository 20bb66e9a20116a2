//! Archive handling
//!
//! Engine builds ship as ZIP archives. Extraction overwrites whatever is
//! already in the destination, so re-extracting over a broken install
//! repairs it in place.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Errors while unpacking a build archive
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Failed to open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt or unsupported archive {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract every entry of `archive_path` into `output_dir`, then delete the archive
///
/// On failure the archive and whatever was already written are left alone.
/// Returns the number of files written.
pub fn extract_archive(archive_path: &Path, output_dir: &Path) -> Result<usize, ArchiveError> {
    let written = extract_zip_to_dir(archive_path, output_dir)?;

    if let Err(e) = fs::remove_file(archive_path) {
        warn!("Failed to remove archive {}: {}", archive_path.display(), e);
    }

    info!(
        "Extracted {} files from {} into {}",
        written,
        archive_path.display(),
        output_dir.display()
    );
    Ok(written)
}

fn extract_zip_to_dir(archive_path: &Path, output_dir: &Path) -> Result<usize, ArchiveError> {
    let zip_err = |source| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(|source| ArchiveError::Open {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;

    fs::create_dir_all(output_dir).map_err(|source| ArchiveError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(zip_err)?;

        // Absolute paths and `..` components would land outside output_dir
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let out_path = output_dir.join(relative);
        let io_err = |source| ArchiveError::Io {
            path: out_path.clone(),
            source,
        };

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_err)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut output = File::create(&out_path).map_err(io_err)?;
        io::copy(&mut entry, &mut output).map_err(io_err)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            // Keep only permission bits; file type bits are meaningless here
            let perms = fs::Permissions::from_mode(mode & 0o7777);
            if let Err(e) = fs::set_permissions(&out_path, perms) {
                debug!("Could not restore mode on {}: {}", out_path.display(), e);
            }
        }

        written += 1;
    }

    Ok(written)
}

/// Build a ZIP file from `(name, contents)` pairs
#[cfg(test)]
pub(crate) fn write_test_zip(path: &Path, entries: &[(&str, &[u8])]) {
    use std::io::Write;

    let file = File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}
