//! Download and archive-extraction collaborator
//!
//! Network I/O is intentionally simple and blocking: the tool performs
//! one resolution and at most one build per invocation, with no
//! parallel fan-out.

use crate::error::{PyforgeError, PyforgeResult};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Download `url` to `dest`. Returns `dest` on success.
pub fn download(url: &str, dest: &Path) -> PyforgeResult<PathBuf> {
    info!("Downloading {url}");
    let mut response = ureq::get(url)
        .call()
        .map_err(|e| PyforgeError::download(url, e.to_string()))?;

    let total: Option<u64> = response
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let progress = match total {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::with_template("{bar:30} {bytes}/{total_bytes} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PyforgeError::io(format!("creating {}", parent.display()), e))?;
    }
    let file = File::create(dest)
        .map_err(|e| PyforgeError::io(format!("creating {}", dest.display()), e))?;
    let mut writer = BufWriter::new(file);

    let mut reader = response.body_mut().as_reader();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| PyforgeError::download(url, e.to_string()))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|e| PyforgeError::io(format!("writing {}", dest.display()), e))?;
        progress.inc(read as u64);
    }
    writer
        .flush()
        .map_err(|e| PyforgeError::io(format!("flushing {}", dest.display()), e))?;
    progress.finish_and_clear();

    debug!("Downloaded to {}", dest.display());
    Ok(dest.to_path_buf())
}

/// Fetch a small text resource (manifests, catalogs)
pub fn download_text(url: &str) -> PyforgeResult<String> {
    debug!("Fetching {url}");
    let mut response = ureq::get(url)
        .call()
        .map_err(|e| PyforgeError::download(url, e.to_string()))?;
    response
        .body_mut()
        .read_to_string()
        .map_err(|e| PyforgeError::download(url, e.to_string()))
}

/// Extract a zip archive into `dest`, returning `dest`
pub fn extract_zip(archive: &Path, dest: &Path) -> PyforgeResult<PathBuf> {
    debug!("Extracting {} to {}", archive.display(), dest.display());
    let file = File::open(archive)
        .map_err(|e| PyforgeError::io(format!("opening {}", archive.display()), e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| PyforgeError::Extract {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::create_dir_all(dest)
        .map_err(|e| PyforgeError::io(format!("creating {}", dest.display()), e))?;
    zip.extract(dest).map_err(|e| PyforgeError::Extract {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(dest.to_path_buf())
}

/// Extract a gzip tarball into `dest`, returning `dest`
pub fn extract_tarball(archive: &Path, dest: &Path) -> PyforgeResult<PathBuf> {
    debug!("Extracting {} to {}", archive.display(), dest.display());
    let file = File::open(archive)
        .map_err(|e| PyforgeError::io(format!("opening {}", archive.display()), e))?;
    std::fs::create_dir_all(dest)
        .map_err(|e| PyforgeError::io(format!("creating {}", dest.display()), e))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest).map_err(|e| PyforgeError::Extract {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn extract_zip_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("src.zip");

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::FileOptions::default();
            writer.add_directory("python-cpython-abc123/", options).unwrap();
            writer
                .start_file("python-cpython-abc123/configure", options)
                .unwrap();
            writer.write_all(b"#!/bin/sh\n").unwrap();
            writer.finish().unwrap();
        }
        std::fs::write(&archive_path, cursor.into_inner()).unwrap();

        let out = extract_zip(&archive_path, &dir.path().join("out")).unwrap();
        assert!(out.join("python-cpython-abc123/configure").exists());
    }

    #[test]
    fn extract_missing_zip_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_zip(&dir.path().join("missing.zip"), dir.path());
        assert!(matches!(result, Err(PyforgeError::Io { .. })));
    }

    #[test]
    fn extract_tarball_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("payload.tar.gz");

        let payload = dir.path().join("payload");
        std::fs::create_dir_all(payload.join("bin")).unwrap();
        std::fs::write(payload.join("bin/python3.9"), b"elf").unwrap();

        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut tar = tar::Builder::new(encoder);
        tar.append_dir_all("payload", &payload).unwrap();
        tar.into_inner().unwrap().finish().unwrap();

        let out = extract_tarball(&archive_path, &dir.path().join("restored")).unwrap();
        assert!(out.join("payload/bin/python3.9").exists());
    }

    #[test]
    fn download_bad_url_is_download_error() {
        let result = download_text("http://127.0.0.1:1/manifest.json");
        assert!(matches!(result, Err(PyforgeError::Download { .. })));
    }
}
