//! Content-addressed build cache
//!
//! Finished builds are stored as gzip tarballs under
//! `<cache-root>/<key>/` together with a `meta.json` recording the
//! original absolute payload locations and their digests. Restore puts
//! every payload back where it was archived from, so the builder's
//! deterministic work directory sees the same tree a fresh build would
//! have produced.
//!
//! Backend unavailability (root not writable) and cache misses are
//! reported as `Ok(None)` / no-ops, never as failures; corrupted
//! entries are a [`PyforgeError::CacheBackend`] error so the caller can
//! distinguish them from a miss.

use crate::error::{PyforgeError, PyforgeResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Storage backend for build payloads
pub trait CacheBackend: Send + Sync {
    /// Whether the backend can be used at all
    fn is_available(&self) -> bool;

    /// Restore the payloads saved under `key`.
    ///
    /// Returns the matched key on a hit, `None` on a miss or when the
    /// backend is unavailable.
    fn restore(&self, key: &str) -> PyforgeResult<Option<String>>;

    /// Persist `paths` under `key`. No-op when the backend is
    /// unavailable.
    fn save(&self, paths: &[PathBuf], key: &str) -> PyforgeResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    key: String,
    payloads: Vec<PayloadMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PayloadMeta {
    /// Absolute path the payload was archived from
    source: String,
    /// Archive file name within the entry directory
    archive: String,
    /// Hex sha256 of the archive
    digest: String,
}

/// Cache backend storing entries under a local directory
#[derive(Debug, Clone)]
pub struct LocalCacheBackend {
    root: PathBuf,
}

impl LocalCacheBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn backend_err(context: &str, e: impl std::fmt::Display) -> PyforgeError {
        PyforgeError::CacheBackend(format!("{context}: {e}"))
    }
}

fn sha256_file(path: &Path) -> PyforgeResult<String> {
    let mut file = File::open(path)
        .map_err(|e| LocalCacheBackend::backend_err("opening payload", e))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| LocalCacheBackend::backend_err("hashing payload", e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

impl CacheBackend for LocalCacheBackend {
    fn is_available(&self) -> bool {
        std::fs::create_dir_all(&self.root).is_ok()
    }

    fn restore(&self, key: &str) -> PyforgeResult<Option<String>> {
        if !self.is_available() {
            info!("Build cache backend is not available");
            return Ok(None);
        }
        let entry = self.entry_dir(key);
        let meta_path = entry.join("meta.json");
        if !meta_path.exists() {
            debug!("Cache miss for key {key}");
            return Ok(None);
        }
        let meta: CacheMeta = serde_json::from_str(
            &std::fs::read_to_string(&meta_path)
                .map_err(|e| Self::backend_err("reading cache metadata", e))?,
        )
        .map_err(|e| Self::backend_err("parsing cache metadata", e))?;

        // An entry with missing payloads is a miss, not an error; one
        // with corrupted payloads is an error.
        for payload in &meta.payloads {
            if !entry.join(&payload.archive).exists() {
                warn!("Cache entry {key} is incomplete. Treating as miss");
                return Ok(None);
            }
        }
        for payload in &meta.payloads {
            let archive = entry.join(&payload.archive);
            let digest = sha256_file(&archive)?;
            if digest != payload.digest {
                return Err(Self::backend_err(
                    "cache entry corrupted",
                    format!("digest mismatch for {}", payload.archive),
                ));
            }
            let source = PathBuf::from(&payload.source);
            let parent = source
                .parent()
                .ok_or_else(|| Self::backend_err("restoring payload", "path has no parent"))?;
            std::fs::create_dir_all(parent)
                .map_err(|e| Self::backend_err("restoring payload", e))?;
            let file = File::open(&archive)
                .map_err(|e| Self::backend_err("opening payload", e))?;
            let mut tar = tar::Archive::new(GzDecoder::new(file));
            tar.unpack(parent)
                .map_err(|e| Self::backend_err("unpacking payload", e))?;
        }
        info!("Restored {} payload(s) for key {key}", meta.payloads.len());
        Ok(Some(meta.key))
    }

    fn save(&self, paths: &[PathBuf], key: &str) -> PyforgeResult<()> {
        if !self.is_available() {
            info!("Build cache backend is not available");
            return Ok(());
        }
        let entry = self.entry_dir(key);
        if entry.exists() {
            std::fs::remove_dir_all(&entry)
                .map_err(|e| Self::backend_err("clearing cache entry", e))?;
        }
        std::fs::create_dir_all(&entry)
            .map_err(|e| Self::backend_err("creating cache entry", e))?;

        let mut payloads = Vec::new();
        for (index, path) in paths.iter().enumerate() {
            let name = path
                .file_name()
                .ok_or_else(|| Self::backend_err("saving payload", "path has no file name"))?
                .to_string_lossy()
                .into_owned();
            let archive_name = format!("payload-{index}.tar.gz");
            let archive = entry.join(&archive_name);
            let file = File::create(&archive)
                .map_err(|e| Self::backend_err("creating payload", e))?;
            let encoder = GzEncoder::new(file, Compression::default());
            let mut tar = tar::Builder::new(encoder);
            tar.follow_symlinks(false);
            tar.append_dir_all(&name, path)
                .map_err(|e| Self::backend_err("archiving payload", e))?;
            tar.into_inner()
                .and_then(|encoder| encoder.finish())
                .map_err(|e| Self::backend_err("finishing payload", e))?;
            payloads.push(PayloadMeta {
                source: path.to_string_lossy().into_owned(),
                archive: archive_name,
                digest: sha256_file(&archive)?,
            });
        }

        let meta = CacheMeta {
            key: key.to_string(),
            payloads,
        };
        std::fs::write(
            entry.join("meta.json"),
            serde_json::to_string_pretty(&meta)?,
        )
        .map_err(|e| Self::backend_err("writing cache metadata", e))?;
        info!("Saved {} payload(s) under key {key}", paths.len());
        Ok(())
    }
}
