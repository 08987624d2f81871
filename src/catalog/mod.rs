//! CPython tag catalog
//!
//! A flat list of `{version, zipBall, installer}` records describing the
//! upstream project's historical release tags. The catalog is vendored
//! as JSON (`data/tags.json`) and maintained out-of-band by polling the
//! upstream repository; `refresh` re-fetches it at the user's request.
//!
//! Tags whose names are not valid semver once the leading `v` is
//! stripped (alpha/beta/rc tags use CPython's own suffix syntax) are
//! skipped at load time. Duplicates by normalized version collapse to
//! the first record seen.

pub mod resolver;

pub use resolver::{resolve_tag, ResolvedBuild};

use crate::error::{PyforgeError, PyforgeResult};
use semver::Version;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The vendored catalog, generated by the maintenance workflow
const BUNDLED_TAGS: &str = include_str!("../../data/tags.json");

/// Where `refresh` fetches the current catalog from
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/pyforge-dev/pyforge/main/data/tags.json";

const REFRESH_ATTEMPTS: u32 = 4;
const REFRESH_BACKOFF: Duration = Duration::from_secs(30);

/// One historical release of CPython
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Normalized exact version
    pub version: Version,
    /// Source zipball for this tag
    pub zipball_url: String,
    /// Whether python.org ships a prebuilt installer for this release
    pub has_installer: bool,
}

/// Raw record shape of the generated tags file
#[derive(Debug, Deserialize)]
struct RawTag {
    version: String,
    #[serde(rename = "zipBall")]
    zipball: String,
    installer: bool,
}

/// The set of known release tags, keyed by normalized version
#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    tags: Vec<Tag>,
}

impl TagCatalog {
    /// Load the vendored catalog shipped with the binary
    pub fn bundled() -> PyforgeResult<Self> {
        Self::from_json(BUNDLED_TAGS)
    }

    /// Parse a catalog from its JSON representation
    pub fn from_json(json: &str) -> PyforgeResult<Self> {
        let raw: Vec<RawTag> = serde_json::from_str(json)?;
        let mut seen = HashSet::new();
        let mut tags = Vec::new();
        for record in raw {
            let name = record.version.strip_prefix('v').unwrap_or(&record.version);
            let Ok(version) = Version::parse(name) else {
                debug!("Skipping non-semver tag {}", record.version);
                continue;
            };
            // first-seen wins
            if !seen.insert(version.clone()) {
                continue;
            }
            tags.push(Tag {
                version,
                zipball_url: record.zipball,
                has_installer: record.installer,
            });
        }
        debug!("Loaded {} catalog tags", tags.len());
        Ok(Self { tags })
    }

    /// Load a catalog from a file on disk
    pub fn from_file(path: &Path) -> PyforgeResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PyforgeError::io(format!("reading catalog from {}", path.display()), e))?;
        Self::from_json(&content)
    }

    /// Fetch the current catalog from `url`, backing off on transient
    /// rate-limit responses.
    pub fn refresh(url: &str) -> PyforgeResult<Self> {
        let mut last_error = String::new();
        for attempt in 1..=REFRESH_ATTEMPTS {
            match ureq::get(url).call() {
                Ok(mut response) => {
                    let body = response
                        .body_mut()
                        .read_to_string()
                        .map_err(|e| PyforgeError::download(url, e.to_string()))?;
                    info!("Catalog refreshed from {url}");
                    return Self::from_json(&body);
                }
                Err(ureq::Error::StatusCode(code)) if code == 403 || code == 429 => {
                    warn!("Rate limited fetching catalog (HTTP {code}). Retrying in {}s...",
                        REFRESH_BACKOFF.as_secs());
                    last_error = format!("HTTP {code}");
                    if attempt < REFRESH_ATTEMPTS {
                        std::thread::sleep(REFRESH_BACKOFF);
                    }
                }
                Err(e) => return Err(PyforgeError::download(url, e.to_string())),
            }
        }
        Err(PyforgeError::download(url, last_error))
    }

    /// All known tags
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
