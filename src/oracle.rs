//! Prebuilt-distribution oracle
//!
//! Answers "is this request already installable without building?".
//! CPython requests are checked against the local tool cache first and
//! then against the upstream versions manifest for the current platform
//! and architecture. PyPy and GraalPy requests are resolved purely by
//! alias rules; they are never built from source here, so a successful
//! answer is just the manifest-style version string the delegate
//! installer understands.

use crate::error::{PyforgeError, PyforgeResult};
use crate::fetch;
use crate::toolcache::{ToolCache, TOOL_NAME};
use crate::version::{Interpreter, VersionRange, VersionRequest, VersionSpec};
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use tracing::{debug, info};

/// Upstream manifest of prebuilt CPython distributions
pub const DEFAULT_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/actions/python-versions/main/versions-manifest.json";

const DEFAULT_PYPY2: &str = "pypy2.7";
const DEFAULT_PYPY3: &str = "pypy3.10";
const DEFAULT_GRAALPY: &str = "graalpy24.1";

/// A positive oracle answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResolution {
    /// Version string the prebuilt installer understands
    pub version: String,
}

/// Query side of the prebuilt short-circuit
#[async_trait]
pub trait PrebuiltOracle: Send + Sync {
    /// Resolve `spec` to a prebuilt version, `None` when nothing
    /// prebuilt satisfies it.
    async fn resolve(
        &self,
        spec: &VersionSpec,
        arch: &str,
        allow_prereleases: bool,
        check_latest: bool,
    ) -> PyforgeResult<Option<OracleResolution>>;
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    version: String,
    #[serde(default)]
    files: Vec<ManifestFile>,
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    arch: String,
    platform: String,
}

/// Manifest-backed oracle with a local tool-cache fast path
pub struct ManifestOracle {
    manifest_url: String,
    tool_cache: ToolCache,
}

impl ManifestOracle {
    pub fn new(manifest_url: impl Into<String>, tool_cache: ToolCache) -> Self {
        Self {
            manifest_url: manifest_url.into(),
            tool_cache,
        }
    }

    fn resolve_pypy(remainder: &str) -> Option<String> {
        if remainder.is_empty() {
            return Some(DEFAULT_PYPY3.to_string());
        }
        let mut components = remainder.splitn(3, '.');
        let major: u64 = components.next()?.parse().ok()?;
        match components.next() {
            // bare major: only the lines with a known default alias
            None => match major {
                2 => Some(DEFAULT_PYPY2.to_string()),
                3 => Some(DEFAULT_PYPY3.to_string()),
                _ => None,
            },
            Some(minor) => {
                let minor: u64 = minor.parse().ok()?;
                Some(format!("pypy{major}.{minor}"))
            }
        }
    }

    fn resolve_graalpy(remainder: &str) -> Option<String> {
        if remainder.is_empty() {
            return Some(DEFAULT_GRAALPY.to_string());
        }
        Some(format!("graalpy{remainder}"))
    }

    async fn resolve_cpython(
        &self,
        range: &VersionRange,
        arch: &str,
        allow_prereleases: bool,
        check_latest: bool,
    ) -> PyforgeResult<Option<Version>> {
        if !check_latest {
            debug!("Checking local tool cache");
            if let Some((version, _)) = self.tool_cache.find(TOOL_NAME, range, arch) {
                debug!("CPython {version} found in local tool cache");
                return Ok(Some(version));
            }
        }

        debug!("Downloading manifest");
        let body = fetch::download_text(&self.manifest_url)?;
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(&body).map_err(|e| PyforgeError::Manifest(e.to_string()))?;
        debug!(
            "Checking manifest for range {range} and arch {arch} ({} entries)",
            entries.len()
        );

        if let Some(version) = match_manifest(&entries, range, arch, current_platform()) {
            return Ok(Some(version));
        }

        // A freshly cut minor often only exists as prereleases
        if allow_prereleases {
            if let Some((major, minor)) = range.minor_level() {
                debug!("Testing for prerelease versions");
                let prerelease = VersionRange::prerelease(major, minor);
                if let Some(version) =
                    match_manifest(&entries, &prerelease, arch, current_platform())
                {
                    info!("Range {range} resolved to prerelease {version}");
                    return Ok(Some(version));
                }
            }
        }
        debug!("Could not find a matching version in the manifest");
        Ok(None)
    }
}

#[async_trait]
impl PrebuiltOracle for ManifestOracle {
    async fn resolve(
        &self,
        spec: &VersionSpec,
        arch: &str,
        allow_prereleases: bool,
        check_latest: bool,
    ) -> PyforgeResult<Option<OracleResolution>> {
        match (&spec.interpreter, &spec.version) {
            (Interpreter::PyPy, VersionRequest::Opaque(remainder)) => {
                let resolved = Self::resolve_pypy(remainder);
                debug!("PyPy request resolved to {resolved:?}");
                Ok(resolved.map(|version| OracleResolution { version }))
            }
            (Interpreter::GraalPy, VersionRequest::Opaque(remainder)) => {
                let resolved = Self::resolve_graalpy(remainder);
                debug!("GraalPy request resolved to {resolved:?}");
                Ok(resolved.map(|version| OracleResolution { version }))
            }
            (Interpreter::CPython, VersionRequest::Range(range)) => {
                let resolved = self
                    .resolve_cpython(range, arch, allow_prereleases, check_latest)
                    .await?;
                Ok(resolved.map(|version| {
                    let mut version = version.to_string();
                    if spec.freethreaded {
                        version.push('t');
                    }
                    OracleResolution { version }
                }))
            }
            // parse() never produces the remaining combinations
            _ => Err(PyforgeError::Internal(format!(
                "inconsistent version spec: {spec:?}"
            ))),
        }
    }
}

/// Highest manifest version satisfying `range` with a file for this
/// arch and platform
fn match_manifest(
    entries: &[ManifestEntry],
    range: &VersionRange,
    arch: &str,
    platform: &str,
) -> Option<Version> {
    let mut best: Option<Version> = None;
    for entry in entries {
        let Ok(version) = Version::parse(&entry.version) else {
            continue;
        };
        if !range.matches(&version) {
            continue;
        }
        if !entry
            .files
            .iter()
            .any(|file| file.arch == arch && file.platform == platform)
        {
            continue;
        }
        match &best {
            Some(current) if version <= *current => {}
            _ => best = Some(version),
        }
    }
    best
}

/// Platform tag the manifest uses for the current OS
fn current_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        _ => "linux",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionSpec;

    fn manifest(entries: &[(&str, &[(&str, &str)])]) -> Vec<ManifestEntry> {
        entries
            .iter()
            .map(|(version, files)| ManifestEntry {
                version: version.to_string(),
                files: files
                    .iter()
                    .map(|(arch, platform)| ManifestFile {
                        arch: arch.to_string(),
                        platform: platform.to_string(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn range(input: &str) -> VersionRange {
        VersionSpec::parse(input, false)
            .unwrap()
            .range()
            .unwrap()
            .clone()
    }

    #[test]
    fn pypy_defaults() {
        assert_eq!(ManifestOracle::resolve_pypy(""), Some("pypy3.10".into()));
        assert_eq!(ManifestOracle::resolve_pypy("2"), Some("pypy2.7".into()));
        assert_eq!(ManifestOracle::resolve_pypy("3"), Some("pypy3.10".into()));
        assert_eq!(ManifestOracle::resolve_pypy("4"), None);
    }

    #[test]
    fn pypy_minor_and_patch_level() {
        assert_eq!(ManifestOracle::resolve_pypy("3.9"), Some("pypy3.9".into()));
        assert_eq!(
            ManifestOracle::resolve_pypy("3.9.16"),
            Some("pypy3.9".into())
        );
        assert_eq!(ManifestOracle::resolve_pypy("nonsense"), None);
    }

    #[test]
    fn graalpy_aliases() {
        assert_eq!(
            ManifestOracle::resolve_graalpy(""),
            Some("graalpy24.1".into())
        );
        assert_eq!(
            ManifestOracle::resolve_graalpy("23.0"),
            Some("graalpy23.0".into())
        );
    }

    #[test]
    fn manifest_match_picks_highest_for_platform() {
        let entries = manifest(&[
            ("3.9.13", &[("x64", "linux"), ("x64", "darwin")]),
            ("3.9.18", &[("x64", "linux")]),
            ("3.10.11", &[("x64", "linux")]),
        ]);
        let version = match_manifest(&entries, &range("3.9"), "x64", "linux").unwrap();
        assert_eq!(version, Version::new(3, 9, 18));
    }

    #[test]
    fn manifest_match_requires_arch_and_platform_file() {
        let entries = manifest(&[("3.9.18", &[("x64", "linux")])]);
        assert!(match_manifest(&entries, &range("3.9"), "arm64", "linux").is_none());
        assert!(match_manifest(&entries, &range("3.9"), "x64", "darwin").is_none());
    }

    #[test]
    fn manifest_miss_is_none() {
        let entries = manifest(&[("3.9.18", &[("x64", "linux")])]);
        assert!(match_manifest(&entries, &range("3.6"), "x64", "linux").is_none());
    }

    #[test]
    fn prerelease_entries_need_prerelease_range() {
        let entries = manifest(&[("3.14.0-rc.2", &[("x64", "linux")])]);
        assert!(match_manifest(&entries, &range("3.14"), "x64", "linux").is_none());
        let prerelease = VersionRange::prerelease(3, 14);
        assert_eq!(
            match_manifest(&entries, &prerelease, "x64", "linux").unwrap(),
            Version::parse("3.14.0-rc.2").unwrap()
        );
    }

    #[tokio::test]
    async fn tool_cache_hit_short_circuits_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        let source = tmp.path().join("built");
        std::fs::create_dir_all(&source).unwrap();
        cache
            .register(&source, TOOL_NAME, &Version::new(3, 9, 1), "x64")
            .unwrap();

        // Unreachable manifest URL proves the cache answered first
        let oracle = ManifestOracle::new("http://127.0.0.1:1/manifest.json", cache);
        let spec = VersionSpec::parse("3.9", false).unwrap();
        let resolution = oracle.resolve(&spec, "x64", false, false).await.unwrap();
        assert_eq!(resolution.unwrap().version, "3.9.1");
    }

    #[tokio::test]
    async fn check_latest_bypasses_tool_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        let source = tmp.path().join("built");
        std::fs::create_dir_all(&source).unwrap();
        cache
            .register(&source, TOOL_NAME, &Version::new(3, 9, 1), "x64")
            .unwrap();

        let oracle = ManifestOracle::new("http://127.0.0.1:1/manifest.json", cache);
        let spec = VersionSpec::parse("3.9", false).unwrap();
        let result = oracle.resolve(&spec, "x64", false, true).await;
        assert!(matches!(result, Err(PyforgeError::Download { .. })));
    }

    #[tokio::test]
    async fn pypy_never_touches_network_or_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let oracle = ManifestOracle::new(
            "http://127.0.0.1:1/manifest.json",
            ToolCache::new(tmp.path().join("toolcache")),
        );
        let spec = VersionSpec::parse("pypy3.9", false).unwrap();
        let resolution = oracle.resolve(&spec, "x64", false, false).await.unwrap();
        assert_eq!(resolution.unwrap().version, "pypy3.9");
    }

    #[tokio::test]
    async fn freethreaded_suffix_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        let source = tmp.path().join("built");
        std::fs::create_dir_all(&source).unwrap();
        cache
            .register(&source, TOOL_NAME, &Version::new(3, 13, 1), "x64")
            .unwrap();

        let oracle = ManifestOracle::new("http://127.0.0.1:1/manifest.json", cache);
        let spec = VersionSpec::parse("3.13", true).unwrap();
        let resolution = oracle.resolve(&spec, "x64", false, false).await.unwrap();
        assert_eq!(resolution.unwrap().version, "3.13.1t");
    }
}
