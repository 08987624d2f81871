//! Tag selection
//!
//! Picks the single best catalog tag satisfying a version range. When
//! `prefer_installer` is set and any satisfying tag carries a prebuilt
//! installer, only installer-bearing tags are eligible; otherwise every
//! satisfying tag is. Within the eligible set the highest version wins.
//!
//! The preference models platforms (Windows) that can only acquire an
//! interpreter efficiently via an official installer: without it, a
//! stale source-only tag could shadow a well-tested installer release
//! in the same version family.

use crate::catalog::{Tag, TagCatalog};
use crate::version::VersionRange;
use semver::Version;
use tracing::debug;

/// A concrete, buildable release picked from the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBuild {
    /// Exact version of the selected tag
    pub version: Version,
    /// Source zipball for the selected tag
    pub zipball_url: String,
    /// Target architecture the build is for
    pub arch: String,
}

/// Resolve `range` against the catalog.
///
/// Returns `None` when no tag satisfies the range; the caller must treat
/// that as "cannot build", not as an error.
pub fn resolve_tag<'a>(
    catalog: &'a TagCatalog,
    range: &VersionRange,
    prefer_installer: bool,
) -> Option<&'a Tag> {
    let candidates: Vec<&Tag> = catalog
        .tags()
        .iter()
        .filter(|tag| range.matches(&tag.version))
        .collect();

    if candidates.is_empty() {
        debug!("No catalog tag satisfies {range}");
        return None;
    }

    let installer_only = prefer_installer && candidates.iter().any(|tag| tag.has_installer);
    let mut best: Option<&Tag> = None;
    for tag in candidates {
        if installer_only && !tag.has_installer {
            continue;
        }
        match best {
            Some(current) if tag.version <= current.version => {}
            _ => best = Some(tag),
        }
    }
    if let Some(tag) = best {
        debug!("Range {range} resolved to tag {}", tag.version);
    }
    best
}

impl ResolvedBuild {
    /// Bind a selected tag to a target architecture
    pub fn new(tag: &Tag, arch: impl Into<String>) -> Self {
        Self {
            version: tag.version.clone(),
            zipball_url: tag.zipball_url.clone(),
            arch: arch.into(),
        }
    }
}
