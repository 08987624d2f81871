//! Version-string parsing and normalization
//!
//! Turns free-form user input ("3", "3.9", "3.8.x", "3.2.5", "3.14-dev",
//! "pypy3.9") into a [`VersionSpec`]: an interpreter tag plus either a
//! normalized semver range (CPython) or an opaque version string
//! (alternate interpreters, which are resolved by the prebuilt manifest
//! and never built from source).

use crate::error::{PyforgeError, PyforgeResult};
use semver::{Version, VersionReq};
use std::fmt;
use tracing::debug;

/// Python interpreter implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    CPython,
    PyPy,
    GraalPy,
}

impl Interpreter {
    /// The marker substring that selects this interpreter in user input
    pub fn marker(&self) -> &'static str {
        match self {
            Interpreter::CPython => "",
            Interpreter::PyPy => "pypy",
            Interpreter::GraalPy => "graalpy",
        }
    }

    /// Display name used in messages and cache keys
    pub fn name(&self) -> &'static str {
        match self {
            Interpreter::CPython => "CPython",
            Interpreter::PyPy => "PyPy",
            Interpreter::GraalPy => "GraalPy",
        }
    }
}

impl fmt::Display for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Structural classification of a normalized CPython range.
///
/// The structured form is what later stages key their threshold logic on
/// (e.g. the prerelease retry only applies to minor-level ranges).
#[derive(Debug, Clone, PartialEq, Eq)]
enum RangeKind {
    /// "" or "x": any version
    Any,
    /// "3": the whole major
    Major(u64),
    /// "3.9": the whole minor
    Minor(u64, u64),
    /// "3.2.5": kept exact, not widened
    Exact(Version),
    /// "3.14-dev": prereleases of an unreleased minor
    Prerelease(u64, u64),
    /// Input that was already a range expression; passed through
    Raw,
}

/// A normalized semantic-version range for CPython
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    kind: RangeKind,
    req: VersionReq,
}

impl VersionRange {
    /// The wildcard range matching any version
    pub fn any() -> Self {
        Self {
            kind: RangeKind::Any,
            req: VersionReq::STAR,
        }
    }

    fn major(major: u64) -> Self {
        let req = VersionReq::parse(&format!(">={major}.0.0, <{}.0.0-0", major + 1))
            .expect("major range is always valid");
        Self {
            kind: RangeKind::Major(major),
            req,
        }
    }

    fn minor(major: u64, minor: u64) -> Self {
        let req = VersionReq::parse(&format!(">={major}.{minor}.0, <{major}.{}.0-0", minor + 1))
            .expect("minor range is always valid");
        Self {
            kind: RangeKind::Minor(major, minor),
            req,
        }
    }

    fn exact(version: Version) -> Self {
        let req = VersionReq::parse(&format!("={version}")).expect("exact range is always valid");
        Self {
            kind: RangeKind::Exact(version),
            req,
        }
    }

    /// Prerelease range anchored at `major.minor.0-0`.
    ///
    /// Under the `semver` crate's matching rules a prerelease version only
    /// matches a range that mentions a prerelease on the same triple, so
    /// the `-0` anchors are what let `3.14.0-rc.2` match here.
    pub fn prerelease(major: u64, minor: u64) -> Self {
        let req = VersionReq::parse(&format!(
            ">={major}.{minor}.0-0, <{major}.{}.0-0",
            minor + 1
        ))
        .expect("prerelease range is always valid");
        Self {
            kind: RangeKind::Prerelease(major, minor),
            req,
        }
    }

    fn raw(req: VersionReq) -> Self {
        Self {
            kind: RangeKind::Raw,
            req,
        }
    }

    /// Whether `version` satisfies this range
    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }

    /// For a minor-level range ("3.9"), the `(major, minor)` pair.
    ///
    /// Exact versions and wider ranges return `None`; the prerelease
    /// retry in the oracle only makes sense at minor granularity.
    pub fn minor_level(&self) -> Option<(u64, u64)> {
        match self.kind {
            RangeKind::Minor(major, minor) => Some((major, minor)),
            _ => None,
        }
    }

    /// For an exact request, the pinned version
    pub fn exact_version(&self) -> Option<&Version> {
        match &self.kind {
            RangeKind::Exact(version) => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RangeKind::Any => write!(f, "*"),
            RangeKind::Exact(version) => write!(f, "{version}"),
            _ => write!(f, "{}", self.req),
        }
    }
}

/// The version portion of a parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// A normalized semver range; only ever produced for CPython
    Range(VersionRange),
    /// Verbatim (lowercased, trimmed) remainder for alternate
    /// interpreters; never coerced into semver
    Opaque(String),
}

/// A parsed, immutable version request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    pub interpreter: Interpreter,
    pub version: VersionRequest,
    pub freethreaded: bool,
}

impl VersionSpec {
    /// Parse a free-form version string.
    ///
    /// Fails with [`PyforgeError::InvalidVersion`] when, after
    /// normalization, the remaining string is not a valid semver version
    /// or range. An empty input defaults to the full wildcard range.
    pub fn parse(raw: &str, freethreaded: bool) -> PyforgeResult<Self> {
        debug!("Parsing version string \"{raw}\"");
        let input = raw.to_lowercase().trim().to_string();

        for interpreter in [Interpreter::PyPy, Interpreter::GraalPy] {
            if input.contains(interpreter.marker()) {
                // Only the separator between marker and version is
                // dropped; dashes inside the version ("3.10-v7.3") stay.
                let remainder = input.replace(interpreter.marker(), "");
                let remainder = remainder
                    .strip_prefix('-')
                    .unwrap_or(&remainder)
                    .trim()
                    .to_string();
                debug!("Interpreter {interpreter}, opaque version \"{remainder}\"");
                return Ok(Self {
                    interpreter,
                    version: VersionRequest::Opaque(remainder),
                    // The freethreaded variant only exists for CPython
                    freethreaded: false,
                });
            }
        }

        let input = input.strip_prefix('v').unwrap_or(&input).to_string();
        let range = normalize_range(&input).ok_or_else(|| PyforgeError::InvalidVersion {
            raw: raw.to_string(),
        })?;
        debug!("Normalized range: {range}");

        Ok(Self {
            interpreter: Interpreter::CPython,
            version: VersionRequest::Range(range),
            freethreaded,
        })
    }

    /// The normalized CPython range, if this is a CPython request
    pub fn range(&self) -> Option<&VersionRange> {
        match &self.version {
            VersionRequest::Range(range) => Some(range),
            VersionRequest::Opaque(_) => None,
        }
    }

    /// How the request reads back to the user (e.g. "pypy3.9", "3.9")
    pub fn display_request(&self) -> String {
        match &self.version {
            VersionRequest::Range(range) => range.to_string(),
            VersionRequest::Opaque(version) => {
                format!("{}{version}", self.interpreter.marker())
            }
        }
    }
}

/// Expand shorthand into a normalized range. Returns `None` on input
/// that is not valid semver after expansion.
fn normalize_range(input: &str) -> Option<VersionRange> {
    if input.is_empty() {
        return Some(VersionRange::any());
    }

    // Already a range expression: validate and pass through untouched so
    // re-parsing normalized output is a no-op.
    if input
        .chars()
        .any(|c| matches!(c, '<' | '>' | '=' | '~' | '^' | ','))
    {
        return VersionReq::parse(input).ok().map(VersionRange::raw);
    }

    if let Some(prefix) = input.strip_suffix("-dev") {
        let (major, minor) = parse_major_minor(prefix)?;
        return Some(VersionRange::prerelease(major, minor));
    }

    let components: Vec<&str> = input.splitn(3, '.').collect();
    match components.as_slice() {
        [one] => {
            if is_wildcard(one) {
                Some(VersionRange::any())
            } else {
                Some(VersionRange::major(one.parse().ok()?))
            }
        }
        [major, minor] => {
            let major = major.parse().ok()?;
            if is_wildcard(minor) {
                Some(VersionRange::major(major))
            } else {
                Some(VersionRange::minor(major, minor.parse().ok()?))
            }
        }
        [major, minor, patch] => {
            if is_wildcard(patch) {
                if is_wildcard(minor) {
                    Some(VersionRange::major(major.parse().ok()?))
                } else {
                    Some(VersionRange::minor(major.parse().ok()?, minor.parse().ok()?))
                }
            } else {
                Version::parse(input).ok().map(VersionRange::exact)
            }
        }
        _ => None,
    }
}

fn parse_major_minor(input: &str) -> Option<(u64, u64)> {
    let (major, minor) = input.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

fn is_wildcard(component: &str) -> bool {
    matches!(component, "x" | "*")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range_of(input: &str) -> String {
        VersionSpec::parse(input, false)
            .unwrap()
            .range()
            .unwrap()
            .to_string()
    }

    #[test]
    fn bare_major_expands_to_whole_major() {
        assert_eq!(range_of("3"), ">=3.0.0, <4.0.0-0");
    }

    #[test]
    fn major_minor_expands_to_whole_minor() {
        assert_eq!(range_of("3.9"), ">=3.9.0, <3.10.0-0");
    }

    #[test]
    fn wildcard_patch_expands_to_whole_minor() {
        assert_eq!(range_of("3.8.x"), ">=3.8.0, <3.9.0-0");
        assert_eq!(range_of("3.8.X"), ">=3.8.0, <3.9.0-0");
    }

    #[test]
    fn wildcard_minor_and_patch_expands_to_major() {
        assert_eq!(range_of("3.x.x"), ">=3.0.0, <4.0.0-0");
        assert_eq!(range_of("3.*.*"), ">=3.0.0, <4.0.0-0");
    }

    #[test]
    fn wildcard_minor_with_concrete_patch_rejected() {
        assert!(VersionSpec::parse("3.x.5", false).is_err());
    }

    #[test]
    fn full_triple_kept_exact() {
        assert_eq!(range_of("3.2.5"), "3.2.5");
    }

    #[test]
    fn exact_with_prerelease_suffix_kept() {
        assert_eq!(range_of("3.13.0-rc.2"), "3.13.0-rc.2");
    }

    #[test]
    fn empty_string_is_wildcard() {
        assert_eq!(range_of(""), "*");
        assert_eq!(range_of("x"), "*");
    }

    #[test]
    fn leading_v_stripped() {
        assert_eq!(range_of("v3.9"), ">=3.9.0, <3.10.0-0");
    }

    #[test]
    fn input_is_trimmed_and_lowercased() {
        assert_eq!(range_of("  3.8.X  "), ">=3.8.0, <3.9.0-0");
    }

    #[test]
    fn dev_suffix_is_prerelease_range() {
        assert_eq!(range_of("3.14-dev"), ">=3.14.0-0, <3.15.0-0");
    }

    #[test]
    fn dev_range_matches_prereleases() {
        let spec = VersionSpec::parse("3.14-dev", false).unwrap();
        let range = spec.range().unwrap();
        assert!(range.matches(&Version::parse("3.14.0-rc.2").unwrap()));
        assert!(range.matches(&Version::parse("3.14.0").unwrap()));
        assert!(!range.matches(&Version::parse("3.15.0").unwrap()));
    }

    #[test]
    fn minor_range_excludes_prereleases() {
        let spec = VersionSpec::parse("3.10", false).unwrap();
        let range = spec.range().unwrap();
        assert!(range.matches(&Version::parse("3.10.4").unwrap()));
        assert!(!range.matches(&Version::parse("3.10.0-a.7").unwrap()));
        assert!(!range.matches(&Version::parse("3.11.0").unwrap()));
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["3", "3.9", "3.8.x", "3.2.5", "", "3.14-dev"] {
            let once = range_of(input);
            assert_eq!(range_of(&once), once, "re-parsing {once:?}");
        }
    }

    #[test]
    fn explicit_range_passes_through() {
        assert_eq!(range_of(">=3.6.0, <3.8.0"), ">=3.6.0, <3.8.0");
    }

    #[test]
    fn pypy_marker_tags_interpreter() {
        let spec = VersionSpec::parse("pypy3.9", true).unwrap();
        assert_eq!(spec.interpreter, Interpreter::PyPy);
        assert_eq!(spec.version, VersionRequest::Opaque("3.9".to_string()));
        // freethreaded does not exist outside CPython
        assert!(!spec.freethreaded);
        assert_eq!(spec.display_request(), "pypy3.9");
    }

    #[test]
    fn pypy_with_dash_marker() {
        let spec = VersionSpec::parse("PyPy-3.10", false).unwrap();
        assert_eq!(spec.interpreter, Interpreter::PyPy);
        assert_eq!(spec.version, VersionRequest::Opaque("3.10".to_string()));
    }

    #[test]
    fn pypy_dashes_inside_version_survive() {
        let spec = VersionSpec::parse("pypy-3.10-v7.3", false).unwrap();
        assert_eq!(spec.interpreter, Interpreter::PyPy);
        assert_eq!(
            spec.version,
            VersionRequest::Opaque("3.10-v7.3".to_string())
        );
    }

    #[test]
    fn graalpy_marker_tags_interpreter() {
        let spec = VersionSpec::parse("graalpy24.1", false).unwrap();
        assert_eq!(spec.interpreter, Interpreter::GraalPy);
        assert_eq!(spec.version, VersionRequest::Opaque("24.1".to_string()));
    }

    #[test]
    fn bare_pypy_keeps_empty_remainder() {
        let spec = VersionSpec::parse("pypy", false).unwrap();
        assert_eq!(spec.version, VersionRequest::Opaque(String::new()));
    }

    #[test]
    fn freethreaded_only_for_cpython() {
        let spec = VersionSpec::parse("3.13", true).unwrap();
        assert!(spec.freethreaded);
    }

    #[test]
    fn invalid_input_rejected() {
        let err = VersionSpec::parse("Random string", false).unwrap_err();
        assert!(matches!(err, PyforgeError::InvalidVersion { .. }));
        assert!(err.to_string().contains("Random string"));
    }

    #[test]
    fn garbage_triple_rejected() {
        assert!(VersionSpec::parse("3.9.banana", false).is_err());
        assert!(VersionSpec::parse("a.b.c", false).is_err());
    }

    #[test]
    fn minor_level_accessor() {
        let spec = VersionSpec::parse("3.9", false).unwrap();
        assert_eq!(spec.range().unwrap().minor_level(), Some((3, 9)));
        let spec = VersionSpec::parse("3.2.5", false).unwrap();
        assert_eq!(spec.range().unwrap().minor_level(), None);
    }

    #[test]
    fn specs_compare_by_value() {
        let a = VersionSpec::parse("3.9", false).unwrap();
        let b = VersionSpec::parse(" 3.9 ", false).unwrap();
        assert_eq!(a, b);
    }
}
