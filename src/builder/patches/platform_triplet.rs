//! `configure` for 3.5 through 3.7 asks the compiler for its multiarch
//! triplet unconditionally. Modern Apple clang answers that query and
//! the answer conflicts with the darwin platform triplet, breaking the
//! extension-module suffix. Skip the query on darwin.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use async_trait::async_trait;
use std::path::Path;

const MULTIARCH_PROBE: &str = "\nMULTIARCH=$($CC --print-multiarch 2>/dev/null)";
const TRIPLET_GUARD: &str = "if test x$PLATFORM_TRIPLET != x && test x$MULTIARCH != x; then";
const GUARDED_PROBE: &str = "if test x$PLATFORM_TRIPLET != xdarwin; then\n  \
MULTIARCH=$($CC --print-multiarch 2>/dev/null)\nfi\n\
if test x$PLATFORM_TRIPLET != x && test x$MULTIARCH != x; then";

pub(super) fn patch_configure(content: &str) -> String {
    content
        .replacen(MULTIARCH_PROBE, "\n", 1)
        .replacen(TRIPLET_GUARD, GUARDED_PROBE, 1)
}

pub struct PlatformTriplet;

#[async_trait]
impl Patch for PlatformTriplet {
    fn description(&self) -> &'static str {
        "fix platform triplet in configure file"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![
            Applicability::new(Os::Darwin, "3.5.x"),
            Applicability::new(Os::Darwin, "3.6.x"),
            Applicability::new(Os::Darwin, "3.7.x"),
        ]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        let configure = source_root.join("configure");
        let content = read_target(self.description(), &configure)?;
        write_target(self.description(), &configure, &patch_configure(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "\
PLATFORM_TRIPLET=darwin
MULTIARCH=$($CC --print-multiarch 2>/dev/null)

if test x$PLATFORM_TRIPLET != x && test x$MULTIARCH != x; then
  if test x$MULTIARCH != x$PLATFORM_TRIPLET; then
    as_fn_error $? \"internal configure error\"
  fi
fi
";

    #[test]
    fn moves_probe_behind_darwin_guard() {
        let patched = patch_configure(FIXTURE);
        assert!(patched.contains("if test x$PLATFORM_TRIPLET != xdarwin; then"));
        // the unconditional probe line is gone
        assert!(!patched.contains("darwin\nMULTIARCH=$($CC"));
        // the guarded one remains, exactly once
        assert_eq!(
            patched.matches("MULTIARCH=$($CC --print-multiarch 2>/dev/null)").count(),
            1
        );
    }

    #[test]
    fn original_comparison_survives() {
        let patched = patch_configure(FIXTURE);
        assert!(patched
            .contains("if test x$PLATFORM_TRIPLET != x && test x$MULTIARCH != x; then"));
    }
}
