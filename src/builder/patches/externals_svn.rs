//! The 3.5 externals scripts still fetch from the long-dead CPython
//! svn mirror over plain http. Rewrite both `get_externals.bat` files
//! to fetch through `git svn` over https.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use async_trait::async_trait;
use std::path::Path;

pub(super) fn patch_externals(content: &str) -> String {
    content
        .replace("svn ", "git svn ")
        .replace("export", "clone")
        .replace("svn co ", "svn clone ")
        .replace("http", "https")
}

pub struct ExternalsSvn;

#[async_trait]
impl Patch for ExternalsSvn {
    fn description(&self) -> &'static str {
        "fix getting external dependencies from svn"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![Applicability::new(Os::Windows, "3.5.x")]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        for target in [
            source_root.join("PCbuild").join("get_externals.bat"),
            source_root.join("Tools").join("msi").join("get_externals.bat"),
        ] {
            let content = read_target(self.description(), &target)?;
            write_target(self.description(), &target, &patch_externals(&content))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn svn_export_becomes_git_svn_clone() {
        let content = "svn export %SVNROOT%tcl-core-8.6.4.2 %EXTERNALS_DIR%\\tcl-core-8.6.4.2\n";
        let patched = patch_externals(content);
        assert!(patched.starts_with("git svn clone "));
        assert!(!patched.contains("export"));
    }

    #[test]
    fn plain_http_becomes_https() {
        let content = "set SVNROOT=http://svn.python.org/projects/external/\n";
        let patched = patch_externals(content);
        assert!(patched.contains("https://svn.python.org"));
    }

    #[test]
    fn every_fetch_line_is_rewritten() {
        let content = "svn export a\nsvn export b\n";
        let patched = patch_externals(content);
        assert_eq!(patched.matches("git svn clone").count(), 2);
    }
}
