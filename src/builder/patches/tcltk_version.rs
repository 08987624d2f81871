//! 3.5/3.6 pin tcl/tk externals that were purged from the mirror.
//! Bump the fetched externals and the patch level to 8.6.10.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;

pub(super) fn patch_externals(content: &str) -> String {
    let tk = Regex::new(r" tk-[0-9.]+").expect("static pattern");
    let tcl = Regex::new(r" tcl-core-[0-9.]+").expect("static pattern");
    let content = tk.replace(content, " tk-8.6.10.0");
    tcl.replace(&content, " tcl-core-8.6.10.0").into_owned()
}

pub(super) fn patch_props(content: &str) -> String {
    let patch_level = Regex::new(r"<TclPatchLevel>[0-9]+</TclPatchLevel>").expect("static pattern");
    patch_level
        .replace(content, "<TclPatchLevel>10</TclPatchLevel>")
        .into_owned()
}

pub struct TcltkExternalVersion;

#[async_trait]
impl Patch for TcltkExternalVersion {
    fn description(&self) -> &'static str {
        "update tcl/tk version for Python < 3.7"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![
            Applicability::new(Os::Windows, "3.6.x"),
            Applicability::new(Os::Windows, "3.5.x"),
        ]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        let externals = source_root.join("PCbuild").join("get_externals.bat");
        let content = read_target(self.description(), &externals)?;
        write_target(self.description(), &externals, &patch_externals(&content))?;

        let props = source_root.join("PCbuild").join("tcltk.props");
        let content = read_target(self.description(), &props)?;
        write_target(self.description(), &props, &patch_props(&content))
    }
}
