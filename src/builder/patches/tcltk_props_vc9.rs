//! Pre-3.5 `tcltk.props` hardcodes the VC9 build directory suffix for
//! its tcl/tk externals. The mirrored externals carry VC13 directories.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use async_trait::async_trait;
use std::path::Path;

pub(super) fn patch_props(content: &str) -> String {
    content.replace("_VC9", "_VC13")
}

pub struct TcltkPropsVc9;

#[async_trait]
impl Patch for TcltkPropsVc9 {
    fn description(&self) -> &'static str {
        "fix tcl/tk build directory for versions other than vc9"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![
            Applicability::new(Os::Windows, "2.7.x"),
            Applicability::new(Os::Windows, "3.0.x"),
            Applicability::new(Os::Windows, "3.1.x"),
            Applicability::new(Os::Windows, "3.2.x"),
            Applicability::new(Os::Windows, "3.3.x"),
            Applicability::new(Os::Windows, "3.4.x"),
        ]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        let props = source_root.join("PCbuild").join("tcltk.props");
        let content = read_target(self.description(), &props)?;
        write_target(self.description(), &props, &patch_props(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_every_vc9_suffix() {
        let content = "<TclDir>$(ExternalsDir)tcl-8.6.1.0_VC9\\</TclDir>\n\
<TkDir>$(ExternalsDir)tk-8.6.1.0_VC9\\</TkDir>\n";
        let patched = patch_props(content);
        assert_eq!(patched.matches("_VC13").count(), 2);
        assert!(!patched.contains("_VC9"));
    }
}
