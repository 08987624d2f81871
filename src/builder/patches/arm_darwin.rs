//! Old `configure` scripts only know about ppc/i386/x86_64 when probing
//! `/usr/bin/arch`, so on Apple Silicon the default arch falls through
//! to a 32-bit build. Insert an arm64 case.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use async_trait::async_trait;
use std::path::Path;

const ARCH_CASE: &str = "case `/usr/bin/arch` in";
const ARM64_ARM: &str = "case `/usr/bin/arch` in\narm64)\nMACOSX_DEFAULT_ARCH=\"arm64\"\n;;";

pub(super) fn patch_configure(content: &str) -> String {
    content.replace(ARCH_CASE, ARM64_ARM)
}

pub struct ArmDarwin;

#[async_trait]
impl Patch for ArmDarwin {
    fn description(&self) -> &'static str {
        "fix arm arch on darwin"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![
            Applicability::new(Os::Darwin, "2.x.x"),
            Applicability::new(Os::Darwin, "3.0.x"),
            Applicability::new(Os::Darwin, "3.1.x"),
            Applicability::new(Os::Darwin, "3.2.x"),
            Applicability::new(Os::Darwin, "3.3.x"),
            Applicability::new(Os::Darwin, "3.4.x"),
            Applicability::new(Os::Darwin, "3.5.x"),
            Applicability::new(Os::Darwin, "3.6.x"),
        ]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        let configure = source_root.join("configure");
        let content = read_target(self.description(), &configure)?;
        write_target(self.description(), &configure, &patch_configure(&content))
    }
}
