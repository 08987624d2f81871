//! The installer bootstrapper project only knows where the WiX libs
//! live for toolset v140. Later toolsets need the vs2017 library
//! directory appended next to the existing dependency list.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use async_trait::async_trait;
use std::path::Path;

const DEPENDENCIES_CLOSE: &str = "</AdditionalDependencies>";
const WIX_LIB_DIRS: &str = "<AdditionalLibraryDirectories \
Condition=\"$(PlatformToolset.StartsWith(`v14`))\">\
$(WixInstallPath)sdk\\vs2017\\lib\\x86</AdditionalLibraryDirectories>";

pub(super) fn patch_bootstrapper(content: &str) -> String {
    content.replacen(
        DEPENDENCIES_CLOSE,
        &format!("{DEPENDENCIES_CLOSE}{WIX_LIB_DIRS}"),
        1,
    )
}

pub struct BootstrapperWix;

#[async_trait]
impl Patch for BootstrapperWix {
    fn description(&self) -> &'static str {
        "fix wix library directories for MSVC > 140"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![
            Applicability::new(Os::Windows, "3.5.x"),
            Applicability::new(Os::Windows, "3.6.x"),
            Applicability::new(Os::Windows, "3.7.x"),
            Applicability::new(Os::Windows, "3.8.x"),
            Applicability::new(Os::Windows, "3.9.x"),
            Applicability::new(Os::Windows, "3.10.x"),
            Applicability::new(Os::Windows, "3.11.x"),
            Applicability::new(Os::Windows, "3.12.x"),
        ]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        let project = source_root
            .join("Tools")
            .join("msi")
            .join("bundle")
            .join("bootstrap")
            .join("pythonba.vcxproj");
        let content = read_target(self.description(), &project)?;
        write_target(self.description(), &project, &patch_bootstrapper(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_wix_library_directories() {
        let content = "<Link>\
<AdditionalDependencies>wixstdba.lib</AdditionalDependencies>\
</Link>";
        let patched = patch_bootstrapper(content);
        assert!(patched.contains(
            "</AdditionalDependencies><AdditionalLibraryDirectories \
Condition=\"$(PlatformToolset.StartsWith(`v14`))\">\
$(WixInstallPath)sdk\\vs2017\\lib\\x86</AdditionalLibraryDirectories>"
        ));
    }

    #[test]
    fn only_first_occurrence_is_patched() {
        let content = "</AdditionalDependencies></AdditionalDependencies>";
        let patched = patch_bootstrapper(content);
        assert_eq!(patched.matches("AdditionalLibraryDirectories").count(), 2);
    }
}
