//! On darwin the system headers live inside the SDK, not under `/usr`.
//! `Tools/scripts/h2py.py` opens header paths verbatim during the 3.0
//! build, so redirect them into the SDK reported by `xcrun`.

use super::{read_target, write_target, Applicability, Patch};
use crate::builder::Os;
use crate::error::PyforgeResult;
use crate::exec;
use async_trait::async_trait;
use std::path::Path;

const OPEN_CALL: &str = "fp = open(filename, 'r')";

pub(super) fn patch_h2py(content: &str, sdk_path: &str) -> String {
    let redirect = format!(
        "filename=filename.replace('/usr/lib', '{sdk_path}/usr/lib')\
.replace('/usr/include', '{sdk_path}/usr/include');fp=open(filename, 'r')"
    );
    content.replacen(OPEN_CALL, &redirect, 1)
}

pub struct H2pyHeaders;

#[async_trait]
impl Patch for H2pyHeaders {
    fn description(&self) -> &'static str {
        "add missing headers in Tools/scripts/h2py.py"
    }

    fn applies_to(&self) -> Vec<Applicability> {
        vec![Applicability::new(Os::Darwin, "3.0.x")]
    }

    async fn apply(&self, source_root: &Path) -> PyforgeResult<()> {
        let sdk_path = exec::capture_stdout("xcrun", &["--sdk", "macosx", "--show-sdk-path"]).await?;
        let h2py = source_root.join("Tools").join("scripts").join("h2py.py");
        let content = read_target(self.description(), &h2py)?;
        write_target(
            self.description(),
            &h2py,
            &patch_h2py(&content, sdk_path.trim()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "\
def process(filename):
    fp = open(filename, 'r')
    body = fp.read()
";

    #[test]
    fn redirects_into_sdk() {
        let patched = patch_h2py(FIXTURE, "/Library/SDKs/MacOSX14.sdk");
        assert!(patched.contains(
            "filename.replace('/usr/lib', '/Library/SDKs/MacOSX14.sdk/usr/lib')"
        ));
        assert!(patched.contains(
            ".replace('/usr/include', '/Library/SDKs/MacOSX14.sdk/usr/include')"
        ));
        assert!(patched.contains(";fp=open(filename, 'r')"));
        assert!(!patched.contains("fp = open(filename, 'r')"));
    }

    #[test]
    fn unrelated_opens_untouched() {
        let content = "fp = open(other, 'rb')\n";
        assert_eq!(patch_h2py(content, "/sdk"), content);
    }
}
