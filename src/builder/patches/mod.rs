//! Source-tree patches
//!
//! Old CPython release tags assume build environments that no longer
//! exist (svn fetch commands, missing arm64 cases in `configure`,
//! ancient tcl/tk externals). Each patch is an idempotent text
//! transformation on specific files, guarded by an `{os, range}`
//! applicability list.
//!
//! The driver walks the registry in registration order; for each patch,
//! the first applicability entry matching both the target OS and the
//! build version fires the patch exactly once, regardless of how many
//! declared ranges overlap. Patches are load-bearing: a patch whose
//! target file cannot be read or written aborts the whole build.

mod arm_darwin;
mod bootstrapper_wix;
mod externals_svn;
mod h2py_headers;
mod platform_triplet;
mod tcltk_props_vc9;
mod tcltk_version;

use crate::builder::Os;
use crate::error::{PyforgeError, PyforgeResult};
use async_trait::async_trait;
use semver::{Version, VersionReq};
use std::path::Path;
use tracing::{debug, info};

/// One `{os, range}` entry in a patch's applicability list
#[derive(Debug, Clone)]
pub struct Applicability {
    pub os: Os,
    pub range: &'static str,
}

impl Applicability {
    pub fn new(os: Os, range: &'static str) -> Self {
        Self { os, range }
    }

    fn matches(&self, os: Os, version: &Version) -> bool {
        if self.os != os {
            return false;
        }
        VersionReq::parse(self.range)
            .map(|req| req.matches(version))
            .unwrap_or(false)
    }
}

/// An idempotent edit to the fetched source tree
#[async_trait]
pub trait Patch: Send + Sync {
    /// Short human description, used in logs
    fn description(&self) -> &'static str;

    /// The `{os, range}` pairs this patch applies to
    fn applies_to(&self) -> Vec<Applicability>;

    /// Perform the edit on `source_root`
    async fn apply(&self, source_root: &Path) -> PyforgeResult<()>;
}

/// All known patches, in registration order
pub fn registry() -> Vec<Box<dyn Patch>> {
    vec![
        Box::new(arm_darwin::ArmDarwin),
        Box::new(bootstrapper_wix::BootstrapperWix),
        Box::new(externals_svn::ExternalsSvn),
        Box::new(h2py_headers::H2pyHeaders),
        Box::new(platform_triplet::PlatformTriplet),
        Box::new(tcltk_version::TcltkExternalVersion),
        Box::new(tcltk_props_vc9::TcltkPropsVc9),
    ]
}

/// Apply every applicable patch to `source_root`
pub async fn apply_all(source_root: &Path, os: Os, version: &Version) -> PyforgeResult<()> {
    for patch in registry() {
        let applicable = patch
            .applies_to()
            .iter()
            .any(|entry| entry.matches(os, version));
        if applicable {
            info!("Applying patch: {}", patch.description());
            patch.apply(source_root).await?;
        } else {
            debug!("Skipping patch: {}", patch.description());
        }
    }
    Ok(())
}

/// Read a patch target file, map failures to [`PyforgeError::PatchFailed`]
pub(crate) fn read_target(description: &'static str, path: &Path) -> PyforgeResult<String> {
    std::fs::read_to_string(path).map_err(|e| PyforgeError::PatchFailed {
        description: description.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write a patch target file, map failures to [`PyforgeError::PatchFailed`]
pub(crate) fn write_target(
    description: &'static str,
    path: &Path,
    content: &str,
) -> PyforgeResult<()> {
    std::fs::write(path, content).map_err(|e| PyforgeError::PatchFailed {
        description: description.to_string(),
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
