//! CLI command implementations

pub mod config;
pub mod install;
pub mod resolve;
pub mod tags;

pub use config::execute as config;
pub use install::execute as install;
pub use resolve::execute as resolve;
pub use tags::execute as tags;

use crate::error::{PyforgeError, PyforgeResult};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Conventional version file picked up when no request is given
const DEFAULT_VERSION_FILE: &str = ".python-version";

/// Work out the version request from the CLI inputs.
///
/// An explicit version wins over a version file. With neither given the
/// conventional `.python-version` file is tried.
pub(crate) fn version_input(
    version: Option<&str>,
    version_file: Option<&Path>,
) -> PyforgeResult<String> {
    if let Some(version) = version {
        if version_file.is_some() {
            warn!("Both a version and a version file were supplied, the version file will be ignored");
        }
        return Ok(version.to_string());
    }

    let path = version_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_VERSION_FILE));
    if !path.exists() {
        if version_file.is_some() {
            return Err(PyforgeError::PathNotFound(path));
        }
        return Err(PyforgeError::User(format!(
            "no version supplied and no {DEFAULT_VERSION_FILE} file found"
        )));
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| PyforgeError::io(format!("reading {}", path.display()), e))?;
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .ok_or_else(|| {
            PyforgeError::User(format!("{} contains no version", path.display()))
        })?;
    info!("Resolved {} as {line}", path.display());
    Ok(line.to_string())
}

/// Architecture label for the host, in manifest vocabulary
pub(crate) fn default_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_version_wins() {
        let input = version_input(Some("3.11"), None).unwrap();
        assert_eq!(input, "3.11");
    }

    #[test]
    fn explicit_version_wins_over_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("version.txt");
        std::fs::write(&file, "3.9\n").unwrap();
        let input = version_input(Some("3.11"), Some(&file)).unwrap();
        assert_eq!(input, "3.11");
    }

    #[test]
    fn version_file_first_meaningful_line() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("version.txt");
        std::fs::write(&file, "# pinned for CI\n\n  3.9.13  \n3.8\n").unwrap();
        let input = version_input(None, Some(&file)).unwrap();
        assert_eq!(input, "3.9.13");
    }

    #[test]
    fn missing_version_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("absent.txt");
        assert!(matches!(
            version_input(None, Some(&file)),
            Err(PyforgeError::PathNotFound(_))
        ));
    }

    #[test]
    fn empty_version_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("version.txt");
        std::fs::write(&file, "\n# nothing here\n").unwrap();
        assert!(matches!(
            version_input(None, Some(&file)),
            Err(PyforgeError::User(_))
        ));
    }

    #[test]
    #[serial_test::serial]
    fn default_version_file_discovered() {
        let tmp = tempfile::tempdir().unwrap();
        let old = std::env::current_dir().unwrap();
        std::env::set_current_dir(tmp.path()).unwrap();
        std::fs::write(DEFAULT_VERSION_FILE, "3.10\n").unwrap();
        let input = version_input(None, None);
        std::env::set_current_dir(old).unwrap();
        assert_eq!(input.unwrap(), "3.10");
    }

    #[test]
    #[serial_test::serial]
    fn no_input_and_no_default_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let old = std::env::current_dir().unwrap();
        std::env::set_current_dir(tmp.path()).unwrap();
        let result = version_input(None, None);
        std::env::set_current_dir(old).unwrap();
        assert!(matches!(result, Err(PyforgeError::User(_))));
    }

    #[test]
    fn default_arch_is_manifest_vocabulary() {
        let arch = default_arch();
        assert!(["x64", "arm64", "x86"].contains(&arch.as_str()) || !arch.is_empty());
    }
}
