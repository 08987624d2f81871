//! Local tool cache
//!
//! Installed runtimes live under `<root>/<tool>/<version>/<arch>/`, with
//! a sibling `<arch>.complete` marker written once the copy finished.
//! Entries without the marker are treated as absent (an interrupted
//! install must not satisfy later lookups).

use crate::error::{PyforgeError, PyforgeResult};
use crate::version::VersionRange;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tool name used for every Python install
pub const TOOL_NAME: &str = "Python";

/// Handle to the tool-cache root directory
#[derive(Debug, Clone)]
pub struct ToolCache {
    root: PathBuf,
}

impl ToolCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_dir(&self, tool: &str, version: &Version, arch: &str) -> PathBuf {
        self.root.join(tool).join(version.to_string()).join(arch)
    }

    fn marker_path(&self, tool: &str, version: &Version, arch: &str) -> PathBuf {
        self.root
            .join(tool)
            .join(version.to_string())
            .join(format!("{arch}.complete"))
    }

    /// Find the highest complete cached version satisfying `range`
    pub fn find(&self, tool: &str, range: &VersionRange, arch: &str) -> Option<(Version, PathBuf)> {
        let tool_dir = self.root.join(tool);
        let entries = std::fs::read_dir(&tool_dir).ok()?;
        let mut best: Option<(Version, PathBuf)> = None;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Ok(version) = Version::parse(&name.to_string_lossy()) else {
                continue;
            };
            if !range.matches(&version) {
                continue;
            }
            if !self.marker_path(tool, &version, arch).exists() {
                debug!("Ignoring incomplete tool-cache entry {version}");
                continue;
            }
            let dir = self.entry_dir(tool, &version, arch);
            if !dir.is_dir() {
                continue;
            }
            match &best {
                Some((current, _)) if version <= *current => {}
                _ => best = Some((version, dir)),
            }
        }
        best
    }

    /// Copy `source` into the cache and mark it complete.
    ///
    /// Returns the final install location.
    pub fn register(
        &self,
        source: &Path,
        tool: &str,
        version: &Version,
        arch: &str,
    ) -> PyforgeResult<PathBuf> {
        let dest = self.entry_dir(tool, version, arch);
        info!("Registering {tool} {version} ({arch}) at {}", dest.display());
        if dest.exists() {
            std::fs::remove_dir_all(&dest)
                .map_err(|e| PyforgeError::io(format!("clearing {}", dest.display()), e))?;
        }
        copy_tree(source, &dest)?;
        let marker = self.marker_path(tool, version, arch);
        std::fs::write(&marker, b"")
            .map_err(|e| PyforgeError::io(format!("writing {}", marker.display()), e))?;
        Ok(dest)
    }
}

/// Recursively copy a directory tree, preserving symlinks on unix
pub fn copy_tree(src: &Path, dst: &Path) -> PyforgeResult<()> {
    if !src.exists() {
        return Err(PyforgeError::PathNotFound(src.to_path_buf()));
    }
    std::fs::create_dir_all(dst)
        .map_err(|e| PyforgeError::io(format!("creating {}", dst.display()), e))?;
    let entries = std::fs::read_dir(src)
        .map_err(|e| PyforgeError::io(format!("reading {}", src.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PyforgeError::io(format!("reading {}", src.display()), e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let metadata = std::fs::symlink_metadata(&from)
            .map_err(|e| PyforgeError::io(format!("stat {}", from.display()), e))?;
        if metadata.file_type().is_symlink() {
            #[cfg(unix)]
            {
                let target = std::fs::read_link(&from)
                    .map_err(|e| PyforgeError::io(format!("readlink {}", from.display()), e))?;
                std::os::unix::fs::symlink(&target, &to)
                    .map_err(|e| PyforgeError::io(format!("symlink {}", to.display()), e))?;
            }
            #[cfg(not(unix))]
            {
                std::fs::copy(&from, &to)
                    .map_err(|e| PyforgeError::io(format!("copying {}", from.display()), e))?;
            }
        } else if metadata.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            std::fs::copy(&from, &to)
                .map_err(|e| PyforgeError::io(format!("copying {}", from.display()), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::VersionSpec;

    fn range(input: &str) -> VersionRange {
        VersionSpec::parse(input, false)
            .unwrap()
            .range()
            .unwrap()
            .clone()
    }

    fn fake_install(dir: &Path) {
        std::fs::create_dir_all(dir.join("bin")).unwrap();
        std::fs::write(dir.join("bin/python3"), b"elf").unwrap();
    }

    #[test]
    fn register_then_find() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        let source = tmp.path().join("built");
        fake_install(&source);

        let version = Version::new(3, 6, 15);
        let installed = cache.register(&source, TOOL_NAME, &version, "x64").unwrap();
        assert!(installed.join("bin/python3").exists());

        let (found, path) = cache.find(TOOL_NAME, &range("3.6"), "x64").unwrap();
        assert_eq!(found, version);
        assert_eq!(path, installed);
    }

    #[test]
    fn incomplete_entries_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        // entry dir without a .complete marker
        let dir = tmp.path().join("toolcache/Python/3.9.1/x64");
        fake_install(&dir);
        assert!(cache.find(TOOL_NAME, &range("3.9"), "x64").is_none());
    }

    #[test]
    fn highest_matching_version_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        let source = tmp.path().join("built");
        fake_install(&source);
        for version in [Version::new(3, 9, 1), Version::new(3, 9, 13)] {
            cache.register(&source, TOOL_NAME, &version, "x64").unwrap();
        }
        let (found, _) = cache.find(TOOL_NAME, &range("3.9"), "x64").unwrap();
        assert_eq!(found, Version::new(3, 9, 13));
    }

    #[test]
    fn arch_is_part_of_the_key() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ToolCache::new(tmp.path().join("toolcache"));
        let source = tmp.path().join("built");
        fake_install(&source);
        cache
            .register(&source, TOOL_NAME, &Version::new(3, 9, 1), "arm64")
            .unwrap();
        assert!(cache.find(TOOL_NAME, &range("3.9"), "x64").is_none());
        assert!(cache.find(TOOL_NAME, &range("3.9"), "arm64").is_some());
    }

    #[test]
    fn copy_tree_preserves_symlinks() {
        #[cfg(unix)]
        {
            let tmp = tempfile::tempdir().unwrap();
            let src = tmp.path().join("src");
            std::fs::create_dir_all(src.join("bin")).unwrap();
            std::fs::write(src.join("bin/python3.9"), b"elf").unwrap();
            std::os::unix::fs::symlink("python3.9", src.join("bin/python3")).unwrap();

            let dst = tmp.path().join("dst");
            copy_tree(&src, &dst).unwrap();
            let link = std::fs::read_link(dst.join("bin/python3")).unwrap();
            assert_eq!(link, PathBuf::from("python3.9"));
        }
    }

    #[test]
    fn copy_tree_missing_source_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = copy_tree(&tmp.path().join("absent"), &tmp.path().join("dst"));
        assert!(matches!(result, Err(PyforgeError::PathNotFound(_))));
    }
}
