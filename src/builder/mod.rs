//! Building CPython from a release tag
//!
//! A [`Builder`] drives the whole pipeline for one resolved tag: fetch
//! the source zipball, patch it, configure, compile, install into a
//! deterministic work directory and persist the result in the build
//! cache. Everything platform-specific is behind the [`OsStrategy`]
//! trait so the pipeline itself stays identical across operating
//! systems.
//!
//! The work directory is derived from the cache key, so two runs for the
//! same `{version, arch, os}` triple land in the same place and cached
//! payloads restore to valid absolute paths.

pub mod cache;
pub mod env;
pub mod patches;

mod darwin;
mod linux;
mod windows;

pub use darwin::DarwinStrategy;
pub use linux::LinuxStrategy;
pub use windows::WindowsStrategy;

use crate::catalog::ResolvedBuild;
use crate::error::{PyforgeError, PyforgeResult};
use crate::fetch;
use cache::CacheBackend;
use env::BuildEnvironment;
use async_trait::async_trait;
use semver::Version;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Operating systems a build can target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    /// Detect the OS the current process runs on
    pub fn detect() -> PyforgeResult<Self> {
        match std::env::consts::OS {
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::Darwin),
            "windows" => Ok(Self::Windows),
            other => Err(PyforgeError::UnsupportedPlatform(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable facts about the build being performed
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub version: Version,
    pub arch: String,
    pub zipball_url: String,
    /// Deterministic directory the whole build happens in
    pub work_dir: PathBuf,
}

/// Platform-specific half of the build pipeline
#[async_trait]
pub trait OsStrategy: Send + Sync {
    fn os(&self) -> Os;

    /// OS discriminator folded into the cache key
    fn cache_key_os(&self) -> &'static str;

    /// Directory under the work dir the finished install lands in
    fn build_suffix(&self) -> &'static str;

    /// Interpreter executable name relative to the install dir
    fn interpreter_relpath(&self) -> &'static str {
        "python"
    }

    /// Acquire an official prebuilt installer instead of compiling.
    ///
    /// Returns the finished install dir when an installer was found and
    /// run, `None` to proceed with a source build.
    async fn install_prebuilt(&mut self, _ctx: &BuildContext) -> PyforgeResult<Option<PathBuf>> {
        Ok(None)
    }

    /// Provision toolchains and libraries, recording compiler flags in
    /// `build_env` rather than the process environment.
    async fn prepare_environment(
        &mut self,
        ctx: &BuildContext,
        build_env: &mut BuildEnvironment,
    ) -> PyforgeResult<()>;

    /// Configure, compile and install the prepared sources. Returns the
    /// install dir.
    async fn build(&mut self, ctx: &BuildContext, build_env: &BuildEnvironment)
        -> PyforgeResult<PathBuf>;

    /// Paths outside the work dir that must be cached with the build
    async fn additional_cache_paths(&mut self, _ctx: &BuildContext) -> PyforgeResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Fixups after the install dir reached its final location
    async fn post_install(
        &mut self,
        ctx: &BuildContext,
        installed: &Path,
        restored: bool,
    ) -> PyforgeResult<()>;
}

/// Pick the strategy for `os`
pub fn create_strategy(os: Os) -> Box<dyn OsStrategy> {
    match os {
        Os::Linux => Box::new(LinuxStrategy::new()),
        Os::Darwin => Box::new(DarwinStrategy::new()),
        Os::Windows => Box::new(WindowsStrategy::new()),
    }
}

/// Pipeline driver for one resolved build
pub struct Builder {
    ctx: BuildContext,
    cache_key: String,
    strategy: Box<dyn OsStrategy>,
    backend: Box<dyn CacheBackend>,
    restored: bool,
}

impl Builder {
    /// Bind a resolved tag to a strategy and cache backend.
    ///
    /// `temp_root` defaults to the system temp directory; it is created
    /// and canonicalized so the derived work dir is stable across runs.
    pub fn new(
        resolved: ResolvedBuild,
        strategy: Box<dyn OsStrategy>,
        backend: Box<dyn CacheBackend>,
        temp_root: Option<PathBuf>,
    ) -> PyforgeResult<Self> {
        let cache_key = format!(
            "CPython{}{}{}",
            resolved.version,
            resolved.arch,
            strategy.cache_key_os()
        );
        let root = temp_root.unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root)
            .map_err(|e| PyforgeError::io(format!("creating {}", root.display()), e))?;
        let root = std::fs::canonicalize(&root)
            .map_err(|e| PyforgeError::io(format!("resolving {}", root.display()), e))?;
        let work_dir = root.join(&cache_key);
        debug!("Builder cache key: {cache_key}");
        debug!("Builder work dir: {}", work_dir.display());
        Ok(Self {
            ctx: BuildContext {
                version: resolved.version,
                arch: resolved.arch,
                zipball_url: resolved.zipball_url,
                work_dir,
            },
            cache_key,
            strategy,
            backend,
            restored: false,
        })
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn version(&self) -> &Version {
        &self.ctx.version
    }

    pub fn arch(&self) -> &str {
        &self.ctx.arch
    }

    /// Where the finished install lives inside the work dir
    pub fn install_dir(&self) -> PathBuf {
        self.ctx.work_dir.join(self.strategy.build_suffix())
    }

    /// Try to satisfy the build from the cache backend.
    ///
    /// On a hit the install dir is back in place and `build` must not be
    /// called.
    pub async fn restore_cache(&mut self) -> PyforgeResult<Option<PathBuf>> {
        info!("Trying to use cached built version");
        if !self.backend.is_available() {
            return Ok(None);
        }
        match self.backend.restore(&self.cache_key)? {
            Some(_) => {
                info!("CPython {} restored from cache", self.ctx.version);
                self.restored = true;
                Ok(Some(self.install_dir()))
            }
            None => {
                info!("Cached version not found");
                Ok(None)
            }
        }
    }

    /// Persist the finished build and its side artifacts
    pub async fn save_cache(&mut self) -> PyforgeResult<()> {
        if !self.backend.is_available() {
            info!("Cache backend is not available, skipping save");
            return Ok(());
        }
        let mut paths = vec![self.install_dir()];
        paths.extend(self.strategy.additional_cache_paths(&self.ctx).await?);
        self.backend.save(&paths, &self.cache_key)
    }

    /// Run the whole build pipeline, returning the install dir
    pub async fn build(&mut self) -> PyforgeResult<PathBuf> {
        if let Some(installed) = self.strategy.install_prebuilt(&self.ctx).await? {
            return Ok(installed);
        }

        debug!("Preparing environment for build");
        let mut build_env = BuildEnvironment::new();
        self.strategy
            .prepare_environment(&self.ctx, &mut build_env)
            .await?;

        debug!("Preparing sources");
        self.prepare_sources().await?;

        self.strategy.build(&self.ctx, &build_env).await
    }

    /// Strategy fixups on the final install location
    pub async fn post_install(&mut self, installed: &Path) -> PyforgeResult<()> {
        self.strategy
            .post_install(&self.ctx, installed, self.restored)
            .await
    }

    /// Make sure pip works in the installed interpreter.
    ///
    /// `ensurepip` ships from 3.4 on; older interpreters fall back to
    /// the pinned `get-pip.py` for their release line. Releases before
    /// 3.2 have no pip at all, which is tolerated.
    pub async fn init_pip(&self, installed: &Path) -> PyforgeResult<()> {
        info!("Initializing pip");
        let python = installed.join(self.strategy.interpreter_relpath());
        if !python.exists() {
            return Err(PyforgeError::PathNotFound(python));
        }
        let python = python.to_string_lossy().into_owned();

        let ensurepip = crate::exec::run_process(
            &python,
            &["-m", "ensurepip"],
            crate::exec::ExecOptions {
                capture: true,
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await?;
        if ensurepip.success() {
            info!("pip initialized via ensurepip");
            return Ok(());
        }

        info!("ensurepip failed, falling back to get-pip.py");
        let major = self.ctx.version.major;
        let minor = self.ctx.version.minor.max(2);
        let url = format!("https://bootstrap.pypa.io/pip/{major}.{minor}/get-pip.py");
        let get_pip = self.ctx.work_dir.join("get-pip.py");
        fetch::download(&url, &get_pip)?;
        let script = get_pip.to_string_lossy().into_owned();
        let result = crate::exec::run_process(
            &python,
            &[script.as_str()],
            crate::exec::ExecOptions {
                capture: true,
                ..Default::default()
            },
        )
        .await;
        let _ = std::fs::remove_file(&get_pip);
        match result {
            Ok(_) => {
                info!("pip initialized via get-pip.py");
                Ok(())
            }
            Err(_) if self.ctx.version.minor < 2 && self.ctx.version.major >= 3 => {
                info!("pip for Python < 3.2 is not available");
                Ok(())
            }
            Err(e) => Err(PyforgeError::PipBootstrap(e.to_string())),
        }
    }

    /// Remove the temporary work directory
    pub fn clean(&self) -> PyforgeResult<()> {
        if !self.ctx.work_dir.exists() {
            return Err(PyforgeError::BuildDir(format!(
                "cannot clear {} as it does not exist",
                self.ctx.work_dir.display()
            )));
        }
        info!("Removing temporary build directories");
        std::fs::remove_dir_all(&self.ctx.work_dir)
            .map_err(|e| PyforgeError::io(format!("removing {}", self.ctx.work_dir.display()), e))
    }

    /// Download, extract, relocate and patch the source tree
    async fn prepare_sources(&self) -> PyforgeResult<()> {
        info!("Preparing sources");
        let staging = self
            .ctx
            .work_dir
            .with_file_name(format!("{}-sources", self.cache_key));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)
                .map_err(|e| PyforgeError::io(format!("clearing {}", staging.display()), e))?;
        }

        info!("Downloading source zipball from {}", self.ctx.zipball_url);
        let zip_path = staging.join("source.zip");
        fetch::download(&self.ctx.zipball_url, &zip_path)?;

        info!("Extracting sources");
        let tree = fetch::extract_zip(&zip_path, &staging.join("tree"))?;
        std::fs::remove_file(&zip_path)
            .map_err(|e| PyforgeError::io(format!("removing {}", zip_path.display()), e))?;

        let sources = locate_source_root(&tree)?;
        debug!("Sources extracted in {}", sources.display());

        info!("Moving sources to work directory");
        crate::toolcache::copy_tree(&sources, &self.ctx.work_dir)?;
        std::fs::remove_dir_all(&staging)
            .map_err(|e| PyforgeError::io(format!("removing {}", staging.display()), e))?;

        info!("Applying patches to source files");
        patches::apply_all(&self.ctx.work_dir, self.strategy.os(), &self.ctx.version).await
    }
}

/// Find the single `python-cpython-*` directory a zipball extracts to
fn locate_source_root(extracted: &Path) -> PyforgeResult<PathBuf> {
    let mut entries = Vec::new();
    let dir = std::fs::read_dir(extracted)
        .map_err(|e| PyforgeError::io(format!("reading {}", extracted.display()), e))?;
    for entry in dir {
        let entry = entry.map_err(|e| PyforgeError::io("reading extracted sources", e))?;
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    if entries.len() != 1 {
        return Err(PyforgeError::Internal(format!(
            "expected one extracted folder, got {entries:?}"
        )));
    }
    let name = &entries[0];
    if !name.starts_with("python-cpython") {
        return Err(PyforgeError::Internal(format!(
            "expected directory starting with \"python-cpython\", got {name}"
        )));
    }
    Ok(extracted.join(name))
}

/// Symlink `link` to `target`, copying when links are unsupported
pub(crate) fn make_symlink(target: &Path, link: &Path) -> PyforgeResult<()> {
    debug!("Creating symlink from {} to {}", target.display(), link.display());
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
            .map_err(|e| PyforgeError::PostInstall(format!("symlink {}: {e}", link.display())))
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(target, link)
            .or_else(|_| std::fs::copy(target, link).map(|_| ()))
            .map_err(|e| PyforgeError::PostInstall(format!("symlink {}: {e}", link.display())))
    }
    #[cfg(not(any(unix, windows)))]
    {
        std::fs::copy(target, link)
            .map(|_| ())
            .map_err(|e| PyforgeError::PostInstall(format!("copying {}: {e}", link.display())))
    }
}
