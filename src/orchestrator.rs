//! Top-level control flow
//!
//! One invocation performs one resolution and at most one build:
//! parse the request, ask the prebuilt oracle, and only when nothing
//! prebuilt exists fall back to resolving a release tag and building it.
//! The build-behavior policy decides whether that fallback is an error,
//! a warning, silent, or forced; no lower component makes that call.

use crate::builder::cache::LocalCacheBackend;
use crate::builder::{create_strategy, Builder, Os};
use crate::catalog::{resolve_tag, ResolvedBuild, TagCatalog};
use crate::error::{PyforgeError, PyforgeResult};
use crate::oracle::PrebuiltOracle;
use crate::toolcache::{ToolCache, TOOL_NAME};
use crate::version::{Interpreter, VersionSpec};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What to do when the request needs a source build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildBehavior {
    /// Build silently
    Allow,
    /// Build, noting it at info level
    #[default]
    Info,
    /// Build, but surface a warning
    Warn,
    /// Refuse to build
    Error,
    /// Build even when a prebuilt distribution exists
    Force,
}

impl FromStr for BuildBehavior {
    type Err = PyforgeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "force" => Ok(Self::Force),
            other => Err(PyforgeError::User(format!(
                "invalid build behavior \"{other}\", expected allow, info, warn, error or force"
            ))),
        }
    }
}

/// One resolution/build request
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub version_input: String,
    pub architecture: String,
    pub cache_enabled: bool,
    pub build_behavior: BuildBehavior,
    pub check_latest: bool,
    pub allow_prereleases: bool,
    pub freethreaded: bool,
}

/// The answer handed back to the CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub resolved_version: String,
    pub architecture: String,
    pub freethreaded: bool,
}

pub struct Orchestrator {
    oracle: Box<dyn PrebuiltOracle>,
    catalog: TagCatalog,
    tool_cache: ToolCache,
    build_cache_root: PathBuf,
    temp_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        oracle: Box<dyn PrebuiltOracle>,
        catalog: TagCatalog,
        tool_cache: ToolCache,
        build_cache_root: PathBuf,
        temp_root: Option<PathBuf>,
    ) -> Self {
        Self {
            oracle,
            catalog,
            tool_cache,
            build_cache_root,
            temp_root,
        }
    }

    /// Resolve `request`, building from source when required
    pub async fn run(&self, request: &RunRequest) -> PyforgeResult<RunOutcome> {
        debug!("Parsing version request");
        let spec = VersionSpec::parse(&request.version_input, request.freethreaded)?;
        debug!(
            "Requested {} {} on {}",
            spec.interpreter,
            spec.display_request(),
            request.architecture
        );

        if request.build_behavior != BuildBehavior::Force {
            debug!("Consulting prebuilt oracle");
            if let Some(resolution) = self
                .oracle
                .resolve(
                    &spec,
                    &request.architecture,
                    request.allow_prereleases,
                    request.check_latest,
                )
                .await?
            {
                info!(
                    "{} version {} is available prebuilt as {}",
                    spec.interpreter,
                    spec.display_request(),
                    resolution.version
                );
                return Ok(RunOutcome {
                    resolved_version: resolution.version,
                    architecture: request.architecture.clone(),
                    freethreaded: spec.freethreaded,
                });
            }
            info!(
                "{} version {} is not available prebuilt",
                spec.interpreter,
                spec.display_request()
            );
        }

        // Only CPython can be built from source
        if spec.interpreter != Interpreter::CPython {
            return Err(PyforgeError::UnbuildableInterpreter {
                interpreter: spec.interpreter.to_string(),
            });
        }
        // Free-threaded binaries only exist prebuilt; a source build
        // would silently hand back a standard interpreter
        if spec.freethreaded {
            return Err(PyforgeError::UnbuildableInterpreter {
                interpreter: "free-threaded CPython".to_string(),
            });
        }

        match request.build_behavior {
            BuildBehavior::Error => {
                return Err(PyforgeError::User(format!(
                    "CPython version {} is not available prebuilt. \
To build it from source, set the build behavior to warn, info or allow",
                    spec.display_request()
                )));
            }
            BuildBehavior::Warn => {
                warn!(
                    "CPython version {} is not available prebuilt. This probably means \
you are requesting a deprecated version",
                    spec.display_request()
                );
            }
            BuildBehavior::Info => {
                info!(
                    "CPython version {} will be built from source",
                    spec.display_request()
                );
            }
            BuildBehavior::Allow => {
                debug!(
                    "CPython version {} will be built from source",
                    spec.display_request()
                );
            }
            BuildBehavior::Force => {
                info!(
                    "Build forced for CPython version {}",
                    spec.display_request()
                );
            }
        }

        let os = Os::detect()?;
        let range = spec
            .range()
            .ok_or_else(|| PyforgeError::Internal("CPython request without a range".into()))?;
        // Windows acquires releases through official installers when any
        // tag in range ships one
        let prefer_installer = os == Os::Windows;
        let tag = resolve_tag(&self.catalog, range, prefer_installer).ok_or_else(|| {
            PyforgeError::UnresolvableRange {
                range: range.to_string(),
            }
        })?;
        let resolved = ResolvedBuild::new(tag, request.architecture.clone());
        let resolved_version = resolved.version.clone();

        let mut builder = Builder::new(
            resolved,
            create_strategy(os),
            Box::new(LocalCacheBackend::new(self.build_cache_root.clone())),
            self.temp_root.clone(),
        )?;

        let mut build_path = None;
        if request.cache_enabled {
            // Restore failures surface as cache errors, not build errors
            build_path = match builder.restore_cache().await {
                Ok(path) => path,
                Err(e) if e.is_cache_error() => return Err(e),
                Err(e) => return Err(PyforgeError::CacheBackend(e.to_string())),
            };
        }
        let restored = build_path.is_some();

        let build_path = match build_path {
            Some(path) => {
                info!("Cache hit, installing already built version");
                path
            }
            None => {
                let path = builder.build().await?;
                if request.cache_enabled {
                    builder.save_cache().await?;
                }
                path
            }
        };

        info!("Installing built version into the tool cache");
        let installed = self.tool_cache.register(
            &build_path,
            TOOL_NAME,
            &resolved_version,
            &request.architecture,
        )?;
        info!(
            "CPython {resolved_version} for arch {} successfully installed{}",
            request.architecture,
            if restored { " (from cache)" } else { "" }
        );

        // Fixups target the final location; clean still runs last and a
        // clean failure wins over a fixup failure
        let fixups = {
            match builder.post_install(&installed).await {
                Ok(()) => builder.init_pip(&installed).await,
                Err(e) => Err(e),
            }
        };
        builder.clean()?;
        fixups?;

        Ok(RunOutcome {
            resolved_version: resolved_version.to_string(),
            architecture: request.architecture.clone(),
            freethreaded: spec.freethreaded,
        })
    }
}
