//! Resolve command - answer a version request without installing

use super::{default_arch, version_input};
use crate::builder::Os;
use crate::catalog::{resolve_tag, TagCatalog};
use crate::cli::args::ResolveArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{PyforgeError, PyforgeResult};
use crate::oracle::{ManifestOracle, PrebuiltOracle};
use crate::toolcache::ToolCache;
use crate::version::{Interpreter, VersionSpec};
use console::style;

/// Execute the resolve command
pub async fn execute(args: ResolveArgs, config: &Config) -> PyforgeResult<()> {
    let version = version_input(args.version.as_deref(), args.version_file.as_deref())?;
    let spec = VersionSpec::parse(&version, args.freethreaded)?;
    let architecture = args
        .arch
        .or_else(|| config.build.architecture.clone())
        .unwrap_or_else(default_arch);
    let allow_prereleases = args.allow_prereleases || config.resolver.allow_prereleases;

    let oracle = ManifestOracle::new(
        config.resolver.manifest_url.clone(),
        ToolCache::new(ConfigManager::tool_cache_dir(config)),
    );

    // Always query the manifest here, the answer should not depend on
    // what happens to be installed already
    if let Some(resolution) = oracle
        .resolve(&spec, &architecture, allow_prereleases, true)
        .await?
    {
        println!(
            "{} {} resolves to prebuilt {}",
            spec.interpreter,
            spec.display_request(),
            style(&resolution.version).green().bold()
        );
        return Ok(());
    }

    if spec.interpreter != Interpreter::CPython {
        return Err(PyforgeError::UnbuildableInterpreter {
            interpreter: spec.interpreter.to_string(),
        });
    }

    let range = spec
        .range()
        .ok_or_else(|| PyforgeError::Internal("CPython request without a range".into()))?;
    let catalog = TagCatalog::bundled()?;
    let prefer_installer = Os::detect()? == Os::Windows;
    let tag = resolve_tag(&catalog, range, prefer_installer).ok_or_else(|| {
        PyforgeError::UnresolvableRange {
            range: range.to_string(),
        }
    })?;
    println!(
        "CPython {} is not available prebuilt, would build {} from source",
        spec.display_request(),
        style(&tag.version).yellow().bold()
    );
    Ok(())
}
