//! Install command - resolve a version and install it

use super::{default_arch, version_input};
use crate::cli::args::InstallArgs;
use crate::config::{Config, ConfigManager};
use crate::error::PyforgeResult;
use crate::catalog::TagCatalog;
use crate::oracle::ManifestOracle;
use crate::orchestrator::{BuildBehavior, Orchestrator, RunRequest};
use crate::toolcache::ToolCache;
use console::style;

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> PyforgeResult<()> {
    let version = version_input(args.version.as_deref(), args.version_file.as_deref())?;
    let architecture = args
        .arch
        .or_else(|| config.build.architecture.clone())
        .unwrap_or_else(default_arch);
    let build_behavior: BuildBehavior = args
        .build
        .as_deref()
        .unwrap_or(config.build.behavior.as_str())
        .parse()?;

    let tool_cache_dir = ConfigManager::tool_cache_dir(config);
    let oracle = ManifestOracle::new(
        config.resolver.manifest_url.clone(),
        ToolCache::new(tool_cache_dir.clone()),
    );
    let orchestrator = Orchestrator::new(
        Box::new(oracle),
        TagCatalog::bundled()?,
        ToolCache::new(tool_cache_dir),
        ConfigManager::build_cache_dir(config),
        config.build.temp_dir.clone(),
    );

    let request = RunRequest {
        version_input: version,
        architecture,
        cache_enabled: config.cache.enabled && !args.no_cache,
        build_behavior,
        check_latest: args.check_latest || config.resolver.check_latest,
        allow_prereleases: args.allow_prereleases || config.resolver.allow_prereleases,
        freethreaded: args.freethreaded,
    };

    let outcome = orchestrator.run(&request).await?;
    println!(
        "{} Python {} ({})",
        style("Installed").green().bold(),
        outcome.resolved_version,
        outcome.architecture
    );
    Ok(())
}
