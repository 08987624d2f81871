//! Configuration schema for pyforge
//!
//! Configuration is stored at `~/.config/pyforge/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Prebuilt resolution settings
    pub resolver: ResolverConfig,

    /// Source build settings
    pub build: BuildConfig,

    /// Build cache settings
    pub cache: CacheConfig,

    /// Tool cache settings
    pub toolcache: ToolCacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging (equivalent to -vv on the command line)
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Prebuilt resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Manifest of prebuilt CPython distributions
    pub manifest_url: String,

    /// Release tag catalog to refresh from
    pub catalog_url: String,

    /// Re-query the manifest even when a matching version is already
    /// in the tool cache
    pub check_latest: bool,

    /// Let prerelease versions satisfy x.y requests
    pub allow_prereleases: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            manifest_url: crate::oracle::DEFAULT_MANIFEST_URL.to_string(),
            catalog_url: crate::catalog::DEFAULT_CATALOG_URL.to_string(),
            check_latest: false,
            allow_prereleases: false,
        }
    }
}

/// Source build settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// What to do when a source build is needed:
    /// "allow", "info", "warn", "error" or "force"
    pub behavior: String,

    /// Target architecture, detected from the host when unset
    pub architecture: Option<String>,

    /// Where build work directories are created, system temp when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            behavior: "info".to_string(),
            architecture: None,
            temp_dir: None,
        }
    }
}

/// Build cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache finished builds (default: true)
    pub enabled: bool,

    /// Cache directory, `~/.cache/pyforge/builds` when unset
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Tool cache settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCacheConfig {
    /// Root of the installed-tools tree, `~/.local/share/pyforge/tools`
    /// when unset
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[resolver]"));
        assert!(toml.contains("[build]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.build.behavior, "info");
        assert!(config.cache.enabled);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [build]
            behavior = "error"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.build.behavior, "error");
        assert!(config.cache.enabled); // default preserved
    }
}
