//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Pyforge - CPython provisioning with a source-build fallback
///
/// Resolves a Python version request against the prebuilt
/// distribution manifest and, when nothing prebuilt matches, builds
/// the release from source and caches the result.
#[derive(Parser, Debug)]
#[command(name = "pyforge")]
#[command(author, version, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "PYFORGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a Python version, building from source when needed
    Install(InstallArgs),

    /// Resolve a version request without installing anything
    Resolve(ResolveArgs),

    /// List the known CPython release tags
    Tags(TagsArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Version request (e.g. 3.11, 3.9.13, pypy3.9, graalpy24.1)
    #[arg(id = "version-request", value_name = "VERSION")]
    pub version: Option<String>,

    /// Read the version request from a file
    #[arg(long)]
    pub version_file: Option<PathBuf>,

    /// Target architecture (defaults to the host architecture)
    #[arg(short, long)]
    pub arch: Option<String>,

    /// Source-build policy: allow, info, warn, error or force
    #[arg(long)]
    pub build: Option<String>,

    /// Skip the build cache for this run
    #[arg(long)]
    pub no_cache: bool,

    /// Query the manifest even when a matching version is already
    /// installed
    #[arg(long)]
    pub check_latest: bool,

    /// Let prerelease versions satisfy x.y requests
    #[arg(long)]
    pub allow_prereleases: bool,

    /// Request a free-threaded interpreter
    #[arg(long)]
    pub freethreaded: bool,
}

/// Arguments for the resolve command
#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Version request (e.g. 3.11, 3.9.13, pypy3.9, graalpy24.1)
    #[arg(id = "version-request", value_name = "VERSION")]
    pub version: Option<String>,

    /// Read the version request from a file
    #[arg(long)]
    pub version_file: Option<PathBuf>,

    /// Target architecture (defaults to the host architecture)
    #[arg(short, long)]
    pub arch: Option<String>,

    /// Let prerelease versions satisfy x.y requests
    #[arg(long)]
    pub allow_prereleases: bool,

    /// Request a free-threaded interpreter
    #[arg(long)]
    pub freethreaded: bool,
}

/// Arguments for the tags command
#[derive(Parser, Debug)]
pub struct TagsArgs {
    /// Only list tags matching this version request
    pub range: Option<String>,

    /// Fetch the current catalog instead of the vendored one
    #[arg(long)]
    pub refresh: bool,

    /// Only list tags with an official installer
    #[arg(long)]
    pub installer_only: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_install() {
        let cli = Cli::parse_from(["pyforge", "install", "3.11"]);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.version.as_deref(), Some("3.11"));
                assert!(!args.no_cache);
            }
            _ => panic!("expected Install command"),
        }
    }

    #[test]
    fn cli_parses_install_flags() {
        let cli = Cli::parse_from([
            "pyforge",
            "install",
            "3.6",
            "--build",
            "allow",
            "--no-cache",
            "--arch",
            "x64",
        ]);
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.build.as_deref(), Some("allow"));
                assert!(args.no_cache);
                assert_eq!(args.arch.as_deref(), Some("x64"));
            }
            _ => panic!("expected Install command"),
        }
    }

    #[test]
    fn cli_parses_version_file() {
        let cli = Cli::parse_from(["pyforge", "install", "--version-file", ".python-version"]);
        match cli.command {
            Commands::Install(args) => {
                assert!(args.version.is_none());
                assert_eq!(
                    args.version_file.as_deref(),
                    Some(std::path::Path::new(".python-version"))
                );
            }
            _ => panic!("expected Install command"),
        }
    }

    #[test]
    fn cli_parses_resolve() {
        let cli = Cli::parse_from(["pyforge", "resolve", "pypy3.9"]);
        match cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.version.as_deref(), Some("pypy3.9"));
            }
            _ => panic!("expected Resolve command"),
        }
    }

    #[test]
    fn cli_parses_tags() {
        let cli = Cli::parse_from(["pyforge", "tags", "3.9", "--installer-only"]);
        match cli.command {
            Commands::Tags(args) => {
                assert_eq!(args.range.as_deref(), Some("3.9"));
                assert!(args.installer_only);
                assert!(!args.refresh);
            }
            _ => panic!("expected Tags command"),
        }
    }

    #[test]
    fn cli_parses_config_show() {
        let cli = Cli::parse_from(["pyforge", "config", "show"]);
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(args.action, Some(ConfigAction::Show)));
            }
            _ => panic!("expected Config command"),
        }
    }

    #[test]
    fn cli_parses_completions() {
        let cli = Cli::parse_from(["pyforge", "completions", "bash"]);
        assert!(matches!(cli.command, Commands::Completions { .. }));
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["pyforge", "tags"]);
        assert_eq!(cli.verbose, 0);

        let cli = Cli::parse_from(["pyforge", "-v", "tags"]);
        assert_eq!(cli.verbose, 1);

        let cli = Cli::parse_from(["pyforge", "-vv", "tags"]);
        assert_eq!(cli.verbose, 2);
    }
}
