//! Error types for pyforge
//!
//! All modules use `PyforgeResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pyforge operations
pub type PyforgeResult<T> = Result<T, PyforgeError>;

/// All errors that can occur in pyforge
#[derive(Error, Debug)]
pub enum PyforgeError {
    // Version resolution errors
    #[error("Invalid version string: \"{raw}\". Could not normalize to a semver range")]
    InvalidVersion { raw: String },

    #[error("No release satisfies the requested range {range}")]
    UnresolvableRange { range: String },

    #[error("Unsupported platform: {0}. pyforge supports Linux, macOS and Windows.")]
    UnsupportedPlatform(String),

    #[error("Building {interpreter} from source is not supported")]
    UnbuildableInterpreter { interpreter: String },

    // Build errors
    #[error("Patch \"{description}\" failed on {path}: {reason}")]
    PatchFailed {
        description: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Build step '{step}' failed: {command} exited with code {code}")]
    BuildStep {
        step: String,
        command: String,
        code: i32,
    },

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Post-install step failed: {0}")]
    PostInstall(String),

    #[error("pip bootstrap failed: {0}")]
    PipBootstrap(String),

    #[error("Build directory error: {0}")]
    BuildDir(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Network errors
    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Failed to extract archive {path}: {reason}")]
    Extract { path: PathBuf, reason: String },

    #[error("Manifest error: {0}")]
    Manifest(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl PyforgeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a build step error
    pub fn build_step(step: impl Into<String>, command: impl Into<String>, code: i32) -> Self {
        Self::BuildStep {
            step: step.into(),
            command: command.into(),
            code,
        }
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from the cache backend rather than the
    /// build itself. Cache failures are reported with their own message
    /// so they are not mistaken for build failures.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Self::CacheBackend(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidVersion { .. } => {
                Some("Examples of valid versions: \"3\", \"3.9\", \"3.8.x\", \"3.2.5\", \"pypy3.9\"")
            }
            Self::UnresolvableRange { .. } => {
                Some("Run: pyforge tags <range> to list available releases")
            }
            Self::UnbuildableInterpreter { .. } => {
                Some("Only CPython can be built from source; use a version the prebuilt manifest supports")
            }
            Self::BuildStep { .. } => Some("Re-run with -vv to see the full build output"),
            _ => None,
        }
    }
}
