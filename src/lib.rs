//! Pyforge - CPython provisioning with a source-build fallback
//!
//! Resolves abstract Python version requests against the prebuilt
//! distribution manifest and, when nothing prebuilt matches, builds the
//! requested CPython release from source, caching the finished build.

pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod oracle;
pub mod orchestrator;
pub mod toolcache;
pub mod version;

pub use error::{PyforgeError, PyforgeResult};
