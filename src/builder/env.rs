//! Explicit build environment
//!
//! The upstream build scripts are steered through environment variables
//! (CC, CFLAGS, LDFLAGS, SVNVERSION, CL, ...). Rather than mutating the
//! process environment, a [`BuildEnvironment`] is threaded through every
//! configure/compile invocation and fully populated before the configure
//! phase starts.

use std::collections::BTreeMap;

/// Environment variables for one build run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnvironment {
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Append a space-separated token to a flag variable (CFLAGS style)
    pub fn append_flag(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let entry = self.vars.entry(key.into()).or_default();
        if !entry.is_empty() && !entry.ends_with(' ') {
            entry.push(' ');
        }
        entry.push_str(value.as_ref());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces() {
        let mut env = BuildEnvironment::new();
        env.set("CC", "gcc-10");
        env.set("CC", "gcc-9");
        assert_eq!(env.get("CC"), Some("gcc-9"));
    }

    #[test]
    fn append_flag_space_separates() {
        let mut env = BuildEnvironment::new();
        env.append_flag("CFLAGS", "-I/usr/local/include");
        env.append_flag("CFLAGS", "-Wno-implicit-function-declaration");
        assert_eq!(
            env.get("CFLAGS"),
            Some("-I/usr/local/include -Wno-implicit-function-declaration")
        );
    }

    #[test]
    fn append_to_empty_has_no_leading_space() {
        let mut env = BuildEnvironment::new();
        env.append_flag("LDFLAGS", "-L/opt/ssl/lib");
        assert_eq!(env.get("LDFLAGS"), Some("-L/opt/ssl/lib"));
    }
}
