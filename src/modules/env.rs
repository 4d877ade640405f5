//! Environment access for the bootstrap.
//!
//! The preload and password variables are the only configuration that flows
//! through the process environment. Everything that reads or mutates them
//! goes through [`Environment`], so the real process environment is touched
//! only at the extraction points and tests can run against [`MemoryEnv`].

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Narrow view of a process environment.
pub trait Environment {
    /// Returns the value of `key`, if set.
    fn var(&self, key: &str) -> Option<OsString>;

    /// Sets `key` to `value`.
    fn set_var(&mut self, key: &str, value: &OsStr);

    /// Removes `key` and returns the value it held.
    fn take_var(&mut self, key: &str) -> Option<OsString>;

    /// Snapshot of every variable, used when replacing the process image.
    fn vars(&self) -> Vec<(OsString, OsString)>;

    /// Whether `key` is set at all.
    fn contains(&self, key: &str) -> bool {
        self.var(key).is_some()
    }
}

/// The environment of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }

    fn set_var(&mut self, key: &str, value: &OsStr) {
        std::env::set_var(key, value);
    }

    fn take_var(&mut self, key: &str) -> Option<OsString> {
        let value = std::env::var_os(key);
        if value.is_some() {
            std::env::remove_var(key);
        }
        value
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        std::env::vars_os().collect()
    }
}

/// An environment held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryEnv {
    vars: BTreeMap<OsString, OsString>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl Environment for MemoryEnv {
    fn var(&self, key: &str) -> Option<OsString> {
        self.vars.get(OsStr::new(key)).cloned()
    }

    fn set_var(&mut self, key: &str, value: &OsStr) {
        self.vars.insert(key.into(), value.to_os_string());
    }

    fn take_var(&mut self, key: &str) -> Option<OsString> {
        self.vars.remove(OsStr::new(key))
    }

    fn vars(&self) -> Vec<(OsString, OsString)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_var_removes_entry() {
        let mut env = MemoryEnv::new().with("KEY", "value");
        assert_eq!(env.take_var("KEY"), Some(OsString::from("value")));
        assert!(!env.contains("KEY"));
        assert_eq!(env.take_var("KEY"), None);
    }

    #[test]
    fn test_vars_snapshot() {
        let mut env = MemoryEnv::new().with("A", "1");
        env.set_var("B", OsStr::new("2"));
        let vars = env.vars();
        assert_eq!(vars.len(), 2);
        assert!(vars.contains(&(OsString::from("B"), OsString::from("2"))));
    }
}
