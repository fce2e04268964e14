use crate::error::{FlowlineError, Result};
use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Scoped mutation of process environment variables
///
/// Every variable touched through the guard is snapshotted on first use and
/// restored (or removed again) when the guard is dropped.
#[derive(Debug, Default)]
pub struct EnvGuard {
    saved: Vec<(String, Option<OsString>)>,
}

impl EnvGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl AsRef<OsStr>) {
        self.snapshot(key);
        std::env::set_var(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.snapshot(key);
        std::env::remove_var(key);
    }

    /// Put `dirs` in front of a search-path variable such as `PATH`
    pub fn prepend_paths(&mut self, key: &str, dirs: &[&Path]) -> Result<()> {
        let current = std::env::var_os(key).unwrap_or_default();
        let mut entries: Vec<std::path::PathBuf> = dirs.iter().map(|d| d.to_path_buf()).collect();
        entries.extend(std::env::split_paths(&current));

        let joined = std::env::join_paths(entries).map_err(|e| {
            FlowlineError::Config(format!("Cannot extend {}: {}", key, e))
        })?;
        self.set(key, joined);
        Ok(())
    }

    pub fn touched(&self) -> usize {
        self.saved.len()
    }

    fn snapshot(&mut self, key: &str) {
        if !self.saved.iter().any(|(k, _)| k == key) {
            self.saved.push((key.to_string(), std::env::var_os(key)));
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        if self.saved.is_empty() {
            return;
        }
        for (key, value) in self.saved.drain(..).rev() {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
        log::debug!("Restored provisioning environment variables");
    }
}
