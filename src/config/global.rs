//! Process-wide configuration.

use std::path::Path;
use std::sync::OnceLock;

use parking_lot::RwLock;

use super::Config;
use crate::errors::Result;

static GLOBAL_CFG: OnceLock<RwLock<Config>> = OnceLock::new();

fn global() -> &'static RwLock<Config> {
    GLOBAL_CFG.get_or_init(|| RwLock::new(Config::default()))
}

/// Returns a snapshot of the global configuration.
pub fn cfg() -> Config {
    global().read().clone()
}

/// Replaces the global configuration.
pub fn set_cfg(config: Config) {
    *global().write() = config;
}

/// Mutates a copy of the global configuration and stores it back.
///
/// No lock is held while `f` runs, so it may read the global
/// configuration. Concurrent updates are last-writer-wins.
pub fn update_cfg<F: FnOnce(&mut Config)>(f: F) {
    let mut updated = cfg();
    f(&mut updated);
    set_cfg(updated);
}

/// Restores the default configuration.
pub fn reset_cfg() {
    set_cfg(Config::default());
}

/// Merges a YAML file into the global configuration.
pub fn load_cfg_from_file(path: impl AsRef<Path>) -> Result<()> {
    let mut guard = global().write();
    let mut merged = guard.clone();
    merged.merge_from_file(path)?;
    *guard = merged;
    Ok(())
}

/// Merges `KEY.PATH value` pairs into the global configuration.
pub fn merge_cfg_from_list<S: AsRef<str>>(opts: &[S]) -> Result<()> {
    let mut guard = global().write();
    guard.merge_from_list(opts)
}
