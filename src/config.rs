// src/config.rs

//! Runtime configuration threaded through every operation
//!
//! There are no process-wide flags; every force/prompt decision lives on this
//! value and travels with the transaction manager instance.

use std::path::PathBuf;
use std::time::Duration;

/// Default cap on candidate combinations the resolver may examine.
pub const DEFAULT_SEARCH_CAP: u64 = 10_000;

/// A lock marker older than this is considered stale and may be taken over.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the persisted state tree (installed/, cache/, lock/).
    pub state_dir: PathBuf,
    /// Filesystem root packages are unpacked under.
    pub install_root: PathBuf,
    /// Identifier of the running platform, e.g. "linux-gnu".
    pub platform: String,
    /// Identifier of the running architecture, e.g. "x86_64".
    pub arch: String,
    /// Hook failures become warnings instead of aborting.
    pub force: bool,
    /// Remove conflicting installed packages instead of failing.
    pub force_replace: bool,
    /// Take over the repository lock even if it looks live.
    pub force_lock: bool,
    /// Skip interactive confirmation.
    pub assume_yes: bool,
    /// Resolver combination cap.
    pub search_cap: u64,
}

impl Config {
    pub fn new(state_dir: PathBuf, platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            state_dir,
            install_root: PathBuf::from("/"),
            platform: platform.into(),
            arch: arch.into(),
            force: false,
            force_replace: false,
            force_lock: false,
            assume_yes: false,
            search_cap: DEFAULT_SEARCH_CAP,
        }
    }

    pub fn installed_dir(&self) -> PathBuf {
        self.state_dir.join("installed")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir.join("cache")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.state_dir.join("lock")
    }
}
