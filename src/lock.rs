// src/lock.rs

//! Repository lock
//!
//! Cross-process mutual exclusion over the installed-package state, built on
//! atomic directory creation as the compare-and-swap primitive. A marker
//! directory holds a `pid` file naming the owner. The lock is reentrant
//! within one process via a counter, so nested operations (upgrade invoking
//! remove) do not deadlock themselves. A marker whose recorded process is
//! gone, or which is older than the staleness threshold, may be taken over;
//! a force flag takes it over unconditionally.

use crate::config::LOCK_STALE_AFTER;
use crate::error::{Error, Result};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::{debug, warn};

pub struct RepoLock {
    dir: PathBuf,
    held: u32,
    force: bool,
}

impl RepoLock {
    pub fn new(dir: PathBuf, force: bool) -> Self {
        RepoLock {
            dir,
            held: 0,
            force,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held > 0
    }

    /// Acquire the lock, incrementing the reentrancy counter if this process
    /// already holds it.
    pub fn acquire(&mut self) -> Result<()> {
        if self.held > 0 {
            self.held += 1;
            return Ok(());
        }

        // One takeover attempt: if the marker is stale or forced we remove
        // it and try the create exactly once more.
        let mut reclaimed = false;
        loop {
            match fs::create_dir(&self.dir) {
                Ok(()) => {
                    fs::write(self.dir.join("pid"), std::process::id().to_string())?;
                    self.held = 1;
                    debug!(dir = %self.dir.display(), "repository lock acquired");
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists && !reclaimed => {
                    let owner = self.read_owner();
                    if self.force || !Self::owner_alive(owner) || self.marker_stale() {
                        warn!(
                            dir = %self.dir.display(),
                            owner,
                            forced = self.force,
                            "removing stale repository lock"
                        );
                        fs::remove_dir_all(&self.dir)?;
                        reclaimed = true;
                        continue;
                    }
                    return Err(Error::LockHeld {
                        pid: owner,
                        path: self.dir.clone(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release one level of the lock; the marker is removed when the
    /// reentrancy count returns to zero. Releasing while not held is a
    /// warning, not an error: partial-failure paths may unwind with
    /// mismatched call sequences.
    pub fn release(&mut self) -> Result<()> {
        if self.held == 0 {
            warn!(dir = %self.dir.display(), "release called while lock not held");
            return Ok(());
        }
        self.held -= 1;
        if self.held == 0 {
            fs::remove_dir_all(&self.dir)?;
            debug!(dir = %self.dir.display(), "repository lock released");
        }
        Ok(())
    }

    fn read_owner(&self) -> i32 {
        fs::read_to_string(self.dir.join("pid"))
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    fn owner_alive(pid: i32) -> bool {
        if pid <= 0 {
            return false;
        }
        // Signal 0 probes for existence without delivering anything.
        kill(Pid::from_raw(pid), None).is_ok()
    }

    fn marker_stale(&self) -> bool {
        let age = fs::metadata(&self.dir)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
        matches!(age, Some(d) if d > LOCK_STALE_AFTER)
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if self.held > 0 {
            self.held = 0;
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}
