// src/transaction/apply.rs

//! Apply phase: bring the filesystem in line with a resolved solution
//!
//! Candidates are applied in dependency-readiness order: a candidate is only
//! applied once every name it depends on is already present in the
//! "installed so far" set for this run. Candidates whose dependencies are
//! not ready yet rotate to the back of the queue; resolution already
//! guarantees an acyclic-satisfiable assignment, so the rotation terminates.

use super::{OpSummary, TransactionManager};
use crate::candidate::{Candidate, Origin};
use crate::error::{Error, Result};
use crate::sources::{HookContext, UnpackOptions};
use crate::store::{sha256_file, FileRecord, InstalledPackage};
use chrono::Utc;
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// Order candidates so each one follows everything it depends on within the
/// batch. A rotating queue, not a full graph traversal: candidates not yet
/// ready are deferred to the back, and a full rotation without progress
/// flushes the remainder (possible only with dependency cycles, which the
/// resolver does not produce for satisfiable inputs).
pub(crate) fn ready_order(
    candidates: Vec<Candidate>,
    already_present: &BTreeSet<String>,
) -> Vec<Candidate> {
    let batch_names: BTreeSet<String> = candidates
        .iter()
        .map(|c| c.meta.name.clone())
        .collect();
    let mut present = already_present.clone();
    let mut queue: std::collections::VecDeque<Candidate> = candidates.into();
    let mut ordered = Vec::with_capacity(queue.len());
    let mut stalled = 0usize;

    while let Some(candidate) = queue.pop_front() {
        let ready = candidate.meta.dependencies.iter().all(|dep| {
            dep.name == candidate.meta.name
                || !batch_names.contains(&dep.name)
                || present.contains(&dep.name)
        });
        if ready {
            present.insert(candidate.meta.name.clone());
            ordered.push(candidate);
            stalled = 0;
        } else {
            stalled += 1;
            if stalled > queue.len() {
                warn!(
                    package = %candidate,
                    "dependency order unresolved; applying remainder as queued"
                );
                ordered.push(candidate);
                ordered.extend(queue.drain(..));
                break;
            }
            queue.push_back(candidate);
        }
    }
    ordered
}

impl<'a> TransactionManager<'a> {
    /// Apply every candidate in the solution. Candidates already installed
    /// are kept untouched; native candidates go through the platform
    /// adapter; managed candidates unpack, run hooks, and get recorded.
    pub(crate) fn apply_solution(
        &mut self,
        solution: &crate::resolver::Solution,
        ctx: HookContext,
        unchanged_externals: &BTreeSet<String>,
    ) -> Result<OpSummary> {
        let mut summary = OpSummary::default();
        let mut to_apply = Vec::new();
        for candidate in solution.candidates() {
            match candidate.origin {
                // Already on disk: nothing to mutate.
                Origin::Installed | Origin::NativeInstalled => {
                    summary.kept.push(candidate.meta.name.clone());
                }
                _ => to_apply.push(candidate.clone()),
            }
        }

        let installed_names: BTreeSet<String> = self
            .store()
            .list()?
            .into_iter()
            .map(|p| p.meta.name)
            .collect();

        for candidate in ready_order(to_apply, &installed_names) {
            let name = candidate.meta.name.clone();
            if candidate.origin == Origin::NativeAvailable {
                debug!(package = %candidate, "delegating to native package manager");
                match ctx {
                    HookContext::Upgrade => self.platform.upgrade_native(&candidate)?,
                    _ => self.platform.install_native(&candidate)?,
                }
                summary.installed.push(name);
                continue;
            }

            // Replacing an installed copy: the old package comes out first,
            // optionally skipping externals that have not changed.
            if self.store().get(&name)?.is_some() {
                let skip_externals = unchanged_externals.contains(&name);
                self.remove_one_by_name(&name, skip_externals)?;
                summary.removed.push(name.clone());
            }

            self.apply_managed(&candidate, ctx, unchanged_externals)?;
            summary.installed.push(name);
        }

        Ok(summary)
    }

    fn apply_managed(
        &mut self,
        candidate: &Candidate,
        ctx: HookContext,
        unchanged_externals: &BTreeSet<String>,
    ) -> Result<()> {
        let name = &candidate.meta.name;
        let archive_path = match &candidate.origin {
            Origin::Source(locator) => Path::new(locator).to_path_buf(),
            other => {
                return Err(Error::Archive(format!(
                    "candidate {candidate} has no archive locator (origin {other:?})"
                )))
            }
        };

        let dest = self.config.install_root.clone();
        let options = UnpackOptions {
            dest: dest.clone(),
            preserve: Vec::new(),
        };

        let status = self.hooks.pre_install(&candidate.meta, &dest, ctx)?;
        self.hook_gate(name, "pre-install", status)?;

        info!(package = %candidate, "unpacking");
        let exit = self.archive.unpack(&archive_path, &options)?;
        if exit != 0 {
            return Err(Error::Archive(format!(
                "unpack of {} exited with status {exit}",
                archive_path.display()
            )));
        }

        let listing = self.archive.list_files(&archive_path)?;
        let mut files = Vec::new();
        for path in listing.root.iter().chain(listing.reloc.iter()) {
            let sha256 = match sha256_file(path) {
                Ok(h) => h,
                Err(e) => {
                    self.privilege_gate(&format!("hashing {}", path.display()), &e)?;
                    String::new()
                }
            };
            files.push(FileRecord {
                path: path.clone(),
                sha256,
                config: is_config_path(path),
            });
        }

        if candidate.meta.externals.is_some() && !unchanged_externals.contains(name.as_str()) {
            let status = self.hooks.run_externals(&candidate.meta, ctx)?;
            self.hook_gate(name, "externals", status)?;
        }

        if let Err(e) = self.platform.link_service_artifacts(&candidate.meta) {
            if self.config.force {
                warn!(package = %candidate, error = %e, "service-artifact linking failed");
            } else {
                return Err(Error::HookFailure {
                    package: name.clone(),
                    phase: "init-script",
                    status: 1,
                });
            }
        }

        let status = self.hooks.post_install(&candidate.meta, &dest, ctx)?;
        self.hook_gate(name, "post-install", status)?;

        self.store().record(&InstalledPackage {
            meta: candidate.meta.clone(),
            filename: candidate.meta.filename(),
            files,
            installed_at: Utc::now(),
        })?;
        Ok(())
    }

    /// Ownership/permission failures are best-effort for unprivileged
    /// callers and fatal for privileged ones.
    pub(crate) fn privilege_gate(&self, what: &str, err: &Error) -> Result<()> {
        let denied = matches!(err, Error::Io(e) if e.kind() == ErrorKind::PermissionDenied);
        if !denied {
            return Ok(());
        }
        if nix::unistd::geteuid().is_root() {
            Err(Error::PrivilegeDenied(what.to_string()))
        } else {
            warn!(what, "permission denied; continuing without privilege");
            Ok(())
        }
    }
}

/// Files under an `etc/` component are treated as config-type for the
/// modified-file preservation rule.
fn is_config_path(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "etc" || c.as_os_str() == "conf")
}
