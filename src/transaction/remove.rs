// src/transaction/remove.rs

//! Remove phase
//!
//! Targets resolve by name, by exact archive filename, or to the whole
//! installed set when unspecified. Unless dependents are being removed too,
//! removal refuses to orphan any other installed package's dependency and
//! lists every offender at once. File deletion is best-effort: individual
//! failures are warnings, and directories are deleted in reverse-path order
//! so they empty out before their own removal is attempted.

use super::{OpSummary, TransactionManager};
use crate::error::{Error, Result};
use crate::sources::HookContext;
use crate::store::InstalledPackage;
use std::collections::BTreeSet;
use std::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    /// Transitively remove installed packages that depend on the targets
    /// instead of refusing.
    pub remove_dependents: bool,
}

impl<'a> TransactionManager<'a> {
    /// Remove the requested packages (all installed packages when the
    /// request list is empty).
    pub fn remove(&mut self, requests: &[String], options: RemoveOptions) -> Result<OpSummary> {
        self.lock.acquire()?;
        let result = self.remove_inner(requests, options);
        self.release_lock();
        self.log_outcome("remove", &result);
        result
    }

    fn remove_inner(&mut self, requests: &[String], options: RemoveOptions) -> Result<OpSummary> {
        let installed = self.store().list()?;

        let mut targets: BTreeSet<String> = BTreeSet::new();
        if requests.is_empty() {
            targets.extend(installed.iter().map(|p| p.meta.name.clone()));
        } else {
            let mut missing = Vec::new();
            for request in requests {
                match installed
                    .iter()
                    .find(|p| p.meta.name == *request || p.filename == *request)
                {
                    Some(pkg) => {
                        targets.insert(pkg.meta.name.clone());
                    }
                    None => missing.push(request.clone()),
                }
            }
            if !missing.is_empty() {
                return Err(Error::unsatisfiable(
                    missing.into_iter().map(|m| format!("{m}: not installed")),
                ));
            }
        }

        if options.remove_dependents {
            self.expand_dependents(&installed, &mut targets)?;
        } else {
            self.check_orphans(&installed, &targets)?;
        }

        let mut summary = OpSummary::default();
        for name in &targets {
            self.remove_one_by_name(name, false)?;
            summary.removed.push(name.clone());
        }
        self.report_delta(&summary);
        Ok(summary)
    }

    /// Grow the target set with everything that transitively depends on it,
    /// using the derived filename -> dependents index.
    fn expand_dependents(
        &self,
        installed: &[InstalledPackage],
        targets: &mut BTreeSet<String>,
    ) -> Result<()> {
        let dep_map = self.store().dependency_map()?;
        let mut frontier: Vec<String> = targets.iter().cloned().collect();
        while let Some(name) = frontier.pop() {
            let Some(pkg) = installed.iter().find(|p| p.meta.name == name) else {
                continue;
            };
            if let Some(dependents) = dep_map.get(&pkg.filename) {
                for dependent in dependents {
                    if targets.insert(dependent.clone()) {
                        debug!(package = %dependent, "pulled in as dependent for removal");
                        frontier.push(dependent.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Refuse to leave any surviving package's dependency unsatisfied,
    /// listing every offender in one error.
    fn check_orphans(
        &self,
        installed: &[InstalledPackage],
        targets: &BTreeSet<String>,
    ) -> Result<()> {
        let mut offenders = Vec::new();
        for pkg in installed {
            if targets.contains(&pkg.meta.name) {
                continue;
            }
            for dep in &pkg.meta.dependencies {
                if targets.contains(&dep.name) {
                    offenders.push(format!(
                        "{} still depends on {}",
                        pkg.meta.name, dep.name
                    ));
                }
            }
        }
        if offenders.is_empty() {
            Ok(())
        } else {
            Err(Error::WouldBreakDependents {
                details: offenders
                    .iter()
                    .map(|o| format!("  - {o}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
        }
    }

    /// Remove one installed package: hooks, service artifacts, files (with
    /// locally modified config files preserved), then the stored state.
    pub(crate) fn remove_one_by_name(&mut self, name: &str, skip_externals: bool) -> Result<()> {
        let Some(pkg) = self.store().get(name)? else {
            return Err(Error::NotInstalled(name.to_string()));
        };
        let workdir = self.config.installed_dir();

        let status = self.hooks.pre_remove(&pkg.meta, &workdir)?;
        self.hook_gate(name, "pre-remove", status)?;

        if let Err(e) = self.platform.unlink_service_artifacts(&pkg.meta) {
            if self.config.force {
                warn!(package = name, error = %e, "service-artifact unlinking failed");
            } else {
                return Err(Error::HookFailure {
                    package: name.to_string(),
                    phase: "init-script",
                    status: 1,
                });
            }
        }

        if pkg.meta.externals.is_some() && !skip_externals {
            let status = self.hooks.run_externals(&pkg.meta, HookContext::Remove)?;
            self.hook_gate(name, "externals", status)?;
        }

        let preserved: BTreeSet<_> = self
            .store()
            .modified_config_files(&pkg)
            .into_iter()
            .collect();
        for path in &preserved {
            info!(path = %path.display(), "preserving locally modified config file");
        }

        // Reverse-path order empties directories before the directory entry
        // itself comes up; a still-populated directory is tolerated.
        let mut paths: Vec<_> = pkg
            .files
            .iter()
            .map(|f| f.path.clone())
            .filter(|p| !preserved.contains(p))
            .collect();
        paths.sort();
        paths.reverse();
        for path in paths {
            let outcome = match fs::symlink_metadata(&path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir(&path),
                Ok(_) => fs::remove_file(&path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                // Partial cleanup failure is never fatal.
                warn!(path = %path.display(), error = %e, "could not remove file");
            }
        }

        let status = self.hooks.post_remove(&pkg.meta, &workdir)?;
        self.hook_gate(name, "post-remove", status)?;

        self.store().remove_record(name)?;
        info!(package = name, "removed");
        Ok(())
    }
}
