// src/transaction/mod.rs

//! Transaction manager: install / upgrade / remove
//!
//! Each operation is independently lock-guarded and follows the same shape:
//! acquire the repository lock, resolve, detect conflicts, apply, log the
//! installed-set delta. Resolution and lock failures abort before any
//! filesystem mutation; apply-phase failures are isolated per package or per
//! file according to the active force flags.

mod apply;
mod remove;

pub use remove::RemoveOptions;

use crate::candidate::{Candidate, CandidatePool, Origin};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lock::RepoLock;
use crate::requirement::{PackageKind, Requirement};
use crate::resolver::{Resolver, Solution};
use crate::sources::{
    ArchiveService, CandidateSource, HookContext, LifecycleHooks, PlatformAdapter, Reporter,
};
use crate::store::InstalledStore;
use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of one transaction, reported back to the driver.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OpSummary {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    /// Packages already satisfied by the installed set; untouched on disk.
    pub kept: Vec<String>,
}

/// One parsed package request from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Requirement(Requirement),
    /// Exact archive file or URL; bypasses candidate selection by pinning
    /// the pool to the single candidate extracted from the archive.
    Archive(PathBuf),
}

/// Parse a request spec: `name`, `name=V`, `name>=V`, `name<=V`, `name>V`,
/// `name<V`, or a path-like spec pointing at an archive.
pub fn parse_request(spec: &str) -> Result<Request> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::InvalidSpec {
            spec: spec.into(),
            reason: "empty spec".into(),
        });
    }
    if spec.contains('/') || spec.ends_with(".qar") {
        return Ok(Request::Archive(PathBuf::from(spec)));
    }

    for (op, build) in [
        (">=", RequestOp::MinVersion),
        ("<=", RequestOp::MaxVersion),
        (">", RequestOp::Above),
        ("<", RequestOp::Below),
        ("=", RequestOp::Exact),
    ] {
        if let Some(idx) = spec.find(op) {
            let name = &spec[..idx];
            let version = &spec[idx + op.len()..];
            if name.is_empty() || version.is_empty() {
                return Err(Error::InvalidSpec {
                    spec: spec.into(),
                    reason: format!("malformed '{op}' constraint"),
                });
            }
            let mut req = Requirement::named(name);
            match build {
                RequestOp::MinVersion => req.min_version = Some(version.into()),
                RequestOp::MaxVersion => req.max_version = Some(version.into()),
                RequestOp::Above => req.version_above = Some(version.into()),
                RequestOp::Below => req.version_below = Some(version.into()),
                RequestOp::Exact => {
                    req.min_version = Some(version.into());
                    req.max_version = Some(version.into());
                }
            }
            return Ok(Request::Requirement(req));
        }
    }

    Ok(Request::Requirement(Requirement::named(spec)))
}

enum RequestOp {
    MinVersion,
    MaxVersion,
    Above,
    Below,
    Exact,
}

pub struct TransactionManager<'a> {
    config: Config,
    store: InstalledStore,
    lock: RepoLock,
    source: &'a dyn CandidateSource,
    archive: &'a dyn ArchiveService,
    platform: &'a dyn PlatformAdapter,
    hooks: &'a dyn LifecycleHooks,
    reporter: Option<&'a dyn Reporter>,
}

impl<'a> TransactionManager<'a> {
    pub fn new(
        config: Config,
        source: &'a dyn CandidateSource,
        archive: &'a dyn ArchiveService,
        platform: &'a dyn PlatformAdapter,
        hooks: &'a dyn LifecycleHooks,
    ) -> Result<Self> {
        let store = InstalledStore::open(&config)?;
        let lock = RepoLock::new(config.lock_dir(), config.force_lock);
        Ok(TransactionManager {
            config,
            store,
            lock,
            source,
            archive,
            platform,
            hooks,
            reporter: None,
        })
    }

    pub fn with_reporter(mut self, reporter: &'a dyn Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn store(&self) -> &InstalledStore {
        &self.store
    }

    /// Install the requested packages and whatever they transitively need.
    pub fn install(&mut self, requests: &[String]) -> Result<OpSummary> {
        self.lock.acquire()?;
        let result = self.install_inner(requests);
        self.release_lock();
        self.log_outcome("install", &result);
        result
    }

    fn install_inner(&mut self, requests: &[String]) -> Result<OpSummary> {
        let (requirements, mut pool) = self.parse_and_seed(requests)?;
        let core_names: BTreeSet<String> =
            requirements.iter().map(|r| r.name.clone()).collect();

        // Installed packages participate as preferred candidates so an
        // already-satisfied requirement resolves to what is on disk.
        for candidate in self.store.installed_candidates()? {
            let kind = if candidate.origin.is_native() {
                PackageKind::Native
            } else {
                PackageKind::Managed
            };
            pool.seed(kind, candidate);
        }

        self.sanity_check(&requirements, &pool)?;

        let mut resolver = Resolver::new(
            self.source,
            self.config.platform.clone(),
            self.config.arch.clone(),
            self.config.search_cap,
        );
        let solution = resolver.resolve(&requirements, &pool, &core_names)?;

        let force_removals = self.detect_conflicts(&solution)?;
        if !self.confirm(&solution)? {
            info!("install aborted by user");
            return Ok(OpSummary::default());
        }
        for name in &force_removals {
            warn!(package = %name, "removing conflicting package (force-replace)");
            // A full removal: the evicted package's externals run too.
            self.remove_one_by_name(name, false)?;
        }

        let summary = self.apply_solution(&solution, HookContext::Install, &BTreeSet::new())?;
        self.report_delta(&summary);
        Ok(summary)
    }

    /// Upgrade the requested packages (or everything when none are named)
    /// without letting unrelated packages slip backwards.
    pub fn upgrade(&mut self, requests: &[String]) -> Result<OpSummary> {
        self.lock.acquire()?;
        let result = self.upgrade_inner(requests);
        self.release_lock();
        self.log_outcome("upgrade", &result);
        result
    }

    fn upgrade_inner(&mut self, requests: &[String]) -> Result<OpSummary> {
        let (mut requirements, mut pool) = self.parse_and_seed(requests)?;
        let core_names: BTreeSet<String> =
            requirements.iter().map(|r| r.name.clone()).collect();

        // Upgrade targets (the requested names, or every installed package
        // when none are named) are seeded with prefer=false so the installed
        // copy is only kept when nothing better exists, with the sources'
        // candidates merged in alongside since the resolver only queries
        // sources for names absent from the pool. Bystanders keep
        // prefer=true and get a synthetic floor at their installed version,
        // so an upgrade never touches or downgrades an unrelated package.
        let upgrade_all = requests.is_empty();
        let installed = self.store.list()?;
        for pkg in &installed {
            let targeted = upgrade_all || core_names.contains(&pkg.meta.name);
            let mut candidate = Candidate::installed(pkg.meta.clone());
            candidate.prefer = !targeted;
            pool.seed(PackageKind::Managed, candidate);
            if targeted {
                for available in self.source.candidates(&pkg.meta.name, PackageKind::Managed)? {
                    pool.seed(PackageKind::Managed, available);
                }
            }
            if !core_names.contains(&pkg.meta.name) {
                requirements.push(
                    Requirement::named(&pkg.meta.name)
                        .with_min_version(pkg.meta.version.clone()),
                );
            }
        }

        self.sanity_check(&requirements, &pool)?;

        let mut resolver = Resolver::new(
            self.source,
            self.config.platform.clone(),
            self.config.arch.clone(),
            self.config.search_cap,
        );
        let solution = resolver.resolve(&requirements, &pool, &core_names)?;

        // Replacements whose externals text is unchanged skip the external
        // hooks: removing and immediately re-running them is pure churn.
        let mut unchanged_externals = BTreeSet::new();
        for candidate in solution.candidates() {
            if let Some(old) = installed.iter().find(|p| p.meta.name == candidate.meta.name) {
                if old.meta.externals == candidate.meta.externals
                    && candidate.meta.externals.is_some()
                {
                    unchanged_externals.insert(candidate.meta.name.clone());
                }
            }
        }

        let force_removals = self.detect_conflicts(&solution)?;
        if !self.confirm(&solution)? {
            info!("upgrade aborted by user");
            return Ok(OpSummary::default());
        }
        for name in &force_removals {
            warn!(package = %name, "removing conflicting package (force-replace)");
            // A full removal: the evicted package's externals run too.
            self.remove_one_by_name(name, false)?;
        }

        let summary = self.apply_solution(&solution, HookContext::Upgrade, &unchanged_externals)?;
        self.report_delta(&summary);
        Ok(summary)
    }

    /// Parse request specs into requirements, pinning archive requests to a
    /// single extracted candidate.
    fn parse_and_seed(&self, requests: &[String]) -> Result<(Vec<Requirement>, CandidatePool)> {
        let mut requirements = Vec::new();
        let mut pool = CandidatePool::new();
        let mut offenders = Vec::new();

        for spec in requests {
            match parse_request(spec)? {
                Request::Requirement(req) => requirements.push(req),
                Request::Archive(path) => {
                    if !self.archive.verify_checksum(&path)? {
                        offenders.push(format!("{}: checksum mismatch", path.display()));
                        continue;
                    }
                    let meta = self.archive.extract_metadata(&path)?;
                    let name = meta.name.clone();
                    let candidate = Candidate::new(
                        meta,
                        Origin::Source(path.display().to_string()),
                    );
                    pool.insert((PackageKind::Managed, name.clone()), vec![candidate]);
                    requirements.push(Requirement::named(name));
                }
            }
        }

        if !offenders.is_empty() {
            return Err(Error::unsatisfiable(offenders));
        }
        Ok((requirements, pool))
    }

    /// Fail fast, listing every request with no compatible candidate and
    /// every declared dependency with no available candidate at all.
    fn sanity_check(&self, requirements: &[Requirement], pool: &CandidatePool) -> Result<()> {
        let mut offenders = Vec::new();
        let platform = &self.config.platform;
        let arch = &self.config.arch;

        for req in requirements {
            let key = (req.kind, req.name.clone());
            let mut candidates: Vec<Candidate> = match pool.get(&key) {
                Some(list) => list.to_vec(),
                None => self.source.candidates(&req.name, req.kind)?,
            };
            if !candidates.iter().any(|c| req.matches(c, platform, arch))
                && pool.contains(&key)
            {
                // Seeded entries may hold only an installed copy the
                // requirement has outgrown; the sources get the final say.
                candidates = self.source.candidates(&req.name, req.kind)?;
            }
            let matching: Vec<&Candidate> = candidates
                .iter()
                .filter(|c| req.matches(c, platform, arch))
                .collect();
            if matching.is_empty() {
                offenders.push(req.describe());
                continue;
            }
            for candidate in matching {
                for dep in &candidate.meta.dependencies {
                    let dep_key = (dep.kind, dep.name.clone());
                    let available = match pool.get(&dep_key) {
                        Some(list) => list.iter().any(|c| dep.matches(c, platform, arch)),
                        None => self
                            .source
                            .candidates(&dep.name, dep.kind)?
                            .iter()
                            .any(|c| dep.matches(c, platform, arch)),
                    };
                    if !available {
                        offenders.push(format!(
                            "{} (required by {candidate})",
                            dep.describe()
                        ));
                    }
                }
            }
        }

        if offenders.is_empty() {
            Ok(())
        } else {
            offenders.sort();
            offenders.dedup();
            Err(Error::unsatisfiable(offenders))
        }
    }

    /// Package-level conflict detection, symmetric in both directions.
    /// Returns the installed packages to remove first under force-replace;
    /// conflicts inside the solution itself are always fatal.
    fn detect_conflicts(&self, solution: &Solution) -> Result<Vec<String>> {
        let platform = &self.config.platform;
        let arch = &self.config.arch;
        let candidates = solution.candidates();

        let mut fatal = Vec::new();
        for (i, a) in candidates.iter().enumerate() {
            for b in candidates.iter().skip(i + 1) {
                let hit = a.meta.conflicts.iter().any(|r| r.matches(b, platform, arch))
                    || b.meta.conflicts.iter().any(|r| r.matches(a, platform, arch));
                if hit {
                    fatal.push(format!("{a} conflicts with {b} within the same solution"));
                }
            }
        }
        if !fatal.is_empty() {
            return Err(Error::conflict(fatal));
        }

        let mut replaceable = Vec::new();
        let mut blocking = Vec::new();
        for pkg in self.store.list()? {
            let installed = Candidate::installed(pkg.meta.clone());
            for new in candidates {
                if new.meta.name == pkg.meta.name {
                    continue; // replacement of itself, not a conflict
                }
                let hit = new
                    .meta
                    .conflicts
                    .iter()
                    .any(|r| r.matches(&installed, platform, arch))
                    || pkg
                        .meta
                        .conflicts
                        .iter()
                        .any(|r| r.matches(new, platform, arch));
                if hit {
                    if self.config.force_replace {
                        replaceable.push(pkg.meta.name.clone());
                    } else {
                        blocking.push(format!("{new} conflicts with installed {}", installed));
                    }
                }
            }
        }
        if !blocking.is_empty() {
            return Err(Error::conflict(blocking));
        }
        replaceable.sort();
        replaceable.dedup();
        Ok(replaceable)
    }

    fn confirm(&self, solution: &Solution) -> Result<bool> {
        if self.config.assume_yes {
            return Ok(true);
        }
        let mut out = std::io::stdout().lock();
        writeln!(out, "The following packages will be processed:")?;
        for candidate in solution.candidates() {
            writeln!(out, "  {candidate}")?;
        }
        write!(out, "Proceed? [y/N] ")?;
        out.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(matches!(line.trim(), "y" | "Y" | "yes"))
    }

    /// Gate a hook exit status through the global force flag.
    fn hook_gate(&self, package: &str, phase: &'static str, status: i32) -> Result<()> {
        if status == 0 {
            return Ok(());
        }
        if self.config.force {
            warn!(package, phase, status, "hook failed; continuing under --force");
            Ok(())
        } else {
            Err(Error::HookFailure {
                package: package.to_string(),
                phase,
                status,
            })
        }
    }

    fn release_lock(&mut self) {
        if let Err(e) = self.lock.release() {
            warn!(error = %e, "failed to release repository lock");
        }
    }

    fn report_delta(&self, summary: &OpSummary) {
        if summary.installed.is_empty() && summary.removed.is_empty() {
            return;
        }
        let delta = format!(
            "installed=[{}] removed=[{}]",
            summary.installed.join(","),
            summary.removed.join(",")
        );
        info!(%delta, "installed-set delta");
        if let Some(reporter) = self.reporter {
            // Reporting is best-effort; a slow or dead collector never
            // blocks the operation's outcome.
            if let Err(e) = reporter.report(&delta) {
                warn!(error = %e, "usage report failed");
            }
        }
    }

    fn log_outcome(&self, op: &str, result: &Result<OpSummary>) {
        match result {
            Ok(summary) => info!(
                op,
                installed = summary.installed.len(),
                removed = summary.removed.len(),
                kept = summary.kept.len(),
                "transaction complete"
            ),
            Err(e) => warn!(op, error = %e, "transaction failed"),
        }
    }
}
