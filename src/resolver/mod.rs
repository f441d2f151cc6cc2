// src/resolver/mod.rs

//! Preference-ordered dependency resolution
//!
//! Given top-level requirements, a candidate pool split into managed and
//! native namespaces, and the set of core package names the user asked for
//! directly, the resolver searches for the first consistent assignment of
//! one candidate per required name. Enumeration walks the depth-monotonic
//! frontier (core packages outer, dependency-only packages nested inside),
//! so more-preferred combinations are always checked first and the first
//! checker success is final.
//!
//! Transitive dependencies discovered by the checker trigger a recursive
//! re-resolution with an augmented requirement list and a copied pool; the
//! combinations-checked counter is carried through and capped.

mod frontier;

use crate::candidate::{ranked_slots, Candidate, CandidatePool, PoolKey};
use crate::error::{Error, Result};
use crate::requirement::{PackageKind, Requirement};
use crate::sources::CandidateSource;
use frontier::DepthFrontier;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, trace};

/// A fully-resolved, internally consistent candidate assignment.
#[derive(Debug, Clone)]
pub struct Solution {
    candidates: Vec<Candidate>,
}

impl Solution {
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }

    pub fn get(&self, kind: PackageKind, name: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| {
            c.meta.name == name
                && match kind {
                    PackageKind::Native => c.origin.is_native(),
                    PackageKind::Managed => !c.origin.is_native(),
                }
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Candidate-source query cache keyed by the normalized requirement value.
/// Invalidated explicitly when the underlying sources change.
#[derive(Default)]
struct SourceCache {
    entries: HashMap<Requirement, Vec<Candidate>>,
}

impl SourceCache {
    fn clear(&mut self) {
        self.entries.clear();
    }
}

pub struct Resolver<'a> {
    source: &'a dyn CandidateSource,
    platform: String,
    arch: String,
    cap: u64,
    cache: SourceCache,
    checked: u64,
}

impl<'a> Resolver<'a> {
    pub fn new(
        source: &'a dyn CandidateSource,
        platform: impl Into<String>,
        arch: impl Into<String>,
        cap: u64,
    ) -> Self {
        Resolver {
            source,
            platform: platform.into(),
            arch: arch.into(),
            cap,
            cache: SourceCache::default(),
            checked: 0,
        }
    }

    /// Number of candidate combinations examined by the last `resolve` call.
    pub fn combinations_checked(&self) -> u64 {
        self.checked
    }

    /// Drop cached candidate-source query results. Must be called when the
    /// underlying sources change between resolutions.
    pub fn invalidate_cache(&mut self) {
        self.cache.clear();
    }

    /// Resolve `requirements` against `pool`. The pool is copied up front;
    /// caller state is never mutated by the search.
    pub fn resolve(
        &mut self,
        requirements: &[Requirement],
        pool: &CandidatePool,
        core_names: &BTreeSet<String>,
    ) -> Result<Solution> {
        self.checked = 0;
        let mut counter = 0u64;
        let result = self.resolve_inner(
            requirements.to_vec(),
            pool.clone(),
            core_names,
            &mut counter,
        );
        self.checked = counter;
        match &result {
            Ok(sol) => debug!(
                packages = sol.len(),
                combinations = counter,
                "resolution succeeded"
            ),
            Err(err) => debug!(combinations = counter, %err, "resolution failed"),
        }
        result
    }

    fn resolve_inner(
        &mut self,
        requirements: Vec<Requirement>,
        mut pool: CandidatePool,
        core_names: &BTreeSet<String>,
        counter: &mut u64,
    ) -> Result<Solution> {
        // Seed or narrow a pool entry per requirement; an empty entry means
        // the requirement is unsatisfiable no matter what else is chosen.
        let mut offenders = Vec::new();
        for req in &requirements {
            let key: PoolKey = (req.kind, req.name.clone());
            let narrowed = if pool.contains(&key) {
                // A seeded entry that narrows to nothing falls back to the
                // sources; it may hold only an installed copy the
                // requirement has outgrown.
                pool.retain_matching(&key, req, &self.platform, &self.arch) > 0
            } else {
                false
            };
            if !narrowed {
                let candidates = self.query(req)?;
                if candidates.is_empty() {
                    offenders.push(req.describe());
                } else {
                    pool.insert(key, candidates);
                }
            }
        }
        if !offenders.is_empty() {
            return Err(Error::unsatisfiable(offenders));
        }

        // Sorted slot lists per required name, sentinel rule applied.
        let keys: BTreeSet<PoolKey> = requirements
            .iter()
            .map(|r| (r.kind, r.name.clone()))
            .collect();
        let mut core_keys = Vec::new();
        let mut dep_keys = Vec::new();
        for key in keys {
            if core_names.contains(&key.1) {
                core_keys.push(key);
            } else {
                dep_keys.push(key);
            }
        }

        let core_slots: Vec<Vec<Option<Candidate>>> = core_keys
            .iter()
            .map(|k| ranked_slots(pool.get(k).unwrap_or(&[])))
            .collect();
        let dep_slots: Vec<Vec<Option<Candidate>>> = dep_keys
            .iter()
            .map(|k| ranked_slots(pool.get(k).unwrap_or(&[])))
            .collect();

        let core_bounds: Vec<usize> = core_slots.iter().map(|s| s.len() - 1).collect();
        let dep_bounds: Vec<usize> = dep_slots.iter().map(|s| s.len() - 1).collect();

        for core_combo in DepthFrontier::new(core_bounds) {
            for dep_combo in DepthFrontier::new(dep_bounds.clone()) {
                *counter += 1;
                if *counter > self.cap {
                    return Err(Error::SearchExhausted {
                        checked: *counter,
                        cap: self.cap,
                    });
                }

                let mut assignment: BTreeMap<&PoolKey, Option<&Candidate>> = BTreeMap::new();
                for (i, key) in core_keys.iter().enumerate() {
                    assignment.insert(key, core_slots[i][core_combo[i]].as_ref());
                }
                for (i, key) in dep_keys.iter().enumerate() {
                    assignment.insert(key, dep_slots[i][dep_combo[i]].as_ref());
                }

                match self.check_assignment(&assignment, &requirements, &pool, core_names, counter)?
                {
                    Some(solution) => return Ok(solution),
                    None => continue,
                }
            }
        }

        Err(Error::NoSolution { checked: *counter })
    }

    /// Validate one complete assignment. `Ok(None)` rejects the combination
    /// without dooming the overall search; transitively discovered
    /// requirements trigger a recursive resolution with the pool copied at
    /// the boundary.
    fn check_assignment(
        &mut self,
        assignment: &BTreeMap<&PoolKey, Option<&Candidate>>,
        requirements: &[Requirement],
        pool: &CandidatePool,
        core_names: &BTreeSet<String>,
        counter: &mut u64,
    ) -> Result<Option<Solution>> {
        // Every requirement on the list must be met by its assigned slot.
        for req in requirements {
            let key: PoolKey = (req.kind, req.name.clone());
            match assignment.get(&key).copied().flatten() {
                Some(candidate) if req.matches(candidate, &self.platform, &self.arch) => {}
                _ => return Ok(None),
            }
        }

        // Collect dependencies declared by the chosen candidates.
        let mut new_requirements: Vec<Requirement> = Vec::new();
        for candidate in assignment.values().copied().flatten() {
            for dep in &candidate.meta.dependencies {
                if requirements.contains(dep) || new_requirements.contains(dep) {
                    continue;
                }
                let dep_key: PoolKey = (dep.kind, dep.name.clone());
                if pool.contains(&dep_key) {
                    // A pool already exists for this name: the current
                    // assignment must already satisfy the dependency or the
                    // combination is invalid.
                    match assignment.get(&dep_key).copied().flatten() {
                        Some(chosen) if dep.matches(chosen, &self.platform, &self.arch) => {}
                        _ => {
                            trace!(dep = %dep.describe(), "assignment fails transitive dependency");
                            return Ok(None);
                        }
                    }
                } else {
                    new_requirements.push(dep.clone());
                }
            }
        }

        if new_requirements.is_empty() {
            let candidates: Vec<Candidate> =
                assignment.values().copied().flatten().cloned().collect();
            return Ok(Some(Solution { candidates }));
        }

        // Fresh names were pulled in: re-resolve with the augmented
        // requirement list. Failure here only rejects this combination.
        debug!(
            new = new_requirements.len(),
            "recursing for transitive dependencies"
        );
        let mut augmented = requirements.to_vec();
        augmented.extend(new_requirements);
        match self.resolve_inner(augmented, pool.clone(), core_names, counter) {
            Ok(solution) => Ok(Some(solution)),
            Err(err @ Error::SearchExhausted { .. }) => Err(err),
            Err(_) => Ok(None),
        }
    }

    fn query(&mut self, req: &Requirement) -> Result<Vec<Candidate>> {
        if let Some(cached) = self.cache.entries.get(req) {
            return Ok(cached.clone());
        }
        let raw = self.source.candidates(&req.name, req.kind)?;
        let filtered: Vec<Candidate> = raw
            .into_iter()
            .filter(|c| req.matches(c, &self.platform, &self.arch))
            .collect();
        self.cache.entries.insert(req.clone(), filtered.clone());
        Ok(filtered)
    }
}
