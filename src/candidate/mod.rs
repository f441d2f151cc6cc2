// src/candidate/mod.rs

//! Candidate packages, their metadata, and the preference ranking
//!
//! A `Candidate` is one concrete installable package version from some
//! origin. Pools map package names to candidate lists, partitioned into the
//! managed and native namespaces. The ranking here drives both "pick the
//! best candidate" and the resolver's enumeration order.

use crate::requirement::{PackageKind, Requirement};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;

/// Where a candidate came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Already installed by this system.
    Installed,
    /// Installed through the OS-native package manager.
    NativeInstalled,
    /// Available through the OS-native package manager.
    NativeAvailable,
    /// A source locator: file path, directory, or URL.
    Source(String),
}

impl Origin {
    pub fn is_installed(&self) -> bool {
        matches!(self, Origin::Installed | Origin::NativeInstalled)
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Origin::NativeInstalled | Origin::NativeAvailable)
    }
}

/// Package metadata as recorded in the archive manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub version: Version,
    /// Package revision distinguishing rebuilds of the same upstream version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Version>,
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<Requirement>,
    #[serde(default)]
    pub conflicts: Vec<Requirement>,
    /// External-hook script text carried in the archive, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub externals: Option<String>,
    /// Archive filename as recorded at build time; when absent the filename
    /// is derived from name/version/revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_hint: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            name: String::new(),
            version: Version::parse("0"),
            revision: None,
            platforms: Vec::new(),
            architectures: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            externals: None,
            filename_hint: None,
        }
    }
}

impl Metadata {
    /// The generated archive filename for this package.
    pub fn filename(&self) -> String {
        if let Some(ref hint) = self.filename_hint {
            return hint.clone();
        }
        match self.revision {
            Some(ref rev) => format!("{}-{}-{}.qar", self.name, self.version, rev),
            None => format!("{}-{}.qar", self.name, self.version),
        }
    }

    /// "version" or "version-revision" rendering used in display output.
    pub fn version_string(&self) -> String {
        match self.revision {
            Some(ref rev) => format!("{}-{}", self.version, rev),
            None => self.version.to_string(),
        }
    }
}

/// One concrete, installable package version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub meta: Metadata,
    pub origin: Origin,
    /// Soft bias toward keeping this candidate; defaults true for installed
    /// origins ("all else equal, keep what is there").
    pub prefer: bool,
}

impl Candidate {
    pub fn new(meta: Metadata, origin: Origin) -> Self {
        let prefer = origin.is_installed();
        Candidate {
            meta,
            origin,
            prefer,
        }
    }

    pub fn installed(meta: Metadata) -> Self {
        Candidate::new(meta, Origin::Installed)
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Sort key for the preference order. Lower sorts first (more
    /// preferred): name, installed-and-preferred, higher version, higher
    /// revision, shorter (more specific) platform and architecture lists
    /// with empty lists mapped to a large sentinel so generic candidates
    /// rank below specific ones, and finally installed origin as a
    /// minimal-churn tiebreaker.
    pub fn rank_key(&self) -> RankKey {
        RankKey {
            name: self.meta.name.clone(),
            not_preferred_installed: !(self.origin.is_installed() && self.prefer),
            version: Reverse(self.meta.version.clone()),
            revision: Reverse(self.meta.revision.clone()),
            platform_specificity: list_specificity(&self.meta.platforms),
            arch_specificity: list_specificity(&self.meta.architectures),
            not_installed: !self.origin.is_installed(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.meta.name, self.meta.version_string())
    }
}

/// An empty platform/arch list means "runs anywhere" and is *less* preferred
/// than a platform-specific build.
const GENERIC_LIST_SENTINEL: usize = usize::MAX;

fn list_specificity(list: &[String]) -> usize {
    if list.is_empty() {
        GENERIC_LIST_SENTINEL
    } else {
        list.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankKey {
    name: String,
    not_preferred_installed: bool,
    version: Reverse<Version>,
    revision: Reverse<Option<Version>>,
    platform_specificity: usize,
    arch_specificity: usize,
    not_installed: bool,
}

/// Sort a pool entry into enumeration order and apply the "no package"
/// sentinel rule: when the top-ranked candidate is not installed-origin, a
/// `None` slot is prepended so the search can pick "install nothing for this
/// slot" at depth 0.
pub fn ranked_slots(candidates: &[Candidate]) -> Vec<Option<Candidate>> {
    let mut sorted: Vec<Candidate> = candidates.to_vec();
    sorted.sort_by_cached_key(|c| c.rank_key());

    let needs_sentinel = sorted
        .first()
        .map(|c| !c.origin.is_installed())
        .unwrap_or(true);

    let mut slots: Vec<Option<Candidate>> = Vec::with_capacity(sorted.len() + 1);
    if needs_sentinel {
        slots.push(None);
    }
    slots.extend(sorted.into_iter().map(Some));
    slots
}

/// Key into a candidate pool: namespace plus package name.
pub type PoolKey = (PackageKind, String);

/// Mapping from (namespace, name) to candidate lists. BTreeMap keeps
/// iteration deterministic, which the resolver's determinism property
/// depends on.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    entries: BTreeMap<PoolKey, Vec<Candidate>>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &PoolKey) -> Option<&[Candidate]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn insert(&mut self, key: PoolKey, candidates: Vec<Candidate>) {
        self.entries.insert(key, candidates);
    }

    /// Seed a single candidate into its namespace slot.
    pub fn seed(&mut self, kind: PackageKind, candidate: Candidate) {
        let key = (kind, candidate.meta.name.clone());
        self.entries.entry(key).or_default().push(candidate);
    }

    /// Narrow an existing entry down to candidates still matching `req`.
    /// Returns the remaining count.
    pub fn retain_matching(
        &mut self,
        key: &PoolKey,
        req: &Requirement,
        platform: &str,
        arch: &str,
    ) -> usize {
        match self.entries.get_mut(key) {
            Some(list) => {
                list.retain(|c| req.matches(c, platform, arch));
                list.len()
            }
            None => 0,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &PoolKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(version: &str, revision: Option<&str>) -> Candidate {
        Candidate::new(
            Metadata {
                name: "pkg".into(),
                version: Version::parse(version),
                revision: revision.map(Version::parse),
                ..Default::default()
            },
            Origin::Source("repo".into()),
        )
    }

    #[test]
    fn test_higher_version_ranks_first() {
        let slots = ranked_slots(&[cand("1.0", None), cand("2.0", None), cand("1.5", None)]);
        // Nothing installed: sentinel leads.
        assert!(slots[0].is_none());
        assert_eq!(slots[1].as_ref().unwrap().meta.version, "2.0".into());
        assert_eq!(slots[2].as_ref().unwrap().meta.version, "1.5".into());
    }

    #[test]
    fn test_higher_revision_breaks_version_tie() {
        let slots = ranked_slots(&[cand("1.0", Some("1")), cand("1.0", Some("3"))]);
        assert_eq!(
            slots[1].as_ref().unwrap().meta.revision,
            Some("3".into())
        );
    }

    #[test]
    fn test_preferred_installed_ranks_above_newer() {
        let mut installed = cand("1.0", None);
        installed.origin = Origin::Installed;
        installed.prefer = true;
        let newer = cand("2.0", None);

        let slots = ranked_slots(&[newer.clone(), installed.clone()]);
        // Installed-and-preferred top slot: no sentinel.
        assert_eq!(slots[0].as_ref().unwrap().origin, Origin::Installed);

        // With prefer off, the newer candidate wins and the installed copy
        // only survives as a churn tiebreaker further down.
        let mut unpinned = installed;
        unpinned.prefer = false;
        let slots = ranked_slots(&[newer, unpinned]);
        assert_eq!(slots[0].as_ref().unwrap().meta.version, "2.0".into());
    }

    #[test]
    fn test_platform_specific_beats_generic() {
        let generic = cand("1.0", None);
        let mut specific = cand("1.0", None);
        specific.meta.platforms = vec!["linux-gnu".into()];

        let slots = ranked_slots(&[generic, specific]);
        assert_eq!(
            slots[1].as_ref().unwrap().meta.platforms,
            vec!["linux-gnu".to_string()]
        );
    }

    #[test]
    fn test_sentinel_only_without_installed_top() {
        let mut installed = cand("1.0", None);
        installed.origin = Origin::Installed;
        assert!(ranked_slots(&[installed]).first().unwrap().is_some());
        assert!(ranked_slots(&[cand("1.0", None)]).first().unwrap().is_none());
        assert!(ranked_slots(&[]).first().unwrap().is_none());
    }

    #[test]
    fn test_filename_generation() {
        let mut meta = Metadata {
            name: "tool".into(),
            version: Version::parse("1.2"),
            revision: Some(Version::parse("4")),
            ..Default::default()
        };
        assert_eq!(meta.filename(), "tool-1.2-4.qar");
        meta.filename_hint = Some("tool-custom.qar".into());
        assert_eq!(meta.filename(), "tool-custom.qar");
    }
}
