// src/requirement/mod.rs

//! Package requirements and the candidate matcher
//!
//! A `Requirement` names a package (in the managed or native namespace) and
//! optionally constrains its version, its package revision, or its exact
//! generated filename. `Requirement::matches` is a pure predicate over a
//! candidate; evaluation order follows the documented short-circuit rules.

use crate::candidate::{Candidate, Origin};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Which namespace a requirement lives in. A managed and a native package
/// may share a name without conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PackageKind {
    Managed,
    Native,
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageKind::Managed => write!(f, "managed"),
            PackageKind::Native => write!(f, "native"),
        }
    }
}

/// A single requirement on one package name.
///
/// At most one of `version_pattern` or the min/max bounds is meaningful per
/// evaluation. The revision bounds are only consulted when the candidate's
/// version lands exactly on either supplied version bound; this lets a
/// requirement express "X at version >= 2.3, and if it is exactly 2.3 the
/// revision must be >= 5". A candidate strictly inside the version range
/// matches regardless of its revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub name: String,
    pub kind: PackageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_filename: Option<String>,
    /// Glob pattern over the candidate's "version" or "version-revision".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_above: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_below: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_revision: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_revision: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_above: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_below: Option<Version>,
}

impl Default for PackageKind {
    fn default() -> Self {
        PackageKind::Managed
    }
}

impl Requirement {
    pub fn named(name: impl Into<String>) -> Self {
        Requirement {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn native(name: impl Into<String>) -> Self {
        Requirement {
            name: name.into(),
            kind: PackageKind::Native,
            ..Default::default()
        }
    }

    pub fn with_min_version(mut self, v: impl Into<Version>) -> Self {
        self.min_version = Some(v.into());
        self
    }

    pub fn with_max_version(mut self, v: impl Into<Version>) -> Self {
        self.max_version = Some(v.into());
        self
    }

    /// Check whether a candidate satisfies this requirement on the given
    /// platform/architecture. Pure; the only side effect is trace logging.
    pub fn matches(&self, candidate: &Candidate, platform: &str, arch: &str) -> bool {
        let meta = &candidate.meta;

        let native_origin = matches!(
            candidate.origin,
            Origin::NativeInstalled | Origin::NativeAvailable
        );

        // Namespace gate for native requirements.
        if self.kind == PackageKind::Native && !native_origin {
            return false;
        }

        // Exact-filename requests pin a specific archive; every other field
        // is ignored for them.
        if let Some(ref fname) = self.exact_filename {
            return meta.filename() == *fname;
        }

        // Namespace gate for managed requirements.
        if self.kind == PackageKind::Managed && native_origin {
            return false;
        }

        if meta.name != self.name {
            return false;
        }

        if let Some(ref pattern) = self.version_pattern {
            if !version_pattern_matches(pattern, meta) {
                trace!(name = %meta.name, pattern, "version pattern rejected candidate");
                return false;
            }
        }

        // Revision bounds ride along with the version bounds: they apply
        // whenever the candidate version lands exactly on either bound.
        let mut on_bound = false;
        if let Some(ref min) = self.min_version {
            if meta.version < *min {
                return false;
            }
            on_bound |= meta.version == *min;
        }
        if let Some(ref max) = self.max_version {
            if meta.version > *max {
                return false;
            }
            on_bound |= meta.version == *max;
        }
        if on_bound && !revision_bounds_ok(self, meta.revision.as_ref()) {
            return false;
        }
        if let Some(ref above) = self.version_above {
            if meta.version <= *above {
                return false;
            }
        }
        if let Some(ref below) = self.version_below {
            if meta.version >= *below {
                return false;
            }
        }

        if !pattern_list_matches(&meta.platforms, platform) {
            return false;
        }
        if !pattern_list_matches(&meta.architectures, arch) {
            return false;
        }

        true
    }

    /// Human-readable rendering used in aggregated diagnostics.
    pub fn describe(&self) -> String {
        let mut out = format!("{} ({})", self.name, self.kind);
        if let Some(ref f) = self.exact_filename {
            out.push_str(&format!(" file {f}"));
        }
        if let Some(ref p) = self.version_pattern {
            out.push_str(&format!(" matching {p}"));
        }
        if let Some(ref v) = self.min_version {
            out.push_str(&format!(" >={v}"));
        }
        if let Some(ref v) = self.max_version {
            out.push_str(&format!(" <={v}"));
        }
        if let Some(ref v) = self.version_above {
            out.push_str(&format!(" >{v}"));
        }
        if let Some(ref v) = self.version_below {
            out.push_str(&format!(" <{v}"));
        }
        out
    }
}

/// Glob-match the pattern against "version" and "version-revision"; the
/// pattern may mention either half.
fn version_pattern_matches(pattern: &str, meta: &crate::candidate::Metadata) -> bool {
    let pat = match glob::Pattern::new(pattern) {
        Ok(p) => p,
        Err(_) => return false,
    };
    if pat.matches(meta.version.as_str()) {
        return true;
    }
    if let Some(ref rev) = meta.revision {
        return pat.matches(&format!("{}-{}", meta.version, rev));
    }
    false
}

fn revision_bounds_ok(req: &Requirement, revision: Option<&Version>) -> bool {
    let Some(rev) = revision else {
        // A revisionless candidate cannot satisfy any revision bound.
        return req.min_revision.is_none()
            && req.max_revision.is_none()
            && req.revision_above.is_none()
            && req.revision_below.is_none();
    };
    if let Some(ref min) = req.min_revision {
        if rev < min {
            return false;
        }
    }
    if let Some(ref max) = req.max_revision {
        if rev > max {
            return false;
        }
    }
    if let Some(ref above) = req.revision_above {
        if rev <= above {
            return false;
        }
    }
    if let Some(ref below) = req.revision_below {
        if rev >= below {
            return false;
        }
    }
    true
}

/// A declared platform/architecture list matches when it is empty, contains
/// the identifier verbatim, or contains an entry that works as a regular
/// expression matching the identifier. Entries that fail to compile as a
/// regex match nothing.
fn pattern_list_matches(declared: &[String], current: &str) -> bool {
    if declared.is_empty() {
        return true;
    }
    declared.iter().any(|entry| {
        entry == current
            || regex::Regex::new(entry)
                .map(|re| re.is_match(current))
                .unwrap_or(false)
    })
}
