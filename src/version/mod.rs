// src/version/mod.rs

//! Version parsing and comparison
//!
//! Versions are dotted, mixed alpha/numeric strings ("1.2.3", "2.0b1",
//! "1.4.2-r3"). A version parses into alternating numeric and alphabetic
//! segments which compare segment-by-segment: numerically when both sides
//! are numeric, lexically otherwise. Any non-empty string parses to some
//! comparable value; there is no failure mode here.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One run of digits or one run of non-digit, non-separator characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Num(u64),
    Alpha(String),
}

impl Segment {
    fn compare(&self, other: &Segment) -> Ordering {
        match (self, other) {
            (Segment::Num(a), Segment::Num(b)) => a.cmp(b),
            // Mixed or alphabetic runs fall back to lexical comparison on
            // the raw text, matching how the segments were written.
            _ => self.text().cmp(&other.text()),
        }
    }

    fn text(&self) -> String {
        match self {
            Segment::Num(n) => n.to_string(),
            Segment::Alpha(s) => s.clone(),
        }
    }
}

/// An immutable, totally ordered version value. Equality and hashing follow
/// the parsed segments, not the raw text, so "1.2." and "1.2" are the same
/// version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Version {
    raw: String,
    segments: Vec<Segment>,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl Version {
    /// Parse a version string. Separators (`.`, `-`, `_`) flush the current
    /// run; a digit/alpha boundary also starts a new segment, so "2.0b1"
    /// yields [2, 0, "b", 1]. Trailing empty segments ("1.2.") are dropped,
    /// so "1.2." compares equal to "1.2".
    pub fn parse(s: &str) -> Self {
        let mut segments = Vec::new();
        let mut digits = String::new();
        let mut alpha = String::new();

        fn flush(digits: &mut String, alpha: &mut String, segments: &mut Vec<Segment>) {
            if !digits.is_empty() {
                let run = std::mem::take(digits);
                // Runs too long for u64 degrade to lexical comparison.
                match run.parse::<u64>() {
                    Ok(n) => segments.push(Segment::Num(n)),
                    Err(_) => segments.push(Segment::Alpha(run)),
                }
            }
            if !alpha.is_empty() {
                segments.push(Segment::Alpha(std::mem::take(alpha)));
            }
        }

        for ch in s.chars() {
            if ch == '.' || ch == '-' || ch == '_' {
                flush(&mut digits, &mut alpha, &mut segments);
            } else if ch.is_ascii_digit() {
                if !alpha.is_empty() {
                    flush(&mut digits, &mut alpha, &mut segments);
                }
                digits.push(ch);
            } else {
                if !digits.is_empty() {
                    flush(&mut digits, &mut alpha, &mut segments);
                }
                alpha.push(ch);
            }
        }
        flush(&mut digits, &mut alpha, &mut segments);

        Version {
            raw: s.to_string(),
            segments,
        }
    }

    /// Heuristic used by the archive builder to flag suspect versions.
    pub fn starts_with_digit(&self) -> bool {
        self.raw.chars().next().is_some_and(|c| c.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn compare(&self, other: &Version) -> Ordering {
        let mut a = self.segments.iter();
        let mut b = other.segments.iter();
        loop {
            match (a.next(), b.next()) {
                (Some(x), Some(y)) => match x.compare(y) {
                    Ordering::Equal => continue,
                    ord => return ord,
                },
                // Fewer segments sorts first: 1.2 < 1.2.1.
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (None, None) => return Ordering::Equal,
            }
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.raw
    }
}
