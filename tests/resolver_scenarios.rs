// tests/resolver_scenarios.rs
//! End-to-end resolution scenarios exercised through the public API.

use quarry::sources::CandidateSource;
use quarry::{
    Candidate, CandidatePool, Error, Metadata, Origin, PackageKind, Requirement, Resolver,
    Version, DEFAULT_SEARCH_CAP,
};
use std::collections::{BTreeSet, HashMap};

struct MapSource {
    managed: HashMap<String, Vec<Candidate>>,
}

impl CandidateSource for MapSource {
    fn candidates(&self, name: &str, kind: PackageKind) -> quarry::Result<Vec<Candidate>> {
        if kind == PackageKind::Native {
            return Ok(Vec::new());
        }
        Ok(self.managed.get(name).cloned().unwrap_or_default())
    }
}

fn cand(name: &str, version: &str, deps: Vec<Requirement>) -> Candidate {
    Candidate::new(
        Metadata {
            name: name.into(),
            version: Version::parse(version),
            dependencies: deps,
            ..Default::default()
        },
        Origin::Source("repo".into()),
    )
}

fn pinned(name: &str, version: &str) -> Requirement {
    Requirement::named(name)
        .with_min_version(version)
        .with_max_version(version)
}

fn core(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// A full transitive resolution: "a" pulls in b and a bounded c, c pulls in
/// its matching d, and the platform-specific b build wins over the generic
/// one. Exactly four candidates, no more.
#[test]
fn preference_ordered_transitive_resolution() {
    let a_deps = vec![
        Requirement::named("b"),
        Requirement::named("c")
            .with_min_version("1.1")
            .with_max_version("1.2"),
    ];

    let mut b_specific = cand("b", "1.0", vec![]);
    b_specific.meta.platforms = vec!["linux-gnu".into()];

    let c_versions: Vec<Candidate> = ["1.0", "1.1", "1.2", "1.3"]
        .iter()
        .map(|v| cand("c", v, vec![pinned("d", v)]))
        .collect();
    let d_versions: Vec<Candidate> = ["1.0", "1.1", "1.2", "1.3"]
        .iter()
        .map(|v| cand("d", v, vec![]))
        .collect();

    let source = MapSource {
        managed: HashMap::from([
            ("a".to_string(), vec![cand("a", "1.0", a_deps)]),
            ("b".to_string(), vec![cand("b", "1.0", vec![]), b_specific]),
            ("c".to_string(), c_versions),
            ("d".to_string(), d_versions),
        ]),
    };

    let mut resolver = Resolver::new(&source, "linux-gnu", "x86_64", DEFAULT_SEARCH_CAP);
    let solution = resolver
        .resolve(
            &[Requirement::named("a")],
            &CandidatePool::new(),
            &core(&["a"]),
        )
        .unwrap();

    assert_eq!(solution.len(), 4);

    let names: BTreeSet<&str> = solution.candidates().iter().map(|c| c.name()).collect();
    assert_eq!(names, ["a", "b", "c", "d"].into_iter().collect());

    let b = solution.get(PackageKind::Managed, "b").unwrap();
    assert_eq!(b.meta.platforms, vec!["linux-gnu".to_string()]);

    let c = solution.get(PackageKind::Managed, "c").unwrap();
    assert_eq!(c.meta.version, Version::parse("1.2"));
    let d = solution.get(PackageKind::Managed, "d").unwrap();
    assert_eq!(d.meta.version, Version::parse("1.2"));
}

/// Revision bounds bite when the candidate version sits exactly on either
/// version bound, and not in between.
#[test]
fn revision_bounds_apply_on_version_boundaries() {
    let candidate = Candidate::new(
        Metadata {
            name: "x".into(),
            version: Version::parse("2.3"),
            revision: Some(Version::parse("2")),
            ..Default::default()
        },
        Origin::Source("repo".into()),
    );

    // Version 2.3 lands on the upper bound, so the pinned revision 3
    // rejects revision 2.
    let mut pinned = Requirement::named("x")
        .with_min_version("1.0")
        .with_max_version("2.3");
    pinned.min_revision = Some("3".into());
    pinned.max_revision = Some("3".into());
    assert!(!pinned.matches(&candidate, "linux-gnu", "x86_64"));

    // The same shape with revision range 2..=3 admits it.
    let mut ranged = Requirement::named("x")
        .with_min_version("1.0")
        .with_max_version("2.3");
    ranged.min_revision = Some("2".into());
    ranged.max_revision = Some("3".into());
    assert!(ranged.matches(&candidate, "linux-gnu", "x86_64"));

    // Strictly inside the version range the revision bounds are ignored.
    let interior = Candidate::new(
        Metadata {
            name: "x".into(),
            version: Version::parse("1.7"),
            revision: Some(Version::parse("1")),
            ..Default::default()
        },
        Origin::Source("repo".into()),
    );
    assert!(pinned.matches(&interior, "linux-gnu", "x86_64"));
}

/// Zero satisfying candidates fails up front, before any combination is
/// enumerated.
#[test]
fn unsatisfiable_fails_without_enumeration() {
    let source = MapSource {
        managed: HashMap::new(),
    };
    let mut resolver = Resolver::new(&source, "linux-gnu", "x86_64", DEFAULT_SEARCH_CAP);
    let err = resolver
        .resolve(
            &[Requirement::named("missing")],
            &CandidatePool::new(),
            &core(&["missing"]),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Unsatisfiable { .. }));
    assert_eq!(resolver.combinations_checked(), 0);
}

/// An installed set that already satisfies every requirement resolves to
/// itself: nothing new gets picked.
#[test]
fn satisfied_installed_set_is_idempotent() {
    let mut installed_a = cand("a", "1.0", vec![Requirement::named("b")]);
    installed_a.origin = Origin::Installed;
    installed_a.prefer = true;
    let mut installed_b = cand("b", "2.0", vec![]);
    installed_b.origin = Origin::Installed;
    installed_b.prefer = true;

    // Newer versions exist but must not displace a satisfied installed set.
    let source = MapSource {
        managed: HashMap::from([
            ("a".to_string(), vec![cand("a", "3.0", vec![])]),
            ("b".to_string(), vec![cand("b", "3.0", vec![])]),
        ]),
    };

    let mut pool = CandidatePool::new();
    pool.seed(PackageKind::Managed, installed_a);
    pool.seed(PackageKind::Managed, installed_b);

    let mut resolver = Resolver::new(&source, "linux-gnu", "x86_64", DEFAULT_SEARCH_CAP);
    let solution = resolver
        .resolve(
            &[Requirement::named("a"), Requirement::named("b")],
            &pool,
            &core(&["a", "b"]),
        )
        .unwrap();

    assert_eq!(solution.len(), 2);
    for candidate in solution.candidates() {
        assert_eq!(candidate.origin, Origin::Installed);
    }
}

/// A requirement the installed copy has outgrown falls through to the
/// sources instead of failing on the seeded pool entry.
#[test]
fn outgrown_installed_entry_falls_back_to_sources() {
    let mut installed = cand("tool", "1.0", vec![]);
    installed.origin = Origin::Installed;

    let source = MapSource {
        managed: HashMap::from([("tool".to_string(), vec![cand("tool", "2.1", vec![])])]),
    };

    let mut pool = CandidatePool::new();
    pool.seed(PackageKind::Managed, installed);

    let mut resolver = Resolver::new(&source, "linux-gnu", "x86_64", DEFAULT_SEARCH_CAP);
    let solution = resolver
        .resolve(
            &[Requirement::named("tool").with_min_version("2.0")],
            &pool,
            &core(&["tool"]),
        )
        .unwrap();
    assert_eq!(
        solution.candidates()[0].meta.version,
        Version::parse("2.1")
    );
}
