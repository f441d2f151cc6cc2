// tests/transaction.rs
//! Transaction manager integration tests over a temporary state tree and a
//! directory-backed candidate source.

use chrono::Utc;
use quarry::sources::devel::{JsonArchive, JsonSource, NullHooks, NullPlatform};
use quarry::sources::{HookContext, LifecycleHooks, PlatformAdapter};
use quarry::{
    Candidate, Config, Error, InstalledPackage, Metadata, RemoveOptions, Requirement,
    TransactionManager, Version,
};
use std::cell::Cell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Hooks with scriptable exit statuses and an externals-invocation counter.
#[derive(Default)]
struct ScriptedHooks {
    post_install_status: i32,
    post_remove_status: i32,
    externals_runs: Cell<u32>,
}

impl LifecycleHooks for ScriptedHooks {
    fn pre_install(&self, _meta: &Metadata, _workdir: &Path, _ctx: HookContext) -> quarry::Result<i32> {
        Ok(0)
    }

    fn post_install(&self, _meta: &Metadata, _workdir: &Path, _ctx: HookContext) -> quarry::Result<i32> {
        Ok(self.post_install_status)
    }

    fn pre_remove(&self, _meta: &Metadata, _workdir: &Path) -> quarry::Result<i32> {
        Ok(0)
    }

    fn post_remove(&self, _meta: &Metadata, _workdir: &Path) -> quarry::Result<i32> {
        Ok(self.post_remove_status)
    }

    fn run_externals(&self, _meta: &Metadata, _ctx: HookContext) -> quarry::Result<i32> {
        self.externals_runs.set(self.externals_runs.get() + 1);
        Ok(0)
    }
}

/// Platform adapter whose service-artifact linking always fails.
struct BrokenServicePlatform;

impl PlatformAdapter for BrokenServicePlatform {
    fn install_native(&self, _candidate: &Candidate) -> quarry::Result<()> {
        Ok(())
    }

    fn upgrade_native(&self, _candidate: &Candidate) -> quarry::Result<()> {
        Ok(())
    }

    fn native_install_string(&self, candidate: &Candidate) -> String {
        format!("install {}", candidate.meta.name)
    }

    fn link_service_artifacts(&self, _meta: &Metadata) -> quarry::Result<()> {
        Err(Error::Archive("service directory unavailable".into()))
    }

    fn unlink_service_artifacts(&self, _meta: &Metadata) -> quarry::Result<()> {
        Err(Error::Archive("service directory unavailable".into()))
    }
}

fn meta(name: &str, version: &str, deps: Vec<Requirement>) -> Metadata {
    Metadata {
        name: name.into(),
        version: Version::parse(version),
        dependencies: deps,
        ..Default::default()
    }
}

fn publish(repo: &Path, meta: &Metadata) {
    let path = repo.join(format!("{}-{}.json", meta.name, meta.version));
    fs::write(path, serde_json::to_string_pretty(meta).unwrap()).unwrap();
}

fn installed(meta: Metadata) -> InstalledPackage {
    let filename = meta.filename();
    InstalledPackage {
        meta,
        filename,
        files: Vec::new(),
        installed_at: Utc::now(),
    }
}

fn config(tmp: &TempDir) -> Config {
    let mut config = Config::new(tmp.path().join("state"), "linux-gnu", "x86_64");
    config.assume_yes = true;
    config
}

fn repo_dir(tmp: &TempDir) -> std::path::PathBuf {
    let repo = tmp.path().join("repo");
    fs::create_dir_all(&repo).unwrap();
    repo
}

#[test]
fn install_pulls_dependencies_in_ready_order() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "1.0", vec![Requirement::named("lib")]));
    publish(&repo, &meta("lib", "1.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();

    let summary = manager.install(&["app".to_string()]).unwrap();
    assert_eq!(summary.installed, vec!["lib".to_string(), "app".to_string()]);
    assert!(manager.store().get("app").unwrap().is_some());
    assert!(manager.store().get("lib").unwrap().is_some());
}

#[test]
fn install_keeps_already_satisfied_packages() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "2.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("app", "1.0", vec![]))).unwrap();

    // A plain install request is already satisfied; the newer version in the
    // repo must not displace the installed copy.
    let summary = manager.install(&["app".to_string()]).unwrap();
    assert!(summary.installed.is_empty());
    assert_eq!(summary.kept, vec!["app".to_string()]);
    let pkg = manager.store().get("app").unwrap().unwrap();
    assert_eq!(pkg.meta.version, Version::parse("1.0"));
}

#[test]
fn remove_refuses_to_break_dependents() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("lib", "1.0", vec![]))).unwrap();
    manager
        .store()
        .record(&installed(meta("app", "1.0", vec![Requirement::named("lib")])))
        .unwrap();

    let err = manager
        .remove(&["lib".to_string()], RemoveOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::WouldBreakDependents { .. }));
    assert!(err.to_string().contains("app"));

    // Both targets are still installed.
    assert!(manager.store().get("lib").unwrap().is_some());
    assert!(manager.store().get("app").unwrap().is_some());
}

#[test]
fn remove_with_dependents_takes_the_whole_chain() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("lib", "1.0", vec![]))).unwrap();
    manager
        .store()
        .record(&installed(meta("app", "1.0", vec![Requirement::named("lib")])))
        .unwrap();

    let summary = manager
        .remove(
            &["lib".to_string()],
            RemoveOptions {
                remove_dependents: true,
            },
        )
        .unwrap();
    assert_eq!(summary.removed, vec!["app".to_string(), "lib".to_string()]);
    assert!(manager.store().list().unwrap().is_empty());
}

#[test]
fn remove_unknown_package_lists_it() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();

    let err = manager
        .remove(&["ghost".to_string()], RemoveOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Unsatisfiable { .. }));
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn conflicts_are_detected_in_both_directions() {
    // The incoming package declares the conflict.
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    let mut incoming = meta("new", "1.0", vec![]);
    incoming.conflicts = vec![Requirement::named("old")];
    publish(&repo, &incoming);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("old", "1.0", vec![]))).unwrap();

    let err = manager.install(&["new".to_string()]).unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));

    // The installed package declares the conflict.
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("new", "1.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    let mut old = meta("old", "1.0", vec![]);
    old.conflicts = vec![Requirement::named("new")];
    manager.store().record(&installed(old)).unwrap();

    let err = manager.install(&["new".to_string()]).unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
}

#[test]
fn force_replace_removes_the_conflicting_package() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    let mut incoming = meta("new", "1.0", vec![]);
    incoming.conflicts = vec![Requirement::named("old")];
    publish(&repo, &incoming);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut config = config(&tmp);
    config.force_replace = true;
    let mut manager =
        TransactionManager::new(config, &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("old", "1.0", vec![]))).unwrap();

    let summary = manager.install(&["new".to_string()]).unwrap();
    assert_eq!(summary.installed, vec!["new".to_string()]);
    assert!(manager.store().get("old").unwrap().is_none());
    assert!(manager.store().get("new").unwrap().is_some());
}

#[test]
fn upgrade_replaces_installed_with_newer() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "2.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("app", "1.0", vec![]))).unwrap();

    let summary = manager.upgrade(&["app".to_string()]).unwrap();
    assert_eq!(summary.removed, vec!["app".to_string()]);
    assert_eq!(summary.installed, vec!["app".to_string()]);
    let pkg = manager.store().get("app").unwrap().unwrap();
    assert_eq!(pkg.meta.version, Version::parse("2.0"));
}

#[test]
fn upgrade_leaves_bystanders_alone() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "2.0", vec![]));
    // A newer "other" exists, but only "app" was asked for.
    publish(&repo, &meta("other", "2.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("app", "1.0", vec![]))).unwrap();
    manager.store().record(&installed(meta("other", "1.0", vec![]))).unwrap();

    let summary = manager.upgrade(&["app".to_string()]).unwrap();
    assert_eq!(summary.installed, vec!["app".to_string()]);
    assert!(summary.kept.contains(&"other".to_string()));
    let other = manager.store().get("other").unwrap().unwrap();
    assert_eq!(other.meta.version, Version::parse("1.0"));
}

#[test]
fn upgrade_without_specs_takes_everything() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "2.0", vec![]));
    publish(&repo, &meta("other", "2.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform, hooks) = (JsonArchive, NullPlatform, NullHooks);
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("app", "1.0", vec![]))).unwrap();
    manager.store().record(&installed(meta("other", "1.0", vec![]))).unwrap();

    let summary = manager.upgrade(&[]).unwrap();
    let mut upgraded = summary.installed.clone();
    upgraded.sort();
    assert_eq!(upgraded, vec!["app".to_string(), "other".to_string()]);
    for name in ["app", "other"] {
        let pkg = manager.store().get(name).unwrap().unwrap();
        assert_eq!(pkg.meta.version, Version::parse("2.0"));
    }
}

#[test]
fn failing_post_install_hook_aborts_with_phase() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "1.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform) = (JsonArchive, NullPlatform);
    let hooks = ScriptedHooks {
        post_install_status: 7,
        ..Default::default()
    };
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();

    let err = manager.install(&["app".to_string()]).unwrap_err();
    match &err {
        Error::HookFailure { phase, status, .. } => {
            assert_eq!(*phase, "post-install");
            assert_eq!(*status, 7);
        }
        other => panic!("expected HookFailure, got {other}"),
    }
    assert_eq!(quarry::cli::exit_code(&err), quarry::cli::EXIT_POST_INSTALL);
    // The package was never recorded as installed.
    assert!(manager.store().get("app").unwrap().is_none());
}

#[test]
fn force_downgrades_hook_failure_to_warning() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "1.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, platform) = (JsonArchive, NullPlatform);
    let hooks = ScriptedHooks {
        post_install_status: 7,
        ..Default::default()
    };
    let mut config = config(&tmp);
    config.force = true;
    let mut manager =
        TransactionManager::new(config, &source, &archive, &platform, &hooks).unwrap();

    let summary = manager.install(&["app".to_string()]).unwrap();
    assert_eq!(summary.installed, vec!["app".to_string()]);
    assert!(manager.store().get("app").unwrap().is_some());
}

#[test]
fn failing_post_remove_hook_aborts_removal() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform) = (JsonArchive, NullPlatform);
    let hooks = ScriptedHooks {
        post_remove_status: 2,
        ..Default::default()
    };
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();
    manager.store().record(&installed(meta("app", "1.0", vec![]))).unwrap();

    let err = manager
        .remove(&["app".to_string()], RemoveOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::HookFailure {
            phase: "post-remove",
            ..
        }
    ));
    assert_eq!(quarry::cli::exit_code(&err), quarry::cli::EXIT_POST_REMOVE);
    // The stored record survives a failed removal.
    assert!(manager.store().get("app").unwrap().is_some());
}

#[test]
fn failing_service_artifact_linking_maps_to_init_script() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    publish(&repo, &meta("app", "1.0", vec![]));

    let source = JsonSource::new(vec![repo]);
    let (archive, hooks) = (JsonArchive, NullHooks);
    let platform = BrokenServicePlatform;
    let mut manager =
        TransactionManager::new(config(&tmp), &source, &archive, &platform, &hooks).unwrap();

    let err = manager.install(&["app".to_string()]).unwrap_err();
    assert!(matches!(
        err,
        Error::HookFailure {
            phase: "init-script",
            ..
        }
    ));
    assert_eq!(quarry::cli::exit_code(&err), quarry::cli::EXIT_INIT_SCRIPT);
}

#[test]
fn force_replace_runs_evicted_package_externals() {
    let tmp = TempDir::new().unwrap();
    let repo = repo_dir(&tmp);
    let mut incoming = meta("new", "1.0", vec![]);
    incoming.conflicts = vec![Requirement::named("old")];
    publish(&repo, &incoming);

    let source = JsonSource::new(vec![repo]);
    let (archive, platform) = (JsonArchive, NullPlatform);
    let hooks = ScriptedHooks::default();
    let mut config = config(&tmp);
    config.force_replace = true;
    let mut manager =
        TransactionManager::new(config, &source, &archive, &platform, &hooks).unwrap();
    let mut old = meta("old", "1.0", vec![]);
    old.externals = Some("cleanup".into());
    manager.store().record(&installed(old)).unwrap();

    manager.install(&["new".to_string()]).unwrap();
    assert!(manager.store().get("old").unwrap().is_none());
    // The evicted package's uninstall-time externals ran exactly once.
    assert_eq!(hooks.externals_runs.get(), 1);
}
