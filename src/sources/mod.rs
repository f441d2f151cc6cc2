// src/sources/mod.rs

//! Collaborator interfaces consumed by the core
//!
//! The archive format, native package-manager shelling, lifecycle hook
//! execution, and result reporting are mechanical I/O concerns implemented
//! outside this crate's core. The traits here are the seams; tests supply
//! mocks.

pub mod devel;

use crate::candidate::{Candidate, Metadata};
use crate::error::Result;
use crate::requirement::PackageKind;
use std::path::{Path, PathBuf};

/// Enumerates candidates for a package name from configured sources.
pub trait CandidateSource {
    /// Managed candidates from configured directories, files, and URLs, or
    /// native candidates (installed and available) from the host OS.
    fn candidates(&self, name: &str, kind: PackageKind) -> Result<Vec<Candidate>>;
}

/// Files listed by an archive, split into root-owned and relocatable sets.
#[derive(Debug, Clone, Default)]
pub struct ArchiveFileList {
    pub root: Vec<PathBuf>,
    pub reloc: Vec<PathBuf>,
}

/// Options controlling where and how an archive is unpacked.
#[derive(Debug, Clone, Default)]
pub struct UnpackOptions {
    pub dest: PathBuf,
    /// Paths to leave untouched (locally modified config files).
    pub preserve: Vec<PathBuf>,
}

/// Access to the on-disk archive container format.
pub trait ArchiveService {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata>;
    fn verify_checksum(&self, path: &Path) -> Result<bool>;
    fn list_files(&self, path: &Path) -> Result<ArchiveFileList>;
    /// Returns the unpack process exit code.
    fn unpack(&self, path: &Path, options: &UnpackOptions) -> Result<i32>;
}

/// Shells out to the host OS package manager for native packages.
pub trait PlatformAdapter {
    fn install_native(&self, candidate: &Candidate) -> Result<()>;
    fn upgrade_native(&self, candidate: &Candidate) -> Result<()>;
    /// The command string that would install this candidate natively.
    fn native_install_string(&self, candidate: &Candidate) -> String;
    /// Link or unlink init-script/crontab artifacts for a package.
    fn link_service_artifacts(&self, meta: &Metadata) -> Result<()>;
    fn unlink_service_artifacts(&self, meta: &Metadata) -> Result<()>;
}

/// Whether a hook is running during a fresh install or an upgrade; passed to
/// hook scripts through their environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookContext {
    Install,
    Upgrade,
    Remove,
}

/// Lifecycle hook scripts invoked with the package's unpack directory as the
/// working directory. A nonzero exit status surfaces as `Error::HookFailure`
/// unless the global force flag downgrades it.
pub trait LifecycleHooks {
    fn pre_install(&self, meta: &Metadata, workdir: &Path, ctx: HookContext) -> Result<i32>;
    fn post_install(&self, meta: &Metadata, workdir: &Path, ctx: HookContext) -> Result<i32>;
    fn pre_remove(&self, meta: &Metadata, workdir: &Path) -> Result<i32>;
    fn post_remove(&self, meta: &Metadata, workdir: &Path) -> Result<i32>;
    /// Uninstall-time external hooks carried in the package metadata.
    fn run_externals(&self, meta: &Metadata, ctx: HookContext) -> Result<i32>;
}

/// Optional post-operation reporting to an external collector. Failures and
/// timeouts here are logged and never fatal.
pub trait Reporter {
    fn report(&self, delta: &str) -> Result<()>;
}
