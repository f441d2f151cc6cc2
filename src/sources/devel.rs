// src/sources/devel.rs

//! Development and test doubles for the collaborator traits
//!
//! `JsonSource` serves candidates from directories of per-package metadata
//! JSON files; `JsonArchive` reads a `.qar` path as a bare JSON metadata
//! document. The null adapters succeed without doing anything. These back
//! the CLI when no real collaborators are wired in, and the integration
//! tests.

use super::{ArchiveFileList, ArchiveService, CandidateSource, HookContext, LifecycleHooks,
    PlatformAdapter};
use crate::candidate::{Candidate, Metadata, Origin};
use crate::error::{Error, Result};
use crate::requirement::PackageKind;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Serves managed candidates from metadata JSON files named
/// `<anything>.json` inside the configured directories. Native lookups
/// always come back empty.
pub struct JsonSource {
    dirs: Vec<PathBuf>,
}

impl JsonSource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        JsonSource { dirs }
    }
}

impl CandidateSource for JsonSource {
    fn candidates(&self, name: &str, kind: PackageKind) -> Result<Vec<Candidate>> {
        if kind == PackageKind::Native {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for dir in &self.dirs {
            let entries = match fs::read_dir(dir) {
                Ok(e) => e,
                Err(_) => continue,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let text = fs::read_to_string(&path)?;
                let meta: Metadata =
                    serde_json::from_str(&text).map_err(|source| Error::CorruptState {
                        path: path.clone(),
                        source,
                    })?;
                if meta.name == name {
                    debug!(name, path = %path.display(), "candidate from source dir");
                    found.push(Candidate::new(
                        meta,
                        Origin::Source(path.display().to_string()),
                    ));
                }
            }
        }
        Ok(found)
    }
}

/// Treats an archive path as a JSON metadata document. Checksums always
/// verify, listings are empty, unpacking succeeds without touching disk.
pub struct JsonArchive;

impl ArchiveService for JsonArchive {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| Error::CorruptState {
            path: path.to_path_buf(),
            source,
        })
    }

    fn verify_checksum(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }

    fn list_files(&self, _path: &Path) -> Result<ArchiveFileList> {
        Ok(ArchiveFileList::default())
    }

    fn unpack(&self, _path: &Path, _options: &super::UnpackOptions) -> Result<i32> {
        Ok(0)
    }
}

/// Platform adapter that accepts every request and does nothing.
pub struct NullPlatform;

impl PlatformAdapter for NullPlatform {
    fn install_native(&self, _candidate: &Candidate) -> Result<()> {
        Ok(())
    }

    fn upgrade_native(&self, _candidate: &Candidate) -> Result<()> {
        Ok(())
    }

    fn native_install_string(&self, candidate: &Candidate) -> String {
        format!("install {}", candidate.meta.name)
    }

    fn link_service_artifacts(&self, _meta: &Metadata) -> Result<()> {
        Ok(())
    }

    fn unlink_service_artifacts(&self, _meta: &Metadata) -> Result<()> {
        Ok(())
    }
}

/// Hooks that always exit 0.
pub struct NullHooks;

impl LifecycleHooks for NullHooks {
    fn pre_install(&self, _meta: &Metadata, _workdir: &Path, _ctx: HookContext) -> Result<i32> {
        Ok(0)
    }

    fn post_install(&self, _meta: &Metadata, _workdir: &Path, _ctx: HookContext) -> Result<i32> {
        Ok(0)
    }

    fn pre_remove(&self, _meta: &Metadata, _workdir: &Path) -> Result<i32> {
        Ok(0)
    }

    fn post_remove(&self, _meta: &Metadata, _workdir: &Path) -> Result<i32> {
        Ok(0)
    }

    fn run_externals(&self, _meta: &Metadata, _ctx: HookContext) -> Result<i32> {
        Ok(0)
    }
}
