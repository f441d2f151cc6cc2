// src/store/mod.rs

//! Installed-set persistence
//!
//! One JSON record per installed package under `installed/`, plus a parallel
//! metadata cache under `cache/` keyed by package name. The store also
//! derives the installed dependency map (archive filename -> names of
//! installed packages depending on it) used by Remove.

use crate::candidate::{Candidate, Metadata};
use crate::config::Config;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// One file owned by an installed package. `config` files are eligible for
/// preservation when locally modified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub sha256: String,
    #[serde(default)]
    pub config: bool,
}

/// The stored record for one installed package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub meta: Metadata,
    /// Archive filename this package was installed from.
    pub filename: String,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    pub installed_at: DateTime<Utc>,
}

pub struct InstalledStore {
    installed_dir: PathBuf,
    cache_dir: PathBuf,
}

impl InstalledStore {
    pub fn open(config: &Config) -> Result<Self> {
        let installed_dir = config.installed_dir();
        let cache_dir = config.cache_dir();
        fs::create_dir_all(&installed_dir)?;
        fs::create_dir_all(&cache_dir)?;
        Ok(InstalledStore {
            installed_dir,
            cache_dir,
        })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.installed_dir.join(format!("{name}.json"))
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{name}.json"))
    }

    pub fn get(&self, name: &str) -> Result<Option<InstalledPackage>> {
        let path = self.record_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let pkg = serde_json::from_str(&text).map_err(|source| Error::CorruptState {
            path: path.clone(),
            source,
        })?;
        Ok(Some(pkg))
    }

    pub fn list(&self) -> Result<Vec<InstalledPackage>> {
        let mut packages = Vec::new();
        for entry in WalkDir::new(&self.installed_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                Error::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walkdir loop")
                }))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(path)?;
            let pkg = serde_json::from_str(&text).map_err(|source| Error::CorruptState {
                path: path.to_path_buf(),
                source,
            })?;
            packages.push(pkg);
        }
        Ok(packages)
    }

    /// The installed set rendered as resolver candidates, `prefer`
    /// defaulting to true ("all else equal, keep what is there").
    pub fn installed_candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|p| Candidate::installed(p.meta))
            .collect())
    }

    pub fn record(&self, pkg: &InstalledPackage) -> Result<()> {
        let record = serde_json::to_string_pretty(pkg)?;
        fs::write(self.record_path(&pkg.meta.name), record)?;
        let cache = serde_json::to_string_pretty(&pkg.meta)?;
        fs::write(self.cache_path(&pkg.meta.name), cache)?;
        debug!(name = %pkg.meta.name, "recorded installed package");
        Ok(())
    }

    pub fn remove_record(&self, name: &str) -> Result<()> {
        let record = self.record_path(name);
        if !record.exists() {
            return Err(Error::NotInstalled(name.to_string()));
        }
        fs::remove_file(record)?;
        let cache = self.cache_path(name);
        if cache.exists() {
            fs::remove_file(cache)?;
        }
        Ok(())
    }

    /// Derived index: archive filename -> names of installed packages whose
    /// declared dependencies resolve to that package.
    pub fn dependency_map(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let installed = self.list()?;
        let by_name: BTreeMap<&str, &InstalledPackage> = installed
            .iter()
            .map(|p| (p.meta.name.as_str(), p))
            .collect();

        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for pkg in &installed {
            for dep in &pkg.meta.dependencies {
                if let Some(provider) = by_name.get(dep.name.as_str()) {
                    map.entry(provider.filename.clone())
                        .or_default()
                        .push(pkg.meta.name.clone());
                }
            }
        }
        Ok(map)
    }

    /// Config-type files whose on-disk checksum no longer matches the
    /// recorded manifest; these are preserved rather than deleted.
    pub fn modified_config_files(&self, pkg: &InstalledPackage) -> Vec<PathBuf> {
        pkg.files
            .iter()
            .filter(|f| f.config)
            .filter(|f| match sha256_file(&f.path) {
                Ok(actual) => actual != f.sha256,
                // Unreadable or already-gone files are not "modified".
                Err(_) => false,
            })
            .map(|f| f.path.clone())
            .collect()
    }
}

/// Hex SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
