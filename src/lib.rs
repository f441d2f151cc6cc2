// src/lib.rs

//! Quarry package manager
//!
//! Tracks installed software units, resolves version and dependency
//! constraints against candidate pools drawn from multiple sources, and
//! mutates the installed set under a repository-wide lock.
//!
//! # Architecture
//!
//! - Preference-ordered resolution: a bounded, depth-monotonic search over
//!   per-name candidate pools split into managed and native namespaces
//! - Transactional apply: dependency-readiness ordering, symmetric conflict
//!   detection, aggregated fail-fast diagnostics
//! - Filesystem-mutex repository lock with stale-owner takeover
//! - Collaborator traits at the seams for archive I/O, native package
//!   managers, lifecycle hooks, and reporting

pub mod candidate;
pub mod cli;
pub mod config;
mod error;
pub mod lock;
pub mod requirement;
pub mod resolver;
pub mod sources;
pub mod store;
pub mod transaction;
pub mod version;

pub use candidate::{ranked_slots, Candidate, CandidatePool, Metadata, Origin, PoolKey};
pub use config::{Config, DEFAULT_SEARCH_CAP, LOCK_STALE_AFTER};
pub use error::{Error, Result};
pub use lock::RepoLock;
pub use requirement::{PackageKind, Requirement};
pub use resolver::{Resolver, Solution};
pub use store::{FileRecord, InstalledPackage, InstalledStore};
pub use transaction::{parse_request, OpSummary, RemoveOptions, Request, TransactionManager};
pub use version::Version;
