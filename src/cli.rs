// src/cli.rs
//! CLI definitions for the quarry package manager
//!
//! Thin glue: argument parsing with clap, configuration assembly, and the
//! mapping from error classes to process exit codes. The transaction
//! manager does the actual work.

use crate::config::Config;
use crate::error::Error;
use crate::sources::devel::{JsonArchive, JsonSource, NullHooks, NullPlatform};
use crate::transaction::{RemoveOptions, TransactionManager};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Exit codes reported to the driver.
pub const EXIT_OK: i32 = 0;
pub const EXIT_GENERIC: i32 = 1;
pub const EXIT_POST_INSTALL: i32 = 2;
pub const EXIT_POST_REMOVE: i32 = 3;
pub const EXIT_INIT_SCRIPT: i32 = 4;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(author = "Quarry Project")]
#[command(version)]
#[command(about = "Package manager with preference-ordered dependency resolution", long_about = None)]
pub struct Cli {
    /// State directory holding installed/, cache/, and lock/
    #[arg(long, default_value = "/var/lib/quarry", global = true)]
    pub state_dir: PathBuf,

    /// Candidate source directories (metadata JSON files)
    #[arg(long, global = true)]
    pub source_dir: Vec<PathBuf>,

    /// Platform identifier override
    #[arg(long, global = true)]
    pub platform: Option<String>,

    /// Architecture identifier override
    #[arg(long, global = true)]
    pub arch: Option<String>,

    /// Downgrade hook failures to warnings
    #[arg(long, global = true)]
    pub force: bool,

    /// Remove conflicting installed packages instead of failing
    #[arg(long, global = true)]
    pub force_replace: bool,

    /// Take over the repository lock even if it looks live
    #[arg(long, global = true)]
    pub force_lock: bool,

    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages by name, constraint, or archive path
    Install {
        /// Package specs: name, name>=V, name=V, or a .qar path
        specs: Vec<String>,
    },

    /// Upgrade packages (all out-of-date packages when none are named)
    Upgrade {
        specs: Vec<String>,
    },

    /// Remove installed packages (everything when none are named)
    Remove {
        specs: Vec<String>,

        /// Also remove installed packages that depend on the targets
        #[arg(long)]
        remove_dependents: bool,
    },

    /// List the installed set
    List,
}

/// Map an error to its exit class.
pub fn exit_code(err: &Error) -> i32 {
    match err {
        Error::HookFailure { phase, .. } => match *phase {
            "post-install" => EXIT_POST_INSTALL,
            "post-remove" => EXIT_POST_REMOVE,
            "init-script" => EXIT_INIT_SCRIPT,
            _ => EXIT_GENERIC,
        },
        _ => EXIT_GENERIC,
    }
}

pub fn run(cli: Cli) -> i32 {
    let platform = cli
        .platform
        .clone()
        .unwrap_or_else(|| std::env::consts::OS.to_string());
    let arch = cli
        .arch
        .clone()
        .unwrap_or_else(|| std::env::consts::ARCH.to_string());

    let mut config = Config::new(cli.state_dir.clone(), platform, arch);
    config.force = cli.force;
    config.force_replace = cli.force_replace;
    config.force_lock = cli.force_lock;
    config.assume_yes = cli.yes;

    let source = JsonSource::new(cli.source_dir.clone());
    let archive = JsonArchive;
    let platform_adapter = NullPlatform;
    let hooks = NullHooks;

    let manager = TransactionManager::new(config, &source, &archive, &platform_adapter, &hooks);
    let mut manager = match manager {
        Ok(m) => m,
        Err(e) => {
            eprintln!("quarry: {e}");
            return exit_code(&e);
        }
    };

    let outcome = match cli.command {
        Commands::Install { specs } => manager.install(&specs),
        Commands::Upgrade { specs } => manager.upgrade(&specs),
        Commands::Remove {
            specs,
            remove_dependents,
        } => manager.remove(&specs, RemoveOptions { remove_dependents }),
        Commands::List => {
            return match list_installed(&manager) {
                Ok(()) => EXIT_OK,
                Err(e) => {
                    eprintln!("quarry: {e}");
                    exit_code(&e)
                }
            };
        }
    };

    match outcome {
        Ok(summary) => {
            for name in &summary.installed {
                println!("installed {name}");
            }
            for name in &summary.removed {
                println!("removed {name}");
            }
            for name in &summary.kept {
                println!("kept {name}");
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("quarry: {e}");
            exit_code(&e)
        }
    }
}

fn list_installed(manager: &TransactionManager<'_>) -> crate::Result<()> {
    for pkg in manager.store().list()? {
        println!(
            "{} {} ({})",
            pkg.meta.name,
            pkg.meta.version_string(),
            pkg.installed_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_classes() {
        let post_install = Error::HookFailure {
            package: "x".into(),
            phase: "post-install",
            status: 1,
        };
        assert_eq!(exit_code(&post_install), EXIT_POST_INSTALL);

        let post_remove = Error::HookFailure {
            package: "x".into(),
            phase: "post-remove",
            status: 1,
        };
        assert_eq!(exit_code(&post_remove), EXIT_POST_REMOVE);

        let init = Error::HookFailure {
            package: "x".into(),
            phase: "init-script",
            status: 1,
        };
        assert_eq!(exit_code(&init), EXIT_INIT_SCRIPT);

        let generic = Error::NoSolution { checked: 7 };
        assert_eq!(exit_code(&generic), EXIT_GENERIC);
    }
}
