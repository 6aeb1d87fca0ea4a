// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Kernel module autoloading driven by `MODALIAS`.
//!
//! Early in boot the partition holding `modules.dep` may not be mounted yet.
//! Requests that fail for that reason are queued and retried ahead of every
//! later module request.

pub mod modprobe;
pub mod parsers;

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use log::{debug, info};

pub use modprobe::{DepModuleLoader, FinitModule, ModuleFiles, ModuleInserter};

bitflags! {
    /// Outcome of a load request. Empty means loaded or already present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModStatus: u32 {
        const UNKNOWN = 1 << 0;
        /// A module in the chain is on the base blacklist.
        const IN_BLACK = 1 << 1;
        /// A module in the chain is on the caller's blacklist.
        const IN_CALLER_BLACK = 1 << 2;
        const BAD_DEP = 1 << 3;
        const BAD_ALIAS = 1 << 4;
        const DEP_NOT_FOUND = 1 << 5;
        const INVALID_CALLER_BLACK = 1 << 6;
        const INVALID_NAME = 1 << 7;
    }
}

impl ModStatus {
    /// Failures that mean the module files are not readable yet.
    pub const NOT_READY: ModStatus = ModStatus::BAD_DEP
        .union(ModStatus::INVALID_CALLER_BLACK)
        .union(ModStatus::BAD_ALIAS);

    pub fn is_ok(self) -> bool {
        self.is_empty()
    }

    pub fn needs_retry(self) -> bool {
        self.intersects(Self::NOT_READY)
    }
}

/// The module loading collaborator.
pub trait ModuleLoader {
    /// Load `name` (a module name or alias) after its dependencies. `args`
    /// go to the target module only. `blacklist` names an extra blacklist
    /// file checked before anything is loaded.
    fn insmod_by_dep(&self, name: &str, args: &str, blacklist: Option<&Path>) -> ModStatus;

    /// Real module name behind an alias, when known.
    fn resolve_alias(&self, _alias: &str) -> Option<String> {
        None
    }
}

/// Parameters registered for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArgs {
    pub name: String,
    pub args: String,
}

pub struct ModuleAutoloader {
    loader: Box<dyn ModuleLoader>,
    blacklist: Option<PathBuf>,
    deferred: Vec<String>,
    args: Vec<ModuleArgs>,
}

impl ModuleAutoloader {
    /// `blacklist` is applied to uevent driven loads, not to
    /// [`module_probe`](Self::module_probe).
    pub fn new(loader: Box<dyn ModuleLoader>, blacklist: Option<PathBuf>) -> Self {
        Self {
            loader,
            blacklist,
            deferred: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn add_mod_args<S: AsRef<str>>(&mut self, name: &str, args: &[S]) {
        let joined = args
            .iter()
            .map(|a| a.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        self.args.push(ModuleArgs {
            name: name.to_string(),
            args: joined,
        });
    }

    /// Parameters for a module or alias; empty when none were registered.
    pub fn mod_args(&self, name: &str) -> String {
        let real = self.loader.resolve_alias(name);
        let name = real.as_deref().unwrap_or(name);
        self.args
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.args.clone())
            .unwrap_or_default()
    }

    pub fn deferred(&self) -> &[String] {
        &self.deferred
    }

    fn load(&self, alias: &str, blacklist: Option<&Path>) -> ModStatus {
        let args = self.mod_args(alias);
        self.loader.insmod_by_dep(alias, &args, blacklist)
    }

    /// Retry every queued alias, keeping the ones still not ready.
    /// Returns how many left the queue.
    pub fn retry_deferred(&mut self) -> usize {
        let queued = std::mem::take(&mut self.deferred);
        let before = queued.len();
        for alias in queued {
            info!("deferred loading of module for {}", alias);
            let status = self.load(&alias, self.blacklist.as_deref());
            if status.needs_retry() {
                self.deferred.push(alias);
            }
        }
        before - self.deferred.len()
    }

    /// Handle the alias from an add event.
    pub fn handle_modalias(&mut self, modalias: &str) -> ModStatus {
        self.retry_deferred();

        let status = self.load(modalias, self.blacklist.as_deref());
        if status.needs_retry() {
            if self.deferred.iter().any(|a| a == modalias) {
                debug!("{} already queued for deferred loading", modalias);
            } else {
                info!("add to queue for deferred module loading: {}", modalias);
                self.deferred.push(modalias.to_string());
            }
        } else if !status.is_ok() {
            debug!("module for {} not loaded: {:?}", modalias, status);
        }
        status
    }

    /// Explicit load request that skips the uevent blacklist.
    pub fn module_probe(&self, alias: &str) -> ModStatus {
        self.load(alias, None)
    }
}
