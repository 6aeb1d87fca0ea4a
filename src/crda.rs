// CLASSIFICATION: COMMUNITY
// Filename: crda.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Regulatory domain helper launched on platform `change` events.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use log::{info, warn};

use crate::uevent::Uevent;

pub const DEFAULT_CRDA_PATH: &str = "/system/bin/crda";

#[derive(Debug, Clone)]
pub struct CrdaLauncher {
    helper: PathBuf,
}

impl Default for CrdaLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_CRDA_PATH)
    }
}

impl CrdaLauncher {
    pub fn new(helper: impl Into<PathBuf>) -> Self {
        Self {
            helper: helper.into(),
        }
    }

    pub fn helper(&self) -> &Path {
        &self.helper
    }

    /// Whether `ev` asks for the regulatory domain to be set.
    pub fn wants(ev: &Uevent) -> bool {
        ev.subsystem.starts_with("platform") && ev.is_action("change")
    }

    fn is_executable(&self) -> bool {
        self.helper
            .metadata()
            .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    /// Start the helper for `ev` when it applies. The child is reaped on a
    /// detached thread; the caller never waits for it.
    pub fn handle(&self, ev: &Uevent) -> Option<io::Result<u32>> {
        if !Self::wants(ev) {
            return None;
        }
        if !self.is_executable() {
            info!("crda: {} not executable, skipping", self.helper.display());
            return None;
        }
        Some(self.launch(&ev.country))
    }

    fn launch(&self, country: &str) -> io::Result<u32> {
        let child = Command::new(&self.helper)
            .env_clear()
            .env("COUNTRY", country)
            .stdin(Stdio::null())
            .spawn()?;
        let pid = child.id();
        info!("crda: started {} (pid {}) COUNTRY={}", self.helper.display(), pid, country);
        thread::Builder::new()
            .name("crda-reaper".into())
            .spawn(move || reap(child))?;
        Ok(pid)
    }
}

fn reap(mut child: Child) {
    match child.wait() {
        Ok(status) if status.success() => {}
        Ok(status) => warn!("crda: helper exited with {}", status),
        Err(e) => warn!("crda: wait failed: {}", e),
    }
}
