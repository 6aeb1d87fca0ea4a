// CLASSIFICATION: COMMUNITY
// Filename: coldboot.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Replay `add` events for devices the kernel found before we started.
//!
//! Writing `add` to a sysfs `uevent` file makes the kernel re-send the event.
//! The socket is drained after every write so the receive buffer never holds
//! more than one device's worth of events.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info, warn};

pub const DEFAULT_COLDBOOT_PATHS: [&str; 3] = ["/sys/class", "/sys/block", "/sys/devices"];
pub const DEFAULT_COLDBOOT_MARKER: &str = "/dev/.coldboot_done";

#[derive(Debug, Clone, Default)]
pub struct Coldboot {
    /// Follow symlinked directories this many levels deep; `None` never
    /// follows them.
    follow_depth: Option<usize>,
}

impl Coldboot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn follow_symlinks(mut self, max_depth: usize) -> Self {
        self.follow_depth = Some(max_depth);
        self
    }

    /// Poke every `uevent` file below `root`, calling `drain` with the
    /// directory after each successful write. Returns the number of pokes.
    pub fn walk(&self, root: &Path, drain: &mut dyn FnMut(&Path)) -> usize {
        self.walk_at(root, 0, drain)
    }

    fn walk_at(&self, dir: &Path, depth: usize, drain: &mut dyn FnMut(&Path)) -> usize {
        let mut pokes = 0;
        if let Ok(mut f) = OpenOptions::new().write(true).open(dir.join("uevent")) {
            match f.write_all(b"add\n") {
                Ok(()) => {
                    pokes += 1;
                    drain(dir);
                }
                Err(e) => debug!("coldboot {}: {}", dir.display(), e),
            }
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("coldboot: cannot list {}: {}", dir.display(), e);
                return pokes;
            }
        };
        let mut children: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .filter(|entry| self.descend_into(entry, depth))
            .map(|entry| entry.path())
            .collect();
        children.sort();

        for child in children {
            pokes += self.walk_at(&child, depth + 1, drain);
        }
        pokes
    }

    fn descend_into(&self, entry: &fs::DirEntry, depth: usize) -> bool {
        let Ok(kind) = entry.file_type() else {
            return false;
        };
        if kind.is_dir() {
            return true;
        }
        match self.follow_depth {
            Some(max) if kind.is_symlink() && depth < max => {
                fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Walk `paths` in order unless `marker` already exists, then create
    /// the marker. Returns whether a walk happened. A marker that cannot
    /// be created is logged; the next start simply walks again.
    pub fn run(&self, paths: &[PathBuf], marker: &Path, drain: &mut dyn FnMut(&Path)) -> bool {
        if marker.exists() {
            info!("skipping coldboot, already done");
            return false;
        }
        let started = Instant::now();
        let mut pokes = 0;
        for path in paths {
            if !path.is_dir() {
                warn!("coldboot: {} is not a directory", path.display());
                continue;
            }
            pokes += self.walk(path, drain);
        }
        if let Err(e) = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o000)
            .open(marker)
        {
            warn!("coldboot: cannot create {}: {}", marker.display(), e);
        }
        info!(
            "coldboot {} devices in {:.2}s",
            pokes,
            started.elapsed().as_secs_f64()
        );
        true
    }
}
