// CLASSIFICATION: COMMUNITY
// Filename: platform.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Registry of platform bus devices seen so far.
//!
//! Platform devices are not discoverable, so their sysfs path is the only
//! stable handle we get. Later block and character events are attributed to
//! the bus whose path prefixes theirs, which gives `/dev/block/platform/<bus>`
//! names that survive probe order changes.

use log::info;

/// A tracked platform bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDevice {
    path: String,
    name_offset: usize,
}

impl PlatformDevice {
    fn new(path: &str) -> Self {
        let mut name = path;
        if let Some(rest) = name.strip_prefix("/devices/") {
            name = rest.strip_prefix("platform/").unwrap_or(rest);
        }
        Self {
            path: path.to_string(),
            name_offset: path.len() - name.len(),
        }
    }

    /// Full sysfs path of the bus.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Short name used under `/dev/block/platform/`.
    pub fn name(&self) -> &str {
        &self.path[self.name_offset..]
    }

    pub fn path_len(&self) -> usize {
        self.path.len()
    }

    /// True when `path` lies strictly below this bus.
    fn owns(&self, path: &str) -> bool {
        path.len() > self.path.len()
            && path.as_bytes()[self.path.len()] == b'/'
            && path.starts_with(self.path.as_str())
    }
}

/// Insertion ordered table; lookups prefer the most recent registration.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    buses: Vec<PlatformDevice>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `path` unless an already registered bus owns it.
    pub fn register(&mut self, path: &str) -> bool {
        if self.find_owning(path).is_some() {
            return false;
        }
        let bus = PlatformDevice::new(path);
        info!("adding platform device {} ({})", bus.name(), path);
        self.buses.push(bus);
        true
    }

    /// Drop the record registered for exactly `path`.
    pub fn unregister(&mut self, path: &str) -> bool {
        match self.buses.iter().rposition(|b| b.path == path) {
            Some(idx) => {
                let bus = self.buses.remove(idx);
                info!("removing platform device {}", bus.name());
                true
            }
            None => false,
        }
    }

    /// The most recently registered bus that `path` lives under.
    pub fn find_owning(&self, path: &str) -> Option<&PlatformDevice> {
        self.buses.iter().rev().find(|b| b.owns(path))
    }

    pub fn len(&self) -> usize {
        self.buses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformDevice> {
        self.buses.iter()
    }
}
