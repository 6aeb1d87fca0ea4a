// CLASSIFICATION: COMMUNITY
// Filename: perms.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Ownership and mode policy for device nodes and sysfs attributes.
//!
//! Node rules are searched newest first so that a board specific file loaded
//! after the generic one overrides it. Attribute rules are all applied, in
//! load order, since one device commonly has several attributes to fix up.

use std::fs;
use std::os::unix::fs::{chown, PermissionsExt};
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::label::SecurityLabeler;
use crate::matcher::NameMatcher;

/// Mode applied to nodes no rule matches, owned by root:root.
pub const DEFAULT_NODE_MODE: u32 = 0o600;

/// Longest attribute path we are willing to build.
const MAX_ATTR_PATH: usize = 512;

/// Rule names for sysfs attributes carry this prefix; event paths do not.
const SYSFS_PREFIX: &str = "/sys";

/// Resolved ownership for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePerm {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl Default for NodePerm {
    fn default() -> Self {
        Self {
            mode: DEFAULT_NODE_MODE,
            uid: 0,
            gid: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermRule {
    name: String,
    matcher: NameMatcher,
    attr: Option<String>,
    pub perm: NodePerm,
}

impl PermRule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self) -> Option<&str> {
        self.attr.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.matcher.is_wildcard()
    }
}

/// One pending chown/chmod on a sysfs attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrFixup {
    /// Absolute path below `/sys`.
    pub path: String,
    pub perm: NodePerm,
}

#[derive(Debug, Default)]
pub struct PermissionTable {
    node_rules: Vec<PermRule>,
    attr_rules: Vec<PermRule>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a rule by whether it names an attribute.
    pub fn add_rule(
        &mut self,
        name: &str,
        attr: Option<&str>,
        mode: u32,
        uid: u32,
        gid: u32,
        wildcard: bool,
    ) {
        match attr {
            Some(attr) => self.add_attr_rule(name, attr, mode, uid, gid, wildcard),
            None => self.add_node_rule(name, mode, uid, gid, wildcard),
        }
    }

    pub fn add_node_rule(&mut self, name: &str, mode: u32, uid: u32, gid: u32, wildcard: bool) {
        self.node_rules.push(PermRule {
            name: name.to_string(),
            matcher: NameMatcher::new(name, wildcard),
            attr: None,
            perm: NodePerm { mode, uid, gid },
        });
    }

    pub fn add_attr_rule(
        &mut self,
        name: &str,
        attr: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        wildcard: bool,
    ) {
        let relative = name.get(SYSFS_PREFIX.len()..).unwrap_or("");
        self.attr_rules.push(PermRule {
            name: name.to_string(),
            matcher: NameMatcher::new(relative, wildcard),
            attr: Some(attr.to_string()),
            perm: NodePerm { mode, uid, gid },
        });
    }

    pub fn node_rules(&self) -> &[PermRule] {
        &self.node_rules
    }

    pub fn attr_rules(&self) -> &[PermRule] {
        &self.attr_rules
    }

    /// Ownership for the node at `devpath`, newest matching rule first.
    pub fn resolve_node_perm(&self, devpath: &str) -> NodePerm {
        self.node_rules
            .iter()
            .rev()
            .find(|r| r.matcher.matches(devpath))
            .map(|r| r.perm)
            .unwrap_or_default()
    }

    /// Every attribute fixup that applies to the device at sysfs relative
    /// `upath`, in rule order. An oversized path ends the list.
    pub fn attr_fixups(&self, upath: &str) -> Vec<AttrFixup> {
        let mut out = Vec::new();
        for rule in &self.attr_rules {
            if !rule.matcher.matches(upath) {
                continue;
            }
            let attr = rule.attr.as_deref().unwrap_or("");
            if upath.len() + attr.len() + 6 > MAX_ATTR_PATH {
                break;
            }
            out.push(AttrFixup {
                path: format!("{SYSFS_PREFIX}{upath}/{attr}"),
                perm: rule.perm,
            });
        }
        out
    }

    /// Apply attribute rules for `upath` below the sysfs mount `sysfs_root`.
    /// Failures are logged per attribute and do not stop the others.
    pub fn apply_attr_perms(
        &self,
        sysfs_root: &Path,
        upath: &str,
        labeler: &dyn SecurityLabeler,
    ) -> usize {
        let fixups = self.attr_fixups(upath);
        for fix in &fixups {
            let target = sysfs_path(sysfs_root, &fix.path);
            info!(
                "fixup {} {} {} 0{:o}",
                target.display(),
                fix.perm.uid,
                fix.perm.gid,
                fix.perm.mode
            );
            if let Err(e) = chown(&target, Some(fix.perm.uid), Some(fix.perm.gid)) {
                warn!("chown {}: {}", target.display(), e);
            }
            let mode = fs::Permissions::from_mode(fix.perm.mode);
            if let Err(e) = fs::set_permissions(&target, mode) {
                warn!("chmod {}: {}", target.display(), e);
            }
            if let Err(e) = labeler.relabel(&target.to_string_lossy()) {
                warn!("relabel {}: {}", target.display(), e);
            }
        }
        fixups.len()
    }
}

/// Map a `/sys/...` path onto the configured sysfs mount.
pub fn sysfs_path(sysfs_root: &Path, path: &str) -> PathBuf {
    let rel = path.strip_prefix(SYSFS_PREFIX).unwrap_or(path);
    sysfs_root.join(rel.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_node_gets_default() {
        let mut t = PermissionTable::new();
        t.add_node_rule("/dev/null", 0o666, 0, 0, false);
        assert_eq!(t.resolve_node_perm("/dev/zero"), NodePerm::default());
        assert_eq!(
            t.resolve_node_perm("/dev/zero"),
            NodePerm { mode: 0o600, uid: 0, gid: 0 }
        );
    }

    #[test]
    fn later_node_rule_overrides() {
        let mut t = PermissionTable::new();
        t.add_node_rule("/dev/input/*", 0o660, 0, 1004, true);
        t.add_node_rule("/dev/input/event3", 0o600, 1000, 1000, false);
        assert_eq!(t.resolve_node_perm("/dev/input/event3").uid, 1000);
        assert_eq!(t.resolve_node_perm("/dev/input/event1").gid, 1004);
    }

    #[test]
    fn earlier_rule_loses_even_when_more_specific() {
        let mut t = PermissionTable::new();
        t.add_node_rule("/dev/input/event3", 0o600, 1000, 1000, false);
        t.add_node_rule("/dev/input/*", 0o660, 0, 1004, true);
        assert_eq!(t.resolve_node_perm("/dev/input/event3").gid, 1004);
    }

    #[test]
    fn every_attr_rule_applies_in_order() {
        let mut t = PermissionTable::new();
        t.add_attr_rule("/sys/devices/virtual/input/input*", "enable", 0o660, 0, 1000, true);
        t.add_attr_rule("/sys/devices/virtual/input/input*", "poll_delay", 0o664, 0, 1000, true);
        t.add_attr_rule("/sys/devices/other", "enable", 0o600, 0, 0, false);
        let fixups = t.attr_fixups("/devices/virtual/input/input4");
        let paths: Vec<_> = fixups.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/sys/devices/virtual/input/input4/enable",
                "/sys/devices/virtual/input/input4/poll_delay"
            ]
        );
    }

    #[test]
    fn add_rule_routes_by_attr() {
        let mut t = PermissionTable::new();
        t.add_rule("/dev/null", None, 0o666, 0, 0, false);
        t.add_rule("/sys/class/leds/*", Some("brightness"), 0o664, 1000, 1000, true);
        assert_eq!(t.node_rules().len(), 1);
        assert_eq!(t.attr_rules().len(), 1);
        assert_eq!(t.attr_rules()[0].attr(), Some("brightness"));
    }

    #[test]
    fn oversized_attr_path_stops_scan() {
        let mut t = PermissionTable::new();
        let long = "x".repeat(600);
        t.add_attr_rule("/sys/devices/*", &long, 0o600, 0, 0, true);
        t.add_attr_rule("/sys/devices/*", "enable", 0o600, 0, 0, true);
        assert!(t.attr_fixups("/devices/a").is_empty());
    }

    #[test]
    fn sysfs_path_maps_onto_root() {
        assert_eq!(
            sysfs_path(Path::new("/tmp/fake"), "/sys/devices/a/enable"),
            PathBuf::from("/tmp/fake/devices/a/enable")
        );
    }
}
