// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Daemon configuration, read from TOML.
//!
//! ```toml
//! firmware_dirs = ["/etc/firmware", "/vendor/firmware"]
//!
//! [[device]]
//! name = "/dev/input/*"
//! mode = 0o660
//! gid = 1004
//!
//! [[sysfs]]
//! name = "/sys/devices/virtual/input/input*"
//! attr = "enable"
//! mode = 0o660
//! uid = 1000
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::coldboot::{DEFAULT_COLDBOOT_MARKER, DEFAULT_COLDBOOT_PATHS};
use crate::crda::{CrdaLauncher, DEFAULT_CRDA_PATH};
use crate::error::{DevmgrError, Result};
use crate::firmware::{FirmwareLoader, DEFAULT_BOOT_MARKER, DEFAULT_FIRMWARE_DIRS};
use crate::label::{NoLabels, SecurityLabeler, StaticLabeler};
use crate::matcher::has_glob_meta;
use crate::modules::{DepModuleLoader, ModuleAutoloader, ModuleFiles};
use crate::netlink::DEFAULT_RCVBUF;
use crate::perms::{sysfs_path, PermissionTable, DEFAULT_NODE_MODE};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ueventd.toml";
pub const CONFIG_ENV: &str = "UEVENTD_CONFIG";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Filesystem root that `/dev/...` paths are created below.
    pub dev_root: PathBuf,
    pub sysfs_root: PathBuf,
    pub coldboot_marker: PathBuf,
    /// Sysfs trees replayed at startup, as `/sys/...` paths.
    pub coldboot_paths: Vec<String>,
    pub coldboot_follow_depth: Option<usize>,
    pub boot_marker: PathBuf,
    pub firmware_dirs: Vec<PathBuf>,
    pub firmware_boot_timeout_secs: Option<u64>,
    /// Serve firmware requests on worker threads.
    pub firmware_worker: bool,
    pub netlink_rcvbuf: usize,
    pub crda_path: PathBuf,
    pub modules: ModulesConfig,
    #[serde(rename = "device")]
    pub devices: Vec<NodeRuleConfig>,
    pub sysfs: Vec<AttrRuleConfig>,
    pub module_args: Vec<ModuleArgsConfig>,
    #[serde(rename = "label")]
    pub labels: Vec<LabelConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            dev_root: PathBuf::from("/"),
            sysfs_root: PathBuf::from("/sys"),
            coldboot_marker: PathBuf::from(DEFAULT_COLDBOOT_MARKER),
            coldboot_paths: DEFAULT_COLDBOOT_PATHS.iter().map(|p| p.to_string()).collect(),
            coldboot_follow_depth: None,
            boot_marker: PathBuf::from(DEFAULT_BOOT_MARKER),
            firmware_dirs: DEFAULT_FIRMWARE_DIRS.iter().map(PathBuf::from).collect(),
            firmware_boot_timeout_secs: None,
            firmware_worker: true,
            netlink_rcvbuf: DEFAULT_RCVBUF,
            crda_path: PathBuf::from(DEFAULT_CRDA_PATH),
            modules: ModulesConfig::default(),
            devices: Vec::new(),
            sysfs: Vec::new(),
            module_args: Vec::new(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModulesConfig {
    pub dir: PathBuf,
    pub dep_file: PathBuf,
    pub alias_file: PathBuf,
    pub base_blacklist: PathBuf,
    /// Extra blacklist applied to uevent driven loads only.
    pub ueventd_blacklist: Option<PathBuf>,
    pub strip: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        let files = ModuleFiles::default();
        Self {
            dir: files.dir,
            dep_file: files.dep_file,
            alias_file: files.alias_file,
            base_blacklist: files.base_blacklist,
            ueventd_blacklist: Some(PathBuf::from("/ueventd.modules.blacklist")),
            strip: files.strip,
        }
    }
}

fn default_mode() -> u32 {
    DEFAULT_NODE_MODE
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeRuleConfig {
    pub name: String,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttrRuleConfig {
    pub name: String,
    pub attr: String,
    #[serde(default = "default_mode")]
    pub mode: u32,
    #[serde(default)]
    pub uid: u32,
    #[serde(default)]
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleArgsConfig {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelConfig {
    pub pattern: String,
    pub context: String,
}

/// `explicit`, else `$UEVENTD_CONFIG`, else the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl DaemonConfig {
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| DevmgrError::Config {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                info!("loading config {}", path.display());
                Self::from_toml(&text, path)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(DevmgrError::io("read", path, e)),
        }
    }

    /// Node and attribute rules in file order.
    pub fn permissions(&self) -> Result<PermissionTable> {
        let mut table = PermissionTable::new();
        for rule in &self.devices {
            if rule.name.is_empty() {
                return Err(DevmgrError::InvalidRule(rule.name.clone(), "empty device name"));
            }
            let wildcard = has_glob_meta(&rule.name);
            table.add_node_rule(&rule.name, rule.mode, rule.uid, rule.gid, wildcard);
        }
        for rule in &self.sysfs {
            if !rule.name.starts_with("/sys/") {
                return Err(DevmgrError::InvalidRule(
                    rule.name.clone(),
                    "sysfs rule must start with /sys/",
                ));
            }
            if rule.attr.is_empty() {
                return Err(DevmgrError::InvalidRule(rule.name.clone(), "missing attribute"));
            }
            table.add_attr_rule(
                &rule.name,
                &rule.attr,
                rule.mode,
                rule.uid,
                rule.gid,
                has_glob_meta(&rule.name),
            );
        }
        Ok(table)
    }

    pub fn labeler(&self) -> Box<dyn SecurityLabeler> {
        if self.labels.is_empty() {
            return Box::new(NoLabels);
        }
        let mut labeler = StaticLabeler::new();
        for label in &self.labels {
            labeler.add(&label.pattern, &label.context);
        }
        Box::new(labeler)
    }

    pub fn module_files(&self) -> ModuleFiles {
        ModuleFiles {
            dir: self.modules.dir.clone(),
            dep_file: self.modules.dep_file.clone(),
            alias_file: self.modules.alias_file.clone(),
            base_blacklist: self.modules.base_blacklist.clone(),
            strip: self.modules.strip,
        }
    }

    pub fn autoloader(&self) -> ModuleAutoloader {
        let loader = DepModuleLoader::new(self.module_files());
        let mut autoloader =
            ModuleAutoloader::new(Box::new(loader), self.modules.ueventd_blacklist.clone());
        for entry in &self.module_args {
            autoloader.add_mod_args(&entry.name, entry.args.as_slice());
        }
        autoloader
    }

    /// `/dev` marker paths live below `dev_root` like the nodes do.
    fn below_dev_root(&self, path: &Path) -> PathBuf {
        self.dev_root.join(path.strip_prefix("/").unwrap_or(path))
    }

    pub fn coldboot_marker_path(&self) -> PathBuf {
        self.below_dev_root(&self.coldboot_marker)
    }

    pub fn boot_marker_path(&self) -> PathBuf {
        self.below_dev_root(&self.boot_marker)
    }

    pub fn firmware_loader(&self) -> FirmwareLoader {
        FirmwareLoader::new(self.firmware_dirs.clone(), &self.sysfs_root)
            .with_boot_marker(self.boot_marker_path())
            .with_boot_timeout(self.firmware_boot_timeout_secs.map(Duration::from_secs))
    }

    pub fn crda(&self) -> CrdaLauncher {
        CrdaLauncher::new(&self.crda_path)
    }

    /// Coldboot trees mapped onto the configured sysfs mount.
    pub fn coldboot_paths(&self) -> Vec<PathBuf> {
        self.coldboot_paths
            .iter()
            .map(|p| sysfs_path(&self.sysfs_root, p))
            .collect()
    }
}
