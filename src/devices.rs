// CLASSIFICATION: COMMUNITY
// Filename: devices.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Device node synthesis.
//!
//! Each event is first turned into a [`DevicePlan`] (node path, directories
//! and symlinks) by pure functions, then [`Synthesizer::apply`] performs the
//! filesystem work for the event's action.

use std::io;

use log::{error, info, warn};

use crate::devfs::{DeviceFs, NodeSpec};
use crate::label::SecurityLabeler;
use crate::perms::PermissionTable;
use crate::platform::PlatformRegistry;
use crate::uevent::Uevent;

/// Longest kernel name accepted for a node.
pub const MAX_NAME_LEN: usize = 64;

/// Longest symlink parent directory we will create.
const MAX_LINK_DIR: usize = 255;

const DIR_MODE: u32 = 0o755;

/// Fixed `/dev` sub directories keyed by subsystem prefix.
const SUBSYSTEM_DIRS: &[(&str, &str)] = &[
    ("graphics", "/dev/graphics/"),
    ("drm", "/dev/dri/"),
    ("oncrpc", "/dev/oncrpc/"),
    ("adsp", "/dev/adsp/"),
    ("msm_camera", "/dev/msm_camera/"),
    ("input", "/dev/input/"),
    ("mtd", "/dev/mtd/"),
    ("sound", "/dev/snd/"),
];

/// Where an event's node lives and what hangs off it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DevicePlan {
    pub devpath: String,
    pub block: bool,
    /// Directories to ensure before the action runs.
    pub dirs: Vec<String>,
    pub links: Vec<String>,
}

/// The node name for a device event: the last path segment, provided the
/// event carries device numbers and the name fits.
pub fn device_name(ev: &Uevent) -> Option<&str> {
    if !ev.is_device_node() {
        return None;
    }
    let (_, name) = ev.path.rsplit_once('/')?;
    if name.len() > MAX_NAME_LEN {
        warn!("device name too long: {}", name);
        return None;
    }
    Some(name)
}

/// Replace every byte unsafe in a path segment with `_`.
pub fn sanitize(name: &str) -> String {
    name.bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.') {
                char::from(b)
            } else {
                '_'
            }
        })
        .collect()
}

/// Plan for a `block` subsystem event.
pub fn block_plan(ev: &Uevent, platform: &PlatformRegistry) -> Option<DevicePlan> {
    let name = device_name(ev)?;
    let links = if ev.path.starts_with("/devices/") {
        platform_block_links(ev, platform)
    } else {
        Vec::new()
    };
    Some(DevicePlan {
        devpath: format!("/dev/block/{name}"),
        block: true,
        dirs: vec!["/dev/block".to_string()],
        links,
    })
}

/// Stable names for a partition below a known platform bus.
pub fn platform_block_links(ev: &Uevent, platform: &PlatformRegistry) -> Vec<String> {
    let Some(pdev) = platform.find_owning(&ev.path) else {
        return Vec::new();
    };
    info!("found platform device {}", pdev.name());
    let link_path = format!("/dev/block/platform/{}", pdev.name());

    let mut links = Vec::with_capacity(3);
    if let Some(part) = &ev.partition_name {
        links.push(format!("{link_path}/by-name/{}", sanitize(part)));
    }
    if ev.partition_num >= 0 {
        links.push(format!("{link_path}/by-num/p{}", ev.partition_num));
    }
    let base = ev.path.rsplit('/').next().unwrap_or_default();
    links.push(format!("{link_path}/{base}"));
    links
}

/// Interface link for USB character devices hanging off a platform bus,
/// e.g. `/dev/usb/tty1-1:1.0`.
pub fn character_device_links(ev: &Uevent, platform: &PlatformRegistry) -> Vec<String> {
    let Some(pdev) = platform.find_owning(&ev.path) else {
        return Vec::new();
    };
    let rest = &ev.path[pdev.path_len()..];
    if !rest.starts_with("/usb") {
        return Vec::new();
    }
    // Skip the root hub and device, keep the interface.
    let mut parts = rest[1..].split('/');
    let (_hub, _device) = (parts.next(), parts.next());
    match (parts.next(), parts.next()) {
        (Some(interface), Some(_)) if !interface.is_empty() => {
            vec![format!("/dev/usb/{}{}", ev.subsystem, interface)]
        }
        _ => Vec::new(),
    }
}

/// Plan for anything that is neither block nor platform.
pub fn generic_plan(ev: &Uevent, platform: &PlatformRegistry) -> Option<DevicePlan> {
    let mut name = device_name(ev)?;
    let subsystem = ev.subsystem.as_str();
    let mut dirs = Vec::new();
    let devpath;

    if subsystem.starts_with("usb") {
        if subsystem != "usb" {
            return None;
        }
        if let Some(devname) = &ev.device_name {
            devpath = format!("/dev/{devname}");
            let mut at = "/dev/".len();
            while let Some(off) = devpath[at..].find('/') {
                dirs.push(devpath[..at + off].to_string());
                at += off + 1;
            }
        } else {
            // devfs layout: minors in groups of 128, numbered from 001.
            let bus_id = ev.minor / 128 + 1;
            let device_id = ev.minor % 128 + 1;
            dirs.push("/dev/bus".to_string());
            dirs.push("/dev/bus/usb".to_string());
            dirs.push(format!("/dev/bus/usb/{bus_id:03}"));
            devpath = format!("/dev/bus/usb/{bus_id:03}/{device_id:03}");
        }
    } else {
        let mut base = "/dev/";
        if let Some(&(_, dir)) = SUBSYSTEM_DIRS.iter().find(|(s, _)| subsystem.starts_with(s)) {
            base = dir;
        } else if subsystem.starts_with("misc") {
            if let Some(stripped) = name.strip_prefix("log_") {
                base = "/dev/log/";
                name = stripped;
            }
        }
        if base != "/dev/" {
            dirs.push(base.trim_end_matches('/').to_string());
        }
        devpath = format!("{base}{name}");
    }

    let links = character_device_links(ev, platform);
    if !links.is_empty() {
        dirs.push("/dev/usb".to_string());
    }
    Some(DevicePlan {
        devpath,
        block: false,
        dirs,
        links,
    })
}

/// Track platform buses; they never get a node of their own.
pub fn handle_platform_event(ev: &Uevent, platform: &mut PlatformRegistry) {
    match ev.action.as_str() {
        "add" => {
            platform.register(&ev.path);
        }
        "remove" => {
            platform.unregister(&ev.path);
        }
        _ => {}
    }
}

/// Filesystem half of device handling, borrowed for one event.
pub struct Synthesizer<'a> {
    pub fs: &'a mut dyn DeviceFs,
    pub perms: &'a PermissionTable,
    pub labeler: &'a dyn SecurityLabeler,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        fs: &'a mut dyn DeviceFs,
        perms: &'a PermissionTable,
        labeler: &'a dyn SecurityLabeler,
    ) -> Self {
        Self { fs, perms, labeler }
    }

    /// Run `action` against a plan. Only `add` and `remove` touch nodes.
    pub fn apply(&mut self, action: &str, plan: &DevicePlan, major: i32, minor: i32) {
        for dir in &plan.dirs {
            if let Err(e) = self.fs.make_dir(dir, DIR_MODE) {
                warn!("mkdir {}: {}", dir, e);
            }
        }
        match action {
            "add" => {
                self.make_device(plan, major, minor);
                for link in &plan.links {
                    self.make_link(&plan.devpath, link);
                }
            }
            "remove" => {
                for link in &plan.links {
                    self.remove_link(&plan.devpath, link);
                }
                if let Err(e) = self.fs.unlink(&plan.devpath) {
                    if e.kind() != io::ErrorKind::NotFound {
                        warn!("unlink {}: {}", plan.devpath, e);
                    }
                }
            }
            _ => {}
        }
    }

    fn make_device(&mut self, plan: &DevicePlan, major: i32, minor: i32) {
        let perm = self.perms.resolve_node_perm(&plan.devpath);
        let kind = if plan.block { libc::S_IFBLK } else { libc::S_IFCHR };
        let spec = NodeSpec {
            mode: perm.mode | kind,
            major: major as u32,
            minor: minor as u32,
            uid: perm.uid,
            gid: perm.gid,
        };

        let context = self.labeler.lookup(&plan.devpath, spec.mode);
        if let Some(ctx) = &context {
            if let Err(e) = self.labeler.set_create_context(Some(ctx)) {
                warn!("setfscreatecon {}: {}", ctx, e);
            }
        }
        if let Err(e) = self.fs.make_node(&plan.devpath, &spec) {
            error!("mknod {} ({}:{}): {}", plan.devpath, major, minor, e);
        }
        if context.is_some() {
            if let Err(e) = self.labeler.set_create_context(None) {
                warn!("clear fscreate context: {}", e);
            }
        }
    }

    fn make_link(&mut self, target: &str, link: &str) {
        let Some(slash) = link.rfind('/') else {
            return;
        };
        if slash == 0 || slash > MAX_LINK_DIR {
            return;
        }
        let dir = &link[..slash];
        if let Err(e) = self.fs.make_dir(dir, DIR_MODE) {
            error!("failed to create directory {}: {}", dir, e);
        }
        if let Err(e) = self.fs.symlink(target, link) {
            if e.kind() != io::ErrorKind::AlreadyExists {
                error!("failed to symlink {} to {}: {}", target, link, e);
            }
        }
    }

    /// Remove `link` only while it still points at `target`.
    fn remove_link(&mut self, target: &str, link: &str) {
        match self.fs.read_link(link) {
            Ok(current) if current == target => {
                if let Err(e) = self.fs.unlink(link) {
                    warn!("unlink {}: {}", link, e);
                }
            }
            _ => {}
        }
    }
}
