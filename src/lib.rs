// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Date Modified: 2026-10-16
// Author: Lukas Bower

//! Device node manager for the init system: kernel uevents in, `/dev` out.

/// Decoding of raw netlink uevent datagrams
pub mod uevent;

/// Platform bus registry used for stable block device names
pub mod platform;

/// Exact and glob name matching shared by the rule tables
pub mod matcher;

/// Ownership and mode rules for device nodes and sysfs attributes
pub mod perms;

/// Security label hooks
pub mod label;

/// Filesystem backend for `/dev`
pub mod devfs;

/// Node path, symlink and permission synthesis
pub mod devices;

/// Userspace firmware loading
pub mod firmware;

/// Kernel module autoloading
pub mod modules;

/// Coldboot replay of existing devices
pub mod coldboot;

/// Regulatory domain helper launcher
pub mod crda;

/// Netlink uevent socket
pub mod netlink;

pub mod config;
pub mod error;
pub mod manager;

pub use error::{DevmgrError, Result};
pub use manager::DeviceManager;
pub use uevent::{parse, Uevent};
