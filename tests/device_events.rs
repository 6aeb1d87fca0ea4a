// CLASSIFICATION: COMMUNITY
// Filename: device_events.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

mod common;

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};

use common::{init_logging, mem_manager, message, queue};
use tempfile::tempdir;
use ueventd::perms::PermissionTable;
use ueventd::uevent::UEVENT_MSG_LEN;

const SDCC: &str = "/devices/platform/msm_sdcc.1";
const PART: &str = "/devices/platform/msm_sdcc.1/mmc_host/mmc0/mmc0:0001/block/mmcblk0/mmcblk0p1";

fn platform_add() -> Vec<u8> {
    message(&[("ACTION", "add"), ("DEVPATH", SDCC), ("SUBSYSTEM", "platform")])
}

fn partition(action: &str) -> Vec<u8> {
    message(&[
        ("ACTION", action),
        ("DEVPATH", PART),
        ("SUBSYSTEM", "block"),
        ("MAJOR", "179"),
        ("MINOR", "1"),
        ("PARTN", "1"),
        ("PARTNAME", "system"),
    ])
}

#[test]
fn partition_below_platform_bus_gets_stable_links() {
    init_logging();
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let mut q = queue(vec![platform_add(), partition("add")]);
    assert_eq!(mgr.drain(&mut q), 2);

    let node = mgr.fs().nodes["/dev/block/mmcblk0p1"];
    assert!(node.is_block());
    assert_eq!((node.perm(), node.uid, node.gid), (0o600, 0, 0));
    assert_eq!((node.major, node.minor), (179, 1));

    let links: Vec<_> = mgr.fs().links.keys().cloned().collect();
    assert_eq!(
        links,
        vec![
            "/dev/block/platform/msm_sdcc.1/by-name/system",
            "/dev/block/platform/msm_sdcc.1/by-num/p1",
            "/dev/block/platform/msm_sdcc.1/mmcblk0p1",
        ]
    );
    assert!(mgr.fs().links.values().all(|t| t == "/dev/block/mmcblk0p1"));
}

#[test]
fn partition_before_its_bus_has_no_links() {
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let mut q = queue(vec![partition("add"), platform_add()]);
    mgr.drain(&mut q);
    assert!(mgr.fs().nodes.contains_key("/dev/block/mmcblk0p1"));
    assert!(mgr.fs().links.is_empty());
}

#[test]
fn add_then_remove_leaves_nothing() {
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let mut q = queue(vec![platform_add(), partition("add"), partition("remove")]);
    mgr.drain(&mut q);
    assert!(mgr.fs().nodes.is_empty());
    assert!(mgr.fs().links.is_empty());
}

#[test]
fn remove_keeps_links_owned_by_another_node() {
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let mut q = queue(vec![platform_add(), partition("add")]);
    mgr.drain(&mut q);
    let by_name = "/dev/block/platform/msm_sdcc.1/by-name/system";
    mgr.fs_mut().links.insert(by_name.to_string(), "/dev/block/mmcblk1p1".to_string());

    mgr.handle_message(&partition("remove"));
    assert_eq!(mgr.fs().links.len(), 1);
    assert_eq!(mgr.fs().links[by_name], "/dev/block/mmcblk1p1");
}

#[test]
fn node_rules_apply_newest_first() {
    let mut perms = PermissionTable::new();
    perms.add_node_rule("/dev/input/*", 0o660, 0, 1004, true);
    perms.add_node_rule("/dev/input/event9", 0o600, 1000, 1000, false);
    let (mut mgr, _) = mem_manager(perms);
    let mut q = queue(vec![
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/virtual/input/input3/event3"),
            ("SUBSYSTEM", "input"),
            ("MAJOR", "13"),
            ("MINOR", "67"),
        ]),
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/virtual/input/input9/event9"),
            ("SUBSYSTEM", "input"),
            ("MAJOR", "13"),
            ("MINOR", "73"),
        ]),
    ]);
    mgr.drain(&mut q);
    let event3 = mgr.fs().nodes["/dev/input/event3"];
    assert!(!event3.is_block());
    assert_eq!((event3.perm(), event3.gid), (0o660, 1004));
    assert_eq!(mgr.fs().nodes["/dev/input/event9"].uid, 1000);
    assert!(mgr.fs().dirs.contains("/dev/input"));
}

#[test]
fn generic_naming_rules() {
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let mut q = queue(vec![
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/virtual/misc/log_main"),
            ("SUBSYSTEM", "misc"),
            ("MAJOR", "10"),
            ("MINOR", "60"),
        ]),
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/pci0000:00/usb2/2-1"),
            ("SUBSYSTEM", "usb"),
            ("MAJOR", "189"),
            ("MINOR", "129"),
        ]),
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/pci0000:00/usb1/1-2"),
            ("SUBSYSTEM", "usb"),
            ("MAJOR", "189"),
            ("MINOR", "1"),
            ("DEVNAME", "bus/usb/001/002"),
        ]),
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/pci0000:00/usb1/1-2/1-2:1.0"),
            ("SUBSYSTEM", "usb_device"),
            ("MAJOR", "189"),
            ("MINOR", "2"),
        ]),
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", "/devices/virtual/sound/controlC0"),
            ("SUBSYSTEM", "sound"),
            ("MAJOR", "116"),
            ("MINOR", "0"),
        ]),
    ]);
    mgr.drain(&mut q);
    let nodes: Vec<_> = mgr.fs().nodes.keys().cloned().collect();
    assert_eq!(
        nodes,
        vec![
            "/dev/bus/usb/001/002",
            "/dev/bus/usb/002/002",
            "/dev/log/main",
            "/dev/snd/controlC0",
        ]
    );
}

#[test]
fn events_without_numbers_or_with_long_names_make_no_node() {
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let long = format!("/devices/virtual/misc/{}", "n".repeat(65));
    let mut q = queue(vec![
        message(&[("ACTION", "add"), ("DEVPATH", "/devices/virtual/net/lo"), ("SUBSYSTEM", "net")]),
        message(&[
            ("ACTION", "add"),
            ("DEVPATH", long.as_str()),
            ("SUBSYSTEM", "misc"),
            ("MAJOR", "10"),
            ("MINOR", "1"),
        ]),
    ]);
    assert_eq!(mgr.drain(&mut q), 2);
    assert!(mgr.fs().nodes.is_empty());
}

#[test]
fn oversized_datagram_is_dropped() {
    let (mut mgr, _) = mem_manager(PermissionTable::new());
    let mut big = platform_add();
    big.resize(UEVENT_MSG_LEN + 10, b'A');
    let mut q = queue(vec![big, partition("add")]);
    assert_eq!(mgr.drain(&mut q), 1);
    assert!(mgr.platform().is_empty());
    assert!(mgr.fs().links.is_empty());
}

#[test]
fn sysfs_attributes_fixed_on_add_and_change() {
    let sys = tempdir().unwrap();
    let dev = sys.path().join("devices/virtual/input/input1");
    fs::create_dir_all(&dev).unwrap();
    fs::write(dev.join("enable"), b"0").unwrap();
    fs::set_permissions(dev.join("enable"), fs::Permissions::from_mode(0o600)).unwrap();
    let owner = fs::metadata(dev.join("enable")).unwrap();

    let mut perms = PermissionTable::new();
    perms.add_attr_rule(
        "/sys/devices/virtual/input/input*",
        "enable",
        0o664,
        owner.uid(),
        owner.gid(),
        true,
    );
    let (mgr, _) = mem_manager(perms);
    let mut mgr = mgr.with_sysfs_root(sys.path());

    mgr.handle_message(&message(&[
        ("ACTION", "change"),
        ("DEVPATH", "/devices/virtual/input/input1"),
        ("SUBSYSTEM", "input"),
    ]));
    let mode = fs::metadata(dev.join("enable")).unwrap().permissions().mode();
    assert_eq!(mode & 0o7777, 0o664);

    fs::set_permissions(dev.join("enable"), fs::Permissions::from_mode(0o600)).unwrap();
    mgr.handle_message(&message(&[
        ("ACTION", "remove"),
        ("DEVPATH", "/devices/virtual/input/input1"),
        ("SUBSYSTEM", "input"),
    ]));
    let mode = fs::metadata(dev.join("enable")).unwrap().permissions().mode();
    assert_eq!(mode & 0o7777, 0o600);
}
