// CLASSIFICATION: COMMUNITY
// Filename: manager.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! The device manager: owns every table and dispatches events.
//!
//! One event is fully handled before the next datagram is read. Only
//! firmware loads leave the loop, and those run on workers that share
//! nothing mutable with the manager.

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use log::{debug, error, info, warn};

use crate::coldboot::Coldboot;
use crate::config::DaemonConfig;
use crate::crda::CrdaLauncher;
use crate::devfs::{DeviceFs, HostFs};
use crate::devices::{self, Synthesizer};
use crate::error::{DevmgrError, Result};
use crate::firmware::{FirmwareLoader, FirmwareOutcome, FirmwareReport};
use crate::label::{NoLabels, SecurityLabeler};
use crate::modules::ModuleAutoloader;
use crate::netlink::UeventSource;
use crate::perms::PermissionTable;
use crate::platform::PlatformRegistry;
use crate::uevent::{self, Uevent, UEVENT_MSG_LEN};

/// Poll timeout while firmware workers are still running, in milliseconds.
const REAP_INTERVAL_MS: libc::c_int = 500;

enum FirmwareDispatch {
    Inline,
    Workers {
        tx: Sender<FirmwareReport>,
        rx: Receiver<FirmwareReport>,
        pending: usize,
    },
}

pub struct DeviceManager<F: DeviceFs = HostFs> {
    fs: F,
    platform: PlatformRegistry,
    perms: PermissionTable,
    modules: ModuleAutoloader,
    labeler: Box<dyn SecurityLabeler>,
    firmware: FirmwareLoader,
    dispatch: FirmwareDispatch,
    crda: Option<CrdaLauncher>,
    sysfs_root: PathBuf,
}

impl DeviceManager<HostFs> {
    /// Everything the daemon needs, as described by `cfg`.
    pub fn from_config(cfg: &DaemonConfig) -> Result<Self> {
        let fs = HostFs::new(&cfg.dev_root);
        let manager = DeviceManager::new(fs, cfg.permissions()?, cfg.autoloader())
            .with_labeler(cfg.labeler())
            .with_firmware(cfg.firmware_loader(), cfg.firmware_worker)
            .with_crda(Some(cfg.crda()))
            .with_sysfs_root(&cfg.sysfs_root);
        Ok(manager)
    }
}

impl<F: DeviceFs> DeviceManager<F> {
    /// A manager with no labels, inline firmware loading from the default
    /// directories and no regulatory helper.
    pub fn new(fs: F, perms: PermissionTable, modules: ModuleAutoloader) -> Self {
        Self {
            fs,
            platform: PlatformRegistry::new(),
            perms,
            modules,
            labeler: Box::new(NoLabels),
            firmware: FirmwareLoader::default(),
            dispatch: FirmwareDispatch::Inline,
            crda: None,
            sysfs_root: PathBuf::from("/sys"),
        }
    }

    pub fn with_labeler(mut self, labeler: Box<dyn SecurityLabeler>) -> Self {
        self.labeler = labeler;
        self
    }

    /// `worker` runs each load on its own thread; otherwise loads block
    /// the event loop.
    pub fn with_firmware(mut self, loader: FirmwareLoader, worker: bool) -> Self {
        self.firmware = loader;
        self.dispatch = if worker {
            let (tx, rx) = mpsc::channel();
            FirmwareDispatch::Workers { tx, rx, pending: 0 }
        } else {
            FirmwareDispatch::Inline
        };
        self
    }

    pub fn with_crda(mut self, crda: Option<CrdaLauncher>) -> Self {
        self.crda = crda;
        self
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn platform(&self) -> &PlatformRegistry {
        &self.platform
    }

    pub fn perms(&self) -> &PermissionTable {
        &self.perms
    }

    pub fn perms_mut(&mut self) -> &mut PermissionTable {
        &mut self.perms
    }

    pub fn modules(&self) -> &ModuleAutoloader {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut ModuleAutoloader {
        &mut self.modules
    }

    pub fn sysfs_root(&self) -> &Path {
        &self.sysfs_root
    }

    /// Parse and dispatch one datagram. Oversized datagrams are dropped.
    pub fn handle_message(&mut self, msg: &[u8]) -> bool {
        if msg.len() >= UEVENT_MSG_LEN {
            debug!("dropping oversized uevent ({} bytes)", msg.len());
            return false;
        }
        let ev = uevent::parse(msg);
        self.handle_event(&ev);
        true
    }

    pub fn handle_event(&mut self, ev: &Uevent) {
        if ev.is_action("add") {
            if let Some(alias) = &ev.modalias {
                self.modules.handle_modalias(alias);
            }
        }

        if ev.is_action("add") || ev.is_action("change") {
            self.perms
                .apply_attr_perms(&self.sysfs_root, &ev.path, self.labeler.as_ref());
        }

        self.handle_device_event(ev);

        if ev.subsystem == "firmware" && ev.is_action("add") {
            self.handle_firmware_event(ev);
        }

        if let Some(crda) = &self.crda {
            if let Some(Err(e)) = crda.handle(ev) {
                warn!("crda: {}", e);
            }
        }
    }

    fn handle_device_event(&mut self, ev: &Uevent) {
        let subsystem = ev.subsystem.as_str();
        let plan = if subsystem.starts_with("block") {
            devices::block_plan(ev, &self.platform)
        } else if subsystem.starts_with("platform") {
            devices::handle_platform_event(ev, &mut self.platform);
            None
        } else {
            devices::generic_plan(ev, &self.platform)
        };

        if let Some(plan) = plan {
            Synthesizer::new(&mut self.fs, &self.perms, self.labeler.as_ref())
                .apply(&ev.action, &plan, ev.major, ev.minor);
        }
    }

    fn handle_firmware_event(&mut self, ev: &Uevent) {
        match &mut self.dispatch {
            FirmwareDispatch::Inline => {
                let outcome = self.firmware.load(&ev.path, &ev.firmware);
                log_report(&FirmwareReport {
                    devpath: ev.path.clone(),
                    firmware: ev.firmware.clone(),
                    outcome,
                });
            }
            FirmwareDispatch::Workers { tx, pending, .. } => {
                match self.firmware.spawn(&ev.path, &ev.firmware, tx.clone()) {
                    Ok(_) => *pending += 1,
                    Err(e) => error!("firmware: cannot start worker for {}: {}", ev.firmware, e),
                }
            }
        }
    }

    /// Firmware loads still running on workers.
    pub fn firmware_pending(&self) -> usize {
        match &self.dispatch {
            FirmwareDispatch::Inline => 0,
            FirmwareDispatch::Workers { pending, .. } => *pending,
        }
    }

    /// Collect and log finished worker reports without blocking.
    pub fn reap_firmware_reports(&mut self) -> Vec<FirmwareReport> {
        let FirmwareDispatch::Workers { rx, pending, .. } = &mut self.dispatch else {
            return Vec::new();
        };
        let mut done = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(report) => {
                    log_report(&report);
                    *pending = pending.saturating_sub(1);
                    done.push(report);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        done
    }

    /// Dispatch every pending datagram from `source`. Returns how many were
    /// handled.
    pub fn drain(&mut self, source: &mut dyn UeventSource) -> usize {
        let mut buf = [0u8; UEVENT_MSG_LEN + 2];
        let mut handled = 0;
        loop {
            match source.recv(&mut buf) {
                Ok(Some(n)) => {
                    if self.handle_message(&buf[..n]) {
                        handled += 1;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("uevent recv: {}", e);
                    break;
                }
            }
        }
        handled
    }

    /// Replay existing devices, draining `source` after every poke.
    pub fn coldboot(
        &mut self,
        source: &mut dyn UeventSource,
        walker: &Coldboot,
        paths: &[PathBuf],
        marker: &Path,
    ) -> bool {
        walker.run(paths, marker, &mut |_| {
            self.drain(source);
        })
    }

    /// Serve `source` until polling it fails.
    pub fn run<S: UeventSource + AsRawFd>(&mut self, source: &mut S) -> Result<()> {
        info!("ueventd: entering event loop");
        loop {
            let mut pfd = libc::pollfd {
                fd: source.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let timeout = if self.firmware_pending() > 0 { REAP_INTERVAL_MS } else { -1 };
            // SAFETY: pfd is a single valid pollfd for the whole call.
            let nr = unsafe { libc::poll(&mut pfd, 1, timeout) };
            if nr < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(DevmgrError::Netlink(e));
            }
            if nr > 0 && pfd.revents & libc::POLLIN != 0 {
                self.drain(source);
            }
            self.reap_firmware_reports();
        }
    }
}

fn log_report(report: &FirmwareReport) {
    match &report.outcome {
        FirmwareOutcome::Loaded { source, bytes } => info!(
            "firmware: {} -> {} ({} bytes from {})",
            report.firmware,
            report.devpath,
            bytes,
            source.display()
        ),
        other => warn!("firmware: {} for {}: {:?}", report.firmware, report.devpath, other),
    }
}
