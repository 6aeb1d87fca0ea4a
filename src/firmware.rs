// CLASSIFICATION: COMMUNITY
// Filename: firmware.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Userspace firmware loading.
//!
//! When a driver asks for a blob the kernel exposes
//! `/sys/<devpath>/{loading,data}` and emits a `firmware` add event. We write
//! `1` to `loading`, stream the file into `data`, then write `0` on success
//! or `-1` to abort. The kernel only learns about failure through that
//! handshake.

use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

/// Searched in order; the first directory holding the file wins.
pub const DEFAULT_FIRMWARE_DIRS: [&str; 3] =
    ["/etc/firmware", "/vendor/firmware", "/firmware/image"];

/// Present while init is still bringing the system up.
pub const DEFAULT_BOOT_MARKER: &str = "/dev/.booting";

const CHUNK: usize = 4096;
const BOOT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareOutcome {
    Loaded { source: PathBuf, bytes: u64 },
    /// No candidate file existed once boot finished (or the wait timed out).
    NotFound,
    /// The copy started but a read or write failed.
    CopyFailed,
    /// The sysfs handshake files could not be opened.
    NoInterface,
}

impl FirmwareOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, FirmwareOutcome::Loaded { .. })
    }
}

/// Result of one load, sent back from a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareReport {
    pub devpath: String,
    pub firmware: String,
    pub outcome: FirmwareOutcome,
}

/// Read only state needed to serve a request. Cloned into each worker.
#[derive(Debug, Clone)]
pub struct FirmwareLoader {
    dirs: Vec<PathBuf>,
    sysfs_root: PathBuf,
    boot_marker: PathBuf,
    boot_timeout: Option<Duration>,
    retry_interval: Duration,
}

impl Default for FirmwareLoader {
    fn default() -> Self {
        Self::new(DEFAULT_FIRMWARE_DIRS.iter().map(PathBuf::from).collect(), "/sys")
    }
}

impl FirmwareLoader {
    pub fn new(dirs: Vec<PathBuf>, sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            dirs,
            sysfs_root: sysfs_root.into(),
            boot_marker: PathBuf::from(DEFAULT_BOOT_MARKER),
            boot_timeout: None,
            retry_interval: BOOT_RETRY_INTERVAL,
        }
    }

    pub fn with_boot_marker(mut self, marker: impl Into<PathBuf>) -> Self {
        self.boot_marker = marker.into();
        self
    }

    /// Give up waiting for firmware filesystems after `timeout` even if the
    /// boot marker is still present. `None` waits for the marker alone.
    pub fn with_boot_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.boot_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    fn is_booting(&self) -> bool {
        self.boot_marker.exists()
    }

    fn open_candidate(&self, firmware: &str) -> Option<(PathBuf, File)> {
        self.dirs.iter().find_map(|dir| {
            let path = dir.join(firmware);
            File::open(&path).ok().map(|f| (path, f))
        })
    }

    /// Find the blob, waiting while boot is in progress.
    pub fn locate(&self, firmware: &str) -> Option<(PathBuf, File)> {
        let started = Instant::now();
        let mut booting = self.is_booting();
        loop {
            if let Some(found) = self.open_candidate(firmware) {
                return Some(found);
            }
            if !booting {
                return None;
            }
            if let Some(limit) = self.boot_timeout {
                if started.elapsed() >= limit {
                    warn!("firmware: gave up waiting for '{}' after {:?}", firmware, limit);
                    return None;
                }
            }
            thread::sleep(self.retry_interval);
            booting = self.is_booting();
        }
    }

    /// Serve one request for `firmware` on behalf of the device at `devpath`.
    pub fn load(&self, devpath: &str, firmware: &str) -> FirmwareOutcome {
        info!("firmware: loading '{}' for '{}'", firmware, devpath);
        let root = self.sysfs_root.join(devpath.trim_start_matches('/'));

        let mut loading = match open_wo(&root.join("loading")) {
            Ok(f) => f,
            Err(e) => {
                warn!("firmware: {}: {}", root.join("loading").display(), e);
                return FirmwareOutcome::NoInterface;
            }
        };
        let mut data = match open_wo(&root.join("data")) {
            Ok(f) => f,
            Err(e) => {
                warn!("firmware: {}: {}", root.join("data").display(), e);
                return FirmwareOutcome::NoInterface;
            }
        };

        let Some((source, mut blob)) = self.locate(firmware) else {
            info!("firmware: could not open '{}'", firmware);
            if let Err(e) = abort_load(&mut loading) {
                warn!("firmware: abort {}: {}", root.join("loading").display(), e);
            }
            return FirmwareOutcome::NotFound;
        };

        match copy_firmware(&mut blob, &mut loading, &mut data) {
            Ok(bytes) => {
                info!("firmware: copy success {{ '{}', '{}' }}", root.display(), firmware);
                FirmwareOutcome::Loaded { source, bytes }
            }
            Err(e) => {
                info!(
                    "firmware: copy failure {{ '{}', '{}' }}: {}",
                    root.display(),
                    firmware,
                    e
                );
                FirmwareOutcome::CopyFailed
            }
        }
    }

    /// Serve a request on its own thread and report back over `reports`.
    pub fn spawn(
        &self,
        devpath: &str,
        firmware: &str,
        reports: Sender<FirmwareReport>,
    ) -> io::Result<JoinHandle<()>> {
        let loader = self.clone();
        let devpath = devpath.to_string();
        let firmware = firmware.to_string();
        thread::Builder::new()
            .name("firmware".into())
            .spawn(move || {
                let outcome = loader.load(&devpath, &firmware);
                let _ = reports.send(FirmwareReport {
                    devpath,
                    firmware,
                    outcome,
                });
            })
    }
}

fn open_wo(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).open(path)
}

fn retryable(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Tell the kernel no blob is coming.
pub fn abort_load(loading: &mut impl Write) -> io::Result<()> {
    loading.write_all(b"-1")
}

/// Run the `loading`/`data` handshake for an open blob. The final status is
/// always written to `loading`, whatever happened in between.
pub fn copy_firmware(
    blob: &mut impl Read,
    loading: &mut impl Write,
    data: &mut impl Write,
) -> io::Result<u64> {
    loading.write_all(b"1")?;
    let result = stream(blob, data);
    let status: &[u8] = if result.is_ok() { b"0" } else { b"-1" };
    loading.write_all(status)?;
    result
}

fn stream(blob: &mut impl Read, data: &mut impl Write) -> io::Result<u64> {
    let mut buf = [0u8; CHUNK];
    let mut total = 0u64;
    loop {
        let n = match blob.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if retryable(&e) => continue,
            Err(e) => return Err(e),
        };
        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            match data.write(chunk) {
                Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "data accepted nothing")),
                Ok(w) => chunk = &chunk[w..],
                Err(e) if retryable(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `step` bytes per write.
    struct Dribble {
        out: Vec<u8>,
        step: usize,
    }

    impl Write for Dribble {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step);
            self.out.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "device went away"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handshake_on_success() {
        let blob: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let mut loading = Vec::new();
        let mut data = Dribble { out: Vec::new(), step: 1000 };
        let n = copy_firmware(&mut blob.as_slice(), &mut loading, &mut data).unwrap();
        assert_eq!(n, blob.len() as u64);
        assert_eq!(data.out, blob);
        assert_eq!(loading, b"10");
    }

    #[test]
    fn handshake_on_write_failure() {
        let blob = vec![7u8; 100];
        let mut loading = Vec::new();
        assert!(copy_firmware(&mut blob.as_slice(), &mut loading, &mut Broken).is_err());
        assert_eq!(loading, b"1-1");
    }

    #[test]
    fn abort_surfaces_write_failure() {
        let mut loading = Vec::new();
        abort_load(&mut loading).unwrap();
        assert_eq!(loading, b"-1");
        assert_eq!(abort_load(&mut Broken).unwrap_err().kind(), ErrorKind::Other);
    }

    #[test]
    fn empty_blob_still_completes() {
        let mut loading = Vec::new();
        let mut data = Vec::new();
        assert_eq!(copy_firmware(&mut io::empty(), &mut loading, &mut data).unwrap(), 0);
        assert_eq!(loading, b"10");
    }
}
