// CLASSIFICATION: COMMUNITY
// Filename: devfs.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Filesystem side effects of device events.
//!
//! Everything the synthesizer does to `/dev` goes through [`DeviceFs`] using
//! logical absolute paths such as `/dev/block/sda`. [`HostFs`] maps those
//! below a root directory and performs the real syscalls.

use std::ffi::{CStr, CString};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{symlink, DirBuilderExt};
use std::path::{Path, PathBuf};

use log::warn;

/// Everything needed to create one special file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    /// Permission bits together with `S_IFBLK` or `S_IFCHR`.
    pub mode: u32,
    pub major: u32,
    pub minor: u32,
    pub uid: u32,
    pub gid: u32,
}

impl NodeSpec {
    pub fn is_block(&self) -> bool {
        self.mode & libc::S_IFMT == libc::S_IFBLK
    }

    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

pub trait DeviceFs {
    /// Create `path` and any missing parents. Existing directories are fine.
    fn make_dir(&mut self, path: &str, mode: u32) -> io::Result<()>;

    /// Create the special file owned by `spec.uid:spec.gid`.
    fn make_node(&mut self, path: &str, spec: &NodeSpec) -> io::Result<()>;

    fn symlink(&mut self, target: &str, link: &str) -> io::Result<()>;

    fn read_link(&self, link: &str) -> io::Result<String>;

    fn unlink(&mut self, path: &str) -> io::Result<()>;
}

/// The real filesystem, rooted at `root` (normally `/`).
#[derive(Debug, Clone)]
pub struct HostFs {
    root: PathBuf,
}

impl Default for HostFs {
    fn default() -> Self {
        Self::new("/")
    }
}

impl HostFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

/// Effective gid held for the guard's lifetime, then dropped back to root.
struct EffectiveGid;

impl EffectiveGid {
    fn switch(gid: u32) -> Self {
        // SAFETY: setegid only touches process credentials.
        if unsafe { libc::setegid(gid) } != 0 {
            warn!("setegid {}: {}", gid, io::Error::last_os_error());
        }
        EffectiveGid
    }
}

impl Drop for EffectiveGid {
    fn drop(&mut self) {
        // SAFETY: as above.
        if unsafe { libc::setegid(0) } != 0 {
            warn!("setegid 0: {}", io::Error::last_os_error());
        }
    }
}

/// Set the owner of `target`, leaving its group alone.
fn chown_owner(target: &CStr, uid: u32) -> io::Result<()> {
    // SAFETY: `target` is NUL terminated and outlives the call.
    if unsafe { libc::chown(target.as_ptr(), uid, libc::gid_t::MAX) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl DeviceFs for HostFs {
    fn make_dir(&mut self, path: &str, mode: u32) -> io::Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(self.resolve(path))
    }

    fn make_node(&mut self, path: &str, spec: &NodeSpec) -> io::Result<()> {
        let target = c_path(&self.resolve(path))?;
        // The node is created under its final group. The uid can only be
        // applied afterwards and is still racy.
        let _egid = EffectiveGid::switch(spec.gid);
        // SAFETY: plain syscall on a NUL terminated path we own.
        let made = unsafe {
            let dev = libc::makedev(spec.major, spec.minor);
            libc::mknod(target.as_ptr(), spec.mode, dev)
        };
        if made != 0 {
            return Err(io::Error::last_os_error());
        }
        if let Err(e) = chown_owner(&target, spec.uid) {
            warn!("chown {}: {}", path, e);
        }
        Ok(())
    }

    fn symlink(&mut self, target: &str, link: &str) -> io::Result<()> {
        symlink(target, self.resolve(link))
    }

    fn read_link(&self, link: &str) -> io::Result<String> {
        let target = fs::read_link(self.resolve(link))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn unlink(&mut self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn links_and_dirs_under_root() {
        let dir = tempdir().unwrap();
        let mut fs = HostFs::new(dir.path());
        fs.make_dir("/dev/block/platform/foo/by-name", 0o755).unwrap();
        fs.symlink("/dev/block/mmcblk0p1", "/dev/block/platform/foo/by-name/system")
            .unwrap();
        assert_eq!(
            fs.read_link("/dev/block/platform/foo/by-name/system").unwrap(),
            "/dev/block/mmcblk0p1"
        );
        assert!(dir.path().join("dev/block/platform/foo/by-name").is_dir());
        fs.unlink("/dev/block/platform/foo/by-name/system").unwrap();
        assert!(fs.read_link("/dev/block/platform/foo/by-name/system").is_err());
    }

    #[test]
    fn chown_of_missing_node_reports_error() {
        let dir = tempdir().unwrap();
        let target = c_path(&dir.path().join("absent")).unwrap();
        // SAFETY: getuid has no preconditions.
        let uid = unsafe { libc::getuid() };
        let err = chown_owner(&target, uid).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        fs::write(dir.path().join("present"), b"").unwrap();
        let target = c_path(&dir.path().join("present")).unwrap();
        chown_owner(&target, uid).unwrap();
    }

    #[test]
    fn node_spec_kind() {
        let spec = NodeSpec {
            mode: 0o660 | libc::S_IFBLK,
            major: 179,
            minor: 1,
            uid: 0,
            gid: 6,
        };
        assert!(spec.is_block());
        assert_eq!(spec.perm(), 0o660);
    }
}
