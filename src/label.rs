// CLASSIFICATION: COMMUNITY
// Filename: label.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Security label collaborators.

use std::ffi::{CStr, CString};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use log::warn;

use crate::matcher::NameMatcher;

const SELINUX_XATTR: &CStr = c"security.selinux";

/// Mandatory access control hook consulted when nodes are created.
pub trait SecurityLabeler {
    /// Context for a new object at `path` with file type and mode `mode`.
    fn lookup(&self, path: &str, mode: u32) -> Option<String>;

    /// Set or clear the context applied to files created by this thread.
    fn set_create_context(&self, context: Option<&str>) -> io::Result<()>;

    /// Reapply the expected context to an existing object.
    fn relabel(&self, _path: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Used when the platform has no MAC subsystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLabels;

impl SecurityLabeler for NoLabels {
    fn lookup(&self, _path: &str, _mode: u32) -> Option<String> {
        None
    }

    fn set_create_context(&self, _context: Option<&str>) -> io::Result<()> {
        Ok(())
    }
}

/// Ordered glob to context table; the last matching entry wins.
#[derive(Debug, Clone)]
pub struct StaticLabeler {
    entries: Vec<(NameMatcher, String)>,
    fscreate: PathBuf,
}

impl StaticLabeler {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            fscreate: PathBuf::from("/proc/thread-self/attr/fscreate"),
        }
    }

    /// Write creation contexts somewhere other than procfs.
    pub fn with_fscreate(mut self, path: impl Into<PathBuf>) -> Self {
        self.fscreate = path.into();
        self
    }

    pub fn add(&mut self, pattern: &str, context: &str) {
        let wildcard = crate::matcher::has_glob_meta(pattern);
        self.entries
            .push((NameMatcher::new(pattern, wildcard), context.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StaticLabeler {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityLabeler for StaticLabeler {
    fn lookup(&self, path: &str, _mode: u32) -> Option<String> {
        self.entries
            .iter()
            .rev()
            .find(|(m, _)| m.matches(path))
            .map(|(_, ctx)| ctx.clone())
    }

    fn set_create_context(&self, context: Option<&str>) -> io::Result<()> {
        let mut f = OpenOptions::new().write(true).open(&self.fscreate)?;
        match context {
            Some(ctx) => f.write_all(ctx.as_bytes()),
            // A zero length write resets the attribute.
            None => f.write(b"").map(|_| ()),
        }
    }

    fn relabel(&self, path: &str) -> io::Result<()> {
        let Some(ctx) = self.lookup(path, 0) else {
            return Ok(());
        };
        let c_path =
            CString::new(path).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: path and name are NUL terminated; the value is passed with its length.
        let rc = unsafe {
            libc::setxattr(
                c_path.as_ptr(),
                SELINUX_XATTR.as_ptr(),
                ctx.as_ptr().cast(),
                ctx.len(),
                0,
            )
        };
        if rc != 0 {
            let err = io::Error::last_os_error();
            warn!("relabel {} to {}: {}", path, ctx, err);
            return Err(err);
        }
        Ok(())
    }
}
