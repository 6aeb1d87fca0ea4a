// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors surfaced by the device manager's setup paths.
///
/// The per-event path never returns these to the caller; it logs and moves
/// on so that a bad device can never take init down with it.
#[derive(Debug, Error)]
pub enum DevmgrError {
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("netlink socket: {0}")]
    Netlink(#[source] io::Error),
    #[error("invalid rule for {0}: {1}")]
    InvalidRule(String, &'static str),
}

impl DevmgrError {
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        DevmgrError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DevmgrError>;
