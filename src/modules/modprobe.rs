// CLASSIFICATION: COMMUNITY
// Filename: modprobe.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! `modules.dep` driven module loader.

use std::ffi::CString;
use std::fs::{self, File};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use once_cell::unsync::OnceCell;

use super::parsers::{self, AliasEntry};
use super::{ModStatus, ModuleLoader};

/// Where the module metadata lives.
#[derive(Debug, Clone)]
pub struct ModuleFiles {
    /// Prefix for module images.
    pub dir: PathBuf,
    pub dep_file: PathBuf,
    pub alias_file: PathBuf,
    /// Always applied; a missing file means no base blacklist.
    pub base_blacklist: PathBuf,
    /// Load every image as `dir/<basename>` instead of `dir/<dep path>`.
    pub strip: bool,
}

impl Default for ModuleFiles {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/lib/modules/"),
            dep_file: PathBuf::from("/lib/modules/modules.dep"),
            alias_file: PathBuf::from("/lib/modules/modules.alias"),
            base_blacklist: PathBuf::from("/system/etc/modules.blacklist"),
            strip: true,
        }
    }
}

/// Puts one module image into the kernel.
pub trait ModuleInserter {
    fn insert(&self, image: &Path, params: &str) -> io::Result<()>;
}

/// `finit_module(2)` on the image file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinitModule;

impl ModuleInserter for FinitModule {
    fn insert(&self, image: &Path, params: &str) -> io::Result<()> {
        let file = File::open(image)?;
        let params =
            CString::new(params).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: fd and params stay valid for the duration of the call.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_finit_module,
                file.as_raw_fd(),
                params.as_ptr(),
                0 as libc::c_int,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

pub struct DepModuleLoader<I: ModuleInserter = FinitModule> {
    files: ModuleFiles,
    inserter: I,
    /// Alias map used for argument lookups, cached after the first
    /// successful read.
    aliases: OnceCell<Vec<AliasEntry>>,
}

impl DepModuleLoader<FinitModule> {
    pub fn new(files: ModuleFiles) -> Self {
        Self::with_inserter(files, FinitModule)
    }
}

impl<I: ModuleInserter> DepModuleLoader<I> {
    pub fn with_inserter(files: ModuleFiles, inserter: I) -> Self {
        Self {
            files,
            inserter,
            aliases: OnceCell::new(),
        }
    }

    pub fn files(&self) -> &ModuleFiles {
        &self.files
    }

    pub fn inserter(&self) -> &I {
        &self.inserter
    }

    fn image_path(&self, entry: &str) -> PathBuf {
        let rel = if self.files.strip {
            parsers::strip_path(entry)
        } else {
            entry
        };
        self.files.dir.join(rel)
    }

    /// Insert the chain last entry first; only the target gets `args`.
    fn insmod_chain(&self, chain: &[String], args: &str) -> ModStatus {
        for (idx, entry) in chain.iter().enumerate().rev() {
            let image = self.image_path(entry);
            let params = if idx == 0 { args } else { "" };
            match self.inserter.insert(&image, params) {
                Ok(()) => info!("loaded module {}", image.display()),
                Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {}
                Err(e) => {
                    error!(
                        "failed to insmod [{}] with args [{}]: {}",
                        image.display(),
                        params,
                        e
                    );
                    return ModStatus::UNKNOWN;
                }
            }
        }
        ModStatus::empty()
    }
}

fn read_text(path: &Path) -> io::Result<String> {
    fs::read(path).map(|b| String::from_utf8_lossy(&b).into_owned())
}

/// Whether any module in `chain` is listed. Entries that are not `.ko`
/// paths cannot be checked and count as a hit.
fn chain_blacklisted(chain: &[String], blacklist: &[String]) -> bool {
    chain.iter().any(|entry| match parsers::module_name(entry) {
        Some(name) => blacklist.iter().any(|b| b == name),
        None => true,
    })
}

impl<I: ModuleInserter> ModuleLoader for DepModuleLoader<I> {
    fn insmod_by_dep(&self, name: &str, args: &str, blacklist: Option<&Path>) -> ModStatus {
        if name.is_empty() {
            error!("need valid module name");
            return ModStatus::INVALID_NAME;
        }

        let aliases = match read_text(&self.files.alias_file) {
            Ok(text) => parsers::parse_aliases(&text),
            Err(e) => {
                warn!("parse alias {}: {}", self.files.alias_file.display(), e);
                return ModStatus::BAD_ALIAS;
            }
        };

        let base_blacklist = match read_text(&self.files.base_blacklist) {
            Ok(text) => parsers::parse_blacklist(&text),
            Err(e) => {
                info!("base blacklist {}: {}", self.files.base_blacklist.display(), e);
                Vec::new()
            }
        };

        let caller_blacklist = match blacklist {
            Some(path) => match read_text(path) {
                Ok(text) => parsers::parse_blacklist(&text),
                Err(e) => {
                    info!("caller blacklist {}: {}", path.display(), e);
                    return ModStatus::INVALID_CALLER_BLACK;
                }
            },
            None => Vec::new(),
        };

        let deps = match read_text(&self.files.dep_file) {
            Ok(text) => text,
            Err(e) => {
                warn!("cannot load dep file {}: {}", self.files.dep_file.display(), e);
                return ModStatus::BAD_DEP;
            }
        };

        let module = parsers::resolve_alias(&aliases, name).unwrap_or(name);
        let Some(chain) = parsers::look_up_dep(&deps, module) else {
            warn!("cannot find module's dependency info: [{}]", module);
            return ModStatus::DEP_NOT_FOUND;
        };

        if chain_blacklisted(&chain, &caller_blacklist) {
            info!("a module for {} is in caller's black list", module);
            return ModStatus::IN_CALLER_BLACK;
        }
        if chain_blacklisted(&chain, &base_blacklist) {
            info!("a module for {} is in system black list", module);
            return ModStatus::IN_BLACK;
        }

        self.insmod_chain(&chain, args)
    }

    fn resolve_alias(&self, alias: &str) -> Option<String> {
        if self.aliases.get().is_none() {
            if let Ok(text) = read_text(&self.files.alias_file) {
                let parsed = parsers::parse_aliases(&text);
                if !parsed.is_empty() {
                    let _ = self.aliases.set(parsed);
                }
            }
        }
        let aliases = self.aliases.get()?;
        parsers::resolve_alias(aliases, alias).map(str::to_string)
    }
}
