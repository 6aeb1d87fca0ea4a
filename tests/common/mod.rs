// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io;
use std::path::Path;
use std::rc::Rc;

use ueventd::devfs::{DeviceFs, NodeSpec};
use ueventd::modules::{ModStatus, ModuleAutoloader, ModuleLoader};
use ueventd::perms::PermissionTable;
use ueventd::DeviceManager;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory `/dev`.
#[derive(Debug, Default)]
pub struct MemFs {
    pub dirs: BTreeSet<String>,
    pub nodes: BTreeMap<String, NodeSpec>,
    pub links: BTreeMap<String, String>,
}

fn exists() -> io::Error {
    io::Error::from(io::ErrorKind::AlreadyExists)
}

fn missing() -> io::Error {
    io::Error::from(io::ErrorKind::NotFound)
}

impl DeviceFs for MemFs {
    fn make_dir(&mut self, path: &str, _mode: u32) -> io::Result<()> {
        let mut at = 0;
        while let Some(off) = path[at + 1..].find('/') {
            at += off + 1;
            self.dirs.insert(path[..at].to_string());
        }
        self.dirs.insert(path.trim_end_matches('/').to_string());
        Ok(())
    }

    fn make_node(&mut self, path: &str, spec: &NodeSpec) -> io::Result<()> {
        if self.nodes.contains_key(path) || self.links.contains_key(path) {
            return Err(exists());
        }
        self.nodes.insert(path.to_string(), *spec);
        Ok(())
    }

    fn symlink(&mut self, target: &str, link: &str) -> io::Result<()> {
        if self.nodes.contains_key(link) || self.links.contains_key(link) {
            return Err(exists());
        }
        self.links.insert(link.to_string(), target.to_string());
        Ok(())
    }

    fn read_link(&self, link: &str) -> io::Result<String> {
        self.links.get(link).cloned().ok_or_else(missing)
    }

    fn unlink(&mut self, path: &str) -> io::Result<()> {
        if self.nodes.remove(path).is_some() || self.links.remove(path).is_some() {
            Ok(())
        } else {
            Err(missing())
        }
    }
}

/// Scripted module loader shared with the test through `Rc`.
pub struct ModuleScript {
    pub status: RefCell<ModStatus>,
    pub calls: RefCell<Vec<String>>,
}

impl Default for ModuleScript {
    fn default() -> Self {
        Self {
            status: RefCell::new(ModStatus::empty()),
            calls: RefCell::new(Vec::new()),
        }
    }
}

pub struct ScriptedLoader(pub Rc<ModuleScript>);

impl ModuleLoader for ScriptedLoader {
    fn insmod_by_dep(&self, name: &str, _args: &str, _blacklist: Option<&Path>) -> ModStatus {
        self.0.calls.borrow_mut().push(name.to_string());
        *self.0.status.borrow()
    }
}

pub fn scripted_modules() -> (ModuleAutoloader, Rc<ModuleScript>) {
    let script = Rc::new(ModuleScript::default());
    let autoloader = ModuleAutoloader::new(Box::new(ScriptedLoader(script.clone())), None);
    (autoloader, script)
}

pub fn mem_manager(perms: PermissionTable) -> (DeviceManager<MemFs>, Rc<ModuleScript>) {
    let (modules, script) = scripted_modules();
    (DeviceManager::new(MemFs::default(), perms, modules), script)
}

/// Encode `KEY=VALUE` pairs the way the kernel does.
pub fn message(fields: &[(&str, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in fields {
        out.extend_from_slice(key.as_bytes());
        out.push(b'=');
        out.extend_from_slice(value.as_bytes());
        out.push(0);
    }
    out
}

pub fn queue(messages: Vec<Vec<u8>>) -> VecDeque<Vec<u8>> {
    messages.into_iter().collect()
}
