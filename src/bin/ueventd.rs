// CLASSIFICATION: COMMUNITY
// Filename: ueventd.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use ueventd::coldboot::Coldboot;
use ueventd::config::{config_path, DaemonConfig};
use ueventd::netlink::UeventSocket;
use ueventd::DeviceManager;

#[derive(Parser)]
#[command(name = "ueventd", about = "Create /dev nodes from kernel uevents", version = "0.1")]
struct Cli {
    /// Configuration file (default $UEVENTD_CONFIG or /etc/ueventd.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Skip the coldboot replay of existing devices
    #[arg(long = "no-coldboot")]
    no_coldboot: bool,
    /// Create /dev entries below this root instead of the configured one
    #[arg(long = "dev-root")]
    dev_root: Option<PathBuf>,
}

fn run(cli: Cli) -> ueventd::Result<()> {
    let mut cfg = DaemonConfig::load(&config_path(cli.config.as_deref()))?;
    if let Some(root) = cli.dev_root {
        cfg.dev_root = root;
    }

    let mut socket = UeventSocket::open(cfg.netlink_rcvbuf)?;
    let mut manager = DeviceManager::from_config(&cfg)?;

    if cli.no_coldboot {
        info!("coldboot disabled");
    } else {
        let walker = match cfg.coldboot_follow_depth {
            Some(depth) => Coldboot::new().follow_symlinks(depth),
            None => Coldboot::new(),
        };
        let marker = cfg.coldboot_marker_path();
        manager.coldboot(&mut socket, &walker, &cfg.coldboot_paths(), &marker);
    }

    manager.run(&mut socket)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("ueventd: {}", err);
            ExitCode::FAILURE
        }
    }
}
