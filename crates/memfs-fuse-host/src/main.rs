// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! memfs FUSE Host
//!
//! Mounts an in-memory filesystem at the given mount point through libfuse
//! and serves it until interrupted.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;
#[cfg_attr(not(all(feature = "fuse", target_os = "linux")), allow(dead_code))]
mod errno;
#[cfg_attr(not(all(feature = "fuse", target_os = "linux")), allow(dead_code))]
mod xattr;

#[cfg(all(feature = "fuse", target_os = "linux"))]
use adapter::MemFsFuse;
use anyhow::{Context, Result};
use clap::Parser;
use memfs_core::{Config, FileSystem};
use memfs_logging::{CliLoggingArgs, LogLevel};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

fn version() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(memfs_core::package_version).as_str()
}

#[derive(Parser, Debug)]
#[command(name = "memfs", version = version(), about = "In-memory FUSE filesystem")]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host name reported in logs
    #[arg(short = 'N', long)]
    name: Option<String>,

    /// Maximum number of data bytes held in memory
    #[arg(short = 'C', long = "cache", value_name = "BYTES")]
    cache_size: Option<u64>,

    /// Minimum log level (debug, info, warn, error, fatal)
    #[arg(short = 'L', long)]
    level: Option<String>,

    /// Refuse every mutation
    #[arg(short = 'R', long)]
    readonly: bool,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,

    #[command(flatten)]
    logging: CliLoggingArgs,
}

/// The configuration file, or defaults, with command-line values on top.
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(name) = &args.name {
        config.name = name.clone();
    }
    if let Some(cache_size) = args.cache_size {
        config.cache_size = cache_size;
    }
    if let Some(level) = &args.level {
        config.level = level.clone();
    }
    if args.readonly {
        config.readonly = true;
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    args.logging.init("memfs", LogLevel::parse(&config.level))?;

    info!(version = version(), "Starting memfs FUSE Host");
    info!(
        mount = %args.mount_point.display(),
        name = %config.name,
        cache_size = config.cache_size,
        readonly = config.readonly,
        replicas = config.replicas.len(),
        "configuration loaded"
    );

    let fs = Arc::new(FileSystem::new(&args.mount_point, config)?);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    run(&args, fs)?;

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        warn!("FUSE support not compiled in. This binary is for testing only.");
        info!(root = %fs.root(), "memfs core initialized");
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}

/// Serve the filesystem until SIGINT or SIGTERM, then unmount.
#[cfg(all(feature = "fuse", target_os = "linux"))]
fn run(args: &Args, fs: Arc<FileSystem>) -> Result<()> {
    use fuser::MountOption;
    use std::sync::mpsc;

    let mut mount_options = vec![
        MountOption::FSName("memfs".to_string()),
        MountOption::Subtype("memfs".to_string()),
    ];
    if fs.is_readonly() {
        mount_options.push(MountOption::RO);
    }
    if args.allow_other {
        mount_options.push(MountOption::AllowOther);
    }
    if args.auto_unmount {
        mount_options.push(MountOption::AutoUnmount);
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("failed to install signal handler")?;

    info!("Mounting filesystem...");
    let session = fuser::spawn_mount2(MemFsFuse::new(fs), &args.mount_point, &mount_options)
        .with_context(|| format!("failed to mount at {}", args.mount_point.display()))?;
    info!("memfs mounted; waiting for a termination signal");

    if stop_rx.recv().is_err() {
        warn!("signal handler dropped its channel");
    }

    info!("Unmounting filesystem...");
    drop(session);
    info!("memfs stopped");
    Ok(())
}
