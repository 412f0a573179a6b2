// SPDX-License-Identifier: MIT
//! The SOFS14 formatting tool.
//!
//! Lays the file system metadata onto a support file so the file may be
//! used as a SOFS14 storage device: the superblock, the inode table, the
//! data zone and the root directory seen as empty.

mod log;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use sofsfs::{DiskLayout, Identity, SofsFormatter};
use sofsio::prelude::*;

#[derive(Parser)]
#[command(
    name = "sofsmkfs",
    version,
    about = "Install a SOFS14 file system on a support file"
)]
struct Cli {
    /// Volume name
    #[arg(short, long, default_value = "SOFS14")]
    name: String,

    /// Total number of inodes (default: one per eight blocks)
    #[arg(short, long, default_value_t = 0)]
    inodes: u32,

    /// Zero fill the free data clusters
    #[arg(short, long)]
    zero: bool,

    /// Print no progress messages
    #[arg(short, long)]
    quiet: bool,

    /// Path to the support file
    device: PathBuf,
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut dev = FileDev::open(&cli.device)
        .with_context(|| format!("cannot open support file {}", cli.device.display()))?;

    let size_bytes = dev.block_count() as u64 * BLOCK_SIZE as u64;
    let layout = DiskLayout::compute(size_bytes, cli.inodes)
        .context("support file cannot hold a SOFS14 volume")?;

    log_step!(
        "installing a {}-inode SOFS14 file system in {}",
        layout.itotal,
        cli.device.display()
    );
    log_step!(
        "{} blocks: 1 superblock, {} inode table, {} data clusters",
        layout.n_total,
        layout.itable_blocks,
        layout.dzone_total
    );

    let mut fmt = SofsFormatter::new(&mut dev, &layout, &cli.name, Identity::ROOT);
    fmt.format(cli.zero).context("formatting failed")?;

    log_step!("checking file system metadata");
    fmt.verify().context("the written metadata is inconsistent")?;

    dev.close().context("closing the support file failed")?;
    log_step!("formatting concluded");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.quiet {
        log::set_log_level(log::LogLevel::Quiet);
    }
    if cli.name.len() >= sofsfs::constant::VOLUME_NAME_SIZE {
        eprintln!("sofsmkfs: volume name too long");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sofsmkfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}
