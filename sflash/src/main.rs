// SPDX-License-Identifier: MIT

//! GPIO-assisted serial firmware flasher.
//!
//! Usage:
//!   sflash 0x1000 app.bin 0x8000 data.bin
//!   sflash --port /dev/ttyUSB0 --baud 230400 0x0 bootloader.bin

mod cli;
mod flasher;
mod partition;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Cli::parse();
    cli::run(args)
}
