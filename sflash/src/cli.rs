// SPDX-License-Identifier: MIT

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sflash_loader::{
    SerialLoader, SessionConfig, DEFAULT_BAUD_RATE, DEFAULT_GPIO_CHIP, DEFAULT_IO0_LINE,
    DEFAULT_RESET_LINE, DEFAULT_SERIAL_DEVICE,
};

use crate::flasher;
use crate::partition;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "sflash")]
#[command(about = "Flash firmware images over a serial link with GPIO bootstrap control")]
pub struct Cli {
    /// Serial port device
    #[arg(short, long, default_value = DEFAULT_SERIAL_DEVICE)]
    pub port: PathBuf,

    /// Serial port baud rate for the initial connection
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Reset GPIO line offset
    #[arg(short, long, default_value_t = DEFAULT_RESET_LINE)]
    pub reset: u32,

    /// IO0 (PROG) GPIO line offset
    #[arg(short = '0', long, default_value_t = DEFAULT_IO0_LINE)]
    pub io0: u32,

    /// GPIO character device holding the reset/IO0 lines
    #[arg(long, default_value = DEFAULT_GPIO_CHIP)]
    pub gpiochip: PathBuf,

    /// Alternating programming address and binary file name, up to 8 pairs
    #[arg(value_name = "ADDR FILE", required = true, num_args = 1..)]
    pub targets: Vec<String>,
}

impl Cli {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            device: self.port.clone(),
            gpiochip: self.gpiochip.clone(),
            baud: self.baud,
            reset_line: self.reset,
            io0_line: self.io0,
        }
    }
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let config = cli.session_config();
    log::info!(
        "sflash - port = {}, baud = {}, reset_gpio = {}, io0_gpio = {}",
        config.device.display(),
        config.baud,
        config.reset_line,
        config.io0_line
    );

    // All images are parsed and loaded before the serial device is touched.
    let partitions = partition::build_partitions(&cli.targets)?;

    let mut loader = SerialLoader::open(&config).context("failed to initialize port")?;
    flasher::run(&mut loader, &partitions)?;

    println!("Done");
    Ok(())
}
