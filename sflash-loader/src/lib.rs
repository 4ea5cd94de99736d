// SPDX-License-Identifier: MIT

//! Serial/GPIO port layer for the sflash firmware flasher.
//!
//! The flasher core only ever talks to the [`Loader`] trait: a session that
//! has already acquired the serial device and the two control GPIOs, and that
//! can connect to the target bootloader, push images, and reset the target
//! back into normal execution. [`SerialLoader`] is the real implementation;
//! tests substitute their own.

pub mod protocol;
pub mod serial;

pub use serial::SerialLoader;

use std::path::PathBuf;

use thiserror::Error;

/// Default serial device path.
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyS0";

/// Default GPIO character device holding the reset and IO0 lines.
pub const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

/// Baud rate for the initial bootloader handshake.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Elevated baud rate negotiated after the handshake to speed up transfers.
pub const HIGHER_BAUD_RATE: u32 = 460_800;

/// Default GPIO line offset wired to the target reset pin.
pub const DEFAULT_RESET_LINE: u32 = 2;

/// Default GPIO line offset wired to the target IO0 (PROG) pin.
pub const DEFAULT_IO0_LINE: u32 = 3;

/// Session parameters, fixed for the lifetime of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Serial device path, e.g. `/dev/ttyS0`.
    pub device: PathBuf,
    /// GPIO character device holding the control lines.
    pub gpiochip: PathBuf,
    /// Baud rate for the initial connection.
    pub baud: u32,
    /// GPIO line offset of the target reset pin.
    pub reset_line: u32,
    /// GPIO line offset of the target IO0 (bootstrap) pin.
    pub io0_line: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_SERIAL_DEVICE),
            gpiochip: PathBuf::from(DEFAULT_GPIO_CHIP),
            baud: DEFAULT_BAUD_RATE,
            reset_line: DEFAULT_RESET_LINE,
            io0_line: DEFAULT_IO0_LINE,
        }
    }
}

/// Errors surfaced by a loader session.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The serial device could not be opened or configured.
    #[error("failed to open serial device {device}: {source}")]
    PortOpen {
        device: String,
        #[source]
        source: serialport::Error,
    },

    /// The reset/IO0 GPIO lines could not be requested.
    #[error("failed to request GPIO lines on {chip}: {source}")]
    GpioRequest {
        chip: String,
        #[source]
        source: gpiocdev::Error,
    },

    /// The bootloader did not answer the sync handshake.
    #[error("bootloader sync failed: {0}")]
    Sync(String),

    /// The target refused the elevated baud rate.
    #[error("baud change to {baud} rejected: {reason}")]
    BaudChange { baud: u32, reason: String },

    /// A flash write command sequence failed.
    #[error("flash write at {addr:#010x} failed: {reason}")]
    FlashWrite { addr: u32, reason: String },

    /// Serial transfer failed mid-command.
    #[error("serial transfer failed: {0}")]
    Io(#[from] std::io::Error),
}

/// An established bootloader session.
///
/// Port initialization is the construction of the concrete type (see
/// [`SerialLoader::open`]); once a `Loader` exists, the serial device and the
/// control GPIOs are held for the rest of the process.
pub trait Loader {
    /// Force the target into bootloader mode and negotiate reception at
    /// `baud`. Must be called before any [`Loader::flash_write`].
    fn connect(&mut self, baud: u32) -> Result<(), LoaderError>;

    /// Transmit one binary image to the given target flash address.
    fn flash_write(&mut self, image: &[u8], addr: u32) -> Result<(), LoaderError>;

    /// Release bootstrap mode and reset the target back into normal
    /// execution. Best effort; failures are logged, not reported.
    fn reset_target(&mut self);
}
