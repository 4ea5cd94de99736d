// SPDX-License-Identifier: MIT

//! Real loader session over a serial port with GPIO bootstrap control.
//!
//! The reset and IO0 pins are driven through the Linux GPIO character device
//! interface. Driving a line Active asserts the corresponding target pin;
//! both lines idle Inactive.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use gpiocdev::line::Value;
use gpiocdev::request::{Config, Request};
use serialport::SerialPort;

use crate::protocol::{self, AckStatus, Command, Response, CRC32, MAX_DATA_BLOCK_SIZE};
use crate::{Loader, LoaderError, SessionConfig};

/// Timeout for individual serial reads.
const READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// How long reset is held asserted.
const RESET_PULSE: Duration = Duration::from_millis(100);

/// Settle time after releasing reset before the first sync attempt.
const BOOT_SETTLE: Duration = Duration::from_millis(50);

/// Sync attempts before giving up on the bootloader.
const SYNC_ATTEMPTS: u32 = 3;

/// Largest accepted response frame. Real responses are a few bytes; anything
/// past this is line noise or a stuck sender.
const MAX_FRAME_LEN: usize = 4096;

/// Serial/GPIO implementation of [`Loader`].
///
/// Construction is the whole of port initialization: it opens the serial
/// device at the configured baud and requests both control lines as outputs.
/// Dropping the session releases both.
pub struct SerialLoader {
    port: Box<dyn SerialPort>,
    lines: Request,
    reset_line: u32,
    io0_line: u32,
    rx_buf: Vec<u8>,
}

impl SerialLoader {
    /// Open the serial device and acquire the reset/IO0 GPIO lines.
    pub fn open(config: &SessionConfig) -> Result<Self, LoaderError> {
        let device = config.device.to_string_lossy().into_owned();
        let port = serialport::new(device.as_str(), config.baud)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| LoaderError::PortOpen {
                device: device.clone(),
                source,
            })?;

        let mut line_config = Config::default();
        line_config
            .with_line(config.reset_line)
            .as_output(Value::Inactive);
        line_config
            .with_line(config.io0_line)
            .as_output(Value::Inactive);
        let lines = Request::from_config(line_config)
            .on_chip(&config.gpiochip)
            .with_consumer("sflash")
            .request()
            .map_err(|source| LoaderError::GpioRequest {
                chip: config.gpiochip.to_string_lossy().into_owned(),
                source,
            })?;

        log::debug!(
            "opened {} at {} baud (reset line {}, io0 line {})",
            device,
            config.baud,
            config.reset_line,
            config.io0_line
        );

        Ok(Self {
            port,
            lines,
            reset_line: config.reset_line,
            io0_line: config.io0_line,
            rx_buf: Vec::with_capacity(256),
        })
    }

    fn set_line(&self, offset: u32, value: Value) {
        if let Err(e) = self.lines.set_value(offset, value) {
            log::error!("failed to drive GPIO line {}: {}", offset, e);
        }
    }

    /// Assert IO0 and pulse reset so the target boots into its bootloader.
    fn enter_bootloader(&mut self) {
        self.set_line(self.io0_line, Value::Active);
        self.set_line(self.reset_line, Value::Active);
        thread::sleep(RESET_PULSE);
        self.set_line(self.reset_line, Value::Inactive);
        thread::sleep(BOOT_SETTLE);
        self.set_line(self.io0_line, Value::Inactive);
    }

    /// Throw away stale bytes so the next frame starts clean.
    fn drain_rx(&mut self) {
        let mut buf = [0u8; 64];
        let old_timeout = self.port.timeout();
        let _ = self.port.set_timeout(Duration::from_millis(10));
        while self.port.read(&mut buf).unwrap_or(0) > 0 {}
        let _ = self.port.set_timeout(old_timeout);
    }

    fn send(&mut self, cmd: &Command) -> Result<(), LoaderError> {
        let frame = protocol::encode_command(cmd)
            .map_err(|e| LoaderError::Sync(format!("failed to encode command: {}", e)))?;
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read one zero-delimited frame and decode the response.
    fn receive(&mut self) -> Result<Response, LoaderError> {
        read_frame(&mut self.port, &mut self.rx_buf)?;
        protocol::decode_response(&mut self.rx_buf)
            .map_err(|e| LoaderError::Sync(format!("bad response frame: {}", e)))
    }

    fn transact(&mut self, cmd: &Command) -> Result<AckStatus, LoaderError> {
        self.send(cmd)?;
        let Response::Ack(status) = self.receive()?;
        Ok(status)
    }

    /// Probe the bootloader until it acks, up to [`SYNC_ATTEMPTS`] times.
    fn sync(&mut self) -> Result<(), LoaderError> {
        let mut last = String::from("no response");
        for attempt in 1..=SYNC_ATTEMPTS {
            self.drain_rx();
            match self.transact(&Command::Sync) {
                Ok(AckStatus::Ok) => return Ok(()),
                Ok(status) => last = format!("unexpected ack {:?}", status),
                Err(e) => last = e.to_string(),
            }
            log::debug!("sync attempt {}/{} failed: {}", attempt, SYNC_ATTEMPTS, last);
        }
        Err(LoaderError::Sync(last))
    }
}

/// Read bytes into `buf` until the 0x00 frame delimiter, refusing to grow
/// past [`MAX_FRAME_LEN`].
fn read_frame(reader: &mut impl Read, buf: &mut Vec<u8>) -> Result<(), LoaderError> {
    buf.clear();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(1) => {
                buf.push(byte[0]);
                if byte[0] == 0 {
                    return Ok(());
                }
                if buf.len() >= MAX_FRAME_LEN {
                    return Err(LoaderError::Sync(format!(
                        "no frame delimiter within {} bytes",
                        MAX_FRAME_LEN
                    )));
                }
            }
            Ok(_) => continue,
            Err(e) => return Err(LoaderError::Io(e)),
        }
    }
}

impl Loader for SerialLoader {
    fn connect(&mut self, baud: u32) -> Result<(), LoaderError> {
        self.enter_bootloader();
        self.sync()?;

        if baud != self.port.baud_rate().unwrap_or(0) {
            match self.transact(&Command::ChangeBaud { baud })? {
                AckStatus::Ok => {}
                status => {
                    return Err(LoaderError::BaudChange {
                        baud,
                        reason: format!("target answered {:?}", status),
                    })
                }
            }
            self.port
                .set_baud_rate(baud)
                .map_err(|e| LoaderError::BaudChange {
                    baud,
                    reason: e.to_string(),
                })?;
            // Let the target's UART re-lock before probing again.
            thread::sleep(BOOT_SETTLE);
            self.sync()?;
        }

        log::info!("connected to bootloader at {} baud", baud);
        Ok(())
    }

    fn flash_write(&mut self, image: &[u8], addr: u32) -> Result<(), LoaderError> {
        let fail = |reason: String| LoaderError::FlashWrite { addr, reason };

        match self.transact(&Command::FlashBegin {
            addr,
            size: image.len() as u32,
        })? {
            AckStatus::Ok => {}
            status => return Err(fail(format!("begin rejected: {:?}", status))),
        }

        let mut offset = 0u32;
        for chunk in image.chunks(MAX_DATA_BLOCK_SIZE) {
            match self.transact(&Command::FlashData {
                offset,
                data: chunk.to_vec(),
            })? {
                AckStatus::Ok => {}
                status => {
                    return Err(fail(format!(
                        "data block at offset {} rejected: {:?}",
                        offset, status
                    )))
                }
            }
            offset += chunk.len() as u32;
        }

        match self.transact(&Command::FlashEnd {
            crc32: CRC32.checksum(image),
        })? {
            AckStatus::Ok => Ok(()),
            AckStatus::CrcError => Err(fail("image CRC mismatch after transfer".into())),
            status => Err(fail(format!("end rejected: {:?}", status))),
        }
    }

    fn reset_target(&mut self) {
        self.set_line(self.io0_line, Value::Inactive);
        self.set_line(self.reset_line, Value::Active);
        thread::sleep(RESET_PULSE);
        self.set_line(self.reset_line, Value::Inactive);
        log::info!("target reset into normal execution");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_frame_stops_at_delimiter() {
        let mut reader = Cursor::new(vec![0x01, 0x02, 0x03, 0x00, 0xFF]);
        let mut buf = Vec::new();
        read_frame(&mut reader, &mut buf).unwrap();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x00]);
    }

    #[test]
    fn test_read_frame_rejects_endless_garbage() {
        // A device streaming nonzero bytes must not grow the buffer forever.
        let mut reader = Cursor::new(vec![0xA5u8; MAX_FRAME_LEN + 100]);
        let mut buf = Vec::new();
        let err = read_frame(&mut reader, &mut buf).unwrap_err();
        assert!(matches!(err, LoaderError::Sync(_)));
        assert!(buf.len() <= MAX_FRAME_LEN);
    }

    #[test]
    fn test_read_frame_clears_previous_contents() {
        let mut reader = Cursor::new(vec![0x07, 0x00]);
        let mut buf = vec![0xEE; 8];
        read_frame(&mut reader, &mut buf).unwrap();
        assert_eq!(buf, vec![0x07, 0x00]);
    }
}
