// SPDX-License-Identifier: MIT

//! Wire commands exchanged with the target bootloader.
//!
//! Frames are postcard-serialized and COBS-framed with a 0x00 delimiter, so
//! the receiver can resynchronize on any byte loss. The format is private to
//! this crate; the flasher core never sees it.

use crc::{Crc, CRC_32_ISO_HDLC};
use serde::{Deserialize, Serialize};

/// CRC used to verify a whole image after transfer.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Maximum payload carried by one [`Command::FlashData`] frame.
pub const MAX_DATA_BLOCK_SIZE: usize = 1024;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe; the bootloader answers `Ack(Ok)` when ready.
    Sync,
    /// Switch the target UART to `baud`. Acked at the old rate, after which
    /// both ends change speed and re-sync.
    ChangeBaud { baud: u32 },
    /// Start writing `size` bytes at flash offset `addr`.
    FlashBegin { addr: u32, size: u32 },
    /// One block of image data at `offset` relative to the current begin.
    FlashData { offset: u32, data: Vec<u8> },
    /// End of image; the target checks `crc32` over everything received.
    FlashEnd { crc32: u32 },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack(AckStatus),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    CrcError,
    FlashError,
    BadCommand,
    BadSequence,
}

/// Encode a command into a delimited COBS frame.
pub fn encode_command(cmd: &Command) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_stdvec_cobs(cmd)
}

/// Decode a response from one delimited COBS frame.
///
/// `frame` must contain exactly one frame including its trailing 0x00; the
/// buffer is scratch space for in-place COBS decoding.
pub fn decode_response(frame: &mut [u8]) -> Result<Response, postcard::Error> {
    postcard::from_bytes_cobs(frame)
}
