// SPDX-License-Identifier: MIT

//! Flash sequencing: connect at the elevated baud, write each partition in
//! positional order, and always reset the target afterwards.
//!
//! The sequence is strictly linear; retries, if any, live inside the loader.
//! Once a session exists the target may be sitting in bootloader mode, so
//! `reset_target` runs on every exit path, including connect and write
//! failures.

use indicatif::{ProgressBar, ProgressStyle};
use sflash_loader::{Loader, LoaderError, HIGHER_BAUD_RATE};
use thiserror::Error;

use crate::partition::Partition;

#[derive(Debug, Error)]
pub enum FlashError {
    #[error("failed to connect to bootloader at {baud} baud: {source}")]
    Connect {
        baud: u32,
        #[source]
        source: LoaderError,
    },

    #[error("failed to flash {source_name} at {addr:#010x} ({written} of {total} partitions written): {source}")]
    Write {
        source_name: String,
        addr: u32,
        written: usize,
        total: usize,
        #[source]
        source: LoaderError,
    },
}

/// Flash every partition through an already-initialized loader session.
///
/// The target is reset exactly once, whatever happens after this point.
pub fn run(loader: &mut dyn Loader, partitions: &[Partition]) -> Result<(), FlashError> {
    let result = flash_all(loader, partitions);
    loader.reset_target();
    result
}

fn flash_all(loader: &mut dyn Loader, partitions: &[Partition]) -> Result<(), FlashError> {
    loader
        .connect(HIGHER_BAUD_RATE)
        .map_err(|source| FlashError::Connect {
            baud: HIGHER_BAUD_RATE,
            source,
        })?;

    let pb = ProgressBar::new(partitions.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} partitions")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    for (written, part) in partitions.iter().enumerate() {
        log::info!(
            "{:08x} {:8} {}",
            part.addr,
            part.size(),
            part.source.display()
        );
        if let Err(source) = loader.flash_write(&part.image, part.addr) {
            pb.abandon();
            // Abort the remaining queue on the first failed write.
            return Err(FlashError::Write {
                source_name: part.source.display().to_string(),
                addr: part.addr,
                written,
                total: partitions.len(),
                source,
            });
        }
        pb.inc(1);
    }

    pb.finish();
    Ok(())
}
