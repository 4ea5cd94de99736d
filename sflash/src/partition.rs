// SPDX-License-Identifier: MIT

//! Partition list construction from `<address> <file>` argument pairs.
//!
//! Every image is loaded fully into memory before any serial work starts, so
//! a bad argument or unreadable file can never leave the target half-flashed.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Upper bound on address/file pairs accepted in one invocation.
pub const MAX_PARTITIONS: usize = 8;

/// One unit of work: a binary image and the flash address it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub addr: u32,
    pub image: Vec<u8>,
    /// Originating file path, kept for diagnostics.
    pub source: PathBuf,
}

impl Partition {
    pub fn size(&self) -> usize {
        self.image.len()
    }
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("invalid address `{0}` (expected 0x-prefixed hex or decimal)")]
    InvalidAddress(String),

    #[error("missing file name after address {addr:#x}")]
    MissingFileName { addr: u32 },

    #[error("failed to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("short read on {path}: expected {expected} bytes, got {actual}")]
    ShortRead {
        path: PathBuf,
        expected: u64,
        actual: usize,
    },

    #[error("too many partitions: at most {MAX_PARTITIONS} address/file pairs")]
    TooManyPartitions,
}

impl PartitionError {
    fn file_open(path: &PathBuf, source: std::io::Error) -> Self {
        Self::FileOpen {
            path: path.clone(),
            source,
        }
    }
}

/// Parse a flash address token: `0x`/`0X` prefix selects base 16, anything
/// else must be decimal.
pub fn parse_address(token: &str) -> Result<u32, PartitionError> {
    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => token.parse::<u32>(),
    };
    parsed.map_err(|_| PartitionError::InvalidAddress(token.to_string()))
}

/// Build the ordered partition list from alternating `<address> <file>`
/// tokens. Order of the pairs is the flashing order.
///
/// Any failure discards the whole list; no partial result is returned.
pub fn build_partitions(tokens: &[String]) -> Result<Vec<Partition>, PartitionError> {
    let mut partitions = Vec::with_capacity(tokens.len() / 2);
    let mut iter = tokens.iter();

    while let Some(addr_token) = iter.next() {
        let addr = parse_address(addr_token)?;
        let path = match iter.next() {
            Some(name) => PathBuf::from(name),
            None => return Err(PartitionError::MissingFileName { addr }),
        };
        if partitions.len() == MAX_PARTITIONS {
            return Err(PartitionError::TooManyPartitions);
        }
        partitions.push(load_partition(addr, path)?);
    }

    Ok(partitions)
}

/// Read one image file in full, checking the byte count against the length
/// the filesystem reported at open time.
fn load_partition(addr: u32, path: PathBuf) -> Result<Partition, PartitionError> {
    let mut file = File::open(&path).map_err(|e| PartitionError::file_open(&path, e))?;
    let expected = file
        .metadata()
        .map_err(|e| PartitionError::file_open(&path, e))?
        .len();

    let image = read_image(&mut file, expected, &path)?;
    Ok(Partition { addr, image, source: path })
}

/// Drain `reader` and require at least `expected` bytes; a file truncated
/// between the length check and the read surfaces here as `ShortRead`.
fn read_image(
    reader: &mut impl Read,
    expected: u64,
    path: &Path,
) -> Result<Vec<u8>, PartitionError> {
    let mut image = Vec::with_capacity(usize::try_from(expected).unwrap_or(0));
    let actual = reader
        .read_to_end(&mut image)
        .map_err(|e| PartitionError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    if (actual as u64) < expected {
        return Err(PartitionError::ShortRead {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, contents: &[u8]) -> String {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_address_hex() {
        assert_eq!(parse_address("0x1000").unwrap(), 4096);
        assert_eq!(parse_address("0X8000").unwrap(), 32768);
    }

    #[test]
    fn test_parse_address_decimal() {
        assert_eq!(parse_address("1000").unwrap(), 1000);
        assert_eq!(parse_address("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_address_malformed_is_an_error() {
        assert!(matches!(
            parse_address("0xzz"),
            Err(PartitionError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_address("app.bin"),
            Err(PartitionError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_address(""),
            Err(PartitionError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_pairs_become_partitions_in_order() {
        let dir = TempDir::new().unwrap();
        let app = write_file(&dir, "app.bin", b"application");
        let data = write_file(&dir, "data.bin", b"data");

        let tokens = vec!["0x1000".to_string(), app, "0x8000".to_string(), data];
        let parts = build_partitions(&tokens).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].addr, 4096);
        assert_eq!(parts[0].image, b"application");
        assert_eq!(parts[1].addr, 32768);
        assert_eq!(parts[1].image, b"data");
    }

    #[test]
    fn test_empty_tokens_yield_empty_list() {
        assert!(build_partitions(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_name_fails() {
        let err = build_partitions(&["0x1000".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            PartitionError::MissingFileName { addr: 0x1000 }
        ));
    }

    #[test]
    fn test_unopenable_second_file_aborts_whole_list() {
        let dir = TempDir::new().unwrap();
        let app = write_file(&dir, "app.bin", b"application");
        let missing = dir.path().join("nope.bin");

        let tokens = vec![
            "0x1000".to_string(),
            app,
            "0x8000".to_string(),
            missing.to_string_lossy().into_owned(),
        ];
        let err = build_partitions(&tokens).unwrap_err();
        match err {
            PartitionError::FileOpen { path, .. } => assert_eq!(path, missing),
            other => panic!("expected FileOpen, got {other:?}"),
        }
    }

    #[test]
    fn test_ninth_pair_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "img.bin", b"x");

        let mut tokens = Vec::new();
        for i in 0..9 {
            tokens.push(format!("{:#x}", 0x1000 * (i + 1)));
            tokens.push(file.clone());
        }
        assert!(matches!(
            build_partitions(&tokens).unwrap_err(),
            PartitionError::TooManyPartitions
        ));
    }

    #[test]
    fn test_eight_pairs_are_accepted() {
        let dir = TempDir::new().unwrap();
        let file = write_file(&dir, "img.bin", b"x");

        let mut tokens = Vec::new();
        for i in 0..8 {
            tokens.push(format!("{:#x}", 0x1000 * (i + 1)));
            tokens.push(file.clone());
        }
        assert_eq!(build_partitions(&tokens).unwrap().len(), 8);
    }

    #[test]
    fn test_builder_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let app = write_file(&dir, "app.bin", b"application");
        let tokens = vec!["0x1000".to_string(), app];

        let first = build_partitions(&tokens).unwrap();
        let second = build_partitions(&tokens).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_source_is_a_short_read() {
        // A file that shrinks between the length check and the read must be
        // reported, not silently accepted.
        let mut truncated = std::io::Cursor::new(b"abc".to_vec());
        let err = read_image(&mut truncated, 10, Path::new("img.bin")).unwrap_err();
        match err {
            PartitionError::ShortRead {
                path,
                expected,
                actual,
            } => {
                assert_eq!(path, Path::new("img.bin"));
                assert_eq!(expected, 10);
                assert_eq!(actual, 3);
            }
            other => panic!("expected ShortRead, got {other:?}"),
        }
    }

    #[test]
    fn test_source_grown_past_expected_is_accepted() {
        let mut grown = std::io::Cursor::new(vec![0x5Au8; 16]);
        let image = read_image(&mut grown, 4, Path::new("img.bin")).unwrap();
        assert_eq!(image.len(), 16);
    }

    #[test]
    fn test_size_matches_file_length() {
        let dir = TempDir::new().unwrap();
        let payload = vec![0xA5u8; 3000];
        let file = write_file(&dir, "img.bin", &payload);

        let parts = build_partitions(&["0".to_string(), file]).unwrap();
        assert_eq!(parts[0].size(), 3000);
    }
}
