//! On-disk image of a committed store state.
//!
//! Layout: a fixed-size bincode header (magic, format version, body length,
//! CRC32 of the body) followed by the bincode body. Writes go to a sibling
//! temporary file that is synced and then renamed over the target, so a
//! crash leaves either the old image or the new one.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{ErrorKind, GeoError, GeoResult};

use super::StoreState;

const MAGIC: u32 = 0x47454F4C; // "GEOL"
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FileHeader {
    magic: u32,
    version: u32,
    body_len: u64,
    checksum: u32,
}

impl FileHeader {
    fn for_body(body: &[u8]) -> Self {
        FileHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            body_len: body.len() as u64,
            checksum: crc32(body),
        }
    }

    fn validate(&self, body: &[u8]) -> GeoResult<()> {
        if self.magic != MAGIC {
            return Err(corrupted("Invalid file format (bad magic)"));
        }
        if self.version != FORMAT_VERSION {
            return Err(corrupted(&format!(
                "Unsupported file format version {}",
                self.version
            )));
        }
        if self.body_len != body.len() as u64 {
            return Err(corrupted(&format!(
                "Truncated file: expected {} body bytes, found {}",
                self.body_len,
                body.len()
            )));
        }
        let actual = crc32(body);
        if self.checksum != actual {
            return Err(corrupted(&format!(
                "Checksum mismatch - possible corruption (expected: {:x}, got: {:x})",
                self.checksum, actual
            )));
        }
        Ok(())
    }
}

/// Writes `state` to `path` atomically.
pub(crate) fn write_state(path: &Path, state: &StoreState) -> GeoResult<()> {
    let body = bincode::serde::encode_to_vec(state, bincode::config::legacy()).map_err(|e| {
        GeoError::new(
            &format!("Failed to serialize store state: {}", e),
            ErrorKind::EncodingError,
        )
    })?;
    let header = bincode::serde::encode_to_vec(FileHeader::for_body(&body), bincode::config::legacy())
        .map_err(|e| {
            GeoError::new(
                &format!("Failed to serialize file header: {}", e),
                ErrorKind::EncodingError,
            )
        })?;

    let temp = temp_path(path);
    {
        let mut file = File::create(&temp)?;
        file.write_all(&header)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    debug!(
        "Wrote store image of {} bytes to {}",
        header.len() + body.len(),
        path.display()
    );
    Ok(())
}

/// Reads and validates the image at `path`.
pub(crate) fn read_state(path: &Path) -> GeoResult<StoreState> {
    let bytes = fs::read(path)?;
    let (header, consumed): (FileHeader, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())
            .map_err(|e| corrupted(&format!("Unreadable file header: {}", e)))?;
    let body = &bytes[consumed..];
    header.validate(body)?;

    let (state, _): (StoreState, usize) =
        bincode::serde::decode_from_slice(body, bincode::config::legacy())
            .map_err(|e| corrupted(&format!("Unreadable store state: {}", e)))?;
    Ok(state)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn corrupted(message: &str) -> GeoError {
    GeoError::new(message, ErrorKind::FileCorrupted)
}

/// CRC-32/BZIP2 (poly 0x04C11DB7, MSB first, inverted output).
fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    const POLY: u32 = 0x04C11DB7;

    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x80000000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }

    crc ^ 0xFFFFFFFF
}
