//! Bootloader firmware framing and upload state
//!
//! This module provides:
//! - Splitting a firmware image into checksummed `data` chunks
//! - The bootloader command set
//! - Upload state tracking shared with observers

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksum::checksum_hex;

/// Largest payload the bootloader accepts in one `data` command
pub const MAX_CHUNK_SIZE: usize = 50;

/// Bootloader commands (sent newline-terminated)
pub mod commands {
    /// Erase flash and start a new upload
    pub const START: &str = "startfw";
    /// Finish (or abort) an upload
    pub const END: &str = "endfw";
    /// Prefix of a chunk command
    pub const DATA: &str = "data";
    /// Start the uploaded firmware
    pub const BOOT: &str = "boot";
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FirmwareError {
    #[error("Chunk size must be between 1 and {MAX_CHUNK_SIZE}, got {0}")]
    InvalidChunkSize(usize),
}

/// One slice of a firmware image, framed as a `data` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareChunk<'a> {
    /// 0-based position in the image
    pub index: usize,
    pub bytes: &'a [u8],
}

impl FirmwareChunk<'_> {
    /// Payload length as 2 hex digits
    pub fn length_hex(&self) -> String {
        format!("{:02x}", self.bytes.len())
    }

    pub fn payload_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Fletcher-16 over the raw chunk bytes, 4 hex digits
    pub fn checksum_hex(&self) -> String {
        checksum_hex(self.bytes)
    }

    /// `data<len><payload><checksum>`, without line terminator
    pub fn command(&self) -> String {
        format!(
            "{}{}{}{}",
            commands::DATA,
            self.length_hex(),
            self.payload_hex(),
            self.checksum_hex()
        )
    }
}

/// Split an image into chunks of at most `chunk_size` bytes, in file order
pub fn chunks(image: &[u8], chunk_size: usize) -> Result<Vec<FirmwareChunk<'_>>, FirmwareError> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(FirmwareError::InvalidChunkSize(chunk_size));
    }
    Ok(image
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, bytes)| FirmwareChunk { index, bytes })
        .collect())
}

/// Bootloader upload state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UploadState {
    /// Nothing sent yet
    #[default]
    Idle,
    /// `startfw` sent, flash is being erased
    Erasing,
    /// Sending chunk `chunk` (0-based) of `total`
    Uploading { chunk: usize, total: usize },
    /// `endfw` sent after the last chunk
    Finishing,
    /// `boot` sent
    Rebooting,
    /// Upload completed
    Done,
    /// Upload aborted
    Errored { message: String, chunk: Option<usize> },
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Done | UploadState::Errored { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_lengths() {
        let image = vec![0xaa; 120];
        let chunks = chunks(&image, MAX_CHUNK_SIZE).unwrap();
        let lengths: Vec<usize> = chunks.iter().map(|c| c.bytes.len()).collect();
        assert_eq!(lengths, vec![50, 50, 20]);
        assert_eq!(chunks[2].index, 2);
        assert_eq!(chunks[0].length_hex(), "32");
        assert_eq!(chunks[2].length_hex(), "14");
    }

    #[test]
    fn test_chunk_command() {
        let image = b"A";
        let chunks = chunks(image, MAX_CHUNK_SIZE).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].command(), "data01414141");

        let chunk = FirmwareChunk {
            index: 0,
            bytes: &[0x00, 0xff, 0x10],
        };
        assert_eq!(chunk.payload_hex(), "00ff10");
        assert_eq!(chunk.command(), format!("data0300ff10{}", chunk.checksum_hex()));
    }

    #[test]
    fn test_empty_image_has_no_chunks() {
        assert!(chunks(&[], 50).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_chunk_size() {
        assert_eq!(chunks(b"abc", 0), Err(FirmwareError::InvalidChunkSize(0)));
        assert_eq!(chunks(b"abc", 51), Err(FirmwareError::InvalidChunkSize(51)));
    }

    #[test]
    fn test_upload_state_is_terminal() {
        assert_eq!(UploadState::default(), UploadState::Idle);
        assert!(!UploadState::Idle.is_terminal());
        assert!(!UploadState::Erasing.is_terminal());
        assert!(!UploadState::Uploading { chunk: 0, total: 3 }.is_terminal());
        assert!(!UploadState::Finishing.is_terminal());
        assert!(!UploadState::Rebooting.is_terminal());
        assert!(UploadState::Done.is_terminal());
        assert!(UploadState::Errored {
            message: "test".to_string(),
            chunk: Some(1)
        }
        .is_terminal());
    }
}
