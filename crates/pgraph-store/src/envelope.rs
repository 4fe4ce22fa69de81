//! Checksummed object envelope
//!
//! Every sealed object is stored as:
//! 1. a CBOR header (magic, format version, type name, body length, SHA-256
//!    of the body, SHA-256 of the header fields), followed by
//! 2. the raw body bytes (bincode-encoded object).
//!
//! Readers verify the header checksum, version compatibility, body length
//! and body checksum before handing the body out.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::StoreError;

/// Magic bytes: "PGOB".
pub const MAGIC: [u8; 4] = [0x50, 0x47, 0x4f, 0x42];

/// Current envelope version (major.minor.patch packed into the top three bytes).
pub const VERSION: u32 = 0x01_00_00_00;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub type_name: String,
    pub content_length: u64,
    pub content_checksum: [u8; 32],
    pub header_checksum: [u8; 32],
}

impl EnvelopeHeader {
    pub fn new(type_name: &str, content: &[u8]) -> Self {
        let mut header = Self {
            magic: MAGIC,
            version: VERSION,
            type_name: type_name.to_string(),
            content_length: content.len() as u64,
            content_checksum: compute_sha256(content),
            header_checksum: [0u8; 32],
        };
        header.header_checksum = header.compute_header_checksum();
        header
    }

    fn compute_header_checksum(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.magic);
        hasher.update(self.version.to_le_bytes());
        hasher.update((self.type_name.len() as u64).to_le_bytes());
        hasher.update(self.type_name.as_bytes());
        hasher.update(self.content_length.to_le_bytes());
        hasher.update(self.content_checksum);
        hasher.finalize().into()
    }

    pub fn verify(&self) -> Result<(), StoreError> {
        if self.magic != MAGIC {
            return Err(StoreError::InvalidMagic);
        }
        if !is_version_compatible(self.version, VERSION) {
            return Err(StoreError::IncompatibleVersion {
                object_version: self.version,
                reader_version: VERSION,
            });
        }
        if self.header_checksum != self.compute_header_checksum() {
            return Err(StoreError::HeaderChecksumMismatch);
        }
        Ok(())
    }

    pub fn verify_content(&self, content: &[u8]) -> Result<(), StoreError> {
        if content.len() as u64 != self.content_length {
            return Err(StoreError::ContentLengthMismatch {
                expected: self.content_length,
                actual: content.len() as u64,
            });
        }
        if compute_sha256(content) != self.content_checksum {
            return Err(StoreError::ContentChecksumMismatch);
        }
        Ok(())
    }
}

fn compute_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

fn is_version_compatible(object_version: u32, reader_version: u32) -> bool {
    let object_major = (object_version >> 24) & 0xFF;
    let reader_major = (reader_version >> 24) & 0xFF;
    if object_major != reader_major {
        return false;
    }
    let object_minor = (object_version >> 16) & 0xFF;
    let reader_minor = (reader_version >> 16) & 0xFF;
    reader_minor >= object_minor
}

/// Wrap `content` into header + body bytes.
pub fn encode(type_name: &str, content: &[u8]) -> Result<Vec<u8>, StoreError> {
    let header = EnvelopeHeader::new(type_name, content);
    let mut out = Vec::with_capacity(content.len() + 128);
    ciborium::into_writer(&header, &mut out)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    out.extend_from_slice(content);
    Ok(out)
}

/// Split and verify an envelope, returning the header and the body slice.
pub fn decode(data: &[u8]) -> Result<(EnvelopeHeader, &[u8]), StoreError> {
    let mut cursor = std::io::Cursor::new(data);
    let header: EnvelopeHeader = ciborium::from_reader(&mut cursor)
        .map_err(|e| StoreError::Deserialization(e.to_string()))?;
    header.verify()?;

    let pos = cursor.position() as usize;
    let content = &data[pos..];
    header.verify_content(content)?;
    Ok((header, content))
}
