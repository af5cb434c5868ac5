//! Opaque item payloads, optionally LZ4-compressed.

use std::io::{Read, Write};

use crate::error::{Result, SnapshotError};
use crate::io::{ReadLeExt, WriteLeExt};

/// Largest payload a single record may carry once decompressed.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

/// Payloads shorter than this are always stored raw.
const MIN_COMPRESS_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    None = 0,
    Lz4 = 1,
}

impl Compression {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            _ => Err(SnapshotError::Corrupt("invalid compression kind")),
        }
    }
}

pub(crate) fn encode_payload<W: Write>(
    w: &mut W,
    compression: Compression,
    payload: &[u8],
) -> Result<()> {
    let uncompressed_len: u32 = payload
        .len()
        .try_into()
        .ok()
        .filter(|&len| len <= MAX_PAYLOAD_LEN)
        .ok_or(SnapshotError::Corrupt("payload too large"))?;

    let compression = if payload.len() < MIN_COMPRESS_LEN {
        Compression::None
    } else {
        compression
    };
    let stored = match compression {
        Compression::None => payload.to_vec(),
        Compression::Lz4 => lz4_flex::block::compress(payload),
    };

    w.write_u8(compression as u8)?;
    w.write_u32_le(uncompressed_len)?;
    w.write_u32_le(stored.len() as u32)?;
    w.write_bytes(&stored)
}

pub(crate) fn decode_payload<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let compression = Compression::from_u8(r.read_u8()?)?;
    let uncompressed_len = r.read_u32_le()?;
    if uncompressed_len > MAX_PAYLOAD_LEN {
        return Err(SnapshotError::Corrupt("payload too large"));
    }
    let stored_len = r.read_u32_le()?;
    validate_stored_len(compression, uncompressed_len, stored_len)?;

    let stored = r.read_exact_vec(stored_len as usize)?;
    match compression {
        Compression::None => Ok(stored),
        Compression::Lz4 => Ok(lz4_flex::block::decompress(
            &stored,
            uncompressed_len as usize,
        )?),
    }
}

fn max_lz4_compressed_len(uncompressed_len: u32) -> u32 {
    // LZ4 worst-case size: uncompressed + (uncompressed / 255) + 16
    uncompressed_len
        .saturating_add(uncompressed_len / 255)
        .saturating_add(16)
}

fn validate_stored_len(compression: Compression, uncompressed_len: u32, stored_len: u32) -> Result<()> {
    match compression {
        Compression::None => {
            if stored_len != uncompressed_len {
                return Err(SnapshotError::Corrupt(
                    "stored_len must equal uncompressed_len for no compression",
                ));
            }
        }
        Compression::Lz4 => {
            if stored_len > max_lz4_compressed_len(uncompressed_len) {
                return Err(SnapshotError::Corrupt("lz4 payload too large"));
            }
        }
    }
    Ok(())
}
