use std::io;

use thiserror::Error;
use ticksim_eventq::CheckpointError;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error("invalid checkpoint magic")]
    InvalidMagic,

    #[error("unsupported checkpoint version {0}")]
    UnsupportedVersion(u16),

    #[error("invalid endianness tag {0}")]
    InvalidEndianness(u8),

    #[error("corrupt checkpoint: {0}")]
    Corrupt(&'static str),

    #[error("duplicate timeline `{0}`")]
    DuplicateTimeline(String),

    #[error("timeline count mismatch (META says {expected}, found {found})")]
    TimelineCountMismatch { expected: u32, found: u32 },

    #[error("invalid timeline contents: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("lz4 decompression failed: {0}")]
    Lz4Decompress(#[from] lz4_flex::block::DecompressError),

    #[error("utf-8 decoding failed: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
