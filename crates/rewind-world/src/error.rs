//! World/chunk error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("sub-chunk payload truncated at byte {at}")]
    PayloadTruncated { at: usize },

    #[error("unsupported sub-chunk version: {0}")]
    UnsupportedVersion(u8),

    #[error("invalid bits-per-block: {0}")]
    InvalidBitsPerBlock(u8),

    #[error("block position ({x}, {y}, {z}) outside chunk bounds")]
    OutOfBounds { x: u8, y: i32, z: u8 },

    #[error("leveldb: {0}")]
    Store(String),

    #[error("NBT: {0}")]
    Nbt(#[from] rewind_nbt::NbtError),
}
