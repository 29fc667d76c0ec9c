//! Delta-engine error types.

use rewind_nbt::NbtError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("varuint longer than 32 bits")]
    VaruintOverflow,

    #[error("cannot diff block entities at different positions")]
    DiffKeyMismatch,

    #[error("broken block entity diff: {len} bytes is shorter than the two hashes")]
    BrokenDiff { len: usize },

    #[error("older block entity does not match the stored preimage hash")]
    PreimageMismatch,

    #[error("patched block entity does not match the stored postimage hash")]
    PostimageCorrupt,

    #[error("palette index {index} out of range (palette length {len})")]
    PaletteIndexOutOfRange { index: u32, len: usize },

    #[error("diff record index {index} outside the block matrix")]
    DiffIndexOutOfRange { index: u64 },

    #[error("block palette entry is not a valid block state")]
    BadPaletteEntry,

    #[error("NBT: {0}")]
    Nbt(#[from] NbtError),

    #[error("codec: {0}")]
    Codec(String),
}
