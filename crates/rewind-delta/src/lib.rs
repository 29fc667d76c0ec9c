//! Delta engine for per-chunk history: palette-indexed block matrices,
//! sparse forward diffs, hash-verified block entity patches, and the
//! bit-exact wire formats they persist through.

pub mod block_nbt;
pub mod chunk_matrix;
pub mod convert;
pub mod error;
pub mod index;
pub mod keys;
pub mod layer;
pub mod matrix;
pub mod palette;
pub mod serial;
pub mod wire;

pub use block_nbt::{nbt_difference, nbt_restore, MultipleNbtDiff, NbtRecord, NbtRecordDiff};
pub use chunk_matrix::{
    chunk_difference, chunk_no_change, chunk_restore, new_chunk_matrix, ChunkDiffMatrix,
    ChunkMatrix,
};
pub use convert::{chunk_to_matrix, from_chunk_nbt, matrix_to_chunk, to_chunk_nbt};
pub use error::DeltaError;
pub use index::{ChunkBlockIndex, DimChunk};
pub use layer::{layer_difference, layer_no_change, layer_restore, Layers, LayersDiff};
pub use matrix::{difference, matrix_is_empty, new_matrix, restore, BlockMatrix, DiffMatrix, DiffRecord, MATRIX_SIZE};
pub use palette::Palette;
