//! Chunk model, block identity, and world persistence for Bedrock worlds.

pub mod block;
pub mod chunk;
pub mod error;
pub mod payload;
pub mod range;
pub mod world;

pub use block::{BlockCodec, BlockState, HashBlockCodec, CURRENT_BLOCK_VERSION};
pub use chunk::{Chunk, Layer, SubChunk};
pub use error::WorldError;
pub use payload::{decode_chunk, decode_sub_chunk, encode_chunk, encode_sub_chunk, ChunkEncoding};
pub use range::{Range, END_RANGE, NETHER_RANGE, OVERWORLD_RANGE};
pub use world::WorldDb;
