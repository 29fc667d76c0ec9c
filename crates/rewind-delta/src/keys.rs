//! Byte-key layout for every record kind a chunk timeline persists.
//!
//! Each chunk's records share a 10-byte prefix
//! `x:u32_le ‖ z:u32_le ‖ dim:u16_le`, followed by an ASCII tag and, for
//! time-indexed records, a `u32_le` time point index. Layouts are bit-exact:
//! interoperating with an existing database requires producing identical
//! bytes.

use crate::index::DimChunk;

/// Chunk global header: times, palette, barriers, max limit. Gzip-framed.
pub const KEY_GLOBAL_DATA: &[u8] = b"tbplrg";
/// Latest time point unix seconds (`i64 LE`), standalone quick lookup.
pub const KEY_LATEST_TIME: &[u8] = b"T";
/// Latest chunk matrix, gzip-framed.
pub const KEY_LATEST_CHUNK: &[u8] = b"m";
/// Latest block entity list, gzip-framed.
pub const KEY_LATEST_NBT: &[u8] = b"m'";
/// Block delta update for one time point.
pub const KEY_BLOCK_DU: &[u8] = b"du";
/// Block entity delta update for one time point.
pub const KEY_NBT_DU: &[u8] = b"du'";

/// Key inside the chunk index bucket holding the `u32 LE` count of chunks
/// with history.
pub const KEY_CHUNK_COUNT: &[u8] = b"ChunkCount";
/// Value stored under each registered chunk's index key.
pub const CHUNK_SENTINEL: [u8; 1] = [1];

/// The 10-byte per-chunk key prefix.
pub fn index(pos: DimChunk) -> [u8; 10] {
    let mut b = [0u8; 10];
    b[0..4].copy_from_slice(&(pos.x as u32).to_le_bytes());
    b[4..8].copy_from_slice(&(pos.z as u32).to_le_bytes());
    b[8..10].copy_from_slice(&(pos.dim as u16).to_le_bytes());
    b
}

/// Decode a 10-byte chunk index key back to its position.
pub fn index_inv(key: &[u8]) -> Option<DimChunk> {
    if key.len() != 10 {
        return None;
    }
    Some(DimChunk {
        x: u32::from_le_bytes(key[0..4].try_into().ok()?) as i32,
        z: u32::from_le_bytes(key[4..8].try_into().ok()?) as i32,
        dim: i32::from(u16::from_le_bytes(key[8..10].try_into().ok()?)),
    })
}

/// Chunk prefix plus a record tag.
pub fn sum(pos: DimChunk, tag: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(10 + tag.len());
    key.extend_from_slice(&index(pos));
    key.extend_from_slice(tag);
    key
}

fn time_indexed(pos: DimChunk, tag: &[u8], time_id: u32) -> Vec<u8> {
    let mut key = sum(pos, tag);
    key.extend_from_slice(&time_id.to_le_bytes());
    key
}

/// Key of the block delta update for time point `time_id`.
pub fn block_du(pos: DimChunk, time_id: u32) -> Vec<u8> {
    time_indexed(pos, KEY_BLOCK_DU, time_id)
}

/// Key of the block entity delta update for time point `time_id`.
pub fn nbt_du(pos: DimChunk, time_id: u32) -> Vec<u8> {
    time_indexed(pos, KEY_NBT_DU, time_id)
}
