//! LevelDB-backed Bedrock world output.
//!
//! Writes recovered chunks into a standard Bedrock world database using the
//! stock key format, so the result opens directly in the game.

use std::path::Path;
use std::sync::Mutex;

use rusty_leveldb::DB;

use rewind_nbt::NbtCompound;

use crate::chunk::Chunk;
use crate::error::WorldError;
use crate::payload::{encode_sub_chunk, ChunkEncoding};

// ─── LevelDB key tags ───────────────────────────────────────────────────────

const TAG_CHUNK_VERSION: u8 = 0x2C;
const TAG_SUB_CHUNK_PREFIX: u8 = 0x2F;
const TAG_BLOCK_ENTITY: u8 = 0x31;
const TAG_FINALIZED_STATE: u8 = 0x36;

/// Current chunk format version.
const CHUNK_VERSION: u8 = 40;

/// Build a dimension-aware LevelDB key.
///
/// Overworld (dim=0): `[X:i32_le][Z:i32_le][tag]`
/// Other dimensions: `[X:i32_le][Z:i32_le][dim:i32_le][tag]`
fn chunk_key(cx: i32, cz: i32, dim: i32, tag: u8) -> Vec<u8> {
    let cap = if dim == 0 { 9 } else { 13 };
    let mut key = Vec::with_capacity(cap);
    key.extend_from_slice(&cx.to_le_bytes());
    key.extend_from_slice(&cz.to_le_bytes());
    if dim != 0 {
        key.extend_from_slice(&dim.to_le_bytes());
    }
    key.push(tag);
    key
}

/// Build a dimension-aware sub-chunk key: chunk key + `[0x2F][y_index]`.
fn sub_chunk_key(cx: i32, cz: i32, dim: i32, y_index: i8) -> Vec<u8> {
    let mut key = chunk_key(cx, cz, dim, TAG_SUB_CHUNK_PREFIX);
    key.push(y_index as u8);
    key
}

/// A writable Bedrock world directory.
///
/// The handle is shared by recovery workers, so the underlying store sits
/// behind a mutex.
pub struct WorldDb {
    db: Mutex<DB>,
}

impl WorldDb {
    /// Open or create a world database at the given path.
    pub fn open(path: &Path) -> Result<Self, WorldError> {
        let opts = rusty_leveldb::Options {
            create_if_missing: true,
            ..rusty_leveldb::Options::default()
        };
        let db = DB::open(path, opts).map_err(|e| WorldError::Store(e.to_string()))?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Write a chunk's version, sub-chunks, and finalisation marker.
    pub fn save_chunk(&self, dim: i32, cx: i32, cz: i32, chunk: &Chunk) -> Result<(), WorldError> {
        let mut db = self.db.lock().expect("world db lock poisoned");

        let version_key = chunk_key(cx, cz, dim, TAG_CHUNK_VERSION);
        db.put(&version_key, &[CHUNK_VERSION])
            .map_err(|e| WorldError::Store(e.to_string()))?;

        let min_index = chunk.range().min_y >> 4;
        for (i, sub) in chunk.sub().iter().enumerate() {
            let y_index = (min_index + i as i32) as i8;
            let key = sub_chunk_key(cx, cz, dim, y_index);
            let data = encode_sub_chunk(sub, y_index, ChunkEncoding::Disk);
            db.put(&key, &data)
                .map_err(|e| WorldError::Store(e.to_string()))?;
        }

        // Finalized state = 2 (done)
        let finalized_key = chunk_key(cx, cz, dim, TAG_FINALIZED_STATE);
        db.put(&finalized_key, &2i32.to_le_bytes())
            .map_err(|e| WorldError::Store(e.to_string()))?;

        Ok(())
    }

    /// Write a chunk's block entities as concatenated little-endian NBT.
    /// An empty list removes the record.
    pub fn save_block_nbt(
        &self,
        dim: i32,
        cx: i32,
        cz: i32,
        nbts: &[NbtCompound],
    ) -> Result<(), WorldError> {
        let key = chunk_key(cx, cz, dim, TAG_BLOCK_ENTITY);
        let mut db = self.db.lock().expect("world db lock poisoned");

        if nbts.is_empty() {
            db.delete(&key)
                .map_err(|e| WorldError::Store(e.to_string()))?;
            return Ok(());
        }

        let mut payload = Vec::new();
        for nbt in nbts {
            rewind_nbt::write_nbt(&mut payload, nbt);
        }
        db.put(&key, &payload)
            .map_err(|e| WorldError::Store(e.to_string()))
    }

    /// Raw get, for tools that inspect the world directly.
    pub fn get_raw(&self, key: &[u8]) -> Option<Vec<u8>> {
        let mut db = self.db.lock().expect("world db lock poisoned");
        db.get(key)
    }

    /// Key of a chunk's version record, exposed for existence probes.
    pub fn chunk_version_key(dim: i32, cx: i32, cz: i32) -> Vec<u8> {
        chunk_key(cx, cz, dim, TAG_CHUNK_VERSION)
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), WorldError> {
        let mut db = self.db.lock().expect("world db lock poisoned");
        db.flush().map_err(|e| WorldError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::OVERWORLD_RANGE;
    use rewind_nbt::NbtValue;
    use std::path::PathBuf;

    fn temp_db_path() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rewind_world_test_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn chunk_key_overworld_no_prefix() {
        let key = chunk_key(10, -5, 0, TAG_CHUNK_VERSION);
        assert_eq!(key.len(), 9);
        assert_eq!(&key[0..4], &10i32.to_le_bytes());
        assert_eq!(&key[4..8], &(-5i32).to_le_bytes());
        assert_eq!(key[8], TAG_CHUNK_VERSION);
    }

    #[test]
    fn chunk_key_nether_has_prefix() {
        let key = chunk_key(10, -5, 1, TAG_CHUNK_VERSION);
        assert_eq!(key.len(), 13);
        assert_eq!(&key[8..12], &1i32.to_le_bytes());
        assert_eq!(key[12], TAG_CHUNK_VERSION);
    }

    #[test]
    fn sub_chunk_key_negative_y() {
        let key = sub_chunk_key(0, 0, 0, -4);
        assert_eq!(key[8], TAG_SUB_CHUNK_PREFIX);
        assert_eq!(key[9], 0xFC); // -4 as u8 (two's complement)
    }

    #[test]
    fn save_chunk_and_nbt() {
        let path = temp_db_path();
        let world = WorldDb::open(&path).unwrap();

        let mut chunk = Chunk::new(0, OVERWORLD_RANGE);
        chunk.set(3, 5, 7, 42).unwrap();
        world.save_chunk(0, 2, -3, &chunk).unwrap();

        let mut nbt = NbtCompound::new();
        nbt.insert("id".into(), NbtValue::String("Chest".into()));
        world.save_block_nbt(0, 2, -3, &[nbt]).unwrap();
        world.flush().unwrap();

        std::fs::remove_dir_all(&path).ok();
    }
}
