//! The timeline database: opens the store, owns the session registry, and
//! hands out per-chunk timelines.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use rewind_delta::{keys, DimChunk};
use rewind_world::{BlockCodec, HashBlockCodec};

use crate::error::TimelineError;
use crate::kv::{Bucket, DbOptions, LevelKv};
use crate::session::SessionRegistry;
use crate::timeline::ChunkTimeline;

/// Chunk timeline and history record provider backed by LevelDB.
pub struct TimelineDb {
    kv: Arc<LevelKv>,
    sessions: Arc<SessionRegistry>,
    codec: Arc<dyn BlockCodec>,
}

impl TimelineDb {
    /// Open (or create) the timeline database at `path` with the default
    /// hash-based block codec.
    pub fn open(path: &Path, opts: DbOptions) -> Result<Self, TimelineError> {
        Self::open_with_codec(path, opts, Arc::new(HashBlockCodec::new()))
    }

    /// Open with a caller-supplied block codec.
    pub fn open_with_codec(
        path: &Path,
        opts: DbOptions,
        codec: Arc<dyn BlockCodec>,
    ) -> Result<Self, TimelineError> {
        let kv = Arc::new(LevelKv::open(path, opts)?);
        info!(path = %path.display(), "timeline database opened");
        Ok(Self {
            kv,
            sessions: SessionRegistry::new(),
            codec,
        })
    }

    /// The block codec this database resolves runtime IDs through.
    pub fn codec(&self) -> Arc<dyn BlockCodec> {
        Arc::clone(&self.codec)
    }

    /// Acquire the timeline of the chunk at `pos`.
    ///
    /// A chunk with no history yields an empty timeline; nothing is created
    /// until a non-empty timeline is saved. Blocks while another thread
    /// holds the same chunk's timeline, and fails with
    /// [`TimelineError::DatabaseClosed`] after [`TimelineDb::close`].
    /// Read-only timelines must still be released through save (or
    /// save_nop, or by dropping them).
    pub fn new_chunk_timeline(
        &self,
        pos: DimChunk,
        read_only: bool,
    ) -> Result<ChunkTimeline, TimelineError> {
        let session = self.sessions.require(pos)?;
        ChunkTimeline::load(
            Arc::clone(&self.kv),
            Arc::clone(&self.codec),
            session,
            pos,
            read_only,
        )
    }

    /// Delete every stored record of the chunk at `pos`. A chunk without
    /// history is a no-op.
    ///
    /// Time complexity: O(n) in the chunk's time points.
    pub fn delete_chunk_timeline(&self, pos: DimChunk) -> Result<(), TimelineError> {
        let timeline = self.new_chunk_timeline(pos, false)?;
        if timeline.empty() {
            return Ok(()); // dropping releases the session
        }

        let mut txn = self.kv.open_transaction();

        txn.delete(Bucket::Root, &keys::sum(pos, keys::KEY_GLOBAL_DATA));
        txn.delete(Bucket::Root, &keys::sum(pos, keys::KEY_LATEST_TIME));
        txn.delete(Bucket::Root, &keys::sum(pos, keys::KEY_LATEST_CHUNK));
        txn.delete(Bucket::Root, &keys::sum(pos, keys::KEY_LATEST_NBT));

        for time_id in timeline.barrier_left..=timeline.barrier_right {
            txn.delete(Bucket::Root, &keys::block_du(pos, time_id));
            txn.delete(Bucket::Root, &keys::nbt_du(pos, time_id));
        }

        if txn.has(Bucket::ChunkIndex, &keys::index(pos)) {
            let count = txn
                .get(Bucket::ChunkIndex, keys::KEY_CHUNK_COUNT)
                .and_then(|v| v.try_into().ok().map(u32::from_le_bytes))
                .unwrap_or(0);
            txn.put(
                Bucket::ChunkIndex,
                keys::KEY_CHUNK_COUNT,
                &count.saturating_sub(1).to_le_bytes(),
            );
            txn.delete(Bucket::ChunkIndex, &keys::index(pos));
        }

        txn.commit()
    }

    /// The stamp of the chunk's newest time point, or 0 when none was ever
    /// saved. O(1); does not take a session.
    pub fn load_latest_time_point_unix_time(&self, pos: DimChunk) -> i64 {
        self.kv
            .get(Bucket::Root, &keys::sum(pos, keys::KEY_LATEST_TIME))
            .and_then(|v| v.try_into().ok().map(i64::from_le_bytes))
            .unwrap_or(0)
    }

    /// Overwrite the chunk's latest-time probe key; a zero stamp deletes
    /// it. Does not take a session.
    pub fn save_latest_time_point_unix_time(
        &self,
        pos: DimChunk,
        time_stamp: i64,
    ) -> Result<(), TimelineError> {
        let key = keys::sum(pos, keys::KEY_LATEST_TIME);
        if time_stamp == 0 {
            self.kv.delete(Bucket::Root, &key)
        } else {
            self.kv.put(Bucket::Root, &key, &time_stamp.to_le_bytes())
        }
    }

    /// Number of chunks with stored history.
    pub fn chunk_count(&self) -> u32 {
        self.kv
            .get(Bucket::ChunkIndex, keys::KEY_CHUNK_COUNT)
            .and_then(|v| v.try_into().ok().map(u32::from_le_bytes))
            .unwrap_or(0)
    }

    /// Whether the chunk at `pos` has stored history.
    pub fn has_chunk(&self, pos: DimChunk) -> bool {
        self.kv.has(Bucket::ChunkIndex, &keys::index(pos))
    }

    /// Visit every chunk registered in the chunk index.
    pub fn for_each_chunk(&self, mut f: impl FnMut(DimChunk)) -> Result<(), TimelineError> {
        self.kv.for_each(Bucket::ChunkIndex, |key, _| {
            if key == keys::KEY_CHUNK_COUNT {
                return;
            }
            if let Some(pos) = keys::index_inv(key) {
                f(pos);
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn kv_for_tests(&self) -> &LevelKv {
        &self.kv
    }

    /// Shut down: refuse new sessions, wait for live ones to drain, then
    /// flush the store.
    pub fn close(&self) -> Result<(), TimelineError> {
        self.sessions.close();
        self.sessions.wait_drain();
        self.kv.flush()?;
        info!("timeline database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db() -> (TimelineDb, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rewind_db_test_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        (TimelineDb::open(&dir, DbOptions::default()).unwrap(), dir)
    }

    #[test]
    fn missing_chunk_yields_empty_timeline() {
        let (db, dir) = temp_db();
        let timeline = db
            .new_chunk_timeline(DimChunk::new(0, 0, 0), false)
            .unwrap();
        assert!(timeline.empty());
        assert!(!timeline.read_only());
        timeline.save().unwrap();
        assert_eq!(db.chunk_count(), 0, "empty save must not register");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn latest_time_probe_roundtrip() {
        let (db, dir) = temp_db();
        let pos = DimChunk::new(0, 4, -2);
        assert_eq!(db.load_latest_time_point_unix_time(pos), 0);
        db.save_latest_time_point_unix_time(pos, 12_345).unwrap();
        assert_eq!(db.load_latest_time_point_unix_time(pos), 12_345);
        db.save_latest_time_point_unix_time(pos, 0).unwrap();
        assert_eq!(db.load_latest_time_point_unix_time(pos), 0);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn close_refuses_new_sessions() {
        let (db, dir) = temp_db();
        db.close().unwrap();
        assert!(matches!(
            db.new_chunk_timeline(DimChunk::new(0, 1, 1), true),
            Err(TimelineError::DatabaseClosed)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn delete_missing_chunk_is_noop() {
        let (db, dir) = temp_db();
        db.delete_chunk_timeline(DimChunk::new(0, 9, 9)).unwrap();
        assert_eq!(db.chunk_count(), 0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
