//! Persisting and releasing a timeline.

use bytes::BufMut;

use rewind_delta::{keys, serial, wire};

use crate::error::TimelineError;
use crate::kv::Bucket;
use crate::timeline::ChunkTimeline;

impl ChunkTimeline {
    /// Persist the timeline's header and latest snapshot, then release the
    /// chunk's session.
    ///
    /// Read-only and still-empty timelines only release. The first save of
    /// a chunk also registers it in the chunk index. The session is
    /// released on every exit path, success or not, so a failed save still
    /// lets other threads at the chunk (the buffered mutations are lost).
    pub fn save(self) -> Result<(), TimelineError> {
        if self.is_read_only || self.is_empty {
            return Ok(()); // dropping releases the session
        }

        let mut txn = self.kv.open_transaction();

        // Global header: times, palette, barriers, max limit. Gzipped.
        {
            let mut header = Vec::new();
            header.put_u32_le(self.times.len() as u32 * 8);
            for &time in &self.times {
                header.put_i64_le(time);
            }

            let palette_bytes = serial::palette_to_bytes(&self.palette, self.codec.as_ref());
            header.put_u32_le(palette_bytes.len() as u32);
            header.extend_from_slice(&palette_bytes);

            header.put_u32_le(self.barrier_left);
            header.put_u32_le(self.barrier_right);
            header.put_u32_le(self.max_limit);

            txn.put(
                Bucket::Root,
                &keys::sum(self.pos, keys::KEY_GLOBAL_DATA),
                &wire::gzip(&header)?,
            );
        }

        // Latest time point stamp, standalone for O(1) probes. A zero
        // stamp clears the key instead.
        match self.times.last().copied() {
            Some(0) | None => {
                txn.delete(Bucket::Root, &keys::sum(self.pos, keys::KEY_LATEST_TIME));
            }
            Some(latest) => {
                txn.put(
                    Bucket::Root,
                    &keys::sum(self.pos, keys::KEY_LATEST_TIME),
                    &latest.to_le_bytes(),
                );
            }
        }

        // Latest chunk snapshot.
        {
            let payload = serial::chunk_matrix_to_bytes(&self.latest_chunk)?;
            let key = keys::sum(self.pos, keys::KEY_LATEST_CHUNK);
            if payload.is_empty() {
                txn.delete(Bucket::Root, &key);
            } else {
                txn.put(Bucket::Root, &key, &payload);
            }
        }

        // Latest block entities.
        {
            let payload = serial::block_nbt_to_bytes(&self.latest_nbt)?;
            let key = keys::sum(self.pos, keys::KEY_LATEST_NBT);
            if payload.is_empty() {
                txn.delete(Bucket::Root, &key);
            } else {
                txn.put(Bucket::Root, &key, &payload);
            }
        }

        // First save of this chunk: register it in the chunk index.
        if !self.is_registered {
            let count = txn
                .get(Bucket::ChunkIndex, keys::KEY_CHUNK_COUNT)
                .and_then(|v| v.try_into().ok().map(u32::from_le_bytes))
                .unwrap_or(0);
            txn.put(
                Bucket::ChunkIndex,
                keys::KEY_CHUNK_COUNT,
                &(count + 1).to_le_bytes(),
            );
            txn.put(
                Bucket::ChunkIndex,
                &keys::index(self.pos),
                &keys::CHUNK_SENTINEL,
            );
        }

        txn.commit()
    }

    /// Release the timeline without writing anything.
    pub fn save_nop(self) {
        self.session.release();
    }
}
