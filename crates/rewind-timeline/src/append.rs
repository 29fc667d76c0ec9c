//! Appending new time points.

use std::time::{SystemTime, UNIX_EPOCH};

use rewind_delta::{
    chunk_difference, chunk_no_change, convert, keys, nbt_difference, serial,
};
use rewind_nbt::NbtCompound;
use rewind_world::Chunk;

use crate::error::TimelineError;
use crate::kv::Bucket;
use crate::timeline::ChunkTimeline;

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl ChunkTimeline {
    /// Append a new time point holding `chunk` and its block entities,
    /// stamped with the current wall-clock time.
    ///
    /// With `nop_if_no_change`, an append that changes neither blocks nor
    /// block entities returns without touching the store. If the ring is
    /// full, the oldest time points are popped first. Read-only timelines
    /// do nothing.
    pub fn append(
        &mut self,
        chunk: &Chunk,
        nbts: Vec<NbtCompound>,
        nop_if_no_change: bool,
    ) -> Result<(), TimelineError> {
        self.append_with_time(chunk, nbts, unix_now(), nop_if_no_change)
    }

    /// [`ChunkTimeline::append`] with an explicit unix-seconds stamp.
    pub fn append_with_time(
        &mut self,
        chunk: &Chunk,
        nbts: Vec<NbtCompound>,
        update_unix_time: i64,
        nop_if_no_change: bool,
    ) -> Result<(), TimelineError> {
        if self.is_read_only {
            return Ok(());
        }

        let newer_nbt = convert::from_chunk_nbt(self.pos, nbts);
        let newer_chunk = convert::chunk_to_matrix(chunk, &mut self.palette, self.codec.as_ref());

        let block_diff = chunk_difference(&self.latest_chunk, &newer_chunk);
        let nbt_diff = nbt_difference(&self.latest_nbt, &newer_nbt)?;

        if nop_if_no_change && chunk_no_change(&block_diff) && nbt_diff.no_change() {
            return Ok(());
        }

        // Make room before writing; the pre-pop leaves maxLimit - 1 points,
        // except at maxLimit 1 where the overflow is popped afterwards.
        while !self.is_empty
            && self.barrier_left < self.barrier_right
            && self.time_point_count() >= self.max_limit
        {
            self.pop()?;
        }

        // The diffs were computed against the pre-pop latest state, which
        // pop leaves untouched, so they stay valid here.
        let time_id = self.barrier_right + 1;
        let mut txn = self.kv.open_transaction();
        txn.put(
            Bucket::Root,
            &keys::block_du(self.pos, time_id),
            &serial::chunk_diff_to_bytes(&block_diff)?,
        );
        txn.put(
            Bucket::Root,
            &keys::nbt_du(self.pos, time_id),
            &serial::nbt_diff_to_bytes(&nbt_diff)?,
        );
        txn.put(
            Bucket::Root,
            &keys::sum(self.pos, keys::KEY_LATEST_CHUNK),
            &serial::chunk_matrix_to_bytes(&newer_chunk)?,
        );
        txn.put(
            Bucket::Root,
            &keys::sum(self.pos, keys::KEY_LATEST_NBT),
            &serial::block_nbt_to_bytes(&newer_nbt)?,
        );
        txn.put(
            Bucket::Root,
            &keys::sum(self.pos, keys::KEY_LATEST_TIME),
            &update_unix_time.to_le_bytes(),
        );
        txn.commit()?;

        self.latest_chunk = newer_chunk;
        self.latest_nbt = newer_nbt;
        self.barrier_right += 1;
        self.times.push(update_unix_time);

        if self.is_empty {
            self.barrier_left = self.barrier_right;
            self.ptr = self.barrier_left;
            self.is_empty = false;
        }

        // A limit of 1 keeps exactly the point just written.
        while self.time_point_count() > self.max_limit && self.barrier_left < self.barrier_right {
            self.pop()?;
        }

        Ok(())
    }
}
