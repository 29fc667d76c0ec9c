//! Dropping the oldest time point.

use rewind_delta::{
    chunk_difference, chunk_restore, keys, nbt_difference, nbt_restore, new_chunk_matrix, serial,
};

use crate::error::TimelineError;
use crate::kv::Bucket;
use crate::timeline::ChunkTimeline;

impl ChunkTimeline {
    /// Delete the first time point of the timeline by folding its delta
    /// into the one after it. Empty and single-point timelines (and
    /// read-only ones) are a no-op.
    pub fn pop(&mut self) -> Result<(), TimelineError> {
        if self.is_empty || self.is_read_only || self.barrier_left == self.barrier_right {
            return Ok(());
        }

        let sub_count = self.range.sub_chunk_count();
        let left = self.barrier_left;
        let mut txn = self.kv.open_transaction();

        // Blocks: materialise the first two states, then re-diff the second
        // one from all-air so it becomes the new base.
        {
            let first_payload = txn
                .get(Bucket::Root, &keys::block_du(self.pos, left))
                .unwrap_or_default();
            let first_diff = serial::bytes_to_chunk_diff(&first_payload, sub_count)?;
            let first_state = chunk_restore(new_chunk_matrix(sub_count), &first_diff)?;

            let second_payload = txn
                .get(Bucket::Root, &keys::block_du(self.pos, left + 1))
                .unwrap_or_default();
            let second_diff = serial::bytes_to_chunk_diff(&second_payload, sub_count)?;
            let second_state = chunk_restore(first_state, &second_diff)?;

            let rebased = chunk_difference(&new_chunk_matrix(sub_count), &second_state);

            txn.delete(Bucket::Root, &keys::block_du(self.pos, left));
            txn.put(
                Bucket::Root,
                &keys::block_du(self.pos, left + 1),
                &serial::chunk_diff_to_bytes(&rebased)?,
            );
        }

        // Block entities, the same set-wise.
        {
            let first_payload = txn
                .get(Bucket::Root, &keys::nbt_du(self.pos, left))
                .unwrap_or_default();
            let first_diff = serial::bytes_to_nbt_diff(&first_payload)?;
            let first_state = nbt_restore(&[], &first_diff)?;

            let second_payload = txn
                .get(Bucket::Root, &keys::nbt_du(self.pos, left + 1))
                .unwrap_or_default();
            let second_diff = serial::bytes_to_nbt_diff(&second_payload)?;
            let second_state = nbt_restore(&first_state, &second_diff)?;

            let rebased = nbt_difference(&[], &second_state)?;

            txn.delete(Bucket::Root, &keys::nbt_du(self.pos, left));
            txn.put(
                Bucket::Root,
                &keys::nbt_du(self.pos, left + 1),
                &serial::nbt_diff_to_bytes(&rebased)?,
            );
        }

        txn.commit()?;

        self.barrier_left += 1;
        self.times.remove(0);

        // A cursor at or before the rebased entry has a running state built
        // on the deleted delta; start it over.
        if self.ptr <= self.barrier_left {
            self.reset_pointer();
        }

        Ok(())
    }
}
