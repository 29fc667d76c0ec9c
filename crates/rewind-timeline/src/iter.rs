//! Reading time points back: the prefix-sum cursor.

use rewind_delta::{chunk_restore, convert, keys, nbt_restore, serial};
use rewind_nbt::NbtCompound;
use rewind_world::Chunk;

use crate::error::TimelineError;
use crate::kv::Bucket;
use crate::timeline::ChunkTimeline;

impl ChunkTimeline {
    /// One prefix-sum step: fold the delta at the cursor into the running
    /// state and advance. Returns the time point's stamp and whether it is
    /// the last one. The cursor is left one past the element it read.
    fn step(&mut self) -> Result<(i64, bool), TimelineError> {
        let is_last = self.ptr == self.barrier_right;
        let sub_count = self.range.sub_chunk_count();

        let block_payload = self
            .kv
            .get(Bucket::Root, &keys::block_du(self.pos, self.ptr))
            .unwrap_or_default();
        let block_diff = serial::bytes_to_chunk_diff(&block_payload, sub_count)?;
        let current = std::mem::take(&mut self.current_chunk);
        self.current_chunk = chunk_restore(current, &block_diff)?;

        let nbt_payload = self
            .kv
            .get(Bucket::Root, &keys::nbt_du(self.pos, self.ptr))
            .unwrap_or_default();
        let nbt_diff = serial::bytes_to_nbt_diff(&nbt_payload)?;
        self.current_nbt = nbt_restore(&self.current_nbt, &nbt_diff)?;

        let time = self.times[(self.ptr - self.barrier_left) as usize];
        self.ptr += 1;

        Ok((time, is_last))
    }

    /// Run `step`, resetting the cursor on any failure so a bad time point
    /// does not poison subsequent traversals.
    fn step_or_reset(&mut self) -> Result<(i64, bool), TimelineError> {
        match self.step() {
            Ok(result) => Ok(result),
            Err(e) => {
                self.reset_pointer();
                Err(e)
            }
        }
    }

    fn wrap_if_done(&mut self) {
        if self.ptr > self.barrier_right {
            self.reset_pointer();
        }
    }

    /// Materialise the running state into a chunk plus block entity list.
    fn materialise(&self) -> Result<(Chunk, Vec<NbtCompound>), TimelineError> {
        let chunk = convert::matrix_to_chunk(
            &self.current_chunk,
            self.range,
            &self.palette,
            self.codec.as_ref(),
        )?;
        let nbts = self.current_nbt.iter().map(|r| r.nbt.clone()).collect();
        Ok((chunk, nbts))
    }

    /// Read the time point at the cursor and advance.
    ///
    /// Successive calls return the stored time points in order; after the
    /// last one (flagged by the returned bool) the cursor loops back to the
    /// earliest, so `next` can be called forever.
    pub fn next(&mut self) -> Result<(Chunk, Vec<NbtCompound>, i64, bool), TimelineError> {
        if self.is_empty {
            return Err(TimelineError::EmptyTimeline);
        }

        let (time, is_last) = self.step_or_reset()?;
        let (chunk, nbts) = self.materialise()?;
        self.wrap_if_done();

        Ok((chunk, nbts, time, is_last))
    }

    /// Read time point `index` (0-based from the left barrier), advancing
    /// the cursor cyclically as if `next` had been called the corresponding
    /// number of times, but materialising only the final state.
    pub fn jump_to(&mut self, index: u32) -> Result<(Chunk, Vec<NbtCompound>, i64), TimelineError> {
        if self.is_empty {
            return Err(TimelineError::EmptyTimeline);
        }

        let len = self.time_point_count();
        if index >= len {
            return Err(TimelineError::OutOfRange {
                index,
                max: len - 1,
            });
        }

        let steps = (index + len - self.pointer()) % len + 1;
        let mut time = 0;
        for _ in 0..steps {
            self.wrap_if_done();
            time = self.step_or_reset()?.0;
        }

        let (chunk, nbts) = self.materialise()?;
        self.wrap_if_done();

        Ok((chunk, nbts, time))
    }

    /// The newest time point, served from the cached latest snapshot
    /// without touching the cursor. O(chunk size).
    pub fn last(&self) -> Result<(Chunk, Vec<NbtCompound>, i64), TimelineError> {
        if self.is_empty {
            return Err(TimelineError::EmptyTimeline);
        }

        let chunk = convert::matrix_to_chunk(
            &self.latest_chunk,
            self.range,
            &self.palette,
            self.codec.as_ref(),
        )?;
        let nbts = self.latest_nbt.iter().map(|r| r.nbt.clone()).collect();
        let time = self
            .times
            .last()
            .copied()
            .ok_or(TimelineError::EmptyTimeline)?;

        Ok((chunk, nbts, time))
    }
}
