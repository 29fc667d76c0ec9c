//! Palette recompaction.

use rewind_delta::{
    chunk_difference, keys, new_chunk_matrix, serial, ChunkMatrix, DeltaError, Palette,
};

use crate::error::TimelineError;
use crate::kv::Bucket;
use crate::timeline::ChunkTimeline;

impl ChunkTimeline {
    /// Rebuild the palette from the blocks the timeline actually still
    /// references and re-encode every block delta against it. Block
    /// entity deltas are preserved byte-for-byte.
    ///
    /// Expensive: every time point is materialised. Empty and read-only
    /// timelines are a no-op.
    pub fn compact(&mut self) -> Result<(), TimelineError> {
        if self.is_empty || self.is_read_only {
            return Ok(());
        }

        let sub_count = self.range.sub_chunk_count();
        let len = self.time_point_count();

        // Materialise every stored time point with a full walk.
        self.reset_pointer();
        let mut time_points: Vec<ChunkMatrix> = Vec::with_capacity(len as usize);
        for _ in 0..len {
            if let Err(e) = self.walk_one() {
                self.reset_pointer();
                return Err(e);
            }
            time_points.push(self.current_chunk.clone());
        }
        self.reset_pointer();

        // Collect the runtime IDs still in use.
        let mut new_palette = Palette::new(self.codec.as_ref());
        for time_point in &time_points {
            for layers in time_point {
                for matrix in layers.iter().flatten() {
                    for &index in matrix.iter() {
                        if index != 0 {
                            let runtime_id = self.palette.runtime_id(index).ok_or(
                                DeltaError::PaletteIndexOutOfRange {
                                    index,
                                    len: self.palette.len(),
                                },
                            )?;
                            new_palette.add_block(runtime_id, self.codec.as_ref());
                        }
                    }
                }
            }
        }

        // Re-encode each time point against the new palette.
        for time_point in &mut time_points {
            for layers in time_point.iter_mut() {
                for matrix in layers.iter_mut().flatten() {
                    for index in matrix.iter_mut() {
                        if *index != 0 {
                            let runtime_id = self.palette.runtime_id(*index).ok_or(
                                DeltaError::PaletteIndexOutOfRange {
                                    index: *index,
                                    len: self.palette.len(),
                                },
                            )?;
                            *index = new_palette.index(runtime_id, self.codec.as_ref());
                        }
                    }
                }
            }
        }

        // Rewrite every block delta in one transaction.
        let mut txn = self.kv.open_transaction();
        let mut previous = new_chunk_matrix(sub_count);
        for (offset, time_point) in time_points.iter().enumerate() {
            let diff = chunk_difference(&previous, time_point);
            txn.put(
                Bucket::Root,
                &keys::block_du(self.pos, self.barrier_left + offset as u32),
                &serial::chunk_diff_to_bytes(&diff)?,
            );
            previous = time_point.clone();
        }
        txn.put(
            Bucket::Root,
            &keys::sum(self.pos, keys::KEY_LATEST_CHUNK),
            &serial::chunk_matrix_to_bytes(&previous)?,
        );
        txn.commit()?;

        self.palette = new_palette;
        self.latest_chunk = previous;
        self.reset_pointer();

        Ok(())
    }

    /// A cursor step without materialisation, for internal full walks.
    fn walk_one(&mut self) -> Result<(), TimelineError> {
        let sub_count = self.range.sub_chunk_count();

        let block_payload = self
            .kv
            .get(Bucket::Root, &keys::block_du(self.pos, self.ptr))
            .unwrap_or_default();
        let block_diff = serial::bytes_to_chunk_diff(&block_payload, sub_count)?;
        let current = std::mem::take(&mut self.current_chunk);
        self.current_chunk = rewind_delta::chunk_restore(current, &block_diff)?;
        self.ptr += 1;

        Ok(())
    }
}
