//! The per-chunk timeline state machine.
//!
//! A `ChunkTimeline` is single-threaded by contract: the session registry
//! guarantees at most one live instance per chunk, so no internal locking
//! is needed. Mutations buffer in memory and become durable on `save`.

use std::sync::Arc;

use rewind_delta::{
    keys, new_chunk_matrix, serial, ChunkMatrix, DimChunk, NbtRecord, Palette,
};
use rewind_world::{BlockCodec, Range};

use crate::error::TimelineError;
use crate::kv::{Bucket, LevelKv};
use crate::session::SessionToken;

/// How many time points a fresh timeline retains before popping old ones.
pub const DEFAULT_MAX_LIMIT: u32 = 7;

/// The history of one chunk: a bounded ring of time points stored as
/// chained forward deltas, plus a cursor for prefix-sum traversal.
///
/// Any modification must be followed by a [`ChunkTimeline::save`] call,
/// which is also what releases the chunk's session.
pub struct ChunkTimeline {
    pub(crate) kv: Arc<LevelKv>,
    pub(crate) codec: Arc<dyn BlockCodec>,
    pub(crate) pos: DimChunk,
    pub(crate) range: Range,
    pub(crate) session: SessionToken,

    pub(crate) is_read_only: bool,
    pub(crate) is_empty: bool,
    /// Whether the chunk already has its sentinel in the chunk index.
    pub(crate) is_registered: bool,

    pub(crate) times: Vec<i64>,
    pub(crate) palette: Palette,

    pub(crate) ptr: u32,
    pub(crate) current_chunk: ChunkMatrix,
    pub(crate) current_nbt: Vec<NbtRecord>,

    pub(crate) barrier_left: u32,
    pub(crate) barrier_right: u32,
    pub(crate) max_limit: u32,

    pub(crate) latest_chunk: ChunkMatrix,
    pub(crate) latest_nbt: Vec<NbtRecord>,
}

impl ChunkTimeline {
    /// Load the timeline of `pos`, or a fresh empty one when the chunk has
    /// no history yet. The caller supplies an already-acquired session.
    pub(crate) fn load(
        kv: Arc<LevelKv>,
        codec: Arc<dyn BlockCodec>,
        session: SessionToken,
        pos: DimChunk,
        read_only: bool,
    ) -> Result<Self, TimelineError> {
        let range = Range::for_dimension(pos.dim);
        let sub_count = range.sub_chunk_count();

        let mut timeline = Self {
            palette: Palette::new(codec.as_ref()),
            kv,
            codec,
            pos,
            range,
            session,
            is_read_only: read_only,
            is_empty: false,
            is_registered: false,
            times: Vec::new(),
            ptr: 0,
            current_chunk: new_chunk_matrix(sub_count),
            current_nbt: Vec::new(),
            barrier_left: 0,
            barrier_right: 0,
            max_limit: DEFAULT_MAX_LIMIT,
            latest_chunk: new_chunk_matrix(sub_count),
            latest_nbt: Vec::new(),
        };

        if !timeline
            .kv
            .has(Bucket::ChunkIndex, &keys::index(pos))
        {
            timeline.is_empty = true;
            return Ok(timeline);
        }
        timeline.is_registered = true;

        let gzipped = timeline
            .kv
            .get(Bucket::Root, &keys::sum(pos, keys::KEY_GLOBAL_DATA))
            .unwrap_or_default();
        let global = rewind_delta::wire::gunzip(&gzipped)?;
        timeline.parse_global_data(&global)?;

        let latest_chunk_bytes = timeline
            .kv
            .get(Bucket::Root, &keys::sum(pos, keys::KEY_LATEST_CHUNK))
            .unwrap_or_default();
        timeline.latest_chunk = serial::bytes_to_chunk_matrix(&latest_chunk_bytes, sub_count)?;

        let latest_nbt_bytes = timeline
            .kv
            .get(Bucket::Root, &keys::sum(pos, keys::KEY_LATEST_NBT))
            .unwrap_or_default();
        timeline.latest_nbt = serial::bytes_to_block_nbt(&latest_nbt_bytes)?;

        Ok(timeline)
    }

    /// Parse the gzip-stripped global header: times, palette, barriers.
    fn parse_global_data(&mut self, mut data: &[u8]) -> Result<(), TimelineError> {
        let take_u32 = |data: &mut &[u8]| -> Result<u32, TimelineError> {
            let current = *data;
            if current.len() < 4 {
                return Err(TimelineError::BarrierHeaderCorrupt { got: current.len() });
            }
            let value = u32::from_le_bytes(current[..4].try_into().expect("4 bytes"));
            *data = &current[4..];
            Ok(value)
        };

        // Timeline unix times
        let times_len = take_u32(&mut data)? as usize;
        if data.len() < times_len {
            return Err(TimelineError::BarrierHeaderCorrupt { got: data.len() });
        }
        for chunk in data[..times_len].chunks_exact(8) {
            self.times
                .push(i64::from_le_bytes(chunk.try_into().expect("8 bytes")));
        }
        data = &data[times_len..];

        // Block palette
        let palette_len = take_u32(&mut data)? as usize;
        if data.len() < palette_len {
            return Err(TimelineError::BarrierHeaderCorrupt { got: data.len() });
        }
        self.palette = serial::bytes_to_palette(&data[..palette_len], self.codec.as_ref())?;
        data = &data[palette_len..];

        // Barriers and max limit
        if data.len() < 12 {
            return Err(TimelineError::BarrierHeaderCorrupt { got: data.len() });
        }
        self.barrier_left = take_u32(&mut data)?;
        self.barrier_right = take_u32(&mut data)?;
        self.max_limit = take_u32(&mut data)?;
        self.ptr = self.barrier_left;

        Ok(())
    }

    /// The chunk this timeline belongs to.
    pub fn pos(&self) -> DimChunk {
        self.pos
    }

    /// The block codec runtime IDs resolve through.
    pub fn codec(&self) -> Arc<dyn BlockCodec> {
        Arc::clone(&self.codec)
    }

    /// The vertical extent the chunk lives in.
    pub fn range(&self) -> Range {
        self.range
    }

    /// Whether this timeline has no time points. Saving an empty timeline
    /// only releases it.
    pub fn empty(&self) -> bool {
        self.is_empty
    }

    /// Whether this timeline rejects mutation.
    pub fn read_only(&self) -> bool {
        self.is_read_only
    }

    /// Index of the next time point the cursor will read, relative to the
    /// left barrier.
    pub fn pointer(&self) -> u32 {
        self.ptr - self.barrier_left
    }

    /// Rewind the cursor to the first time point and clear the running
    /// prefix state. Always succeeds, even on an empty timeline.
    pub fn reset_pointer(&mut self) {
        self.ptr = self.barrier_left;
        self.current_chunk = new_chunk_matrix(self.range.sub_chunk_count());
        self.current_nbt = Vec::new();
    }

    /// Unix seconds of every stored time point, non-decreasing.
    pub fn all_time_points(&self) -> &[i64] {
        &self.times
    }

    /// Number of stored time points.
    pub fn all_time_points_len(&self) -> usize {
        self.times.len()
    }

    /// Number of stored (non-air) palette entries.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Cap how many time points the ring retains, popping the oldest ones
    /// immediately if the new limit is already exceeded. Values below 1
    /// clamp to 1. Read-only timelines ignore this.
    pub fn set_max_limit(&mut self, max_limit: u32) -> Result<(), TimelineError> {
        if self.is_read_only {
            return Ok(());
        }

        self.max_limit = max_limit.max(1);

        while self.time_point_count() > self.max_limit {
            self.pop()?;
        }

        Ok(())
    }

    pub(crate) fn time_point_count(&self) -> u32 {
        self.barrier_right - self.barrier_left + 1
    }
}
