//! Chunk enumeration and worker scheduling.

use std::time::Instant;

use rewind_delta::DimChunk;
use rewind_timeline::{TimelineDb, TimelineError};
use rewind_world::WorldDb;
use tracing::info;

use crate::runner::single_chunk_runner;

/// A rectangle of chunks in one dimension, inclusive on both corners.
#[derive(Debug, Clone, Copy)]
pub struct ChunkRect {
    pub dim: i32,
    pub start_x: i32,
    pub start_z: i32,
    pub end_x: i32,
    pub end_z: i32,
}

impl ChunkRect {
    fn normalised(self) -> Self {
        Self {
            dim: self.dim,
            start_x: self.start_x.min(self.end_x),
            start_z: self.start_z.min(self.end_z),
            end_x: self.start_x.max(self.end_x),
            end_z: self.start_z.max(self.end_z),
        }
    }

    fn area(&self) -> u64 {
        let width = (self.end_x - self.start_x) as u64 + 1;
        let depth = (self.end_z - self.start_z) as u64 + 1;
        width * depth
    }

    fn contains(&self, pos: DimChunk) -> bool {
        pos.dim == self.dim
            && (self.start_x..=self.end_x).contains(&pos.x)
            && (self.start_z..=self.end_z).contains(&pos.z)
    }
}

/// Restore every chunk registered in the database.
pub fn recover_entire_database(
    db: &TimelineDb,
    world: &WorldDb,
    target_unix_time: i64,
    max_concurrent: usize,
    ensure_exist_one: bool,
) -> Result<(), TimelineError> {
    let mut chunks = Vec::new();
    db.for_each_chunk(|pos| chunks.push(pos))?;
    run_workers(
        db,
        world,
        &chunks,
        target_unix_time,
        max_concurrent,
        ensure_exist_one,
    );
    Ok(())
}

/// Restore the chunks of a rectangle, walking whichever enumeration is
/// smaller: the rectangle itself or the database's chunk index.
pub fn recover_range(
    db: &TimelineDb,
    world: &WorldDb,
    rect: ChunkRect,
    target_unix_time: i64,
    max_concurrent: usize,
    ensure_exist_one: bool,
) -> Result<(), TimelineError> {
    let rect = rect.normalised();

    let mut chunks = Vec::new();
    if rect.area() <= u64::from(db.chunk_count()) {
        for x in rect.start_x..=rect.end_x {
            for z in rect.start_z..=rect.end_z {
                let pos = DimChunk::new(rect.dim, x, z);
                if db.has_chunk(pos) {
                    chunks.push(pos);
                }
            }
        }
    } else {
        db.for_each_chunk(|pos| {
            if rect.contains(pos) {
                chunks.push(pos);
            }
        })?;
    }

    run_workers(
        db,
        world,
        &chunks,
        target_unix_time,
        max_concurrent,
        ensure_exist_one,
    );
    Ok(())
}

/// Process chunks with at most `max_concurrent` workers; 0 runs serially
/// on the calling thread.
fn run_workers(
    db: &TimelineDb,
    world: &WorldDb,
    chunks: &[DimChunk],
    target_unix_time: i64,
    max_concurrent: usize,
    ensure_exist_one: bool,
) {
    let start = Instant::now();
    let mut written = 0usize;

    if max_concurrent == 0 {
        for &pos in chunks {
            if single_chunk_runner(db, world, target_unix_time, ensure_exist_one, pos) {
                written += 1;
            }
        }
    } else {
        for batch in chunks.chunks(max_concurrent) {
            written += std::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|&pos| {
                        scope.spawn(move || {
                            single_chunk_runner(db, world, target_unix_time, ensure_exist_one, pos)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(false))
                    .filter(|&written| written)
                    .count()
            });
        }
    }

    info!(
        found = chunks.len(),
        written,
        elapsed = ?start.elapsed(),
        "recovery pass finished"
    );
}
