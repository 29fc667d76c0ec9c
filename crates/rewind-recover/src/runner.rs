//! Per-chunk recovery worker.

use rewind_delta::DimChunk;
use rewind_timeline::{TimelineDb, TimelineError};
use rewind_world::WorldDb;
use tracing::{debug, warn};

/// Restore one chunk to the time point closest to (at or before)
/// `target_unix_time` and write it into the output world.
///
/// Returns whether a time point was written. With `ensure_exist_one`, a
/// chunk whose history starts after the target still contributes its
/// earliest time point.
pub fn single_chunk_runner(
    db: &TimelineDb,
    world: &WorldDb,
    target_unix_time: i64,
    ensure_exist_one: bool,
    pos: DimChunk,
) -> bool {
    match run(db, world, target_unix_time, ensure_exist_one, pos) {
        Ok(written) => {
            debug!(dim = pos.dim, x = pos.x, z = pos.z, written, "chunk done");
            written
        }
        Err(e) => {
            warn!(dim = pos.dim, x = pos.x, z = pos.z, error = %e, "chunk skipped");
            false
        }
    }
}

fn run(
    db: &TimelineDb,
    world: &WorldDb,
    target_unix_time: i64,
    ensure_exist_one: bool,
    pos: DimChunk,
) -> Result<bool, TimelineError> {
    let mut timeline = db.new_chunk_timeline(pos, true)?;

    if timeline.empty() {
        timeline.save_nop();
        return Ok(false);
    }

    let len = timeline.all_time_points_len();
    let search = timeline.all_time_points().binary_search(&target_unix_time);
    let index = match search {
        Ok(hit) => hit,
        Err(0) => {
            if !ensure_exist_one {
                timeline.save_nop();
                return Ok(false);
            }
            0
        }
        Err(insertion) => insertion - 1,
    };

    let (chunk, nbts, _) = if index == len - 1 {
        timeline.last()?
    } else {
        timeline.jump_to(index as u32)?
    };

    world.save_chunk(pos.dim, pos.x, pos.z, &chunk)?;
    world.save_block_nbt(pos.dim, pos.x, pos.z, &nbts)?;

    timeline.save()?;
    Ok(true)
}
