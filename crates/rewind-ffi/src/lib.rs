//! C ABI for the timeline store.
//!
//! Every object crosses the boundary as an opaque `i64` handle (negative
//! means failure). Byte strings are length-prefixed; report strings are
//! empty on success and `"<opname>: <error>"` on failure. See `pack` for
//! the exact conventions and the release functions callers must use.

mod arena;
mod chunk_timeline;
mod database;
mod pack;

use std::sync::{Mutex, OnceLock};

use arena::HandleArena;
use rewind_timeline::{ChunkTimeline, TimelineDb};

pub use chunk_timeline::*;
pub use database::*;
pub use pack::{release_bytes, release_string};

/// Live databases, addressed by handle.
pub(crate) fn dbs() -> &'static HandleArena<TimelineDb> {
    static ARENA: OnceLock<HandleArena<TimelineDb>> = OnceLock::new();
    ARENA.get_or_init(HandleArena::default)
}

/// Live chunk timelines, addressed by handle. The slot empties when the
/// timeline is saved.
pub(crate) fn timelines() -> &'static HandleArena<Mutex<Option<ChunkTimeline>>> {
    static ARENA: OnceLock<HandleArena<Mutex<Option<ChunkTimeline>>>> = OnceLock::new();
    ARENA.get_or_init(HandleArena::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::{CStr, CString};

    use rewind_world::{
        encode_chunk, BlockCodec, BlockState, Chunk, ChunkEncoding, HashBlockCodec,
        OVERWORLD_RANGE,
    };

    use crate::pack::{join_slices, pack_bytes, unpack_bytes};

    fn temp_path() -> (CString, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("rewind_ffi_test_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        (
            CString::new(dir.to_str().unwrap()).unwrap(),
            dir,
        )
    }

    fn assert_ok(report: *mut std::ffi::c_char) {
        let message = unsafe { CStr::from_ptr(report) }
            .to_string_lossy()
            .into_owned();
        unsafe { release_string(report) };
        assert!(message.is_empty(), "operation failed: {message}");
    }

    #[test]
    fn full_surface_roundtrip() {
        let (path, dir) = temp_path();
        let codec = HashBlockCodec::new();
        let stone = codec.state_to_runtime_id(&BlockState::bare("minecraft:stone"));

        let db = unsafe { new_timeline_db(path.as_ptr(), 0, 0) };
        assert!(db >= 0);

        let timeline = new_chunk_timeline(db, 0, 3, -2, 0);
        assert!(timeline >= 0);
        assert_eq!(empty(timeline), 1);
        assert_eq!(read_only(timeline), 0);

        // Append one disk-encoded chunk with a single stone block.
        let mut chunk = Chunk::new(codec.air_runtime_id(), OVERWORLD_RANGE);
        chunk.set(3, 5, 7, stone).unwrap();
        let chunk_payload = pack_bytes(&join_slices(&encode_chunk(&chunk, ChunkEncoding::Disk)));
        let nbt_payload = pack_bytes(&[]);
        let report = unsafe {
            append_disk_chunk(
                timeline,
                chunk_payload,
                nbt_payload,
                OVERWORLD_RANGE.min_y,
                OVERWORLD_RANGE.max_y,
            )
        };
        unsafe {
            release_bytes(chunk_payload);
            release_bytes(nbt_payload);
        }
        assert_ok(report);

        assert_eq!(empty(timeline), 0);
        assert_eq!(all_time_point_len(timeline), 1);

        let times = all_time_point(timeline);
        let times_raw = unsafe { unpack_bytes(times) };
        unsafe { release_bytes(times) };
        assert_eq!(times_raw.len(), 8);

        // The bundle ends with is_last = 1 for the only time point.
        let bundle = next_disk_chunk(timeline);
        let bundle_raw = unsafe { unpack_bytes(bundle) };
        unsafe { release_bytes(bundle) };
        assert!(!bundle_raw.is_empty());
        assert_eq!(*bundle_raw.last().unwrap(), 1);

        assert_ok(save(timeline));
        // The handle died with save.
        assert_eq!(empty(timeline), -1);

        assert!(load_latest_time_point_unix_time(db, 0, 3, -2) > 0);

        assert_ok(delete_chunk_timeline(db, 0, 3, -2));
        assert_eq!(load_latest_time_point_unix_time(db, 0, 3, -2), 0);

        assert_ok(close_timeline_db(db));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn bad_handles_report_errors() {
        assert_eq!(empty(9_999_999), -1);
        assert_eq!(all_time_point_len(9_999_999), -1);
        let report = pop(9_999_999);
        let message = unsafe { CStr::from_ptr(report) }
            .to_string_lossy()
            .into_owned();
        unsafe { release_string(report) };
        assert!(message.contains("pop"));
    }
}
