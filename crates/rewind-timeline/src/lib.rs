//! Append-only per-chunk history store for Bedrock worlds.
//!
//! Each chunk owns a bounded ring of time points persisted as chained
//! forward deltas over a shared palette. Writers on the same chunk are
//! serialised by a session registry; different chunks proceed in parallel.

mod append;
mod compact;
pub mod database;
pub mod error;
mod iter;
pub mod kv;
mod pop;
mod save;
pub mod session;
pub mod timeline;

pub use database::TimelineDb;
pub use error::TimelineError;
pub use kv::DbOptions;
pub use session::SessionRegistry;
pub use timeline::{ChunkTimeline, DEFAULT_MAX_LIMIT};

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use rewind_delta::{keys, serial, DeltaError, DimChunk};
    use rewind_nbt::{NbtCompound, NbtValue};
    use rewind_world::{BlockCodec, BlockState, Chunk, HashBlockCodec};

    use crate::kv::Bucket;
    use crate::{DbOptions, TimelineDb, TimelineError};

    /// Throwaway database directory, removed on drop.
    struct TestDir(PathBuf);

    impl Drop for TestDir {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.0).ok();
        }
    }

    fn setup() -> (TestDir, Arc<HashBlockCodec>) {
        let dir = std::env::temp_dir().join(format!("rewind_tl_test_{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();
        (TestDir(dir), Arc::new(HashBlockCodec::new()))
    }

    fn open_at(dir: &Path, codec: &Arc<HashBlockCodec>) -> TimelineDb {
        TimelineDb::open_with_codec(dir, DbOptions::default(), codec.clone()).unwrap()
    }

    fn block(codec: &HashBlockCodec, name: &str) -> u32 {
        codec.state_to_runtime_id(&BlockState::bare(name))
    }

    /// A chunk whose only non-air blocks are the given (x, y, z, id) cells.
    fn chunk_with(codec: &HashBlockCodec, pos: DimChunk, cells: &[(u8, i32, u8, u32)]) -> Chunk {
        let mut chunk = Chunk::new(
            codec.air_runtime_id(),
            rewind_world::Range::for_dimension(pos.dim),
        );
        for &(x, y, z, id) in cells {
            chunk.set(x, y, z, id).unwrap();
        }
        chunk
    }

    /// A block entity at world coordinates for the chunk at `pos`.
    fn entity(pos: DimChunk, x: u8, y: i32, z: u8, value: i32) -> NbtCompound {
        let mut nbt = NbtCompound::new();
        nbt.insert("x".into(), NbtValue::Int((pos.x << 4) + i32::from(x)));
        nbt.insert("y".into(), NbtValue::Int(y));
        nbt.insert("z".into(), NbtValue::Int((pos.z << 4) + i32::from(z)));
        nbt.insert("Val".into(), NbtValue::Int(value));
        nbt
    }

    fn entity_val(nbts: &[NbtCompound]) -> Vec<i32> {
        nbts.iter()
            .filter_map(|n| n.get("Val").and_then(NbtValue::as_int))
            .collect()
    }

    #[test]
    fn single_append_roundtrip_through_reopen() {
        let (dir, codec) = setup();
        let pos = DimChunk::new(0, 0, 0);
        let stone = block(&codec, "minecraft:stone");

        {
            let db = open_at(&dir.0, &codec);
            let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
            assert!(timeline.empty());
            let chunk = chunk_with(&codec, pos, &[(3, 5, 7, stone)]);
            timeline
                .append_with_time(&chunk, Vec::new(), 1_000_000, false)
                .unwrap();
            assert!(!timeline.empty());
            timeline.save().unwrap();
            db.close().unwrap();
        }

        let db = open_at(&dir.0, &codec);
        assert_eq!(db.chunk_count(), 1);
        assert_eq!(db.load_latest_time_point_unix_time(pos), 1_000_000);

        let mut timeline = db.new_chunk_timeline(pos, true).unwrap();
        assert!(!timeline.empty());
        assert!(timeline.read_only());
        assert_eq!(timeline.all_time_points(), &[1_000_000]);

        let (last_chunk, last_nbts, last_time) = timeline.last().unwrap();
        assert_eq!(last_chunk.at(3, 5, 7).unwrap(), stone);
        assert!(last_nbts.is_empty());
        assert_eq!(last_time, 1_000_000);

        let (next_chunk, next_nbts, next_time, is_last) = timeline.next().unwrap();
        assert_eq!(next_chunk.at(3, 5, 7).unwrap(), stone);
        assert_eq!(next_chunk.at(3, 6, 7).unwrap(), codec.air_runtime_id());
        assert!(next_nbts.is_empty());
        assert_eq!(next_time, 1_000_000);
        assert!(is_last);

        // The cursor loops: a second next returns the same time point.
        let (again, _, again_time, again_last) = timeline.next().unwrap();
        assert_eq!(again.at(3, 5, 7).unwrap(), stone);
        assert_eq!(again_time, 1_000_000);
        assert!(again_last);

        timeline.save_nop();
        db.close().unwrap();
    }

    #[test]
    fn ring_pops_oldest_to_satisfy_max_limit() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 1, 0);
        let stone = block(&codec, "minecraft:stone");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        timeline.set_max_limit(3).unwrap();

        for t in 1..=4 {
            let chunk = chunk_with(&codec, pos, &[(0, t as i32, 0, stone)]);
            timeline
                .append_with_time(&chunk, Vec::new(), t, false)
                .unwrap();
            assert!(timeline.all_time_points_len() <= 3, "ring bound violated");
        }

        assert_eq!(timeline.all_time_points(), &[2, 3, 4]);

        let (last_chunk, _, last_time) = timeline.last().unwrap();
        assert_eq!(last_chunk.at(0, 4, 0).unwrap(), stone);
        assert_eq!(last_time, 4);

        // The walk reproduces the surviving points in order: C2, C3, C4.
        for expected in 2..=4i64 {
            let (chunk, _, time, is_last) = timeline.next().unwrap();
            assert_eq!(time, expected);
            assert_eq!(chunk.at(0, expected as i32, 0).unwrap(), stone);
            assert_eq!(is_last, expected == 4);
        }

        timeline.save().unwrap();
    }

    #[test]
    fn nbt_modify_roundtrip_and_corruption_detection() {
        let (dir, codec) = setup();
        let pos = DimChunk::new(0, 2, 0);
        let stone = block(&codec, "minecraft:stone");

        let modify_du_key;
        {
            let db = open_at(&dir.0, &codec);
            let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
            let chunk = chunk_with(&codec, pos, &[(0, 0, 0, stone)]);
            timeline
                .append_with_time(&chunk, vec![entity(pos, 0, 0, 0, 1)], 10, false)
                .unwrap();
            timeline
                .append_with_time(&chunk, vec![entity(pos, 0, 0, 0, 2)], 20, false)
                .unwrap();
            modify_du_key = keys::nbt_du(pos, timeline.barrier_right);

            // Sanity: the walk reproduces both block entity states.
            let (_, nbts, _, _) = timeline.next().unwrap();
            assert_eq!(entity_val(&nbts), vec![1]);
            let (_, nbts, _, is_last) = timeline.next().unwrap();
            assert_eq!(entity_val(&nbts), vec![2]);
            assert!(is_last);
            timeline.save().unwrap();
            db.close().unwrap();
        }

        let db = open_at(&dir.0, &codec);

        // Corrupt the stored postimage hash of the modify diff at du'|L+1.
        {
            let kv = db.kv_for_tests();
            let stored = kv
                .get(Bucket::Root, &modify_du_key)
                .expect("modify diff must exist");
            let mut diff = serial::bytes_to_nbt_diff(&stored).unwrap();
            assert_eq!(diff.modified.len(), 1);
            diff.modified[0].bytes[8] ^= 0xFF;
            kv.put(
                Bucket::Root,
                &modify_du_key,
                &serial::nbt_diff_to_bytes(&diff).unwrap(),
            )
            .unwrap();
        }

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        let (_, nbts, _, _) = timeline.next().unwrap();
        assert_eq!(entity_val(&nbts), vec![1], "first point is untouched");
        let err = timeline.next().unwrap_err();
        assert!(
            matches!(err, TimelineError::Delta(DeltaError::PostimageCorrupt)),
            "got {err:?}"
        );
        // The failure reset the cursor; the walk restarts cleanly.
        let (_, nbts, _, _) = timeline.next().unwrap();
        assert_eq!(entity_val(&nbts), vec![1]);
        timeline.save_nop();
    }

    #[test]
    fn jump_to_matches_sequential_nexts() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 3, 0);
        let stone = block(&codec, "minecraft:stone");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        for t in 1..=5 {
            let chunk = chunk_with(&codec, pos, &[(1, t as i32, 1, stone)]);
            timeline
                .append_with_time(&chunk, vec![entity(pos, 1, t as i32, 1, t as i32)], t, false)
                .unwrap();
        }

        // Walk four nexts and remember the fourth (index 3).
        let mut fourth = None;
        for _ in 0..4 {
            fourth = Some(timeline.next().unwrap());
        }
        let (next_chunk, next_nbts, next_time, _) = fourth.unwrap();

        timeline.reset_pointer();
        let (jump_chunk, jump_nbts, jump_time) = timeline.jump_to(3).unwrap();

        assert_eq!(jump_time, next_time);
        assert_eq!(
            jump_chunk.at(1, 4, 1).unwrap(),
            next_chunk.at(1, 4, 1).unwrap()
        );
        assert_eq!(entity_val(&jump_nbts), entity_val(&next_nbts));

        // jump_to works regardless of the current cursor position.
        let (chunk_again, _, time_again) = timeline.jump_to(3).unwrap();
        assert_eq!(time_again, 4);
        assert_eq!(chunk_again.at(1, 4, 1).unwrap(), stone);

        assert!(matches!(
            timeline.jump_to(5),
            Err(TimelineError::OutOfRange { index: 5, max: 4 })
        ));

        timeline.save().unwrap();
    }

    #[test]
    fn compact_drops_unreferenced_palette_entries() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 4, 0);
        let stone = block(&codec, "minecraft:stone");
        let dirt = block(&codec, "minecraft:dirt");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        let c1 = chunk_with(&codec, pos, &[(0, 0, 0, stone), (1, 0, 0, dirt)]);
        let c2 = chunk_with(&codec, pos, &[(0, 0, 0, stone), (1, 0, 0, stone)]);
        timeline.append_with_time(&c1, Vec::new(), 1, false).unwrap();
        timeline.append_with_time(&c2, Vec::new(), 2, false).unwrap();
        assert_eq!(timeline.palette_len(), 2);

        // Drop the only time point that still references dirt, then compact.
        timeline.pop().unwrap();
        timeline.compact().unwrap();
        assert_eq!(timeline.palette_len(), 1);

        let (chunk, _, time, is_last) = timeline.next().unwrap();
        assert_eq!(time, 2);
        assert!(is_last);
        assert_eq!(chunk.at(0, 0, 0).unwrap(), stone);
        assert_eq!(chunk.at(1, 0, 0).unwrap(), stone);

        let (last_chunk, _, _) = timeline.last().unwrap();
        assert_eq!(last_chunk.at(1, 0, 0).unwrap(), stone);

        timeline.save().unwrap();
    }

    #[test]
    fn compact_preserves_every_time_point() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 5, 0);
        let stone = block(&codec, "minecraft:stone");
        let dirt = block(&codec, "minecraft:dirt");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        let cells: [&[(u8, i32, u8, u32)]; 3] = [
            &[(0, 0, 0, stone)],
            &[(0, 0, 0, stone), (2, 8, 2, dirt)],
            &[(0, 0, 0, dirt), (2, 8, 2, dirt)],
        ];
        for (t, cell) in cells.iter().enumerate() {
            let chunk = chunk_with(&codec, pos, cell);
            timeline
                .append_with_time(
                    &chunk,
                    vec![entity(pos, 0, 0, 0, t as i32)],
                    t as i64 + 1,
                    false,
                )
                .unwrap();
        }

        let palette_before = timeline.palette_len();
        timeline.compact().unwrap();
        assert!(timeline.palette_len() <= palette_before);

        for (t, cell) in cells.iter().enumerate() {
            let (chunk, nbts, time, _) = timeline.next().unwrap();
            assert_eq!(time, t as i64 + 1);
            for &(x, y, z, id) in *cell {
                assert_eq!(chunk.at(x, y, z).unwrap(), id, "time point {t}");
            }
            assert_eq!(entity_val(&nbts), vec![t as i32]);
        }

        timeline.save().unwrap();
    }

    #[test]
    fn pop_leaves_the_tail_intact() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 6, 0);
        let stone = block(&codec, "minecraft:stone");
        let dirt = block(&codec, "minecraft:dirt");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        let cells: [&[(u8, i32, u8, u32)]; 3] = [
            &[(0, 0, 0, stone)],
            &[(0, 0, 0, dirt)],
            &[(0, 0, 0, dirt), (1, 1, 1, stone)],
        ];
        for (t, cell) in cells.iter().enumerate() {
            let chunk = chunk_with(&codec, pos, cell);
            timeline
                .append_with_time(&chunk, Vec::new(), t as i64 + 1, false)
                .unwrap();
        }

        timeline.pop().unwrap();
        assert_eq!(timeline.all_time_points(), &[2, 3]);

        // Remaining materialisations equal the original tail.
        let (chunk, _, time, _) = timeline.next().unwrap();
        assert_eq!(time, 2);
        assert_eq!(chunk.at(0, 0, 0).unwrap(), dirt);
        let (chunk, _, time, is_last) = timeline.next().unwrap();
        assert_eq!(time, 3);
        assert_eq!(chunk.at(1, 1, 1).unwrap(), stone);
        assert!(is_last);

        // Popping down to one point stops there.
        timeline.pop().unwrap();
        timeline.pop().unwrap();
        timeline.pop().unwrap();
        assert_eq!(timeline.all_time_points(), &[3]);

        timeline.save().unwrap();
    }

    #[test]
    fn nop_if_no_change_skips_identical_appends() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 7, 0);
        let stone = block(&codec, "minecraft:stone");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        let chunk = chunk_with(&codec, pos, &[(0, 0, 0, stone)]);
        let nbts = vec![entity(pos, 0, 0, 0, 1)];

        timeline
            .append_with_time(&chunk, nbts.clone(), 1, true)
            .unwrap();
        assert_eq!(timeline.all_time_points_len(), 1);

        timeline
            .append_with_time(&chunk, nbts.clone(), 2, true)
            .unwrap();
        assert_eq!(timeline.all_time_points_len(), 1, "identical append skipped");

        timeline.append_with_time(&chunk, nbts, 3, false).unwrap();
        assert_eq!(timeline.all_time_points_len(), 2, "forced append recorded");

        timeline.save().unwrap();
    }

    #[test]
    fn read_only_timelines_reject_mutation() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 8, 0);
        let stone = block(&codec, "minecraft:stone");

        {
            let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
            let chunk = chunk_with(&codec, pos, &[(0, 0, 0, stone)]);
            timeline
                .append_with_time(&chunk, Vec::new(), 1, false)
                .unwrap();
            timeline.save().unwrap();
        }

        let mut timeline = db.new_chunk_timeline(pos, true).unwrap();
        let chunk = chunk_with(&codec, pos, &[(5, 5, 5, stone)]);
        timeline
            .append_with_time(&chunk, Vec::new(), 2, false)
            .unwrap();
        timeline.pop().unwrap();
        timeline.set_max_limit(1).unwrap();
        timeline.compact().unwrap();
        assert_eq!(timeline.all_time_points(), &[1], "nothing changed");
        timeline.save().unwrap();

        // The store still holds exactly the original history.
        let timeline = db.new_chunk_timeline(pos, true).unwrap();
        assert_eq!(timeline.all_time_points(), &[1]);
        timeline.save_nop();
    }

    #[test]
    fn set_max_limit_pops_immediately() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 9, 0);
        let stone = block(&codec, "minecraft:stone");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        for t in 1..=5 {
            let chunk = chunk_with(&codec, pos, &[(0, t as i32, 0, stone)]);
            timeline
                .append_with_time(&chunk, Vec::new(), t, false)
                .unwrap();
        }

        timeline.set_max_limit(2).unwrap();
        assert_eq!(timeline.all_time_points(), &[4, 5]);

        // Limit 1 keeps exactly the newest point across appends.
        timeline.set_max_limit(0).unwrap();
        assert_eq!(timeline.all_time_points(), &[5]);
        let chunk = chunk_with(&codec, pos, &[(0, 9, 0, stone)]);
        timeline
            .append_with_time(&chunk, Vec::new(), 6, false)
            .unwrap();
        assert_eq!(timeline.all_time_points(), &[6]);

        let (last_chunk, _, _) = timeline.last().unwrap();
        assert_eq!(last_chunk.at(0, 9, 0).unwrap(), stone);

        timeline.save().unwrap();
    }

    #[test]
    fn delete_chunk_timeline_removes_everything() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 10, 0);
        let stone = block(&codec, "minecraft:stone");

        {
            let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
            let chunk = chunk_with(&codec, pos, &[(0, 0, 0, stone)]);
            timeline
                .append_with_time(&chunk, vec![entity(pos, 0, 0, 0, 1)], 1, false)
                .unwrap();
            timeline.save().unwrap();
        }
        assert_eq!(db.chunk_count(), 1);

        db.delete_chunk_timeline(pos).unwrap();
        assert_eq!(db.chunk_count(), 0);
        assert!(!db.has_chunk(pos));
        assert_eq!(db.load_latest_time_point_unix_time(pos), 0);

        let timeline = db.new_chunk_timeline(pos, false).unwrap();
        assert!(timeline.empty());
        timeline.save_nop();
    }

    #[test]
    fn save_registers_the_chunk_exactly_once() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(1, -3, 8);
        let stone = block(&codec, "minecraft:stone");

        for t in 1..=2 {
            let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
            let chunk = chunk_with(&codec, pos, &[(0, 20, 0, stone)]);
            timeline
                .append_with_time(&chunk, Vec::new(), t, false)
                .unwrap();
            timeline.save().unwrap();
        }

        assert_eq!(db.chunk_count(), 1);
        let mut seen = Vec::new();
        db.for_each_chunk(|p| seen.push(p)).unwrap();
        assert_eq!(seen, vec![pos]);
    }

    #[test]
    fn concurrent_sessions_on_one_chunk_serialise() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let db = &db;
        let pos = DimChunk::new(0, 11, 0);

        let mut intervals: Vec<(Instant, Duration)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(move || {
                        let timeline = db.new_chunk_timeline(pos, false).unwrap();
                        let start = Instant::now();
                        std::thread::sleep(Duration::from_millis(50));
                        timeline.save().unwrap();
                        (start, start.elapsed())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        intervals.sort_by_key(|(start, _)| *start);

        let first_end = intervals[0].0 + intervals[0].1;
        assert!(
            intervals[1].0 >= first_end,
            "second session started before the first released"
        );
    }

    #[test]
    fn times_are_non_decreasing_under_mixed_operations() {
        let (dir, codec) = setup();
        let db = open_at(&dir.0, &codec);
        let pos = DimChunk::new(0, 12, 0);
        let stone = block(&codec, "minecraft:stone");

        let mut timeline = db.new_chunk_timeline(pos, false).unwrap();
        timeline.set_max_limit(4).unwrap();
        for t in [5, 5, 7, 9, 12, 12, 15] {
            let chunk = chunk_with(&codec, pos, &[(0, t as i32 % 16, 0, stone)]);
            timeline
                .append_with_time(&chunk, Vec::new(), t, false)
                .unwrap();
            let times = timeline.all_time_points();
            assert!(times.windows(2).all(|w| w[0] <= w[1]));
            assert!(times.len() as u32 <= 4);
        }
        timeline.pop().unwrap();
        assert!(timeline.all_time_points().windows(2).all(|w| w[0] <= w[1]));

        timeline.save().unwrap();
    }
}
