//! Chunk-timeline foreign operations.

use std::ffi::{c_char, c_int, c_longlong};

use rewind_nbt::NbtCompound;
use rewind_timeline::ChunkTimeline;
use rewind_world::{decode_chunk, encode_chunk, Chunk, ChunkEncoding, Range};

use crate::pack::{err_string, join_slices, ok_string, pack_bytes, split_slices, unpack_bytes};
use crate::timelines;

/// Run `f` on the live timeline behind `id`.
fn with_timeline<R>(
    id: c_longlong,
    f: impl FnOnce(&mut ChunkTimeline) -> R,
) -> Option<R> {
    let slot = timelines().get(id)?;
    let mut guard = slot.lock().expect("timeline lock poisoned");
    guard.as_mut().map(f)
}

fn report(opname: &str, result: Option<Result<(), rewind_timeline::TimelineError>>) -> *mut c_char {
    match result {
        None => err_string(opname, "chunk timeline not found"),
        Some(Err(e)) => err_string(opname, e),
        Some(Ok(())) => ok_string(),
    }
}

/// Whether the timeline is empty: 1 yes, 0 no, -1 bad handle.
#[no_mangle]
pub extern "C" fn empty(id: c_longlong) -> c_int {
    match with_timeline(id, |t| t.empty()) {
        None => -1,
        Some(v) => c_int::from(v),
    }
}

/// Whether the timeline is read-only: 1 yes, 0 no, -1 bad handle.
#[no_mangle]
pub extern "C" fn read_only(id: c_longlong) -> c_int {
    match with_timeline(id, |t| t.read_only()) {
        None => -1,
        Some(v) => c_int::from(v),
    }
}

/// Every stored time point stamp as packed `i64 LE` values.
#[no_mangle]
pub extern "C" fn all_time_point(id: c_longlong) -> *mut c_char {
    let times = with_timeline(id, |t| t.all_time_points().to_vec()).unwrap_or_default();
    let mut buf = Vec::with_capacity(times.len() * 8);
    for time in times {
        buf.extend_from_slice(&time.to_le_bytes());
    }
    pack_bytes(&buf)
}

/// Number of stored time points, -1 on a bad handle.
#[no_mangle]
pub extern "C" fn all_time_point_len(id: c_longlong) -> c_int {
    match with_timeline(id, |t| t.all_time_points_len()) {
        None => -1,
        Some(len) => len as c_int,
    }
}

/// Cap the ring size, popping immediately when already over it.
#[no_mangle]
pub extern "C" fn set_max_limit(id: c_longlong, max_limit: c_int) -> *mut c_char {
    report(
        "set_max_limit",
        with_timeline(id, |t| t.set_max_limit(max_limit.max(0) as u32)),
    )
}

/// Rebuild the palette from the blocks still referenced.
#[no_mangle]
pub extern "C" fn compact(id: c_longlong) -> *mut c_char {
    report("compact", with_timeline(id, |t| t.compact()))
}

/// Drop the oldest time point.
#[no_mangle]
pub extern "C" fn pop(id: c_longlong) -> *mut c_char {
    report("pop", with_timeline(id, |t| t.pop()))
}

/// Persist and release the timeline, destroying its handle.
#[no_mangle]
pub extern "C" fn save(id: c_longlong) -> *mut c_char {
    let Some(slot) = timelines().take(id) else {
        return err_string("save", "chunk timeline not found");
    };
    let timeline = slot.lock().expect("timeline lock poisoned").take();
    match timeline {
        None => err_string("save", "chunk timeline not found"),
        Some(timeline) => match timeline.save() {
            Ok(()) => ok_string(),
            Err(e) => err_string("save", e),
        },
    }
}

unsafe fn append_impl(
    id: c_longlong,
    chunk_payload: *const c_char,
    nbt_payload: *const c_char,
    range_start: c_int,
    range_end: c_int,
    encoding: ChunkEncoding,
) -> *mut c_char {
    let sub_payloads = split_slices(&unpack_bytes(chunk_payload));

    let mut nbts: Vec<NbtCompound> = Vec::new();
    for raw in split_slices(&unpack_bytes(nbt_payload)) {
        match rewind_nbt::from_slice(&raw) {
            Ok(compound) => nbts.push(compound),
            Err(e) => return err_string("append", e),
        }
    }

    let range = Range::new(range_start, range_end);
    let result = with_timeline(id, |timeline| {
        let chunk = decode_chunk(
            &sub_payloads,
            timeline.codec().air_runtime_id(),
            range,
            encoding,
        )?;
        timeline.append(&chunk, nbts, true)
    });

    report("append", result)
}

/// Append a time point from disk-encoded sub-chunk payloads.
///
/// # Safety
/// Both payload pointers must be valid length-prefixed byte strings.
#[no_mangle]
pub unsafe extern "C" fn append_disk_chunk(
    id: c_longlong,
    chunk_payload: *const c_char,
    nbt_payload: *const c_char,
    range_start: c_int,
    range_end: c_int,
) -> *mut c_char {
    append_impl(
        id,
        chunk_payload,
        nbt_payload,
        range_start,
        range_end,
        ChunkEncoding::Disk,
    )
}

/// Append a time point from network-encoded sub-chunk payloads.
///
/// # Safety
/// Both payload pointers must be valid length-prefixed byte strings.
#[no_mangle]
pub unsafe extern "C" fn append_network_chunk(
    id: c_longlong,
    chunk_payload: *const c_char,
    nbt_payload: *const c_char,
    range_start: c_int,
    range_end: c_int,
) -> *mut c_char {
    append_impl(
        id,
        chunk_payload,
        nbt_payload,
        range_start,
        range_end,
        ChunkEncoding::Network,
    )
}

/// Bundle a materialised time point for the caller:
/// `chunk ‖ range_start u16 ‖ range_end u16 ‖ nbt ‖ unix_time i64 ‖ [is_last u8]`.
fn pack_time_point(
    chunk: &Chunk,
    encoding: ChunkEncoding,
    nbts: &[NbtCompound],
    update_unix_time: i64,
    is_last: Option<bool>,
) -> *mut c_char {
    let mut buf = Vec::new();

    let chunk_payload = join_slices(&encode_chunk(chunk, encoding));
    buf.extend_from_slice(&(chunk_payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&chunk_payload);

    let range = chunk.range();
    buf.extend_from_slice(&(range.min_y as i16 as u16).to_le_bytes());
    buf.extend_from_slice(&(range.max_y as i16 as u16).to_le_bytes());

    let mut nbt_payload = Vec::new();
    for nbt in nbts {
        let mut raw = Vec::new();
        rewind_nbt::write_nbt(&mut raw, nbt);
        nbt_payload.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        nbt_payload.extend_from_slice(&raw);
    }
    buf.extend_from_slice(&(nbt_payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&nbt_payload);

    buf.extend_from_slice(&update_unix_time.to_le_bytes());

    if let Some(is_last) = is_last {
        buf.push(u8::from(is_last));
    }

    pack_bytes(&buf)
}

fn next_impl(id: c_longlong, encoding: ChunkEncoding) -> *mut c_char {
    match with_timeline(id, ChunkTimeline::next) {
        None | Some(Err(_)) => pack_bytes(&[]),
        Some(Ok((chunk, nbts, time, is_last))) => {
            pack_time_point(&chunk, encoding, &nbts, time, Some(is_last))
        }
    }
}

fn last_impl(id: c_longlong, encoding: ChunkEncoding) -> *mut c_char {
    match with_timeline(id, |t| t.last()) {
        None | Some(Err(_)) => pack_bytes(&[]),
        Some(Ok((chunk, nbts, time))) => pack_time_point(&chunk, encoding, &nbts, time, None),
    }
}

/// Advance the cursor and return the time point, disk-encoded.
#[no_mangle]
pub extern "C" fn next_disk_chunk(id: c_longlong) -> *mut c_char {
    next_impl(id, ChunkEncoding::Disk)
}

/// Advance the cursor and return the time point, network-encoded.
#[no_mangle]
pub extern "C" fn next_network_chunk(id: c_longlong) -> *mut c_char {
    next_impl(id, ChunkEncoding::Network)
}

/// The newest time point, disk-encoded.
#[no_mangle]
pub extern "C" fn last_disk_chunk(id: c_longlong) -> *mut c_char {
    last_impl(id, ChunkEncoding::Disk)
}

/// The newest time point, network-encoded.
#[no_mangle]
pub extern "C" fn last_network_chunk(id: c_longlong) -> *mut c_char {
    last_impl(id, ChunkEncoding::Network)
}
