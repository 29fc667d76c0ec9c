//! Database-level foreign operations.

use std::ffi::{c_char, c_int, c_longlong, CStr};
use std::path::PathBuf;

use rewind_delta::DimChunk;
use rewind_timeline::{DbOptions, TimelineDb};

use crate::pack::{err_string, ok_string};
use crate::{dbs, timelines};

fn dim_chunk(dim: c_int, x: c_int, z: c_int) -> DimChunk {
    DimChunk::new(dim, x, z)
}

/// Open (or create) a timeline database. Returns its handle, negative on
/// failure.
///
/// # Safety
/// `path` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn new_timeline_db(
    path: *const c_char,
    no_grow_sync: c_int,
    no_sync: c_int,
) -> c_longlong {
    if path.is_null() {
        return -1;
    }
    let Ok(path) = CStr::from_ptr(path).to_str() else {
        return -1;
    };

    let opts = DbOptions {
        no_grow_sync: no_grow_sync != 0,
        no_sync: no_sync != 0,
    };
    match TimelineDb::open(&PathBuf::from(path), opts) {
        Ok(db) => dbs().add(db),
        Err(_) => -1,
    }
}

/// Close a timeline database and destroy its handle.
#[no_mangle]
pub extern "C" fn close_timeline_db(id: c_longlong) -> *mut c_char {
    let Some(db) = dbs().take(id) else {
        return err_string("close_timeline_db", "timeline database not found");
    };
    match db.close() {
        Ok(()) => ok_string(),
        Err(e) => err_string("close_timeline_db", e),
    }
}

/// Acquire a chunk timeline. Returns its handle, negative on failure
/// (including a closed database). Blocks while another holder has the
/// same chunk.
#[no_mangle]
pub extern "C" fn new_chunk_timeline(
    db_id: c_longlong,
    dim: c_int,
    x: c_int,
    z: c_int,
    read_only: c_int,
) -> c_longlong {
    let Some(db) = dbs().get(db_id) else {
        return -1;
    };
    match db.new_chunk_timeline(dim_chunk(dim, x, z), read_only != 0) {
        Ok(timeline) => timelines().add(std::sync::Mutex::new(Some(timeline))),
        Err(_) => -1,
    }
}

/// Delete all stored history of a chunk.
#[no_mangle]
pub extern "C" fn delete_chunk_timeline(
    db_id: c_longlong,
    dim: c_int,
    x: c_int,
    z: c_int,
) -> *mut c_char {
    let Some(db) = dbs().get(db_id) else {
        return err_string("delete_chunk_timeline", "timeline database not found");
    };
    match db.delete_chunk_timeline(dim_chunk(dim, x, z)) {
        Ok(()) => ok_string(),
        Err(e) => err_string("delete_chunk_timeline", e),
    }
}

/// Stamp of the chunk's newest time point, 0 when absent, negative on a
/// bad database handle.
#[no_mangle]
pub extern "C" fn load_latest_time_point_unix_time(
    db_id: c_longlong,
    dim: c_int,
    x: c_int,
    z: c_int,
) -> c_longlong {
    let Some(db) = dbs().get(db_id) else {
        return -1;
    };
    db.load_latest_time_point_unix_time(dim_chunk(dim, x, z))
}

/// Overwrite the chunk's latest-time probe key (0 deletes it).
#[no_mangle]
pub extern "C" fn save_latest_time_point_unix_time(
    db_id: c_longlong,
    dim: c_int,
    x: c_int,
    z: c_int,
    time_stamp: c_longlong,
) -> *mut c_char {
    let Some(db) = dbs().get(db_id) else {
        return err_string("save_latest_time_point_unix_time", "timeline database not found");
    };
    match db.save_latest_time_point_unix_time(dim_chunk(dim, x, z), time_stamp) {
        Ok(()) => ok_string(),
        Err(e) => err_string("save_latest_time_point_unix_time", e),
    }
}
