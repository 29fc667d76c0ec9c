//! Packing conventions of the foreign-function surface.
//!
//! Byte strings cross the boundary as `u32 LE length ‖ payload`, allocated
//! here and returned to `release_bytes`. Report strings are C strings:
//! empty on success, `"<opname>: <error>"` on failure, returned to
//! `release_string`.

use std::ffi::{c_char, CString};
use std::fmt::Display;

/// Allocate a length-prefixed byte string for the caller.
pub fn pack_bytes(data: &[u8]) -> *mut c_char {
    let mut buf = Vec::with_capacity(4 + data.len());
    buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
    buf.extend_from_slice(data);
    Box::into_raw(buf.into_boxed_slice()) as *mut c_char
}

/// Read a caller-supplied length-prefixed byte string.
///
/// # Safety
/// `ptr` must point to at least 4 readable bytes holding a little-endian
/// length, followed by that many payload bytes.
pub unsafe fn unpack_bytes(ptr: *const c_char) -> Vec<u8> {
    if ptr.is_null() {
        return Vec::new();
    }
    let header = std::slice::from_raw_parts(ptr as *const u8, 4);
    let len = u32::from_le_bytes(header.try_into().expect("4 bytes")) as usize;
    std::slice::from_raw_parts(ptr.add(4) as *const u8, len).to_vec()
}

/// An empty report string: success.
pub fn ok_string() -> *mut c_char {
    CString::default().into_raw()
}

/// A `"<opname>: <error>"` report string.
pub fn err_string(opname: &str, error: impl Display) -> *mut c_char {
    let message = format!("{opname}: {error}");
    CString::new(message.replace('\0', ""))
        .expect("NUL bytes stripped")
        .into_raw()
}

/// Split a concatenation of `u32 LE length ‖ payload` slices.
pub fn split_slices(mut payload: &[u8]) -> Vec<Vec<u8>> {
    let mut slices = Vec::new();
    while payload.len() >= 4 {
        let len = u32::from_le_bytes(payload[..4].try_into().expect("4 bytes")) as usize;
        if payload.len() < 4 + len {
            break;
        }
        slices.push(payload[4..4 + len].to_vec());
        payload = &payload[4 + len..];
    }
    slices
}

/// Concatenate slices as `u32 LE length ‖ payload` each.
pub fn join_slices(slices: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    for slice in slices {
        buf.extend_from_slice(&(slice.len() as u32).to_le_bytes());
        buf.extend_from_slice(slice);
    }
    buf
}

/// Release a byte string allocated by this library.
///
/// # Safety
/// `ptr` must have come from [`pack_bytes`] and not been released before.
#[no_mangle]
pub unsafe extern "C" fn release_bytes(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    let header = std::slice::from_raw_parts(ptr as *const u8, 4);
    let len = u32::from_le_bytes(header.try_into().expect("4 bytes")) as usize;
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
        ptr as *mut u8,
        4 + len,
    )));
}

/// Release a report string allocated by this library.
///
/// # Safety
/// `ptr` must have come from [`ok_string`]/[`err_string`] and not been
/// released before.
#[no_mangle]
pub unsafe extern "C" fn release_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(CString::from_raw(ptr));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn bytes_roundtrip() {
        let ptr = pack_bytes(b"hello\0world");
        let back = unsafe { unpack_bytes(ptr) };
        assert_eq!(back, b"hello\0world");
        unsafe { release_bytes(ptr) };
    }

    #[test]
    fn empty_bytes_roundtrip() {
        let ptr = pack_bytes(b"");
        assert_eq!(unsafe { unpack_bytes(ptr) }, Vec::<u8>::new());
        unsafe { release_bytes(ptr) };
    }

    #[test]
    fn report_strings() {
        let ok = ok_string();
        assert_eq!(unsafe { CStr::from_ptr(ok) }.to_bytes(), b"");
        unsafe { release_string(ok) };

        let err = err_string("save", "boom");
        assert_eq!(unsafe { CStr::from_ptr(err) }.to_bytes(), b"save: boom");
        unsafe { release_string(err) };
    }

    #[test]
    fn slice_join_split_roundtrip() {
        let slices = vec![b"abc".to_vec(), Vec::new(), b"d".to_vec()];
        let joined = join_slices(&slices);
        assert_eq!(split_slices(&joined), slices);
    }
}
