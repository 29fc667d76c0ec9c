//! Wire primitives shared by the serializers: varuints, length-prefixed
//! slices, and gzip framing.

use std::io::{Read, Write};

use bytes::{Buf, BufMut};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::DeltaError;

/// Write unsigned VarInt (LEB128).
pub fn write_varuint32(buf: &mut impl BufMut, mut value: u32) {
    loop {
        if value & !0x7F == 0 {
            buf.put_u8(value as u8);
            return;
        }
        buf.put_u8((value & 0x7F | 0x80) as u8);
        value >>= 7;
    }
}

/// Read unsigned VarInt (LEB128).
pub fn read_varuint32(buf: &mut impl Buf) -> Result<u32, DeltaError> {
    let mut value: u32 = 0;
    let mut shift = 0;
    loop {
        if !buf.has_remaining() {
            return Err(DeltaError::UnexpectedEof);
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 35 {
            return Err(DeltaError::VaruintOverflow);
        }
    }
}

/// Write a varuint-length-prefixed byte slice.
pub fn write_byte_slice(buf: &mut impl BufMut, data: &[u8]) {
    write_varuint32(buf, data.len() as u32);
    buf.put_slice(data);
}

/// Read a varuint-length-prefixed byte slice.
pub fn read_byte_slice(buf: &mut impl Buf) -> Result<Vec<u8>, DeltaError> {
    let len = read_varuint32(buf)? as usize;
    if buf.remaining() < len {
        return Err(DeltaError::UnexpectedEof);
    }
    let mut data = vec![0u8; len];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

/// Gzip a byte slice at best compression.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|e| DeltaError::Codec(e.to_string()))
}

/// Decompress a gzip stream.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| DeltaError::Codec(e.to_string()))?;
    Ok(out)
}
