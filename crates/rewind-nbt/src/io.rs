//! Little-endian NBT read/write engine (Bedrock disk layout).
//!
//! Ints are i32_le, string lengths are u16_le, array lengths are i32_le.
//! Compounds encode their entries in key order, so the same value always
//! produces the same bytes.

use bytes::{Buf, BufMut};

use crate::error::NbtError;
use crate::value::{NbtCompound, NbtValue};

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: usize = 512;

// -----------------------------------------------------------------------
// Reading
// -----------------------------------------------------------------------

pub(crate) fn read_nbt(buf: &mut impl Buf) -> Result<NbtCompound, NbtError> {
    if !buf.has_remaining() {
        return Err(NbtError::UnexpectedEof);
    }
    let tag_type = buf.get_u8();
    if tag_type != 10 {
        return Err(NbtError::ExpectedCompound { got: tag_type });
    }
    let _root_name = read_string(buf)?;
    read_compound(buf, 0)
}

fn read_tag(buf: &mut impl Buf, tag_type: u8, depth: usize) -> Result<NbtValue, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
    }

    match tag_type {
        1 => {
            ensure_remaining(buf, 1)?;
            Ok(NbtValue::Byte(buf.get_i8()))
        }
        2 => {
            ensure_remaining(buf, 2)?;
            Ok(NbtValue::Short(buf.get_i16_le()))
        }
        3 => {
            ensure_remaining(buf, 4)?;
            Ok(NbtValue::Int(buf.get_i32_le()))
        }
        4 => {
            ensure_remaining(buf, 8)?;
            Ok(NbtValue::Long(buf.get_i64_le()))
        }
        5 => {
            ensure_remaining(buf, 4)?;
            Ok(NbtValue::Float(buf.get_f32_le()))
        }
        6 => {
            ensure_remaining(buf, 8)?;
            Ok(NbtValue::Double(buf.get_f64_le()))
        }
        7 => {
            let len = read_array_len(buf)?;
            ensure_remaining(buf, len)?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                arr.push(buf.get_i8());
            }
            Ok(NbtValue::ByteArray(arr))
        }
        8 => Ok(NbtValue::String(read_string(buf)?)),
        9 => {
            ensure_remaining(buf, 1)?;
            let element_type = buf.get_u8();
            let len = read_array_len(buf)?;
            let mut list = Vec::with_capacity(len);
            for _ in 0..len {
                list.push(read_tag(buf, element_type, depth + 1)?);
            }
            Ok(NbtValue::List(list))
        }
        10 => Ok(NbtValue::Compound(read_compound(buf, depth + 1)?)),
        11 => {
            let len = read_array_len(buf)?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                ensure_remaining(buf, 4)?;
                arr.push(buf.get_i32_le());
            }
            Ok(NbtValue::IntArray(arr))
        }
        12 => {
            let len = read_array_len(buf)?;
            let mut arr = Vec::with_capacity(len);
            for _ in 0..len {
                ensure_remaining(buf, 8)?;
                arr.push(buf.get_i64_le());
            }
            Ok(NbtValue::LongArray(arr))
        }
        _ => Err(NbtError::UnknownTagType(tag_type)),
    }
}

fn read_compound(buf: &mut impl Buf, depth: usize) -> Result<NbtCompound, NbtError> {
    if depth > MAX_DEPTH {
        return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
    }
    let mut map = NbtCompound::new();
    loop {
        ensure_remaining(buf, 1)?;
        let tag_type = buf.get_u8();
        if tag_type == 0 {
            break; // TAG_End
        }
        let name = read_string(buf)?;
        let tag = read_tag(buf, tag_type, depth)?;
        map.insert(name, tag);
    }
    Ok(map)
}

fn read_array_len(buf: &mut impl Buf) -> Result<usize, NbtError> {
    ensure_remaining(buf, 4)?;
    let len = buf.get_i32_le();
    if len < 0 {
        return Err(NbtError::NegativeLength(len));
    }
    Ok(len as usize)
}

fn read_string(buf: &mut impl Buf) -> Result<String, NbtError> {
    ensure_remaining(buf, 2)?;
    let len = buf.get_u16_le() as usize;
    ensure_remaining(buf, len)?;
    let data = buf.copy_to_bytes(len);
    String::from_utf8(data.to_vec()).map_err(|_| NbtError::InvalidUtf8)
}

fn ensure_remaining(buf: &impl Buf, needed: usize) -> Result<(), NbtError> {
    if buf.remaining() < needed {
        Err(NbtError::UnexpectedEof)
    } else {
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Writing
// -----------------------------------------------------------------------

pub(crate) fn write_nbt(buf: &mut impl BufMut, compound: &NbtCompound) {
    buf.put_u8(10); // TAG_Compound
    write_string(buf, ""); // unnamed root
    write_compound(buf, compound);
}

fn write_tag(buf: &mut impl BufMut, tag: &NbtValue) {
    match tag {
        NbtValue::Byte(v) => buf.put_i8(*v),
        NbtValue::Short(v) => buf.put_i16_le(*v),
        NbtValue::Int(v) => buf.put_i32_le(*v),
        NbtValue::Long(v) => buf.put_i64_le(*v),
        NbtValue::Float(v) => buf.put_f32_le(*v),
        NbtValue::Double(v) => buf.put_f64_le(*v),
        NbtValue::ByteArray(arr) => {
            buf.put_i32_le(arr.len() as i32);
            for &b in arr {
                buf.put_i8(b);
            }
        }
        NbtValue::String(s) => write_string(buf, s),
        NbtValue::List(list) => {
            if list.is_empty() {
                buf.put_u8(0); // TAG_End type for empty list
                buf.put_i32_le(0);
            } else {
                buf.put_u8(list[0].tag_type_id());
                buf.put_i32_le(list.len() as i32);
                for item in list {
                    write_tag(buf, item);
                }
            }
        }
        NbtValue::Compound(map) => write_compound(buf, map),
        NbtValue::IntArray(arr) => {
            buf.put_i32_le(arr.len() as i32);
            for &v in arr {
                buf.put_i32_le(v);
            }
        }
        NbtValue::LongArray(arr) => {
            buf.put_i32_le(arr.len() as i32);
            for &v in arr {
                buf.put_i64_le(v);
            }
        }
    }
}

fn write_compound(buf: &mut impl BufMut, map: &NbtCompound) {
    for (name, tag) in map {
        buf.put_u8(tag.tag_type_id());
        write_string(buf, name);
        write_tag(buf, tag);
    }
    buf.put_u8(0); // TAG_End
}

fn write_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u16_le(s.len() as u16);
    buf.put_slice(s.as_bytes());
}
