//! NBT (Named Binary Tag) implementation for Minecraft Bedrock Edition,
//! standard little-endian variant (disk storage and chunk data).
//!
//! Compounds are ordered maps, so the encoder is canonical: structurally
//! equal values always serialise to identical bytes. Binary diffing and
//! hash verification of block-entity data are built on that property.

pub mod error;
mod io;
pub mod value;

pub use error::NbtError;
pub use value::{NbtCompound, NbtValue};

use bytes::{Buf, BufMut};

/// Read one NBT compound (with its unnamed root header) from a buffer.
///
/// The buffer may hold several concatenated compounds; each call consumes
/// exactly one.
pub fn read_nbt(buf: &mut impl Buf) -> Result<NbtCompound, NbtError> {
    io::read_nbt(buf)
}

/// Write one NBT compound (with an unnamed root header) to a buffer.
pub fn write_nbt(buf: &mut impl BufMut, compound: &NbtCompound) {
    io::write_nbt(buf, compound)
}

/// Canonical byte representation of a compound.
pub fn to_canonical_bytes(compound: &NbtCompound) -> Vec<u8> {
    let mut buf = Vec::new();
    write_nbt(&mut buf, compound);
    buf
}

/// Decode a compound from a byte slice, requiring the whole slice to be consumed.
pub fn from_slice(data: &[u8]) -> Result<NbtCompound, NbtError> {
    let mut buf = data;
    read_nbt(&mut buf)
}
