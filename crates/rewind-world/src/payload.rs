//! Sub-chunk payload serialization (version 9 storage format).
//!
//! Disk encoding packs palettes as `i32_le` count + `u32_le` runtime IDs
//! with the storage-header runtime bit clear; network encoding uses ZigZag
//! VarInt palettes with the runtime bit set. Both share the same
//! bits-per-block word packing.

use bytes::BufMut;

use crate::chunk::{Chunk, Layer, SubChunk};
use crate::error::WorldError;
use crate::range::Range;

/// Storage format version written for every sub-chunk.
const SUB_CHUNK_VERSION: u8 = 9;

/// Which wire flavour a chunk payload uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEncoding {
    Disk,
    Network,
}

/// Determine minimum bits-per-block for a given palette size.
/// Valid values: 0, 1, 2, 3, 4, 5, 6, 8, 16.
fn bits_per_block_for_palette(palette_size: usize) -> u8 {
    match palette_size {
        0..=1 => 0,
        2 => 1,
        3..=4 => 2,
        5..=8 => 3,
        9..=16 => 4,
        17..=32 => 5,
        33..=64 => 6,
        65..=256 => 8,
        _ => 16,
    }
}

/// Encode every sub-chunk of `chunk`, bottom to top, one payload per sub-chunk.
pub fn encode_chunk(chunk: &Chunk, encoding: ChunkEncoding) -> Vec<Vec<u8>> {
    let min_index = chunk.range().min_y >> 4;
    chunk
        .sub()
        .iter()
        .enumerate()
        .map(|(i, sub)| encode_sub_chunk(sub, (min_index + i as i32) as i8, encoding))
        .collect()
}

/// Decode per-sub-chunk payloads into a chunk. A zero-length payload stands
/// for an all-air sub-chunk; missing trailing payloads are treated the same.
pub fn decode_chunk(
    payloads: &[Vec<u8>],
    air: u32,
    range: Range,
    encoding: ChunkEncoding,
) -> Result<Chunk, WorldError> {
    let mut chunk = Chunk::new(air, range);
    for (i, payload) in payloads.iter().enumerate().take(range.sub_chunk_count()) {
        if payload.is_empty() {
            continue;
        }
        *chunk.sub_chunk_mut(i) = decode_sub_chunk(payload, air, encoding)?;
    }
    Ok(chunk)
}

/// Serialize a single sub-chunk.
pub fn encode_sub_chunk(sub: &SubChunk, y_index: i8, encoding: ChunkEncoding) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.put_u8(SUB_CHUNK_VERSION);
    buf.put_u8(sub.layers().len() as u8);
    buf.put_u8(y_index as u8);

    for layer in sub.layers() {
        encode_layer(&mut buf, layer, encoding);
    }

    buf
}

fn encode_layer(buf: &mut Vec<u8>, layer: &Layer, encoding: ChunkEncoding) {
    let palette = layer.palette();
    let bpb = bits_per_block_for_palette(palette.len());
    let runtime_flag = match encoding {
        ChunkEncoding::Disk => 0,
        ChunkEncoding::Network => 1,
    };
    buf.put_u8((bpb << 1) | runtime_flag);

    if bpb > 0 {
        // Pack palette indices into u32 words (LSB-first)
        let blocks_per_word = 32 / bpb as usize;
        let word_count = 4096_usize.div_ceil(blocks_per_word);

        for word_idx in 0..word_count {
            let mut word: u32 = 0;
            for slot in 0..blocks_per_word {
                let block_idx = word_idx * blocks_per_word + slot;
                if block_idx < 4096 {
                    let palette_index = layer.indices()[block_idx] as u32;
                    word |= palette_index << (bpb as u32 * slot as u32);
                }
            }
            buf.put_u32_le(word);
        }
    }

    match encoding {
        ChunkEncoding::Disk => {
            buf.put_i32_le(palette.len() as i32);
            for &runtime_id in palette {
                buf.put_u32_le(runtime_id);
            }
        }
        ChunkEncoding::Network => {
            write_zigzag_varint(buf, palette.len() as i32);
            for &runtime_id in palette {
                write_zigzag_varint(buf, runtime_id as i32);
            }
        }
    }
}

/// Deserialize a single sub-chunk payload.
pub fn decode_sub_chunk(
    payload: &[u8],
    air: u32,
    encoding: ChunkEncoding,
) -> Result<SubChunk, WorldError> {
    let mut r = Reader::new(payload);

    let version = r.u8()?;
    if version != SUB_CHUNK_VERSION {
        return Err(WorldError::UnsupportedVersion(version));
    }
    let num_layers = r.u8()?;
    let _y_index = r.u8()?;

    let mut sub = SubChunk::new(air);
    for i in 0..num_layers as usize {
        *sub.layer(i) = decode_layer(&mut r, encoding)?;
    }
    Ok(sub)
}

fn decode_layer(r: &mut Reader<'_>, encoding: ChunkEncoding) -> Result<Layer, WorldError> {
    let header = r.u8()?;
    let bpb = header >> 1;

    let mut indices = Box::new([0u16; 4096]);
    if bpb > 0 {
        if !matches!(bpb, 1 | 2 | 3 | 4 | 5 | 6 | 8 | 16) {
            return Err(WorldError::InvalidBitsPerBlock(bpb));
        }
        let blocks_per_word = 32 / bpb as usize;
        let word_count = 4096_usize.div_ceil(blocks_per_word);
        let mask = if bpb == 16 { 0xFFFF } else { (1u32 << bpb) - 1 };

        for word_idx in 0..word_count {
            let word = r.u32_le()?;
            for slot in 0..blocks_per_word {
                let block_idx = word_idx * blocks_per_word + slot;
                if block_idx < 4096 {
                    indices[block_idx] = ((word >> (bpb as u32 * slot as u32)) & mask) as u16;
                }
            }
        }
    }

    let palette_size = match encoding {
        ChunkEncoding::Disk => r.i32_le()?,
        ChunkEncoding::Network => r.zigzag_varint()?,
    };
    let palette_size = usize::try_from(palette_size).unwrap_or(0);

    let mut palette = Vec::with_capacity(palette_size);
    for _ in 0..palette_size {
        let runtime_id = match encoding {
            ChunkEncoding::Disk => r.u32_le()?,
            ChunkEncoding::Network => r.zigzag_varint()? as u32,
        };
        palette.push(runtime_id);
    }

    Ok(Layer::from_raw(indices, palette))
}

fn write_zigzag_varint(buf: &mut Vec<u8>, value: i32) {
    let mut encoded = ((value << 1) ^ (value >> 31)) as u32;
    loop {
        if encoded & !0x7F == 0 {
            buf.put_u8(encoded as u8);
            return;
        }
        buf.put_u8((encoded & 0x7F | 0x80) as u8);
        encoded >>= 7;
    }
}

/// Bounds-checked byte reader that reports the failing offset.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WorldError> {
        if self.pos + n > self.data.len() {
            return Err(WorldError::PayloadTruncated { at: self.pos });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WorldError> {
        Ok(self.take(1)?[0])
    }

    fn u32_le(&mut self) -> Result<u32, WorldError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32_le(&mut self) -> Result<i32, WorldError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn zigzag_varint(&mut self) -> Result<i32, WorldError> {
        let mut value: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(WorldError::PayloadTruncated { at: self.pos });
            }
        }
        Ok(((value >> 1) as i32) ^ -((value & 1) as i32))
    }
}
