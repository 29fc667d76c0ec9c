//! Bit-exact encoders and decoders for matrices, diffs, block entity lists,
//! and palettes.
//!
//! Chunk-level values are gzip-framed as a whole; an all-empty value is a
//! zero-length byte string, not a gzip stream, so "no change" costs nothing
//! on disk.

use bytes::{Buf, BufMut};

use rewind_nbt::{NbtCompound, NbtValue};
use rewind_world::{BlockCodec, BlockState};

use crate::block_nbt::{MultipleNbtDiff, NbtRecord, NbtRecordDiff};
use crate::chunk_matrix::{new_chunk_matrix, ChunkDiffMatrix, ChunkMatrix};
use crate::error::DeltaError;
use crate::index::ChunkBlockIndex;
use crate::layer::{layer_no_change, Layers, LayersDiff};
use crate::matrix::{matrix_is_empty, new_matrix, BlockMatrix, DiffRecord, MATRIX_SIZE};
use crate::palette::Palette;
use crate::wire;

const MATRIX_EMPTY: u8 = 0;
const MATRIX_NOT_EMPTY: u8 = 1;

// ─── Layers ─────────────────────────────────────────────────────────────────

fn write_block_matrix(buf: &mut impl BufMut, matrix: Option<&BlockMatrix>) {
    match matrix {
        None => buf.put_u8(MATRIX_EMPTY),
        Some(m) if matrix_is_empty(m) => buf.put_u8(MATRIX_EMPTY),
        Some(m) => {
            buf.put_u8(MATRIX_NOT_EMPTY);
            for &value in m.iter() {
                wire::write_varuint32(buf, value);
            }
        }
    }
}

fn read_block_matrix(buf: &mut impl Buf) -> Result<Option<BlockMatrix>, DeltaError> {
    if !buf.has_remaining() {
        return Err(DeltaError::UnexpectedEof);
    }
    if buf.get_u8() == MATRIX_EMPTY {
        return Ok(None);
    }
    let mut matrix = new_matrix();
    for value in matrix.iter_mut() {
        *value = wire::read_varuint32(buf)?;
    }
    Ok(Some(matrix))
}

/// `u32 LE` layer count, then one block matrix block per layer.
pub fn write_layers(buf: &mut impl BufMut, layers: &Layers) {
    buf.put_u32_le(layers.len() as u32);
    for matrix in layers {
        write_block_matrix(buf, matrix.as_ref());
    }
}

pub fn read_layers(buf: &mut impl Buf) -> Result<Layers, DeltaError> {
    if buf.remaining() < 4 {
        return Err(DeltaError::UnexpectedEof);
    }
    let len = buf.get_u32_le() as usize;
    let mut layers = Layers::with_capacity(len.min(16));
    for _ in 0..len {
        layers.push(read_block_matrix(buf)?);
    }
    Ok(layers)
}

// ─── Layer diffs ────────────────────────────────────────────────────────────

fn write_diff_matrix(buf: &mut impl BufMut, diff: &[DiffRecord]) {
    if diff.is_empty() {
        buf.put_u8(MATRIX_EMPTY);
        return;
    }
    buf.put_u8(MATRIX_NOT_EMPTY);
    buf.put_u16_le(diff.len() as u16);
    for record in diff {
        wire::write_varuint32(buf, record.delta);
    }
    for record in diff {
        wire::write_varuint32(buf, record.value);
    }
}

fn read_diff_matrix(buf: &mut impl Buf) -> Result<Vec<DiffRecord>, DeltaError> {
    if !buf.has_remaining() {
        return Err(DeltaError::UnexpectedEof);
    }
    if buf.get_u8() == MATRIX_EMPTY {
        return Ok(Vec::new());
    }
    if buf.remaining() < 2 {
        return Err(DeltaError::UnexpectedEof);
    }
    let count = buf.get_u16_le() as usize;
    if count > MATRIX_SIZE {
        return Err(DeltaError::DiffIndexOutOfRange { index: count as u64 });
    }
    let mut deltas = Vec::with_capacity(count);
    for _ in 0..count {
        deltas.push(wire::read_varuint32(buf)?);
    }
    let mut records = Vec::with_capacity(count);
    for delta in deltas {
        records.push(DiffRecord {
            delta,
            value: wire::read_varuint32(buf)?,
        });
    }
    Ok(records)
}

/// `u32 LE` layer count, then one diff matrix block per layer.
pub fn write_layers_diff(buf: &mut impl BufMut, diff: &LayersDiff) {
    buf.put_u32_le(diff.len() as u32);
    for matrix in diff {
        write_diff_matrix(buf, matrix);
    }
}

pub fn read_layers_diff(buf: &mut impl Buf) -> Result<LayersDiff, DeltaError> {
    if buf.remaining() < 4 {
        return Err(DeltaError::UnexpectedEof);
    }
    let len = buf.get_u32_le() as usize;
    let mut diff = LayersDiff::with_capacity(len.min(16));
    for _ in 0..len {
        diff.push(read_diff_matrix(buf)?);
    }
    Ok(diff)
}

// ─── Whole-chunk values ─────────────────────────────────────────────────────

fn chunk_matrix_all_empty(matrix: &ChunkMatrix) -> bool {
    matrix.iter().all(|layers| {
        layers
            .iter()
            .all(|m| m.as_ref().map_or(true, |m| matrix_is_empty(m)))
    })
}

/// Serialise a chunk matrix: concatenated per-sub-chunk layer blocks,
/// gzipped. An all-air chunk is a zero-length value.
pub fn chunk_matrix_to_bytes(matrix: &ChunkMatrix) -> Result<Vec<u8>, DeltaError> {
    if chunk_matrix_all_empty(matrix) {
        return Ok(Vec::new());
    }
    let mut buf = Vec::new();
    for layers in matrix {
        write_layers(&mut buf, layers);
    }
    wire::gzip(&buf)
}

pub fn bytes_to_chunk_matrix(
    data: &[u8],
    sub_chunk_count: usize,
) -> Result<ChunkMatrix, DeltaError> {
    if data.is_empty() {
        return Ok(new_chunk_matrix(sub_chunk_count));
    }
    let raw = wire::gunzip(data)?;
    let mut buf = raw.as_slice();
    let mut result = ChunkMatrix::new();
    while buf.has_remaining() {
        result.push(read_layers(&mut buf)?);
    }
    if result.len() < sub_chunk_count {
        result.resize_with(sub_chunk_count, Layers::new);
    }
    Ok(result)
}

/// Serialise a chunk diff the same way. "No change" is a zero-length value.
pub fn chunk_diff_to_bytes(diff: &ChunkDiffMatrix) -> Result<Vec<u8>, DeltaError> {
    if diff.iter().all(layer_no_change) {
        return Ok(Vec::new());
    }
    let mut buf = Vec::new();
    for layers_diff in diff {
        write_layers_diff(&mut buf, layers_diff);
    }
    wire::gzip(&buf)
}

pub fn bytes_to_chunk_diff(
    data: &[u8],
    sub_chunk_count: usize,
) -> Result<ChunkDiffMatrix, DeltaError> {
    if data.is_empty() {
        return Ok(vec![LayersDiff::new(); sub_chunk_count]);
    }
    let raw = wire::gunzip(data)?;
    let mut buf = raw.as_slice();
    let mut result = ChunkDiffMatrix::new();
    while buf.has_remaining() {
        result.push(read_layers_diff(&mut buf)?);
    }
    if result.len() < sub_chunk_count {
        result.resize_with(sub_chunk_count, LayersDiff::new);
    }
    Ok(result)
}

// ─── Block entity lists and diffs ───────────────────────────────────────────

/// Serialise a block entity list: per record its packed index and canonical
/// NBT, gzipped. An empty list is a zero-length value.
pub fn block_nbt_to_bytes(records: &[NbtRecord]) -> Result<Vec<u8>, DeltaError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }
    let mut buf = Vec::new();
    for record in records {
        record.index.write(&mut buf);
        rewind_nbt::write_nbt(&mut buf, &record.nbt);
    }
    wire::gzip(&buf)
}

pub fn bytes_to_block_nbt(data: &[u8]) -> Result<Vec<NbtRecord>, DeltaError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let raw = wire::gunzip(data)?;
    let mut buf = raw.as_slice();
    let mut records = Vec::new();
    while buf.has_remaining() {
        let index = ChunkBlockIndex::read(&mut buf)?;
        let nbt = rewind_nbt::read_nbt(&mut buf)?;
        records.push(NbtRecord::new(index, nbt));
    }
    Ok(records)
}

/// Serialise a [`MultipleNbtDiff`]: removed indices, added records, then
/// modified entries running to end of stream. Gzipped; "no change" is a
/// zero-length value.
pub fn nbt_diff_to_bytes(diff: &MultipleNbtDiff) -> Result<Vec<u8>, DeltaError> {
    if diff.no_change() {
        return Ok(Vec::new());
    }
    let mut buf = Vec::new();

    wire::write_varuint32(&mut buf, diff.removed.len() as u32);
    for index in &diff.removed {
        index.write(&mut buf);
    }

    wire::write_varuint32(&mut buf, diff.added.len() as u32);
    for record in &diff.added {
        record.index.write(&mut buf);
        rewind_nbt::write_nbt(&mut buf, &record.nbt);
    }

    for record in &diff.modified {
        record.index.write(&mut buf);
        wire::write_byte_slice(&mut buf, &record.bytes);
    }

    wire::gzip(&buf)
}

pub fn bytes_to_nbt_diff(data: &[u8]) -> Result<MultipleNbtDiff, DeltaError> {
    if data.is_empty() {
        return Ok(MultipleNbtDiff::default());
    }
    let raw = wire::gunzip(data)?;
    let mut buf = raw.as_slice();
    let mut diff = MultipleNbtDiff::default();

    let removed = wire::read_varuint32(&mut buf)?;
    for _ in 0..removed {
        diff.removed.push(ChunkBlockIndex::read(&mut buf)?);
    }

    let added = wire::read_varuint32(&mut buf)?;
    for _ in 0..added {
        let index = ChunkBlockIndex::read(&mut buf)?;
        let nbt = rewind_nbt::read_nbt(&mut buf)?;
        diff.added.push(NbtRecord::new(index, nbt));
    }

    while buf.has_remaining() {
        let index = ChunkBlockIndex::read(&mut buf)?;
        let bytes = wire::read_byte_slice(&mut buf)?;
        diff.modified.push(NbtRecordDiff { index, bytes });
    }

    Ok(diff)
}

// ─── Palette entries ────────────────────────────────────────────────────────

/// Encode one palette entry as the `{name, states, version}` compound the
/// world codec understands.
pub fn encode_palette_entry(runtime_id: u32, codec: &dyn BlockCodec) -> NbtCompound {
    let state = codec
        .runtime_id_to_state(runtime_id)
        .unwrap_or_else(|| BlockState::bare("minecraft:unknown"));
    let mut compound = NbtCompound::new();
    compound.insert("name".into(), NbtValue::String(state.name));
    compound.insert("states".into(), NbtValue::Compound(state.states));
    compound.insert(
        "version".into(),
        NbtValue::Int(codec.current_block_version()),
    );
    compound
}

/// Decode one palette entry compound back to a runtime ID.
pub fn decode_palette_entry(
    compound: &NbtCompound,
    codec: &dyn BlockCodec,
) -> Result<u32, DeltaError> {
    let name = compound
        .get("name")
        .and_then(NbtValue::as_str)
        .ok_or(DeltaError::BadPaletteEntry)?;
    let states = compound
        .get("states")
        .and_then(NbtValue::as_compound)
        .cloned()
        .unwrap_or_default();
    Ok(codec.state_to_runtime_id(&BlockState::new(name, states)))
}

/// Serialise a whole palette as concatenated entry compounds (not gzipped;
/// the global header that embeds this is gzipped as a whole).
pub fn palette_to_bytes(palette: &Palette, codec: &dyn BlockCodec) -> Vec<u8> {
    let mut buf = Vec::new();
    for &runtime_id in palette.ids() {
        rewind_nbt::write_nbt(&mut buf, &encode_palette_entry(runtime_id, codec));
    }
    buf
}

/// Decode concatenated palette entry compounds into a fresh palette.
pub fn bytes_to_palette(data: &[u8], codec: &dyn BlockCodec) -> Result<Palette, DeltaError> {
    let mut palette = Palette::new(codec);
    let mut buf = data;
    while buf.has_remaining() {
        let compound = rewind_nbt::read_nbt(&mut buf)?;
        let runtime_id = decode_palette_entry(&compound, codec)?;
        palette.add_block(runtime_id, codec);
    }
    Ok(palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::difference;
    use rewind_world::HashBlockCodec;

    fn matrix_with(pairs: &[(usize, u32)]) -> BlockMatrix {
        let mut m = new_matrix();
        for &(i, v) in pairs {
            m[i] = v;
        }
        m
    }

    #[test]
    fn layers_framing_bytes() {
        let layers: Layers = vec![None, Some(matrix_with(&[]))];
        let mut buf = Vec::new();
        write_layers(&mut buf, &layers);
        // u32 len = 2, then two empty markers: all-zero matrices serialise
        // exactly like absent ones.
        assert_eq!(buf, vec![2, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn layers_roundtrip() {
        let layers: Layers = vec![Some(matrix_with(&[(0, 1), (4095, 300)])), None];
        let mut buf = Vec::new();
        write_layers(&mut buf, &layers);
        let decoded = read_layers(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded.len(), 2);
        let m = decoded[0].as_ref().unwrap();
        assert_eq!(m[0], 1);
        assert_eq!(m[4095], 300);
        assert!(decoded[1].is_none());
    }

    #[test]
    fn diff_framing_bytes() {
        let diff = vec![DiffRecord { delta: 1, value: 5 }, DiffRecord { delta: 200, value: 1 }];
        let mut buf = Vec::new();
        write_diff_matrix(&mut buf, &diff);
        // marker 1, count u16 LE = 2, deltas [1, 200(varuint c8 01)], values [5, 1]
        assert_eq!(buf, vec![1, 2, 0, 1, 0xC8, 0x01, 5, 1]);
        let decoded = read_diff_matrix(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, diff);
    }

    #[test]
    fn layers_diff_roundtrip() {
        let newer = matrix_with(&[(10, 2), (500, 7)]);
        let diff: LayersDiff = vec![difference(None, Some(&newer)), Vec::new()];
        let mut buf = Vec::new();
        write_layers_diff(&mut buf, &diff);
        let decoded = read_layers_diff(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, diff);
    }

    #[test]
    fn empty_chunk_matrix_is_zero_length() {
        let matrix = new_chunk_matrix(24);
        assert!(chunk_matrix_to_bytes(&matrix).unwrap().is_empty());

        // All-zero matrices count as empty too.
        let mut with_zero = new_chunk_matrix(24);
        with_zero[3] = vec![Some(new_matrix())];
        assert!(chunk_matrix_to_bytes(&with_zero).unwrap().is_empty());

        let decoded = bytes_to_chunk_matrix(&[], 24).unwrap();
        assert_eq!(decoded.len(), 24);
        assert!(decoded.iter().all(Vec::is_empty));
    }

    #[test]
    fn chunk_matrix_roundtrip() {
        let mut matrix = new_chunk_matrix(8);
        matrix[2] = vec![Some(matrix_with(&[(100, 1)]))];
        matrix[7] = vec![None, Some(matrix_with(&[(0, 2)]))];

        let bytes = chunk_matrix_to_bytes(&matrix).unwrap();
        assert!(!bytes.is_empty());
        let decoded = bytes_to_chunk_matrix(&bytes, 8).unwrap();
        assert_eq!(decoded.len(), 8);
        assert_eq!(decoded[2][0].as_ref().unwrap()[100], 1);
        assert!(decoded[7][0].is_none());
        assert_eq!(decoded[7][1].as_ref().unwrap()[0], 2);
    }

    #[test]
    fn empty_chunk_diff_is_zero_length() {
        let diff: ChunkDiffMatrix = vec![LayersDiff::new(); 24];
        assert!(chunk_diff_to_bytes(&diff).unwrap().is_empty());
        let decoded = bytes_to_chunk_diff(&[], 24).unwrap();
        assert_eq!(decoded.len(), 24);
        assert!(crate::chunk_matrix::chunk_no_change(&decoded));
    }

    #[test]
    fn chunk_diff_roundtrip() {
        let newer = matrix_with(&[(0, 1), (9, 4)]);
        let mut diff: ChunkDiffMatrix = vec![LayersDiff::new(); 4];
        diff[1] = vec![difference(None, Some(&newer))];

        let bytes = chunk_diff_to_bytes(&diff).unwrap();
        let decoded = bytes_to_chunk_diff(&bytes, 4).unwrap();
        assert_eq!(decoded, diff);
    }

    #[test]
    fn block_nbt_roundtrip() {
        let mut nbt = NbtCompound::new();
        nbt.insert("id".into(), NbtValue::String("Chest".into()));
        let records = vec![
            NbtRecord::new(ChunkBlockIndex::new(1, -60, 2), nbt.clone()),
            NbtRecord::new(ChunkBlockIndex::new(15, 319, 15), nbt),
        ];

        let bytes = block_nbt_to_bytes(&records).unwrap();
        let decoded = bytes_to_block_nbt(&bytes).unwrap();
        assert_eq!(decoded, records);

        assert!(block_nbt_to_bytes(&[]).unwrap().is_empty());
        assert!(bytes_to_block_nbt(&[]).unwrap().is_empty());
    }

    #[test]
    fn nbt_diff_roundtrip() {
        let mut nbt = NbtCompound::new();
        nbt.insert("Val".into(), NbtValue::Int(1));

        let diff = MultipleNbtDiff {
            removed: vec![ChunkBlockIndex::new(0, 0, 0)],
            added: vec![NbtRecord::new(ChunkBlockIndex::new(1, 1, 1), nbt)],
            modified: vec![NbtRecordDiff {
                index: ChunkBlockIndex::new(2, 2, 2),
                bytes: vec![0xAA; 20],
            }],
        };

        let bytes = nbt_diff_to_bytes(&diff).unwrap();
        let decoded = bytes_to_nbt_diff(&bytes).unwrap();
        assert_eq!(decoded, diff);

        assert!(nbt_diff_to_bytes(&MultipleNbtDiff::default())
            .unwrap()
            .is_empty());
        assert!(bytes_to_nbt_diff(&[]).unwrap().no_change());
    }

    #[test]
    fn palette_entry_roundtrip() {
        let codec = HashBlockCodec::new();
        let stone = codec.state_to_runtime_id(&BlockState::bare("minecraft:stone"));
        let entry = encode_palette_entry(stone, &codec);
        assert_eq!(entry.get("name").and_then(NbtValue::as_str), Some("minecraft:stone"));
        assert_eq!(decode_palette_entry(&entry, &codec).unwrap(), stone);
    }

    #[test]
    fn palette_roundtrip() {
        let codec = HashBlockCodec::new();
        let stone = codec.state_to_runtime_id(&BlockState::bare("minecraft:stone"));
        let dirt = codec.state_to_runtime_id(&BlockState::bare("minecraft:dirt"));

        let mut palette = Palette::new(&codec);
        palette.add_block(stone, &codec);
        palette.add_block(dirt, &codec);

        let bytes = palette_to_bytes(&palette, &codec);
        let decoded = bytes_to_palette(&bytes, &codec).unwrap();
        assert_eq!(decoded.ids(), palette.ids());
    }

    #[test]
    fn bad_palette_entry_is_rejected() {
        let codec = HashBlockCodec::new();
        let mut compound = NbtCompound::new();
        compound.insert("nome".into(), NbtValue::String("typo".into()));
        assert!(matches!(
            decode_palette_entry(&compound, &codec),
            Err(DeltaError::BadPaletteEntry)
        ));
    }
}
