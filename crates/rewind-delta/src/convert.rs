//! Conversions between the world chunk model and the timeline's matrix
//! representation.

use rewind_nbt::{NbtCompound, NbtValue};
use rewind_world::{BlockCodec, Chunk, Range};

use crate::block_nbt::NbtRecord;
use crate::chunk_matrix::ChunkMatrix;
use crate::error::DeltaError;
use crate::index::{ChunkBlockIndex, DimChunk};
use crate::layer::Layers;
use crate::matrix::{matrix_is_empty, new_matrix};
use crate::palette::Palette;

/// Convert a chunk to its matrix representation, registering every block in
/// the timeline's palette as it goes.
pub fn chunk_to_matrix(chunk: &Chunk, palette: &mut Palette, codec: &dyn BlockCodec) -> ChunkMatrix {
    let mut result = ChunkMatrix::with_capacity(chunk.sub().len());

    for sub in chunk.sub() {
        let mut layers = Layers::new();

        if sub.empty() {
            if !sub.layers().is_empty() {
                layers.push(None);
            }
            result.push(layers);
            continue;
        }

        for layer in sub.layers() {
            let mut matrix = new_matrix();
            let mut ptr = 0;
            for x in 0..16u8 {
                for y in 0..16u8 {
                    for z in 0..16u8 {
                        matrix[ptr] = palette.index(layer.at(x, y, z), codec);
                        ptr += 1;
                    }
                }
            }
            layers.push(Some(matrix));
        }

        result.push(layers);
    }

    result
}

/// Convert a matrix back to a chunk through the palette.
pub fn matrix_to_chunk(
    matrix: &ChunkMatrix,
    range: Range,
    palette: &Palette,
    codec: &dyn BlockCodec,
) -> Result<Chunk, DeltaError> {
    let mut chunk = Chunk::new(codec.air_runtime_id(), range);

    for (sub_index, layers) in matrix.iter().enumerate() {
        if sub_index >= chunk.sub().len() {
            break;
        }
        let sub = chunk.sub_chunk_mut(sub_index);

        for (layer_index, block_matrix) in layers.iter().enumerate() {
            let layer = sub.layer(layer_index);

            let Some(block_matrix) = block_matrix else {
                continue;
            };
            if matrix_is_empty(block_matrix) {
                continue;
            }

            let mut ptr = 0;
            for x in 0..16u8 {
                for y in 0..16u8 {
                    for z in 0..16u8 {
                        let palette_index = block_matrix[ptr];
                        let runtime_id = palette.runtime_id(palette_index).ok_or(
                            DeltaError::PaletteIndexOutOfRange {
                                index: palette_index,
                                len: palette.len(),
                            },
                        )?;
                        layer.set(x, y, z, runtime_id);
                        ptr += 1;
                    }
                }
            }
        }
    }

    Ok(chunk)
}

/// Index raw block entity compounds by their position relative to `pos`.
/// Entities outside the chunk or without integer coordinates are skipped.
pub fn from_chunk_nbt(pos: DimChunk, nbts: Vec<NbtCompound>) -> Vec<NbtRecord> {
    let mut result = Vec::new();

    let block_x = pos.x << 4;
    let block_z = pos.z << 4;

    for nbt in nbts {
        let (Some(x), Some(y), Some(z)) = (
            nbt.get("x").and_then(NbtValue::as_int),
            nbt.get("y").and_then(NbtValue::as_int),
            nbt.get("z").and_then(NbtValue::as_int),
        ) else {
            continue;
        };

        let delta_x = x - block_x;
        let delta_z = z - block_z;
        if !(0..16).contains(&delta_x) || !(0..16).contains(&delta_z) {
            continue;
        }

        result.push(NbtRecord::new(
            ChunkBlockIndex::new(delta_x as u8, y as i16, delta_z as u8),
            nbt,
        ));
    }

    result
}

/// Strip the indices back off, leaving the raw compounds.
pub fn to_chunk_nbt(records: Vec<NbtRecord>) -> Vec<NbtCompound> {
    records.into_iter().map(|r| r.nbt).collect()
}
