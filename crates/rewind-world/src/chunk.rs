//! Chunk and sub-chunk data structures.

use crate::error::WorldError;
use crate::range::Range;

/// A single block storage layer: 4096 palette indices plus a palette of
/// block runtime IDs, stored in XZY order: `(x*16 + z)*16 + y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    blocks: Box<[u16; 4096]>,
    palette: Vec<u32>,
}

impl Layer {
    /// Create a layer filled entirely with a single block.
    pub fn new_single(runtime_id: u32) -> Self {
        Self {
            blocks: Box::new([0; 4096]),
            palette: vec![runtime_id],
        }
    }

    /// Get the runtime ID of the block at local coordinates.
    pub fn at(&self, x: u8, y: u8, z: u8) -> u32 {
        debug_assert!(x < 16 && y < 16 && z < 16);
        let block_index = (x as usize * 16 + z as usize) * 16 + y as usize;
        self.palette[self.blocks[block_index] as usize]
    }

    /// Set a block at local coordinates within this layer.
    pub fn set(&mut self, x: u8, y: u8, z: u8, runtime_id: u32) {
        debug_assert!(x < 16 && y < 16 && z < 16);
        let palette_index = match self.palette.iter().position(|&id| id == runtime_id) {
            Some(idx) => idx,
            None => {
                self.palette.push(runtime_id);
                self.palette.len() - 1
            }
        };
        let block_index = (x as usize * 16 + z as usize) * 16 + y as usize;
        self.blocks[block_index] = palette_index as u16;
    }

    /// Rebuild a layer from decoded storage. An empty palette gains a single
    /// placeholder entry so index lookups stay in bounds.
    pub(crate) fn from_raw(mut blocks: Box<[u16; 4096]>, mut palette: Vec<u32>) -> Self {
        if palette.is_empty() {
            palette.push(0);
        }
        // Word packing pads with bit patterns that may exceed the palette.
        let max = (palette.len() - 1) as u16;
        for idx in blocks.iter_mut() {
            if *idx > max {
                *idx = 0;
            }
        }
        Self { blocks, palette }
    }

    /// Raw palette indices in XZY order.
    pub fn indices(&self) -> &[u16; 4096] {
        &self.blocks
    }

    /// The palette of runtime IDs this layer references.
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// Whether every block in the layer resolves to `runtime_id`.
    pub fn uniform(&self, runtime_id: u32) -> bool {
        if self.palette.len() == 1 {
            return self.palette[0] == runtime_id;
        }
        self.blocks
            .iter()
            .all(|&idx| self.palette[idx as usize] == runtime_id)
    }
}

/// A 16x16x16 sub-chunk holding one or more block storage layers
/// (layer 0 is the primary blocks, layer 1 the waterlogging overlay).
#[derive(Debug, Clone, PartialEq)]
pub struct SubChunk {
    air: u32,
    layers: Vec<Layer>,
}

impl SubChunk {
    /// Create a sub-chunk with no layers (all air).
    pub fn new(air: u32) -> Self {
        Self {
            air,
            layers: Vec::new(),
        }
    }

    /// The layers present in this sub-chunk.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Get layer `i`, creating it (and any layers below it) filled with air
    /// if it does not exist yet.
    pub fn layer(&mut self, i: usize) -> &mut Layer {
        while i >= self.layers.len() {
            self.layers.push(Layer::new_single(self.air));
        }
        &mut self.layers[i]
    }

    /// Whether the sub-chunk holds nothing but air.
    pub fn empty(&self) -> bool {
        self.layers.iter().all(|l| l.uniform(self.air))
    }
}

/// A full chunk column: one sub-chunk per 16 blocks of the dimension's
/// vertical range.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    air: u32,
    range: Range,
    subs: Vec<SubChunk>,
}

impl Chunk {
    /// Create a chunk filled entirely with air.
    pub fn new(air: u32, range: Range) -> Self {
        let subs = (0..range.sub_chunk_count())
            .map(|_| SubChunk::new(air))
            .collect();
        Self { air, range, subs }
    }

    pub fn range(&self) -> Range {
        self.range
    }

    pub fn air(&self) -> u32 {
        self.air
    }

    /// All sub-chunks, bottom to top.
    pub fn sub(&self) -> &[SubChunk] {
        &self.subs
    }

    pub fn sub_mut(&mut self) -> &mut [SubChunk] {
        &mut self.subs
    }

    pub fn sub_chunk(&self, i: usize) -> &SubChunk {
        &self.subs[i]
    }

    pub fn sub_chunk_mut(&mut self, i: usize) -> &mut SubChunk {
        &mut self.subs[i]
    }

    /// Get the runtime ID at local x/z and world-space Y (layer 0).
    pub fn at(&self, x: u8, y: i32, z: u8) -> Result<u32, WorldError> {
        if !self.range.contains(y) {
            return Err(WorldError::OutOfBounds { x, y, z });
        }
        let shifted = (y - self.range.min_y) as usize;
        let sub = &self.subs[shifted / 16];
        match sub.layers.first() {
            Some(layer) => Ok(layer.at(x, (shifted % 16) as u8, z)),
            None => Ok(self.air),
        }
    }

    /// Set the runtime ID at local x/z and world-space Y (layer 0).
    pub fn set(&mut self, x: u8, y: i32, z: u8, runtime_id: u32) -> Result<(), WorldError> {
        if !self.range.contains(y) {
            return Err(WorldError::OutOfBounds { x, y, z });
        }
        let shifted = (y - self.range.min_y) as usize;
        let sub = &mut self.subs[shifted / 16];
        sub.layer(0).set(x, (shifted % 16) as u8, z, runtime_id);
        Ok(())
    }
}
