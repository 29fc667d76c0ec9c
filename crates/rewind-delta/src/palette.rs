//! Per-chunk block palette.
//!
//! Every time point of a chunk timeline shares one palette. Index 0 is air
//! by agreement and is never stored.

use std::collections::HashMap;

use rewind_world::{BlockCodec, BlockState};

/// Append-only mapping between block runtime IDs and 1-based compact
/// indices local to one chunk timeline.
pub struct Palette {
    air: u32,
    ids: Vec<u32>,
    mapping: HashMap<u32, u32>,
}

impl Palette {
    /// Create a palette holding nothing but the implicit air entry.
    pub fn new(codec: &dyn BlockCodec) -> Self {
        Self {
            air: codec.air_runtime_id(),
            ids: Vec::new(),
            mapping: HashMap::new(),
        }
    }

    /// Resolve a runtime ID that may not be in the codec's registry to one
    /// that is. Unknown blocks become `minecraft:unknown`.
    fn canonical(&self, runtime_id: u32, codec: &dyn BlockCodec) -> u32 {
        let state = codec
            .runtime_id_to_state(runtime_id)
            .unwrap_or_else(|| BlockState::bare("minecraft:unknown"));
        codec.state_to_runtime_id(&state)
    }

    /// Add a block to the palette. Air and already-present blocks are no-ops.
    pub fn add_block(&mut self, runtime_id: u32, codec: &dyn BlockCodec) {
        self.index(runtime_id, codec);
    }

    /// Find the 1-based palette index of a runtime ID, appending it first if
    /// necessary. Air returns 0.
    pub fn index(&mut self, runtime_id: u32, codec: &dyn BlockCodec) -> u32 {
        if runtime_id == self.air {
            return 0;
        }
        if let Some(&idx) = self.mapping.get(&runtime_id) {
            return idx;
        }

        let canonical = self.canonical(runtime_id, codec);
        if let Some(&idx) = self.mapping.get(&canonical) {
            return idx;
        }

        self.ids.push(canonical);
        let idx = self.ids.len() as u32;
        self.mapping.insert(canonical, idx);
        idx
    }

    /// The runtime ID behind a palette index; 0 resolves to air, anything
    /// past the palette end to `None`.
    pub fn runtime_id(&self, palette_index: u32) -> Option<u32> {
        if palette_index == 0 {
            return Some(self.air);
        }
        self.ids.get(palette_index as usize - 1).copied()
    }

    /// Number of stored (non-air) entries.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The stored runtime IDs in index order.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Replace the palette contents. Entries are assumed unique and already
    /// canonical.
    pub fn set_ids(&mut self, ids: Vec<u32>) {
        self.mapping = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u32 + 1))
            .collect();
        self.ids = ids;
    }
}
