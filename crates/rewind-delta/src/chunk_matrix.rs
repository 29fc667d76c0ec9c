//! Whole-chunk aggregation of layer diffs.

use crate::error::DeltaError;
use crate::layer::{self, Layers, LayersDiff};

/// All blocks of a chunk at one point in time: one layer stack per
/// sub-chunk, bottom to top. Length is fixed by the dimension.
pub type ChunkMatrix = Vec<Layers>;

/// Difference for every sub-chunk of a chunk between two times.
pub type ChunkDiffMatrix = Vec<LayersDiff>;

/// An all-air chunk matrix with one (empty) layer stack per sub-chunk.
pub fn new_chunk_matrix(sub_chunk_count: usize) -> ChunkMatrix {
    vec![Layers::new(); sub_chunk_count]
}

/// Compute the difference between two chunk matrices, sub-chunk by
/// sub-chunk. Both sides are assumed to have the dimension's length.
///
/// Time complexity: O(n × L), n = sub-chunk count, L = layers per sub-chunk.
pub fn chunk_difference(older: &ChunkMatrix, newer: &ChunkMatrix) -> ChunkDiffMatrix {
    let len = older.len().max(newer.len());
    static EMPTY: Layers = Layers::new();
    (0..len)
        .map(|i| {
            layer::layer_difference(
                older.get(i).unwrap_or(&EMPTY),
                newer.get(i).unwrap_or(&EMPTY),
            )
        })
        .collect()
}

/// Apply a chunk diff to `old`, reusing its matrices in place.
///
/// Chaining this across every stored diff of a timeline reproduces the
/// latest chunk; each step costs only the changes it carries.
pub fn chunk_restore(mut old: ChunkMatrix, diff: &ChunkDiffMatrix) -> Result<ChunkMatrix, DeltaError> {
    if old.len() < diff.len() {
        old.resize_with(diff.len(), Layers::new);
    }
    for (i, layers_diff) in diff.iter().enumerate() {
        let base = std::mem::take(&mut old[i]);
        old[i] = layer::layer_restore(base, layers_diff)?;
    }
    Ok(old)
}

/// Whether a chunk diff carries no change at all.
pub fn chunk_no_change(diff: &ChunkDiffMatrix) -> bool {
    diff.iter().all(layer::layer_no_change)
}
