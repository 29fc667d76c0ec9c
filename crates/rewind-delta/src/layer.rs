//! Per-sub-chunk layer stacks and their deltas.

use crate::error::DeltaError;
use crate::matrix::{self, BlockMatrix, DiffMatrix};

/// The block matrices of one sub-chunk, one per data layer
/// (typically 1, or 2 when a waterlogging overlay is present).
pub type Layers = Vec<Option<BlockMatrix>>;

/// Difference for every layer of one sub-chunk between two times.
pub type LayersDiff = Vec<DiffMatrix>;

/// Compute the difference between two layer stacks, padding the shorter
/// side with absent (all-air) matrices.
///
/// Time complexity: O(4096 × n), n = max(older.len(), newer.len()).
pub fn layer_difference(older: &Layers, newer: &Layers) -> LayersDiff {
    let len = older.len().max(newer.len());
    (0..len)
        .map(|i| {
            matrix::difference(
                older.get(i).and_then(Option::as_ref),
                newer.get(i).and_then(Option::as_ref),
            )
        })
        .collect()
}

/// Apply a layers diff to `old`, reusing its matrices in place.
pub fn layer_restore(mut old: Layers, diff: &LayersDiff) -> Result<Layers, DeltaError> {
    if old.len() < diff.len() {
        old.resize_with(diff.len(), || None);
    }
    for (i, diff_matrix) in diff.iter().enumerate() {
        let base = old[i].take();
        old[i] = matrix::restore(base, diff_matrix)?;
    }
    Ok(old)
}

/// Whether a layers diff carries no change at all.
pub fn layer_no_change(diff: &LayersDiff) -> bool {
    diff.iter().all(DiffMatrix::is_empty)
}
