//! Block matrices and their forward deltas.

use crate::error::DeltaError;

/// Blocks in a single sub-chunk layer. Ordering is `x*256 + y*16 + z`.
pub const MATRIX_SIZE: usize = 4096;

/// Palette indices for one layer of one sub-chunk at a point in time.
/// An absent matrix stands for "all air" (palette index 0 everywhere).
pub type BlockMatrix = Box<[u32; MATRIX_SIZE]>;

/// One change inside a [`DiffMatrix`]: the gap to the previous changed
/// index (the running index starts at -1, so the first gap is
/// `first_index + 1`) and the palette index written there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffRecord {
    pub delta: u32,
    pub value: u32,
}

/// Sparse difference between two block matrices, ordered by index.
pub type DiffMatrix = Vec<DiffRecord>;

/// Allocate an all-air matrix.
pub fn new_matrix() -> BlockMatrix {
    Box::new([0; MATRIX_SIZE])
}

/// Whether a matrix holds nothing but air.
pub fn matrix_is_empty(matrix: &BlockMatrix) -> bool {
    matrix.iter().all(|&v| v == 0)
}

fn at(matrix: Option<&BlockMatrix>, i: usize) -> u32 {
    matrix.map_or(0, |m| m[i])
}

/// Compute the difference between `older` and `newer`.
/// Absent matrices count as all air. Equal inputs yield an empty diff.
///
/// Time complexity: O(4096).
pub fn difference(older: Option<&BlockMatrix>, newer: Option<&BlockMatrix>) -> DiffMatrix {
    let mut result = DiffMatrix::new();
    let mut last: i64 = -1;
    for i in 0..MATRIX_SIZE {
        let new_value = at(newer, i);
        if new_value != at(older, i) {
            result.push(DiffRecord {
                delta: (i as i64 - last) as u32,
                value: new_value,
            });
            last = i as i64;
        }
    }
    result
}

/// Apply `diff` to `base`, producing the newer matrix. The modification is
/// carried out directly on `base` when it is present, so chaining restores
/// across a whole timeline costs O(total changes) rather than O(4096 × n).
pub fn restore(base: Option<BlockMatrix>, diff: &DiffMatrix) -> Result<Option<BlockMatrix>, DeltaError> {
    if diff.is_empty() {
        return Ok(base);
    }

    let mut matrix = base.unwrap_or_else(new_matrix);
    let mut index: i64 = -1;
    for record in diff {
        index += i64::from(record.delta);
        if index < 0 || index >= MATRIX_SIZE as i64 {
            return Err(DeltaError::DiffIndexOutOfRange {
                index: index as u64,
            });
        }
        matrix[index as usize] = record.value;
    }
    Ok(Some(matrix))
}
