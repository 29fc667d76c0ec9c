//! Block-entity (NBT) records and their hash-verified deltas.
//!
//! A modified record is stored as
//! `xxh64(canon(older)) ‖ xxh64(canon(newer)) ‖ bsdiff(canon(older), canon(newer))`
//! where `canon` is the deterministic little-endian NBT encoding. Both hashes
//! are checked on restore: a preimage mismatch means the caller's base state
//! diverged from what the diff was built against, a postimage mismatch means
//! the stored bytes themselves are corrupt.

use std::collections::{BTreeMap, BTreeSet};

use xxhash_rust::xxh64::xxh64;

use rewind_nbt::NbtCompound;

use crate::error::DeltaError;
use crate::index::ChunkBlockIndex;

/// One block entity inside a chunk, addressed by its packed position.
#[derive(Debug, Clone, PartialEq)]
pub struct NbtRecord {
    pub index: ChunkBlockIndex,
    pub nbt: NbtCompound,
}

impl NbtRecord {
    pub fn new(index: ChunkBlockIndex, nbt: NbtCompound) -> Self {
        Self { index, nbt }
    }
}

/// The change of one block entity between two times.
#[derive(Debug, Clone, PartialEq)]
pub struct NbtRecordDiff {
    pub index: ChunkBlockIndex,
    /// `older_hash (8) ‖ newer_hash (8) ‖ bsdiff payload`.
    pub bytes: Vec<u8>,
}

/// Everything that happened to a chunk's block entities between two times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipleNbtDiff {
    pub removed: Vec<ChunkBlockIndex>,
    pub added: Vec<NbtRecord>,
    pub modified: Vec<NbtRecordDiff>,
}

impl MultipleNbtDiff {
    /// Whether the diff carries no change at all.
    pub fn no_change(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.modified.is_empty()
    }
}

impl NbtRecordDiff {
    /// Build the diff between two states of the block entity at one position.
    pub fn new(older: &NbtRecord, newer: &NbtRecord) -> Result<Self, DeltaError> {
        if older.index != newer.index {
            return Err(DeltaError::DiffKeyMismatch);
        }

        let older_bytes = rewind_nbt::to_canonical_bytes(&older.nbt);
        let newer_bytes = rewind_nbt::to_canonical_bytes(&newer.nbt);

        let mut bytes = Vec::with_capacity(32);
        bytes.extend_from_slice(&xxh64(&older_bytes, 0).to_le_bytes());
        bytes.extend_from_slice(&xxh64(&newer_bytes, 0).to_le_bytes());
        bsdiff::diff(&older_bytes, &newer_bytes, &mut bytes)
            .map_err(|e| DeltaError::Codec(e.to_string()))?;

        Ok(Self {
            index: older.index,
            bytes,
        })
    }

    /// Apply the diff to the older record, verifying both hashes.
    pub fn restore(&self, older: &NbtRecord) -> Result<NbtRecord, DeltaError> {
        if self.index != older.index {
            return Err(DeltaError::DiffKeyMismatch);
        }
        if self.bytes.len() < 16 {
            return Err(DeltaError::BrokenDiff {
                len: self.bytes.len(),
            });
        }

        let older_bytes = rewind_nbt::to_canonical_bytes(&older.nbt);
        let stored_older_hash = u64::from_le_bytes(self.bytes[0..8].try_into().expect("8 bytes"));
        if xxh64(&older_bytes, 0) != stored_older_hash {
            return Err(DeltaError::PreimageMismatch);
        }

        let mut newer_bytes = Vec::new();
        bsdiff::patch(&older_bytes, &mut &self.bytes[16..], &mut newer_bytes)
            .map_err(|e| DeltaError::Codec(e.to_string()))?;

        let stored_newer_hash = u64::from_le_bytes(self.bytes[8..16].try_into().expect("8 bytes"));
        if xxh64(&newer_bytes, 0) != stored_newer_hash {
            return Err(DeltaError::PostimageCorrupt);
        }

        Ok(NbtRecord {
            index: older.index,
            nbt: rewind_nbt::from_slice(&newer_bytes)?,
        })
    }
}

/// Compute the set difference between two indexed record collections.
/// Indices are assumed unique within each side.
///
/// Time complexity: O(a + b + C·k) where k is the number of modified
/// records and C covers bsdiff + hashing per record.
pub fn nbt_difference(
    older: &[NbtRecord],
    newer: &[NbtRecord],
) -> Result<MultipleNbtDiff, DeltaError> {
    let older_set: BTreeMap<ChunkBlockIndex, &NbtRecord> =
        older.iter().map(|r| (r.index, r)).collect();
    let newer_set: BTreeMap<ChunkBlockIndex, &NbtRecord> =
        newer.iter().map(|r| (r.index, r)).collect();

    let mut result = MultipleNbtDiff::default();

    for (&index, older_record) in &older_set {
        match newer_set.get(&index) {
            None => result.removed.push(index),
            Some(newer_record) => {
                if older_record.nbt != newer_record.nbt {
                    result
                        .modified
                        .push(NbtRecordDiff::new(older_record, newer_record)?);
                }
            }
        }
    }

    for (&index, newer_record) in &newer_set {
        if !older_set.contains_key(&index) {
            result.added.push((*newer_record).clone());
        }
    }

    Ok(result)
}

/// Apply a [`MultipleNbtDiff`] to a record collection, producing the newer
/// collection: added records first, then restored modifications, then the
/// untouched remainder.
pub fn nbt_restore(
    old: &[NbtRecord],
    diff: &MultipleNbtDiff,
) -> Result<Vec<NbtRecord>, DeltaError> {
    let older_set: BTreeMap<ChunkBlockIndex, &NbtRecord> = old.iter().map(|r| (r.index, r)).collect();

    let mut result = Vec::with_capacity(old.len() + diff.added.len());
    result.extend(diff.added.iter().cloned());

    for record_diff in &diff.modified {
        let older = older_set
            .get(&record_diff.index)
            .ok_or(DeltaError::PreimageMismatch)?;
        result.push(record_diff.restore(older)?);
    }

    let mut touched: BTreeSet<ChunkBlockIndex> = diff.removed.iter().copied().collect();
    touched.extend(diff.modified.iter().map(|d| d.index));

    for record in old {
        if !touched.contains(&record.index) {
            result.push(record.clone());
        }
    }

    Ok(result)
}
