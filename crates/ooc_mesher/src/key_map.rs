//! Hash maps over 64-bit external vertex keys.
//!
//! Two levels of welding use these: the global map links clumps that share
//! a key across blocks, and the per-chunk map deduplicates the external
//! vertices actually written into one output chunk.

use rustc_hash::FxHashMap;

use crate::error::{MesherError, Result};
use crate::types::{ClumpId, VertexKey, SPLIT_INDEX_LIMIT};

/// Global map from external vertex key to the clump that first carried it.
///
/// The stored id is never updated after insertion; callers resolve it
/// through the clump forest's `find`.
#[derive(Debug, Default)]
pub struct ClumpKeyMap {
  map: FxHashMap<VertexKey, ClumpId>,
}

impl ClumpKeyMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }

  /// Insert `key -> id` if the key is new and return `None`, otherwise
  /// leave the map unchanged and return the stored id.
  pub fn insert_or_get(&mut self, key: VertexKey, id: ClumpId) -> Option<ClumpId> {
    use std::collections::hash_map::Entry;
    match self.map.entry(key) {
      Entry::Vacant(slot) => {
        slot.insert(id);
        None
      }
      Entry::Occupied(slot) => Some(*slot.get()),
    }
  }
}

/// Per-chunk map from external vertex key to the chunk-local external index.
///
/// Insertion order is the sole generator of chunk-external indices: a new
/// key receives the current map size. Indices must stay below 2^31 so the
/// split encoding in the triangle temp file remains unambiguous.
#[derive(Debug, Default)]
pub struct ExternalIndexMap {
  map: FxHashMap<VertexKey, u32>,
}

impl ExternalIndexMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.is_empty()
  }

  /// Look up `key`, assigning the next dense index if it is new.
  /// Returns the index and whether it was newly inserted.
  pub fn get_or_insert(&mut self, key: VertexKey) -> Result<(u32, bool)> {
    use std::collections::hash_map::Entry;
    let next = self.map.len() as u64;
    match self.map.entry(key) {
      Entry::Occupied(slot) => Ok((*slot.get(), false)),
      Entry::Vacant(slot) => {
        if next >= SPLIT_INDEX_LIMIT as u64 {
          return Err(MesherError::CapacityExceeded(format!(
            "chunk external vertex index space exhausted at {next} entries"
          )));
        }
        slot.insert(next as u32);
        Ok((next as u32, true))
      }
    }
  }

  /// Index previously assigned to `key`, if any.
  pub fn get(&self, key: VertexKey) -> Option<u32> {
    self.map.get(&key).copied()
  }
}

#[cfg(test)]
#[path = "key_map_test.rs"]
mod key_map_test;
