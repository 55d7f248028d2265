//! Global clump forest.
//!
//! A clump is one block-local connected component. Clumps that share an
//! external vertex key belong to the same surface component, which is
//! recorded by union-find over the clump ids. Vertex and triangle totals
//! live at the roots and are summed when two components merge.
//!
//! Clump ids are dense and never recycled; `ChunkClump` records keep the
//! minted id, so component membership is always resolved through [`find`].
//!
//! [`find`]: ClumpForest::find

use serde::{Deserialize, Serialize};

use crate::error::{MesherError, Result};
use crate::types::ClumpId;

/// One node of the clump forest. The counts are only meaningful at roots.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Clump {
  parent: ClumpId,
  rank: u8,

  /// Unique vertices in the component. Externals shared across blocks are
  /// counted once; see [`ClumpForest::deduct_shared_vertex`].
  pub vertices: u64,

  /// Triangles in the component.
  pub triangles: u64,
}

/// All clumps seen so far, as a union-find forest with payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClumpForest {
  nodes: Vec<Clump>,
}

impl ClumpForest {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// The id the next minted clump will receive.
  pub fn next_id(&self) -> ClumpId {
    self.nodes.len() as ClumpId
  }

  /// Mint a fresh clump with `vertices` vertices and no triangles.
  pub fn mint(&mut self, vertices: u64) -> Result<ClumpId> {
    if self.nodes.len() >= ClumpId::MAX as usize {
      return Err(MesherError::CapacityExceeded(format!(
        "clump id space exhausted at {} components",
        self.nodes.len()
      )));
    }
    let id = self.nodes.len() as ClumpId;
    self.nodes.push(Clump {
      parent: id,
      rank: 0,
      vertices,
      triangles: 0,
    });
    Ok(id)
  }

  pub fn is_root(&self, id: ClumpId) -> bool {
    self.nodes[id as usize].parent == id
  }

  /// Root of `id`'s component, with path halving.
  pub fn find(&mut self, id: ClumpId) -> ClumpId {
    let mut cur = id;
    loop {
      let p = self.nodes[cur as usize].parent;
      if p == cur {
        return cur;
      }
      let gp = self.nodes[p as usize].parent;
      self.nodes[cur as usize].parent = gp;
      cur = gp;
    }
  }

  /// Merge the components of `a` and `b`, summing their counts into the
  /// surviving root. Returns the surviving root id.
  pub fn merge(&mut self, a: ClumpId, b: ClumpId) -> ClumpId {
    let ra = self.find(a);
    let rb = self.find(b);
    if ra == rb {
      return ra;
    }
    let (winner, loser) = if self.nodes[ra as usize].rank < self.nodes[rb as usize].rank {
      (rb, ra)
    } else {
      (ra, rb)
    };
    self.nodes[loser as usize].parent = winner;
    let (lv, lt) = {
      let l = &self.nodes[loser as usize];
      (l.vertices, l.triangles)
    };
    let w = &mut self.nodes[winner as usize];
    w.vertices += lv;
    w.triangles += lt;
    if self.nodes[winner as usize].rank == self.nodes[loser as usize].rank {
      self.nodes[winner as usize].rank += 1;
    }
    winner
  }

  /// Count one triangle against `id`'s clump. Only called while `id` is
  /// still its own root (freshly minted in the current block).
  pub fn add_triangle(&mut self, id: ClumpId) {
    debug_assert!(self.is_root(id));
    self.nodes[id as usize].triangles += 1;
  }

  /// Subtract one vertex at `root`. Applied when an external key collides:
  /// both sides of the weld counted the shared vertex, so the surviving
  /// component deducts one copy.
  pub fn deduct_shared_vertex(&mut self, root: ClumpId) {
    debug_assert!(self.is_root(root));
    self.nodes[root as usize].vertices -= 1;
  }

  /// Vertex count of `id`'s component.
  pub fn component_vertices(&mut self, id: ClumpId) -> u64 {
    let root = self.find(id);
    self.nodes[root as usize].vertices
  }

  /// Triangle count of `id`'s component.
  pub fn component_triangles(&mut self, id: ClumpId) -> u64 {
    let root = self.find(id);
    self.nodes[root as usize].triangles
  }

  /// Sum of vertex counts over all roots: the number of unique vertices
  /// received so far.
  pub fn total_vertices(&self) -> u64 {
    self
      .nodes
      .iter()
      .enumerate()
      .filter(|(i, n)| n.parent == *i as ClumpId)
      .map(|(_, n)| n.vertices)
      .sum()
  }

  /// Number of roots, i.e. distinct components.
  pub fn component_count(&self) -> usize {
    self.roots().count()
  }

  /// All component roots with their counts.
  pub fn roots(&self) -> impl Iterator<Item = (ClumpId, &Clump)> {
    self
      .nodes
      .iter()
      .enumerate()
      .filter(|(i, n)| n.parent == *i as ClumpId)
      .map(|(i, n)| (i as ClumpId, n))
  }
}

#[cfg(test)]
#[path = "clump_test.rs"]
mod clump_test;
