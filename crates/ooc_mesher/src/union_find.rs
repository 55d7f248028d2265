//! Disjoint-set forest over block-local vertices.
//!
//! Used once per incoming block to find its connected components. Each root
//! tracks the size of its set, which seeds the vertex count of the global
//! clump minted for that component.

/// Union-find with union by rank, path halving, and per-root set sizes.
#[derive(Debug)]
pub struct UnionFind {
  parent: Vec<u32>,
  rank: Vec<u8>,
  size: Vec<u32>,
}

impl UnionFind {
  pub fn new(n: usize) -> Self {
    let mut uf = Self {
      parent: Vec::new(),
      rank: Vec::new(),
      size: Vec::new(),
    };
    uf.reset(n);
    uf
  }

  /// Reinitialise to `n` singleton sets, reusing the allocations.
  pub fn reset(&mut self, n: usize) {
    self.parent.clear();
    self.parent.extend(0..n as u32);
    self.rank.clear();
    self.rank.resize(n, 0);
    self.size.clear();
    self.size.resize(n, 1);
  }

  pub fn len(&self) -> usize {
    self.parent.len()
  }

  pub fn is_empty(&self) -> bool {
    self.parent.is_empty()
  }

  pub fn is_root(&self, x: u32) -> bool {
    self.parent[x as usize] == x
  }

  /// Find the root of `x`, halving the path on the way up.
  pub fn find(&mut self, x: u32) -> u32 {
    let mut cur = x;
    loop {
      let p = self.parent[cur as usize];
      if p == cur {
        return cur;
      }
      let gp = self.parent[p as usize];
      self.parent[cur as usize] = gp;
      cur = gp;
    }
  }

  /// Union the sets of `a` and `b` by rank. Returns `true` if they were in
  /// different sets.
  pub fn union(&mut self, a: u32, b: u32) -> bool {
    let ra = self.find(a);
    let rb = self.find(b);
    if ra == rb {
      return false;
    }
    let (winner, loser) = if self.rank[ra as usize] < self.rank[rb as usize] {
      (rb, ra)
    } else {
      (ra, rb)
    };
    self.parent[loser as usize] = winner;
    self.size[winner as usize] += self.size[loser as usize];
    if self.rank[winner as usize] == self.rank[loser as usize] {
      self.rank[winner as usize] += 1;
    }
    true
  }

  /// Size of the set containing `x`.
  pub fn set_size(&mut self, x: u32) -> u32 {
    let root = self.find(x);
    self.size[root as usize]
  }
}

#[cfg(test)]
#[path = "union_find_test.rs"]
mod union_find_test;
