//! Tests for the final write pass.

use crate::ply::OutputNamer;
use crate::test_utils::{assert_file_consistent, block, run_blocks};
use crate::types::{MeshBlock, MesherConfig};

fn single_namer() -> OutputNamer {
  OutputNamer::Single("mesh.ply".into())
}

fn disjoint_triangle(gen: u32, i: u32) -> MeshBlock {
  let base = i as f32 * 10.0;
  block(
    gen,
    [0; 3],
    &[
      [base, 0.0, 0.0],
      [base + 1.0, 0.0, 0.0],
      [base, 1.0, 0.0],
    ],
    &[],
    &[[0, 1, 2]],
  )
}

// =============================================================================
// Batch 1: Keep-all runs
// =============================================================================

#[test]
fn test_write_all_components_kept() {
  let blocks: Vec<MeshBlock> = (0..3).map(|i| disjoint_triangle(0, i)).collect();
  let (summary, state) = run_blocks(&blocks, MesherConfig::default(), &single_namer());

  assert_eq!(summary.files_written, 1);
  assert_eq!(summary.threshold_vertices, 0);
  assert_eq!(summary.kept_components, 3);
  assert_eq!(summary.dropped_components, 0);
  assert_eq!(summary.kept_vertices, 9);
  assert_eq!(summary.kept_triangles, 3);

  let state = state.lock().unwrap();
  let file = &state.files[0];
  assert_eq!(file.num_vertices, 9);
  assert_eq!(file.num_triangles, 3);
  assert_file_consistent(file);
}

#[test]
fn test_output_triangles_are_clump_rebased() {
  let blocks: Vec<MeshBlock> = (0..2).map(|i| disjoint_triangle(0, i)).collect();
  let (_, state) = run_blocks(&blocks, MesherConfig::default(), &single_namer());
  let state = state.lock().unwrap();
  let file = &state.files[0];
  assert_eq!(file.triangles[0], [0, 1, 2]);
  assert_eq!(file.triangles[1], [3, 4, 5]);
}

// =============================================================================
// Batch 2: Pruning
// =============================================================================

#[test]
fn test_prune_drops_small_components() {
  // Five disjoint triangles, 15 vertices total. Threshold is
  // ceil(0.3 * 15) = 5, so every 3-vertex component is dropped.
  let blocks: Vec<MeshBlock> = (0..5).map(|i| disjoint_triangle(0, i)).collect();
  let config = MesherConfig::new().with_prune_threshold(0.3);
  let (summary, state) = run_blocks(&blocks, config, &single_namer());

  assert_eq!(summary.threshold_vertices, 5);
  assert_eq!(summary.kept_components, 0);
  assert_eq!(summary.dropped_components, 5);
  assert_eq!(summary.kept_vertices, 0);
  assert_eq!(summary.kept_triangles, 0);

  // The file is still created, just empty.
  let state = state.lock().unwrap();
  assert_eq!(state.files.len(), 1);
  assert_eq!(state.files[0].num_vertices, 0);
  assert_eq!(state.files[0].num_triangles, 0);
}

#[test]
fn test_prune_keeps_large_component() {
  // One 6-vertex component amid three 3-vertex ones: threshold
  // ceil(0.2 * 15) = 3 keeps everything; 0.3 gives 5 and keeps only the
  // welded pair.
  let mut blocks: Vec<MeshBlock> = (0..3).map(|i| disjoint_triangle(0, i)).collect();
  blocks.push(block(
    0,
    [0; 3],
    &[[100.0, 0.0, 0.0], [101.0, 0.0, 0.0], [100.0, 1.0, 0.0]],
    &[],
    &[[0, 1, 2]],
  ));
  blocks.push(block(
    0,
    [0; 3],
    &[[200.0, 0.0, 0.0], [201.0, 0.0, 0.0], [200.0, 1.0, 0.0]],
    &[],
    &[[0, 1, 2]],
  ));
  // Weld the last two into one component.
  let b = blocks.len();
  blocks[b - 2] = block(
    0,
    [0; 3],
    &[[100.0, 0.0, 0.0]],
    &[([7.0, 7.0, 7.0], 1), ([8.0, 8.0, 8.0], 2)],
    &[[0, 1, 2]],
  );
  blocks[b - 1] = block(
    0,
    [0; 3],
    &[[200.0, 0.0, 0.0]],
    &[([7.0, 7.0, 7.0], 1), ([8.0, 8.0, 8.0], 2)],
    &[[0, 1, 2]],
  );

  let config = MesherConfig::new().with_prune_threshold(0.3);
  let (summary, state) = run_blocks(&blocks, config, &single_namer());

  // 9 + 4 unique vertices, threshold ceil(0.3 * 13) = 4.
  assert_eq!(summary.threshold_vertices, 4);
  assert_eq!(summary.kept_components, 1);
  assert_eq!(summary.dropped_components, 3);
  assert_eq!(summary.kept_vertices, 4);
  assert_eq!(summary.kept_triangles, 2);

  let state = state.lock().unwrap();
  let file = &state.files[0];
  assert_eq!(file.num_vertices, 4);
  assert_eq!(file.num_triangles, 2);
  assert_file_consistent(file);
}

// =============================================================================
// Batch 3: Multiple chunks
// =============================================================================

#[test]
fn test_chunks_map_to_separate_files() {
  let namer = OutputNamer::Tagged {
    base: "chunk".into(),
  };
  let blocks = vec![
    {
      let mut b = disjoint_triangle(0, 0);
      b.chunk_id.coords = [0, 0, 0];
      b
    },
    {
      let mut b = disjoint_triangle(1, 1);
      b.chunk_id.coords = [1, 0, 0];
      b
    },
  ];
  let (summary, state) = run_blocks(&blocks, MesherConfig::default(), &namer);

  assert_eq!(summary.files_written, 2);
  let state = state.lock().unwrap();
  assert_eq!(state.files.len(), 2);
  let a = state.file(std::path::Path::new("chunk_0000_0000_0000.ply"));
  let b = state.file(std::path::Path::new("chunk_0001_0000_0000.ply"));
  assert_eq!(a.num_vertices, 3);
  assert_eq!(a.num_triangles, 1);
  assert_eq!(b.num_vertices, 3);
  assert_eq!(b.num_triangles, 1);
  assert_file_consistent(a);
  assert_file_consistent(b);
}

#[test]
fn test_generation_holes_produce_no_files() {
  let blocks = vec![disjoint_triangle(0, 0), {
    let mut b = disjoint_triangle(3, 1);
    b.chunk_id.coords = [3, 0, 0];
    b
  }];
  let namer = OutputNamer::Tagged { base: "hole".into() };
  let (summary, state) = run_blocks(&blocks, MesherConfig::default(), &namer);
  assert_eq!(summary.files_written, 2);
  assert_eq!(state.lock().unwrap().files.len(), 2);
}
