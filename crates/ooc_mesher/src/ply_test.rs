//! Tests for the PLY writer and output namers.

use super::*;
use crate::test_utils::test_dir;
use crate::types::ChunkId;

fn read_header(bytes: &[u8]) -> (String, usize) {
  let end = b"end_header\n";
  let pos = bytes
    .windows(end.len())
    .position(|w| w == end)
    .expect("header terminator")
    + end.len();
  (String::from_utf8(bytes[..pos].to_vec()).unwrap(), pos)
}

#[test]
fn test_ply_layout() {
  let dir = test_dir("ply_layout");
  let path = dir.join("out.ply");

  let mut writer = PlyWriter::new();
  writer.set_counts(2, 1);
  writer.open(&path).unwrap();
  writer
    .write_vertices(0, &[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])
    .unwrap();
  writer.write_triangles(0, &[[0, 1, 0]]).unwrap();
  writer.close().unwrap();

  let bytes = std::fs::read(&path).unwrap();
  let (header, header_len) = read_header(&bytes);
  assert!(header.starts_with("ply\nformat binary_little_endian 1.0\n"));
  assert!(header.contains("element vertex 2\n"));
  assert!(header.contains("element face 1\n"));
  assert!(header.contains("property list uchar uint vertex_indices\n"));

  // 2 vertices of 12 bytes, then one 13-byte face record.
  assert_eq!(bytes.len(), header_len + 2 * 12 + 13);
  let vertices: Vec<[f32; 3]> =
    bytemuck::pod_collect_to_vec(&bytes[header_len..header_len + 24]);
  assert_eq!(vertices, vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);

  let face = &bytes[header_len + 24..];
  assert_eq!(face[0], 3, "face records lead with the vertex count");
  let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&face[1..]);
  assert_eq!(indices, vec![0, 1, 0]);

  let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_out_of_order_offset_writes() {
  let dir = test_dir("ply_ooo");
  let path = dir.join("out.ply");

  let mut writer = PlyWriter::new();
  writer.set_counts(3, 2);
  writer.open(&path).unwrap();
  // Triangles before vertices, second clump before first.
  writer.write_triangles(1, &[[2, 1, 0]]).unwrap();
  writer.write_vertices(2, &[[9.0, 9.0, 9.0]]).unwrap();
  writer.write_vertices(0, &[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]).unwrap();
  writer.write_triangles(0, &[[0, 1, 2]]).unwrap();
  writer.close().unwrap();

  let bytes = std::fs::read(&path).unwrap();
  let (_, header_len) = read_header(&bytes);
  let vertices: Vec<[f32; 3]> =
    bytemuck::pod_collect_to_vec(&bytes[header_len..header_len + 36]);
  assert_eq!(
    vertices,
    vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [9.0, 9.0, 9.0]]
  );
  let faces = &bytes[header_len + 36..];
  assert_eq!(faces.len(), 26);
  let first: Vec<u32> = bytemuck::pod_collect_to_vec(&faces[1..13]);
  let second: Vec<u32> = bytemuck::pod_collect_to_vec(&faces[14..26]);
  assert_eq!(first, vec![0, 1, 2]);
  assert_eq!(second, vec![2, 1, 0]);

  let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_open_closes_previous_file() {
  let dir = test_dir("ply_two_files");
  let mut writer = PlyWriter::new();
  writer.set_counts(1, 0);
  writer.open(&dir.join("a.ply")).unwrap();
  writer.write_vertices(0, &[[1.0, 0.0, 0.0]]).unwrap();
  writer.set_counts(1, 0);
  writer.open(&dir.join("b.ply")).unwrap();
  writer.write_vertices(0, &[[2.0, 0.0, 0.0]]).unwrap();
  writer.close().unwrap();

  assert!(dir.join("a.ply").exists());
  assert!(dir.join("b.ply").exists());
  let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_empty_file_still_written() {
  let dir = test_dir("ply_empty");
  let path = dir.join("empty.ply");
  let mut writer = PlyWriter::new();
  writer.set_counts(0, 0);
  writer.open(&path).unwrap();
  writer.close().unwrap();

  let bytes = std::fs::read(&path).unwrap();
  let (header, header_len) = read_header(&bytes);
  assert!(header.contains("element vertex 0\n"));
  assert_eq!(bytes.len(), header_len);
  let _ = std::fs::remove_dir_all(&dir);
}

// =============================================================================
// Namers
// =============================================================================

#[test]
fn test_single_namer_ignores_chunk_id() {
  let namer = OutputNamer::Single("mesh.ply".into());
  assert_eq!(
    namer.name(&ChunkId::new(0, [1, 2, 3])),
    std::path::PathBuf::from("mesh.ply")
  );
  assert_eq!(
    namer.name(&ChunkId::new(9, [7, 7, 7])),
    std::path::PathBuf::from("mesh.ply")
  );
}

#[test]
fn test_tagged_namer_pads_coordinates() {
  let namer = OutputNamer::Tagged {
    base: "out/mesh".into(),
  };
  assert_eq!(
    namer.name(&ChunkId::new(0, [1, 22, 333])),
    std::path::PathBuf::from("out/mesh_0001_0022_0333.ply")
  );
}
