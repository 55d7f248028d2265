//! ooc_mesher - Out-of-core assembly of block-streamed isosurface meshes
//!
//! This crate turns a stream of per-block triangle meshes (as produced by a
//! marching pass over a sampled grid) into one or more polygon files, while
//! keeping the intermediate geometry on disk so the output may far exceed
//! main memory.
//!
//! # What it does
//!
//! - **Welds** vertices duplicated along block boundaries. Boundary
//!   vertices carry 64-bit keys; equal keys are the same vertex.
//! - **Tracks connected components** across blocks with a two-level
//!   union-find: per-block components ("clumps") are linked globally
//!   through shared keys.
//! - **Spills** reordered geometry to two append-only temp files through a
//!   bounded double-buffer and a dedicated writer thread.
//! - **Prunes** components smaller than a configurable fraction of all
//!   vertices at final write time.
//! - **Streams** each output chunk to a polygon writer with bounded
//!   in-flight bytes, optionally resuming from a checkpoint in a separate
//!   process.
//!
//! # Example
//!
//! ```no_run
//! use ooc_mesher::{MeshBlock, MesherConfig, OocMesher, OutputNamer, PlyWriter};
//!
//! # fn blocks() -> Vec<MeshBlock> { Vec::new() }
//! # fn main() -> ooc_mesher::Result<()> {
//! let config = MesherConfig::new().with_prune_threshold(0.01);
//! let mut mesher = OocMesher::new(std::env::temp_dir(), config)?;
//! for block in blocks() {
//!   mesher.add(&block)?;
//! }
//! let namer = OutputNamer::Single("surface.ply".into());
//! let summary = mesher.write(Box::new(PlyWriter::new()), &namer)?;
//! println!("kept {} components", summary.kept_components);
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod clump;
pub mod error;
pub mod key_map;
pub mod mesher;
pub mod metrics;
pub mod ply;
pub mod sink;
pub mod spill;
pub mod types;
pub mod union_find;
pub mod writeback;

mod checkpoint;

// Shared test builders
#[cfg(test)]
pub mod test_utils;


pub use chunk::{Chunk, ChunkClump, ChunkRegistry};
pub use clump::ClumpForest;
pub use error::{MesherError, Result};
pub use mesher::OocMesher;
pub use metrics::MesherMetrics;
pub use ply::{OutputNamer, PlyWriter, PolygonWriter};
pub use types::{ChunkId, MeshBlock, MesherConfig, Triangle, Vertex, VertexKey};
pub use writeback::WriteSummary;
