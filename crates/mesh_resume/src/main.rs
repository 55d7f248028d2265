//! Checkpoint resume tool.
//!
//! Completes an interrupted out-of-core meshing run: loads a checkpoint
//! written after intake finished, replays only the final write pass against
//! the retained temp files, and emits the polygon files.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use ooc_mesher::{MesherConfig, OocMesher, OutputNamer, PlyWriter};

/// Completes the write pass of a checkpointed meshing run.
#[derive(Parser, Debug)]
#[command(name = "mesh_resume")]
#[command(about = "Writes the output files of a checkpointed out-of-core meshing run")]
struct Args {
	/// Path to the checkpoint file written by the meshing process.
	#[arg(short, long)]
	checkpoint: PathBuf,

	/// Output file, or base name when --split-chunks is set.
	#[arg(short, long)]
	output: PathBuf,

	/// Write one file per chunk, tagged with the chunk coordinates.
	#[arg(long)]
	split_chunks: bool,

	/// Fraction of total vertices below which components are dropped.
	#[arg(long, default_value_t = 0.0)]
	prune: f64,

	/// Keep the temporary files after writing (for another pass).
	#[arg(long)]
	retain_temp_files: bool,
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	let config = MesherConfig::new()
		.with_prune_threshold(args.prune)
		.with_retain_temp_files(args.retain_temp_files);

	println!("Loading checkpoint from: {}", args.checkpoint.display());
	let mut mesher = OocMesher::resume(&args.checkpoint, config)
		.with_context(|| format!("Failed to load checkpoint {}", args.checkpoint.display()))?;

	let namer = if args.split_chunks {
		OutputNamer::Tagged {
			base: args.output.clone(),
		}
	} else {
		OutputNamer::Single(args.output.clone())
	};

	let summary = mesher
		.write(Box::new(PlyWriter::new()), &namer)
		.context("Write pass failed")?;

	println!(
		"Wrote {} file(s): {} vertices, {} triangles",
		summary.files_written, summary.kept_vertices, summary.kept_triangles
	);
	println!(
		"Kept {} of {} components (prune threshold {} vertices)",
		summary.kept_components,
		summary.kept_components + summary.dropped_components,
		summary.threshold_vertices
	);

	Ok(())
}
