//! Bounded asynchronous sink driving a [`PolygonWriter`].
//!
//! The final pass reads geometry back from the temp files on the calling
//! thread and hands write jobs to a single writer thread, so temp-file
//! reads overlap output-file writes. A byte budget bounds the geometry in
//! flight; acquiring budget blocks the producer, which is the only
//! back-pressure point of the pass.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{MesherError, Result};
use crate::ply::PolygonWriter;
use crate::types::{Triangle, Vertex};

/// One unit of work for the writer thread.
pub enum WriteJob {
  /// Fix counts and open the next output file.
  Open {
    path: PathBuf,
    num_vertices: u64,
    num_triangles: u64,
  },
  Vertices {
    first: u64,
    data: Vec<Vertex>,
  },
  Triangles {
    first: u64,
    data: Vec<Triangle>,
  },
}

impl WriteJob {
  fn payload_bytes(&self) -> usize {
    match self {
      WriteJob::Open { .. } => 0,
      WriteJob::Vertices { data, .. } => data.len() * 12,
      WriteJob::Triangles { data, .. } => data.len() * 12,
    }
  }
}

/// Counting byte budget shared between producer and writer thread.
struct ByteBudget {
  capacity: usize,
  used: Mutex<usize>,
  freed: Condvar,
}

impl ByteBudget {
  fn new(capacity: usize) -> Self {
    Self {
      capacity,
      used: Mutex::new(0),
      freed: Condvar::new(),
    }
  }

  fn acquire(&self, bytes: usize) {
    // A job larger than the whole budget still gets through alone.
    let bytes = bytes.min(self.capacity);
    let mut used = self.used.lock().unwrap();
    while *used + bytes > self.capacity {
      used = self.freed.wait(used).unwrap();
    }
    *used += bytes;
  }

  fn release(&self, bytes: usize) {
    let bytes = bytes.min(self.capacity);
    let mut used = self.used.lock().unwrap();
    *used -= bytes;
    drop(used);
    self.freed.notify_all();
  }
}

/// Handle to the writer thread.
pub struct AsyncSink {
  tx: Option<Sender<WriteJob>>,
  handle: Option<JoinHandle<Box<dyn PolygonWriter>>>,
  budget: Arc<ByteBudget>,
  error: Arc<Mutex<Option<MesherError>>>,
}

impl AsyncSink {
  pub fn start(writer: Box<dyn PolygonWriter>, capacity: usize) -> Self {
    let (tx, rx) = unbounded::<WriteJob>();
    let budget = Arc::new(ByteBudget::new(capacity.max(1)));
    let error = Arc::new(Mutex::new(None));
    let worker_budget = Arc::clone(&budget);
    let worker_error = Arc::clone(&error);
    let handle = std::thread::Builder::new()
      .name("mesher-sink".into())
      .spawn(move || sink_worker(rx, writer, worker_budget, worker_error))
      .expect("failed to spawn sink thread");
    Self {
      tx: Some(tx),
      handle: Some(handle),
      budget,
      error,
    }
  }

  /// Queue a job, blocking until its payload fits in the byte budget.
  pub fn send(&self, job: WriteJob) -> Result<()> {
    if let Some(err) = self.error.lock().unwrap().take() {
      return Err(err);
    }
    self.budget.acquire(job.payload_bytes());
    let tx = self.tx.as_ref().expect("sink already finished");
    tx.send(job).map_err(|_| {
      self
        .error
        .lock()
        .unwrap()
        .take()
        .unwrap_or_else(|| MesherError::InconsistentMesh("sink worker terminated".into()))
    })
  }

  /// Drain the queue, close the writer and surface any write error.
  pub fn finish(mut self) -> Result<()> {
    self.tx.take();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
    if let Some(err) = self.error.lock().unwrap().take() {
      return Err(err);
    }
    Ok(())
  }
}

impl Drop for AsyncSink {
  fn drop(&mut self) {
    self.tx.take();
    if let Some(handle) = self.handle.take() {
      let _ = handle.join();
    }
  }
}

fn sink_worker(
  rx: Receiver<WriteJob>,
  mut writer: Box<dyn PolygonWriter>,
  budget: Arc<ByteBudget>,
  error: Arc<Mutex<Option<MesherError>>>,
) -> Box<dyn PolygonWriter> {
  let mut failed = false;
  while let Ok(job) = rx.recv() {
    let bytes = job.payload_bytes();
    if !failed {
      let outcome = match job {
        WriteJob::Open {
          path,
          num_vertices,
          num_triangles,
        } => {
          writer.set_counts(num_vertices, num_triangles);
          writer.open(&path)
        }
        WriteJob::Vertices { first, data } => writer.write_vertices(first, &data),
        WriteJob::Triangles { first, data } => writer.write_triangles(first, &data),
      };
      if let Err(err) = outcome {
        log::error!("output write failed: {err}");
        *error.lock().unwrap() = Some(err);
        failed = true;
      }
    }
    // Release budget even for dropped jobs so the producer never wedges.
    budget.release(bytes);
  }
  if !failed {
    if let Err(err) = writer.close() {
      *error.lock().unwrap() = Some(err);
    }
  }
  writer
}
