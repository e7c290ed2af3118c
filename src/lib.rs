//! Data-parallel `for` loops over an index range.
//!
//! Workers claim contiguous chunks of `[0, n)` from one shared atomic cursor
//! until the range is exhausted, so faster workers simply claim more chunks.
//!
//! ```no_run
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let hits = AtomicUsize::new(0);
//! parfor::parallel_for(1_000, 16, |_| {
//!     hits.fetch_add(1, Ordering::Relaxed);
//! })
//! .unwrap();
//! assert_eq!(hits.into_inner(), 1_000);
//! ```

pub mod error;
pub mod parallel;
pub mod workload;

pub use error::ParallelForError;
pub use parallel::{parallel_for, ParallelFor, RunStats};
