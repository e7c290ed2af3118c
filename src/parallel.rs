use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use tracing::{debug, trace, warn};

use crate::error::{ParallelForError, Result};

pub const DEFAULT_GRAIN: usize = 1;

/// Runs `f(0)..f(n - 1)` on every worker of a fresh scoped thread set, or of
/// an attached rayon pool, handing out chunks of `grain` indices from a
/// shared atomic cursor.
#[derive(Clone)]
pub struct ParallelFor {
    num_workers: usize,
    grain: usize,
    pool: Option<Arc<ThreadPool>>,
}

/// Summary of one call to [`ParallelFor::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Workers that actually ran.
    pub workers: usize,
    /// Chunks claimed inside `[0, n)`.
    pub chunks: usize,
    pub elapsed: Duration,
}

impl ParallelFor {
    pub fn new() -> Self {
        Self::with_workers(None)
    }

    /// `None` falls back to the number of logical CPUs.
    pub fn with_workers(num_workers: Option<usize>) -> Self {
        let num_workers = num_workers.unwrap_or_else(num_cpus::get);

        Self {
            num_workers,
            grain: DEFAULT_GRAIN,
            pool: None,
        }
    }

    pub fn workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Larger grains amortize the atomic claim over more cheap iterations;
    /// smaller grains balance uneven per-index cost better.
    pub fn grain(mut self, grain: usize) -> Self {
        self.grain = grain;
        self
    }

    /// Run on a long-lived pool instead of spawning threads per call. Every
    /// pool thread becomes a worker; the worker-count override is ignored.
    pub fn pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn num_workers(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => self.num_workers,
        }
    }

    pub fn grain_size(&self) -> usize {
        self.grain
    }

    /// Applies `f` to every index in `[0, n)` exactly once and returns after
    /// all workers have finished.
    ///
    /// A panic in `f` stops only the worker that raised it. The remaining
    /// workers drain the cursor, everything is joined, and the first panic
    /// is returned as [`ParallelForError::WorkerPanicked`].
    pub fn run<F>(&self, n: usize, f: F) -> Result<RunStats>
    where
        F: Fn(usize) + Sync,
    {
        if self.grain == 0 {
            return Err(ParallelForError::InvalidGrain);
        }
        let workers = self.num_workers();
        if workers == 0 {
            return Err(ParallelForError::InvalidWorkerCount);
        }

        let started = Instant::now();
        if n == 0 {
            return Ok(RunStats {
                workers: 0,
                chunks: 0,
                elapsed: started.elapsed(),
            });
        }

        let grain = self.grain.min(n);
        let spawned = match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => workers.min(n.div_ceil(grain)),
        };

        // Each worker's final claim lands past `n`, so the cursor tops out
        // below n + (spawned + 1) * grain.
        spawned
            .checked_add(1)
            .and_then(|claims| claims.checked_mul(grain))
            .and_then(|overshoot| overshoot.checked_add(n))
            .ok_or(ParallelForError::RangeOverflow {
                n,
                grain: self.grain,
                workers: spawned,
            })?;

        debug!(
            n,
            grain,
            workers = spawned,
            pooled = self.pool.is_some(),
            "parallel for"
        );

        let cursor = AtomicUsize::new(0);
        let chunks = match &self.pool {
            Some(pool) => {
                let outcomes = pool.broadcast(|_| {
                    panic::catch_unwind(AssertUnwindSafe(|| claim_chunks(&cursor, n, grain, &f)))
                });
                collect_outcomes(outcomes)?
            }
            None => run_scoped(&cursor, n, grain, spawned, &f)?,
        };

        Ok(RunStats {
            workers: spawned,
            chunks,
            elapsed: started.elapsed(),
        })
    }
}

impl Default for ParallelFor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParallelFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelFor")
            .field("num_workers", &self.num_workers())
            .field("grain", &self.grain)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

/// `for i in 0..n { f(i) }`, spread over one worker per logical CPU.
pub fn parallel_for<F>(n: usize, grain: usize, f: F) -> Result<()>
where
    F: Fn(usize) + Sync,
{
    ParallelFor::new().grain(grain).run(n, f).map(|_| ())
}

fn run_scoped<F>(
    cursor: &AtomicUsize,
    n: usize,
    grain: usize,
    workers: usize,
    f: &F,
) -> Result<usize>
where
    F: Fn(usize) + Sync,
{
    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| scope.spawn(move || claim_chunks(cursor, n, grain, f)))
            .collect();

        // Joining every handle here keeps the scope from re-raising a panic.
        collect_outcomes(handles.into_iter().map(|handle| handle.join()))
    })
}

/// Worker loop. Returns the number of chunks processed.
fn claim_chunks<F>(cursor: &AtomicUsize, n: usize, grain: usize, f: &F) -> usize
where
    F: Fn(usize),
{
    let mut claimed = 0;

    loop {
        // The cursor only grows, so once a claim starts past `n` every later
        // claim will too.
        let start = cursor.fetch_add(grain, Ordering::Relaxed);
        if start >= n {
            break;
        }

        let end = (start + grain).min(n);
        trace!(start, end, "claimed chunk");

        for i in start..end {
            f(i);
        }
        claimed += 1;
    }

    claimed
}

fn collect_outcomes<I>(outcomes: I) -> Result<usize>
where
    I: IntoIterator<Item = thread::Result<usize>>,
{
    let mut chunks = 0;
    let mut first_panic = None;

    for outcome in outcomes {
        match outcome {
            Ok(claimed) => chunks += claimed,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "worker panicked");
                if first_panic.is_none() {
                    first_panic = Some(message);
                }
            }
        }
    }

    match first_panic {
        Some(message) => Err(ParallelForError::WorkerPanicked { message }),
        None => Ok(chunks),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
