use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParallelForError {
    #[error("grain must be at least 1")]
    InvalidGrain,

    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    /// The cursor can run past `n` by one grain per worker; this combination
    /// would wrap `usize`.
    #[error("index range {n} with grain {grain} across {workers} workers overflows the cursor")]
    RangeOverflow {
        n: usize,
        grain: usize,
        workers: usize,
    },

    #[error("worker panicked: {message}")]
    WorkerPanicked { message: String },
}

pub type Result<T> = std::result::Result<T, ParallelForError>;
