use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::hint::black_box;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::parallel::{ParallelFor, RunStats};

/// Mixing rounds spent on the cheapest index.
pub const BASE_ROUNDS: u64 = 64;

/// The skewed workload's last eighth costs this many times the first.
const SKEW_STEPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    /// Every index costs the same.
    Uniform,
    /// Cost grows with the index, so late chunks are the expensive ones.
    Skewed,
}

impl Workload {
    pub fn rounds(self, index: usize, n: usize) -> u64 {
        match self {
            Workload::Uniform => BASE_ROUNDS,
            Workload::Skewed => {
                let step = index / n.div_ceil(SKEW_STEPS).max(1);
                BASE_ROUNDS * (1 + step as u64)
            }
        }
    }

    /// Runs the workload over `[0, n)` and checks that every index was
    /// visited exactly once.
    pub fn execute(
        self,
        n: usize,
        executor: &ParallelFor,
        progress: Option<&ProgressBar>,
    ) -> Result<RunStats> {
        let visits: Vec<AtomicU8> = (0..n).map(|_| AtomicU8::new(0)).collect();

        let stats = executor
            .run(n, |i| {
                black_box(mix(i as u64, self.rounds(i, n)));
                visits[i].fetch_add(1, Ordering::Relaxed);

                if let Some(pb) = progress {
                    pb.inc(1);
                }
            })
            .with_context(|| format!("{self:?} workload failed over {n} indices"))?;

        if let Some((index, count)) = visits
            .iter()
            .map(|v| v.load(Ordering::Relaxed))
            .enumerate()
            .find(|&(_, count)| count != 1)
        {
            bail!("index {index} visited {count} times, expected exactly once");
        }

        Ok(stats)
    }
}

fn mix(seed: u64, rounds: u64) -> u64 {
    let mut x = seed | 1;
    for _ in 0..rounds {
        // xorshift64
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
    }
    x
}

pub fn create_progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} indices ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}
