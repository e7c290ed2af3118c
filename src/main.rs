use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parfor::workload::{create_progress_bar, Workload};
use parfor::ParallelFor;

#[derive(Parser, Debug)]
#[command(name = "parfor")]
#[command(about = "Benchmark a chunked parallel for loop", long_about = None)]
struct Args {
    /// Number of indices to process
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    count: usize,

    /// Indices claimed per atomic step
    #[arg(short, long, default_value_t = 64)]
    grain: usize,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Per-index cost profile
    #[arg(short, long, value_enum, default_value_t = Workload::Uniform)]
    workload: Workload,

    /// Run on a persistent rayon pool instead of spawning threads per run
    #[arg(long)]
    pool: bool,

    /// Number of times to run the loop
    #[arg(short, long, default_value_t = 1)]
    repeat: usize,

    /// Disable progress bar
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut executor = ParallelFor::with_workers(args.threads).grain(args.grain);
    if args.pool {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("parfor-{i}"));
        if let Some(threads) = args.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build().context("Failed to build rayon thread pool")?;
        executor = executor.pool(Arc::new(pool));
    }

    info!(?executor, count = args.count, workload = ?args.workload, "starting");
    println!(
        "Running {} indices, grain {}, on {} worker threads",
        args.count,
        executor.grain_size(),
        executor.num_workers()
    );

    let mut total = std::time::Duration::ZERO;
    for run in 1..=args.repeat {
        let progress = (!args.quiet).then(|| create_progress_bar(args.count));

        let stats = args
            .workload
            .execute(args.count, &executor, progress.as_ref())
            .with_context(|| format!("Run {run} failed"))?;

        if let Some(ref pb) = progress {
            pb.finish_with_message("done");
        }

        total += stats.elapsed;
        let per_sec = args.count as f64 / stats.elapsed.as_secs_f64();
        println!(
            "Run {run}: {:.2?} ({} chunks across {} workers, {:.0} indices/s)",
            stats.elapsed, stats.chunks, stats.workers, per_sec
        );
    }

    if args.repeat > 1 {
        println!("\nMean over {} runs: {:.2?}", args.repeat, total / args.repeat as u32);
    }

    Ok(())
}
