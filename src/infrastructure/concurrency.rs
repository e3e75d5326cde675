/// Thread pool setup for Callscope.
/// The pool only serves the definition resolver's read-only candidate scan.

use anyhow::{Context, Result};
use tracing::info;

/// Initialize the global rayon pool. Without an explicit count, half the cores are used,
/// minimum 1 worker.
pub fn init_thread_pool(threads: Option<usize>) -> Result<usize> {
    let cores = num_cpus::get();
    let workers = threads.unwrap_or(cores / 2).max(1);

    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .context("Failed to initialize the global thread pool")?;

    info!(
        "Initialized thread pool: {} workers (system has {} cores)",
        workers, cores
    );

    Ok(workers)
}
