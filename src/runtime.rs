use anyhow::Result;
use tokio::runtime::Runtime;

/// Manually create a tokio runtime with `workers` threads (0 means one per CPU)
pub fn create_runtime(workers: usize) -> Result<Runtime> {
    let workers = if workers == 0 { num_cpus::get() } else { workers };
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("exchange-chat-worker")
        .enable_all()
        .build()?;
    Ok(runtime)
}
