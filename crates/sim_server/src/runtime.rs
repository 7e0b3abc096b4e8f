//! Tokio runtime construction for the simulation host

use sim_backend::RuntimeConfig;
use tokio::runtime::{Builder, Runtime};

/// Single-threaded scheduler unless more than one worker is configured
pub fn create_runtime(config: &RuntimeConfig) -> std::io::Result<Runtime> {
    let mut builder = if config.worker_threads <= 1 {
        Builder::new_current_thread()
    } else {
        let mut builder = Builder::new_multi_thread();
        builder.worker_threads(config.worker_threads);
        builder
    };

    builder.thread_name(&config.thread_name).enable_all().build()
}
