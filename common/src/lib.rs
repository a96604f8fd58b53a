//! Shared core for the imgsync tools: image model, endpoint contract,
//! job engine and the sequential job runner.

use anyhow::Context;

pub mod config;
pub mod endpoint;
pub mod events;
pub mod image;
pub mod job;
pub mod runner;

#[cfg(test)]
pub(crate) mod testutils;

pub use config::{OutputConfig, RuntimeConfig};

fn init_tracing(output: &OutputConfig) {
    let level = if output.quiet {
        tracing_subscriber::filter::LevelFilter::ERROR
    } else {
        match output.verbose {
            0 => tracing_subscriber::filter::LevelFilter::ERROR,
            1 => tracing_subscriber::filter::LevelFilter::INFO,
            2 => tracing_subscriber::filter::LevelFilter::DEBUG,
            _ => tracing_subscriber::filter::LevelFilter::TRACE,
        }
    };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    // logs go to stderr so stdout stays usable for listings
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Set up tracing and a tokio runtime, then drive `func` to completion.
pub fn run<F, Fut, T>(output: &OutputConfig, runtime: &RuntimeConfig, func: F) -> anyhow::Result<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    init_tracing(output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    let runtime = builder
        .build()
        .context("failed to build the tokio runtime")?;
    runtime.block_on(func())
}
