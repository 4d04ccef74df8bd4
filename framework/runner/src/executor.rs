use std::future::Future;

use anyhow::Context;
use tokio::task::JoinHandle;

/// Owns the async runtime used for background work during a run, such as the deadline timer and
/// the Ctrl-C listener. Virtual users do not run on this runtime.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    /// Must not be called from within an async context, the runtime is dropped with the executor.
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
        Ok(Self { runtime })
    }

    /// Submit async code to be run in the background.
    ///
    /// It is not guaranteed that the runner will wait for the future to complete before shutting
    /// down. Keep the handle to abort it once it is no longer needed.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) -> JoinHandle<()> {
        self.runtime.spawn(fut)
    }
}
