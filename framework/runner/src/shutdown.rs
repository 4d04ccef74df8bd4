use std::time::Duration;

use cache_tunnel_core::prelude::ShutdownHandle;
use tokio::signal;
use tokio::task::JoinHandle;

use crate::executor::Executor;

pub(crate) fn start_shutdown_listener(executor: &Executor) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    executor.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, shutting down...");
                listener_handle.shutdown();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {e:?}"),
        }
    });

    handle
}

/// Send the shutdown signal once the deadline has passed.
pub(crate) fn start_deadline(
    executor: &Executor,
    deadline: Duration,
    handle: ShutdownHandle,
) -> JoinHandle<()> {
    executor.spawn(async move {
        tokio::time::sleep(deadline).await;
        log::info!("Run deadline of {}ms reached", deadline.as_millis());
        handle.shutdown();
    })
}
