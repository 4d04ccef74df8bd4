use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::sync::Mutex;

/// Run-level cancellation signal.
///
/// Both the run deadline and Ctrl-C go through this handle. Listeners must be created before the
/// signal is sent, a listener subscribed afterwards will not see it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<()>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: tokio::sync::broadcast::channel(1).0,
        }
    }

    pub fn shutdown(&self) {
        if let Err(e) = self.sender.send(()) {
            // Will fail if nobody is listening for a shutdown signal, in which case the log message
            // can be ignored.
            log::warn!("Failed to send shutdown signal: {e:?}");
        }
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Arc<Mutex<Receiver<()>>>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Point in time check if the shutdown signal has been received. Once this returns true no new
    /// work should be started.
    ///
    /// The signal is consumed by the first call that observes it, so callers should stop on the
    /// first `true`.
    pub fn should_shutdown(&mut self) -> bool {
        match self.receiver.try_lock() {
            Ok(mut guard) => {
                match guard.try_recv() {
                    // Only shutdown signals are sent, so missing some of them still means shutdown.
                    Ok(_) | Err(TryRecvError::Lagged(_)) | Err(TryRecvError::Closed) => true,
                    Err(TryRecvError::Empty) => false,
                }
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_sees_shutdown_once() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        assert!(!listener.should_shutdown());
        handle.shutdown();
        assert!(listener.should_shutdown());
        assert!(!listener.should_shutdown());
    }

    #[test]
    fn every_listener_gets_the_signal() {
        let handle = ShutdownHandle::new();
        let mut listeners = (0..4).map(|_| handle.new_listener()).collect::<Vec<_>>();

        handle.shutdown();

        assert!(listeners.iter_mut().all(|l| l.should_shutdown()));
    }

    #[test]
    fn dropped_handle_counts_as_shutdown() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();
        drop(handle);

        assert!(listener.should_shutdown());
    }

    #[test]
    fn repeated_signals_are_seen_on_first_check() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        // Deadline and Ctrl-C both firing before the listener checks.
        handle.shutdown();
        handle.shutdown();

        assert!(listener.should_shutdown());
    }
}
