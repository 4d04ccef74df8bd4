use std::sync::Arc;
use std::time::Duration;

use cache_tunnel_core::prelude::DelegatedShutdownListener;

use crate::config::RunConfig;

/// Everything a virtual user knows about itself while it runs an iteration.
#[derive(Debug)]
pub struct VirtualUserContext {
    virtual_user_id: usize,
    config: Arc<RunConfig>,
    shutdown_listener: DelegatedShutdownListener,
    iteration: usize,
}

impl VirtualUserContext {
    pub fn new(
        virtual_user_id: usize,
        config: Arc<RunConfig>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            virtual_user_id,
            config,
            shutdown_listener,
            iteration: 0,
        }
    }

    pub fn virtual_user_id(&self) -> usize {
        self.virtual_user_id
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Index of the current iteration within this virtual user's share, starting at 0.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub(crate) fn set_iteration(&mut self, iteration: usize) {
        self.iteration = iteration;
    }

    /// The nonce for the current iteration, according to the configured nonce policy.
    pub fn nonce(&self) -> String {
        self.config
            .nonce_policy()
            .nonce_for(self.config.nonce(), self.virtual_user_id, self.iteration)
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// Block this virtual user for `duration`. Other virtual users are not affected.
    pub fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}
