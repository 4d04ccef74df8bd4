use cache_tunnel_core::prelude::InvalidInputError;
use parking_lot::Mutex;

/// Lifecycle of a run.
///
/// `Idle -> Running` when the scheduler starts, `Running -> Draining` once no more iterations will
/// be dispatched, `Draining -> Completed` once every virtual user has finished its last iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RunState {
    #[display("idle")]
    Idle,
    #[display("running")]
    Running,
    #[display("draining")]
    Draining,
    #[display("completed")]
    Completed,
}

#[derive(Debug)]
pub struct RunStateMachine {
    state: Mutex<RunState>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn current(&self) -> RunState {
        *self.state.lock()
    }

    /// Move to `to` if the current state is `from`, otherwise return the current state.
    fn advance(&self, from: RunState, to: RunState) -> Result<(), RunState> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(*state);
        }

        log::info!("Run state changed from {from} to {to}");
        *state = to;
        Ok(())
    }

    pub fn start(&self) -> anyhow::Result<()> {
        self.advance(RunState::Idle, RunState::Running)
            .map_err(|current| {
                InvalidInputError::new(format!("cannot start a run that is already {current}"))
                    .into()
            })
    }

    /// No more iterations will be dispatched. Safe to call more than once, only the first call
    /// changes the state.
    pub fn drain(&self) -> bool {
        self.advance(RunState::Running, RunState::Draining).is_ok()
    }

    pub fn complete(&self) -> bool {
        self.advance(RunState::Draining, RunState::Completed).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_run_lifecycle() {
        let machine = RunStateMachine::new();
        assert_eq!(RunState::Idle, machine.current());

        machine.start().unwrap();
        assert_eq!(RunState::Running, machine.current());

        assert!(machine.drain());
        assert!(!machine.drain());
        assert_eq!(RunState::Draining, machine.current());

        assert!(machine.complete());
        assert_eq!(RunState::Completed, machine.current());
    }

    #[test]
    fn cannot_complete_without_draining() {
        let machine = RunStateMachine::new();
        machine.start().unwrap();

        assert!(!machine.complete());
        assert_eq!(RunState::Running, machine.current());
    }

    #[test]
    fn cannot_start_twice() {
        let machine = RunStateMachine::new();
        machine.start().unwrap();

        let err = machine.start().unwrap_err();
        assert!(err.is::<InvalidInputError>());
        assert!(err.to_string().contains("running"));
    }
}
