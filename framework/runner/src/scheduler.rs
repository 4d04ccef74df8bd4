use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use cache_tunnel_core::prelude::ShutdownHandle;
use cache_tunnel_instruments::{MetricsAggregator, RunSummary};
use parking_lot::Mutex;

use crate::config::RunConfig;
use crate::context::VirtualUserContext;
use crate::definition::IterationBehaviour;
use crate::executor::Executor;
use crate::shutdown::start_deadline;
use crate::state::{RunState, RunStateMachine};

/// Split `total_iterations` between `virtual_users`.
///
/// Each virtual user gets `total / n` iterations and the first `total % n` virtual users get one
/// more, so the same inputs always give the same assignment.
pub fn iteration_shares(virtual_users: usize, total_iterations: usize) -> Vec<usize> {
    if virtual_users == 0 {
        return Vec::new();
    }

    let base = total_iterations / virtual_users;
    let remainder = total_iterations % virtual_users;
    (0..virtual_users)
        .map(|vu| base + usize::from(vu < remainder))
        .collect()
}

/// Runs a fixed population of virtual users through a fixed number of iterations.
///
/// Each virtual user is an OS thread that runs its share of iterations one after another. The
/// only state shared between virtual users is the [MetricsAggregator], the [RunStateMachine] and a
/// count of iterations that have not been dispatched yet.
pub struct VirtualUserScheduler {
    config: Arc<RunConfig>,
    executor: Arc<Executor>,
    shutdown_handle: ShutdownHandle,
    state: Arc<RunStateMachine>,
    metrics: Arc<MetricsAggregator>,
    cancelled: Arc<AtomicBool>,
    wall_time: Mutex<Option<Duration>>,
}

impl VirtualUserScheduler {
    /// Create a scheduler with its own executor and shutdown handle.
    pub fn new(config: RunConfig) -> anyhow::Result<Self> {
        let executor = Arc::new(Executor::new()?);
        Ok(Self::with_executor(
            config,
            executor,
            ShutdownHandle::default(),
        ))
    }

    /// Create a scheduler that shares an executor and a shutdown handle with the caller, so that
    /// the caller can cancel the run.
    pub fn with_executor(
        config: RunConfig,
        executor: Arc<Executor>,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            executor,
            shutdown_handle,
            state: Arc::new(RunStateMachine::new()),
            metrics: Arc::new(MetricsAggregator::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
            wall_time: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state.current()
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    pub fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    /// Whether any virtual user stopped before finishing its share because of a shutdown.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Time from starting the first virtual user to joining the last one. Only available once the
    /// run has completed.
    pub fn wall_time(&self) -> Option<Duration> {
        *self.wall_time.lock()
    }

    /// Run the scenario and wait for every virtual user to finish.
    ///
    /// Fails before starting any virtual user if this scheduler has already been run. Once
    /// started, the run always reaches [RunState::Completed].
    pub fn run_scenario<B: IterationBehaviour>(&self, behaviour: Arc<B>) -> anyhow::Result<RunSummary> {
        self.state.start()?;

        let shares = iteration_shares(
            self.config.virtual_user_count(),
            self.config.total_iterations(),
        );
        log::info!(
            "Starting {} virtual users for {} iterations, shares {:?}",
            shares.len(),
            self.config.total_iterations(),
            shares
        );

        let undispatched = Arc::new(AtomicUsize::new(self.config.total_iterations()));

        // Subscribe every virtual user before the deadline can fire, otherwise an early signal
        // would be missed.
        let listeners = shares
            .iter()
            .map(|_| self.shutdown_handle.new_listener())
            .collect::<Vec<_>>();

        let deadline_task = self
            .config
            .deadline()
            .map(|deadline| start_deadline(&self.executor, deadline, self.shutdown_handle.clone()));

        let started = Instant::now();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(shares.len());
        let mut spawn_error = None;
        for (virtual_user_id, (share, listener)) in shares.into_iter().zip(listeners).enumerate() {
            let mut ctx = VirtualUserContext::new(virtual_user_id, self.config.clone(), listener);
            let behaviour = behaviour.clone();
            let metrics = self.metrics.clone();
            let state = self.state.clone();
            let undispatched = undispatched.clone();
            let cancelled = self.cancelled.clone();

            let spawned = std::thread::Builder::new()
                .name(format!("vu-{virtual_user_id}"))
                .spawn(move || {
                    run_virtual_user(
                        &mut ctx,
                        share,
                        behaviour.as_ref(),
                        &metrics,
                        &state,
                        &undispatched,
                        &cancelled,
                    );
                })
                .context("Failed to spawn thread for virtual user");

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Stop the virtual users that did start, then report the failure once they
                    // have finished.
                    self.shutdown_handle.shutdown();
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let mut join_error = None;
        for handle in handles {
            let name = handle.thread().name().unwrap_or("vu").to_string();
            if let Err(e) = handle.join() {
                log::error!("Virtual user thread {name} panicked: {e:?}");
                join_error.get_or_insert_with(|| anyhow::anyhow!("Virtual user thread {name} panicked"));
            }
        }

        if let Some(deadline_task) = deadline_task {
            deadline_task.abort();
        }

        let wall_time = started.elapsed();
        *self.wall_time.lock() = Some(wall_time);

        self.state.drain();
        self.metrics.mark_completed();
        self.state.complete();

        log::info!(
            "Run completed in {}ms with {} of {} iterations",
            wall_time.as_millis(),
            self.metrics.iterations_recorded(),
            self.config.total_iterations()
        );

        if let Some(e) = spawn_error.or(join_error) {
            return Err(e);
        }

        self.metrics.summarize()
    }
}

fn run_virtual_user<B: IterationBehaviour>(
    ctx: &mut VirtualUserContext,
    share: usize,
    behaviour: &B,
    metrics: &MetricsAggregator,
    state: &RunStateMachine,
    undispatched: &AtomicUsize,
    cancelled: &AtomicBool,
) {
    log::debug!(
        "Virtual user {} starting with {} iterations",
        ctx.virtual_user_id(),
        share
    );

    for iteration in 0..share {
        if ctx.shutdown_listener().should_shutdown() {
            log::debug!(
                "Stopping virtual user {} after {} of {} iterations",
                ctx.virtual_user_id(),
                iteration,
                share
            );
            cancelled.store(true, Ordering::Release);
            state.drain();
            break;
        }

        // The last iteration of the run has been handed out, nothing else will be dispatched.
        if undispatched.fetch_sub(1, Ordering::AcqRel) == 1 {
            state.drain();
        }

        ctx.set_iteration(iteration);
        let result = behaviour.run_iteration(ctx);
        metrics.record(result);
    }

    log::debug!("Virtual user {} finished", ctx.virtual_user_id());
}
