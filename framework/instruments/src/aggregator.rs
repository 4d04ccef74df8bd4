use std::collections::BTreeMap;
use std::time::Duration;

use cache_tunnel_core::prelude::RunNotCompleteError;
use cache_tunnel_summary_model::{LatencySummary, RequestRole, RoleSummary, RunSummary};
use parking_lot::Mutex;

use crate::outcome::{IterationResult, RequestOutcome};

#[derive(Debug, Default)]
struct RoleAccumulator {
    total: usize,
    successes: usize,
    errors: usize,
    transport_errors: usize,
    status_counts: BTreeMap<u16, usize>,
    body_bytes: u64,
    success_latencies: Vec<Duration>,
}

impl RoleAccumulator {
    fn add(&mut self, outcome: &RequestOutcome) {
        self.total += 1;
        self.body_bytes += outcome.body_size;

        if outcome.error.is_some() {
            self.transport_errors += 1;
        } else {
            *self.status_counts.entry(outcome.status_code).or_default() += 1;
        }

        if outcome.is_success() {
            self.successes += 1;
            self.success_latencies.push(outcome.latency);
        } else {
            self.errors += 1;
        }
    }

    fn summarize(&self) -> RoleSummary {
        RoleSummary {
            total: self.total,
            successes: self.successes,
            errors: self.errors,
            transport_errors: self.transport_errors,
            status_counts: self.status_counts.clone(),
            body_bytes: self.body_bytes,
            latency: LatencySummary::from_durations(&self.success_latencies),
        }
    }
}

#[derive(Debug)]
struct AggregatorState {
    iterations: usize,
    iteration_times: Vec<Duration>,
    roles: BTreeMap<RequestRole, RoleAccumulator>,
    completed: bool,
}

/// Collects the results of every iteration in a run.
///
/// Shared by all virtual users. Recording takes a lock so that the counts are exact regardless of
/// how the virtual users interleave.
#[derive(Debug)]
pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState {
                iterations: 0,
                iteration_times: Vec::new(),
                roles: RequestRole::ALL
                    .into_iter()
                    .map(|role| (role, RoleAccumulator::default()))
                    .collect(),
                completed: false,
            }),
        }
    }

    pub fn record(&self, result: IterationResult) {
        let mut state = self.state.lock();
        if state.completed {
            log::warn!(
                "Dropping iteration {} from virtual user {} because the run has already completed",
                result.iteration(),
                result.virtual_user()
            );
            return;
        }

        state.iterations += 1;
        state.iteration_times.push(result.elapsed());
        for (role, outcome) in result.outcomes() {
            state.roles.entry(*role).or_default().add(outcome);
        }
    }

    pub fn iterations_recorded(&self) -> usize {
        self.state.lock().iterations
    }

    /// Called by the scheduler once every virtual user has finished. After this no more results
    /// are accepted and [MetricsAggregator::summarize] becomes available.
    pub fn mark_completed(&self) {
        self.state.lock().completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.state.lock().completed
    }

    /// Summarise everything recorded. Can be called any number of times once the run is complete
    /// and always returns the same summary.
    pub fn summarize(&self) -> anyhow::Result<RunSummary> {
        let state = self.state.lock();
        if !state.completed {
            return Err(RunNotCompleteError::default().into());
        }

        Ok(RunSummary {
            iterations: state.iterations,
            roles: state
                .roles
                .iter()
                .map(|(role, acc)| (*role, acc.summarize()))
                .collect(),
            iteration_latency: LatencySummary::from_durations(&state.iteration_times),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::TransportErrorKind;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn outcome(status_code: u16, latency_ms: u64) -> RequestOutcome {
        RequestOutcome {
            url: "http://localhost".to_string(),
            status_code,
            latency: Duration::from_millis(latency_ms),
            body_size: 100,
            error: None,
        }
    }

    fn iteration(vu: usize, index: usize, fetch_count: usize) -> IterationResult {
        let mut builder = IterationResult::builder(vu, index, "hash");
        builder.record(RequestRole::Apify, outcome(200, 50));
        builder.record(RequestRole::Analyze, outcome(200, 80));
        for _ in 0..fetch_count {
            builder.record(RequestRole::Fetch, outcome(200, 5));
        }
        builder.finish()
    }

    #[test]
    fn summarize_before_completion_fails() {
        let aggregator = MetricsAggregator::new();
        aggregator.record(iteration(0, 0, 1));

        let err = aggregator.summarize().unwrap_err();
        assert!(err.is::<RunNotCompleteError>());
    }

    #[test]
    fn fetch_count_is_iterations_times_fetches() {
        let aggregator = MetricsAggregator::new();
        for i in 0..7 {
            aggregator.record(iteration(0, i, 4));
        }
        aggregator.mark_completed();

        let summary = aggregator.summarize().unwrap();
        assert_eq!(7, summary.iterations);
        assert_eq!(7, summary.count(RequestRole::Apify));
        assert_eq!(7, summary.count(RequestRole::Analyze));
        assert_eq!(28, summary.count(RequestRole::Fetch));
        assert_eq!(0, summary.total_errors());
    }

    #[test]
    fn summarize_is_idempotent() {
        let aggregator = MetricsAggregator::new();
        aggregator.record(iteration(0, 0, 2));
        aggregator.mark_completed();

        assert_eq!(aggregator.summarize().unwrap(), aggregator.summarize().unwrap());
    }

    #[test]
    fn records_after_completion_are_dropped() {
        let aggregator = MetricsAggregator::new();
        aggregator.record(iteration(0, 0, 2));
        aggregator.mark_completed();
        let before = aggregator.summarize().unwrap();

        aggregator.record(iteration(0, 1, 2));

        assert_eq!(before, aggregator.summarize().unwrap());
        assert_eq!(1, aggregator.iterations_recorded());
    }

    #[test]
    fn failures_are_counted_per_role() {
        let aggregator = MetricsAggregator::new();
        let mut builder = IterationResult::builder(0, 0, "hash");
        builder.record(RequestRole::Apify, outcome(502, 30));
        builder.record(RequestRole::Analyze, outcome(200, 40));
        builder.record(
            RequestRole::Fetch,
            RequestOutcome::transport_failure("http://x", TransportErrorKind::Timeout, Duration::from_secs(1)),
        );
        builder.record(RequestRole::Fetch, outcome(200, 6));
        aggregator.record(builder.finish());
        aggregator.mark_completed();

        let summary = aggregator.summarize().unwrap();

        let apify = summary.role(RequestRole::Apify).unwrap();
        assert_eq!(1, apify.errors);
        assert_eq!(0, apify.transport_errors);
        assert_eq!(BTreeMap::from([(502, 1)]), apify.status_counts);
        assert_eq!(None, apify.latency);

        let fetch = summary.role(RequestRole::Fetch).unwrap();
        assert_eq!(2, fetch.total);
        assert_eq!(1, fetch.successes);
        assert_eq!(1, fetch.transport_errors);
        assert_eq!(BTreeMap::from([(200, 1)]), fetch.status_counts);
        assert_eq!(6.0, fetch.latency.unwrap().max_ms);

        assert_eq!(2, summary.total_errors());
    }

    #[test]
    fn concurrent_records_are_exact() {
        let aggregator = Arc::new(MetricsAggregator::new());

        let handles = (0..8)
            .map(|vu| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        aggregator.record(iteration(vu, i, 3));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        aggregator.mark_completed();

        let summary = aggregator.summarize().unwrap();
        assert_eq!(2000, summary.iterations);
        assert_eq!(2000, summary.successes(RequestRole::Apify));
        assert_eq!(6000, summary.successes(RequestRole::Fetch));
        assert_eq!(
            200_000 + 200_000 + 600_000,
            summary.roles.values().map(|r| r.body_bytes).sum::<u64>()
        );
    }

    #[test]
    fn empty_run_still_lists_every_role() {
        let aggregator = MetricsAggregator::new();
        aggregator.mark_completed();

        let summary = aggregator.summarize().unwrap();
        assert_eq!(0, summary.iterations);
        assert_eq!(3, summary.roles.len());
        assert_eq!(None, summary.iteration_latency);
    }

    #[test]
    fn iteration_wall_time_is_summarised() {
        let aggregator = MetricsAggregator::new();
        for i in 0..3 {
            let mut builder = IterationResult::builder(0, i, "hash");
            builder.record(RequestRole::Apify, outcome(200, 1));
            std::thread::sleep(Duration::from_millis(20));
            aggregator.record(builder.finish());
        }
        aggregator.mark_completed();

        let iteration_latency = aggregator.summarize().unwrap().iteration_latency.unwrap();
        assert!(iteration_latency.min_ms >= 20.0);
        assert!(iteration_latency.max_ms >= iteration_latency.p50_ms);
    }
}
