use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use apify_cache::{run_scenario_with_client, IterationScript};
use cache_tunnel_runner::prelude::*;
use http_client_instrumented::prelude::RequestClient;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// Answers every request with a 200 and counts calls by path.
#[derive(Default)]
struct StubApi {
    apify: AtomicUsize,
    analyze: AtomicUsize,
    fetch: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl RequestClient for StubApi {
    fn get(&self, url: &str) -> RequestOutcome {
        if url.contains("analysis=yes") {
            self.analyze.fetch_add(1, Ordering::SeqCst);
        } else if url.contains("/apify?") {
            self.apify.fetch_add(1, Ordering::SeqCst);
        } else {
            self.fetch.fetch_add(1, Ordering::SeqCst);
        }
        self.urls.lock().push(url.to_string());

        RequestOutcome {
            url: url.to_string(),
            status_code: 200,
            latency: Duration::from_millis(1),
            body_size: 128,
            error: None,
        }
    }
}

fn config() -> RunConfigBuilder {
    RunConfig::builder()
        .api_base_url("http://localhost:8001")
        .base_resource_url("http://localhost:8000/data.csv")
        .nonce("2")
}

#[test]
fn single_user_single_iteration() {
    let stub = Arc::new(StubApi::default());
    let config = config()
        .virtual_user_count(1)
        .total_iterations(1)
        .fetch_count_per_iteration(10)
        .inter_request_delay(Duration::from_millis(100))
        .build()
        .unwrap();

    let started = Instant::now();
    let summary = run_scenario_with_client(config, stub.clone()).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(1, summary.iterations);
    assert_eq!(1, summary.successes(RequestRole::Apify));
    assert_eq!(1, summary.successes(RequestRole::Analyze));
    assert_eq!(10, summary.successes(RequestRole::Fetch));
    assert_eq!(0, summary.total_errors());
    assert!(elapsed >= Duration::from_millis(1000), "took {elapsed:?}");
    assert!(summary.iteration_latency.unwrap().min_ms >= 1000.0);

    assert_eq!(1, stub.apify.load(Ordering::SeqCst));
    assert_eq!(1, stub.analyze.load(Ordering::SeqCst));
    assert_eq!(10, stub.fetch.load(Ordering::SeqCst));
}

#[test]
fn default_shape_spreads_iterations_over_users() {
    let stub = Arc::new(StubApi::default());
    let config = config()
        .virtual_user_count(10)
        .total_iterations(20)
        .fetch_count_per_iteration(3)
        .inter_request_delay(Duration::from_millis(1))
        .build()
        .unwrap();

    let summary = run_scenario_with_client(config, stub.clone()).unwrap();

    assert_eq!(20, summary.iterations);
    assert_eq!(20, summary.count(RequestRole::Apify));
    assert_eq!(20, summary.count(RequestRole::Analyze));
    assert_eq!(60, summary.count(RequestRole::Fetch));
    assert_eq!(100, summary.total_requests());

    assert_eq!(20, stub.apify.load(Ordering::SeqCst));
    assert_eq!(60, stub.fetch.load(Ordering::SeqCst));
}

#[test]
fn shared_nonce_targets_one_cache_slot() {
    let stub = Arc::new(StubApi::default());
    let config = config()
        .virtual_user_count(4)
        .total_iterations(8)
        .fetch_count_per_iteration(2)
        .inter_request_delay(Duration::ZERO)
        .build()
        .unwrap();

    run_scenario_with_client(config, stub.clone()).unwrap();

    let urls = stub.urls.lock();
    let fetch_urls = urls
        .iter()
        .filter(|url| url.contains("/api/"))
        .collect::<std::collections::HashSet<_>>();
    assert_eq!(1, fetch_urls.len());
}

#[test]
fn deadline_cancels_the_benchmark() {
    let stub = Arc::new(StubApi::default());
    let config = config()
        .virtual_user_count(2)
        .total_iterations(1000)
        .fetch_count_per_iteration(2)
        .inter_request_delay(Duration::from_millis(20))
        .deadline(Duration::from_millis(300))
        .build()
        .unwrap();

    let scheduler = VirtualUserScheduler::new(config).unwrap();
    let summary = scheduler
        .run_scenario(Arc::new(IterationScript::new(stub.clone())))
        .unwrap();

    assert!(scheduler.was_cancelled());
    assert_eq!(RunState::Completed, scheduler.state());
    assert!(summary.iterations > 0);
    assert!(summary.iterations < 1000);

    // Iterations in progress at the deadline still complete, so every recorded iteration has all
    // of its calls.
    assert_eq!(summary.iterations, summary.count(RequestRole::Apify));
    assert_eq!(summary.iterations, summary.count(RequestRole::Analyze));
    assert_eq!(summary.iterations * 2, summary.count(RequestRole::Fetch));
    assert_eq!(summary.iterations * 2, stub.fetch.load(Ordering::SeqCst));
}
