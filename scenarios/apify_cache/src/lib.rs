//! The apify cache benchmark: every virtual user asks the csvapi service to apify and analyze a
//! resource under a nonce-derived URL, then repeatedly fetches the cached result.

mod cache_key;
mod script;

use std::sync::Arc;

use cache_tunnel_runner::prelude::{RunConfig, RunSummary, VirtualUserScheduler};
use http_client_instrumented::prelude::{HttpClient, RequestClient};

pub use cache_key::{CacheKey, CacheKeyGenerator, NONCE_QUERY_PARAM};
pub use script::{analyze_url, apify_url, default_fetch_url, IterationScript};

/// Run the benchmark against the configured API over HTTP and wait for the summary.
pub fn run_scenario(config: RunConfig) -> anyhow::Result<RunSummary> {
    let client = HttpClient::new(config.request_timeout());
    run_scenario_with_client(config, client)
}

/// Run the benchmark with any [RequestClient], for example a stub in tests.
pub fn run_scenario_with_client<C: RequestClient + 'static>(
    config: RunConfig,
    client: C,
) -> anyhow::Result<RunSummary> {
    VirtualUserScheduler::new(config)?.run_scenario(Arc::new(IterationScript::new(client)))
}
