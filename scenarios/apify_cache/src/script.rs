use std::time::Duration;

use cache_tunnel_runner::prelude::*;
use http_client_instrumented::prelude::RequestClient;
use url::form_urlencoded;

use crate::cache_key::{CacheKey, CacheKeyGenerator};

/// `GET {api_base_url}/apify?url={derived_url}`
pub fn apify_url(api_base_url: &str, derived_url: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("url", derived_url)
        .finish();
    format!("{api_base_url}/apify?{query}")
}

/// `GET {api_base_url}/apify?analysis=yes&url={derived_url}`
pub fn analyze_url(api_base_url: &str, derived_url: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("analysis", "yes")
        .append_pair("url", derived_url)
        .finish();
    format!("{api_base_url}/apify?{query}")
}

/// The endpoint the apify service serves for a cache slot.
pub fn default_fetch_url(api_base_url: &str, content_hash: &str) -> String {
    format!("{api_base_url}/api/{content_hash}")
}

/// One iteration of the benchmark: apify, analyze, then the timed fetch calls.
///
/// Calls are made one at a time and a failed call never stops the iteration, so every iteration
/// records exactly `2 + fetch_count_per_iteration` outcomes.
pub struct IterationScript<C: RequestClient> {
    client: C,
    key_gen: CacheKeyGenerator,
}

impl<C: RequestClient> IterationScript<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            key_gen: CacheKeyGenerator,
        }
    }

    pub fn run(&self, ctx: &mut VirtualUserContext) -> IterationResult {
        let config = ctx.config();
        let nonce = ctx.nonce();

        let key = match self.key_gen.generate(config.base_resource_url(), &nonce) {
            Ok(key) => Some(key),
            Err(e) => {
                log::error!(
                    "Virtual user {} cannot build a cache key, recording iteration {} as failed: {e}",
                    ctx.virtual_user_id(),
                    ctx.iteration()
                );
                None
            }
        };

        let mut result = IterationResult::builder(
            ctx.virtual_user_id(),
            ctx.iteration(),
            key.as_ref().map(CacheKey::content_hash).unwrap_or_default(),
        );

        let api_base_url = config.api_base_url();
        let apify = key.as_ref().map(|k| apify_url(api_base_url, k.derived_url()));
        result.record(RequestRole::Apify, self.get(apify.as_deref()));

        let analyze = key.as_ref().map(|k| analyze_url(api_base_url, k.derived_url()));
        result.record(RequestRole::Analyze, self.get(analyze.as_deref()));

        let fetch = match config.fetch_url() {
            Some(url) => Some(url.to_string()),
            None => key
                .as_ref()
                .map(|k| default_fetch_url(api_base_url, k.content_hash())),
        };
        let fetch_count = config.fetch_count_per_iteration();
        let delay = config.inter_request_delay();
        let delay_after_last_fetch = config.delay_after_last_fetch();
        for fetch_index in 0..fetch_count {
            result.record(RequestRole::Fetch, self.get(fetch.as_deref()));

            if fetch_index + 1 < fetch_count || delay_after_last_fetch {
                ctx.pause(delay);
            }
        }

        result.finish()
    }

    fn get(&self, url: Option<&str>) -> RequestOutcome {
        match url {
            Some(url) => self.client.get(url),
            None => RequestOutcome::transport_failure(
                "",
                TransportErrorKind::InvalidRequest,
                Duration::ZERO,
            ),
        }
    }
}

impl<C: RequestClient + 'static> IterationBehaviour for IterationScript<C> {
    fn run_iteration(&self, ctx: &mut VirtualUserContext) -> IterationResult {
        self.run(ctx)
    }
}
