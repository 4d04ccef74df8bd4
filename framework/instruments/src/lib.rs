mod aggregator;
mod outcome;
mod report;

use std::time::Instant;

pub use aggregator::MetricsAggregator;
pub use cache_tunnel_summary_model::{LatencySummary, RequestRole, RoleSummary, RunSummary};
pub use outcome::{
    IterationResult, IterationResultBuilder, RequestOutcome, TransportErrorKind,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use report::{print_summary, summary_table};

/// Times a single request from the moment it is created until it is completed.
pub struct OperationRecord {
    url: String,
    started: Instant,
}

impl OperationRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            started: Instant::now(),
        }
    }

    /// The request got a response. Any status is accepted here, success is decided later.
    pub fn complete(self, status_code: u16, body_size: u64) -> RequestOutcome {
        let latency = self.started.elapsed();
        log::trace!(
            "GET {} returned {} in {}ms",
            self.url,
            status_code,
            latency.as_millis()
        );

        RequestOutcome {
            url: self.url,
            status_code,
            latency,
            body_size,
            error: None,
        }
    }

    /// The request never got a usable response.
    pub fn fail(self, kind: TransportErrorKind) -> RequestOutcome {
        let latency = self.started.elapsed();
        log::trace!(
            "GET {} failed after {}ms: {}",
            self.url,
            latency.as_millis(),
            kind
        );

        RequestOutcome::transport_failure(self.url, kind, latency)
    }
}
