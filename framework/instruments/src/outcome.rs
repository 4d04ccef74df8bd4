use std::time::{Duration, Instant};

use cache_tunnel_summary_model::RequestRole;

/// Per-call timeout used when the run does not configure one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a request did not produce a response.
#[derive(derive_more::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    #[display("timeout")]
    Timeout,
    #[display("connection refused")]
    ConnectionRefused,
    #[display("host not found")]
    HostNotFound,
    /// The request could not be built, for example because the URL is malformed.
    #[display("invalid request")]
    InvalidRequest,
    #[display("i/o error")]
    Io,
    #[display("transport error")]
    Other,
}

/// The result of a single HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub url: String,
    /// The response status, or 0 when the call failed before a response was received.
    pub status_code: u16,
    pub latency: Duration,
    pub body_size: u64,
    pub error: Option<TransportErrorKind>,
}

impl RequestOutcome {
    pub fn transport_failure(url: impl Into<String>, kind: TransportErrorKind, latency: Duration) -> Self {
        Self {
            url: url.into(),
            status_code: 0,
            latency,
            body_size: 0,
            error: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }
}

/// Everything one virtual user observed during one iteration, in the order the calls were made.
#[derive(Debug, Clone)]
pub struct IterationResult {
    virtual_user: usize,
    iteration: usize,
    cache_key_hash: String,
    outcomes: Vec<(RequestRole, RequestOutcome)>,
    elapsed: Duration,
}

impl IterationResult {
    pub fn builder(
        virtual_user: usize,
        iteration: usize,
        cache_key_hash: impl Into<String>,
    ) -> IterationResultBuilder {
        IterationResultBuilder {
            virtual_user,
            iteration,
            cache_key_hash: cache_key_hash.into(),
            outcomes: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn virtual_user(&self) -> usize {
        self.virtual_user
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn cache_key_hash(&self) -> &str {
        &self.cache_key_hash
    }

    pub fn outcomes(&self) -> &[(RequestRole, RequestOutcome)] {
        &self.outcomes
    }

    pub fn outcomes_for(&self, role: RequestRole) -> impl Iterator<Item = &RequestOutcome> {
        self.outcomes
            .iter()
            .filter(move |(r, _)| *r == role)
            .map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Wall time of the iteration, including any delays between calls.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Collects outcomes while an iteration is in progress. [IterationResultBuilder::finish] consumes
/// the builder so each iteration produces exactly one [IterationResult].
#[derive(Debug)]
pub struct IterationResultBuilder {
    virtual_user: usize,
    iteration: usize,
    cache_key_hash: String,
    outcomes: Vec<(RequestRole, RequestOutcome)>,
    started: Instant,
}

impl IterationResultBuilder {
    pub fn record(&mut self, role: RequestRole, outcome: RequestOutcome) {
        self.outcomes.push((role, outcome));
    }

    pub fn finish(self) -> IterationResult {
        IterationResult {
            virtual_user: self.virtual_user,
            iteration: self.iteration,
            cache_key_hash: self.cache_key_hash,
            outcomes: self.outcomes,
            elapsed: self.started.elapsed(),
        }
    }
}
