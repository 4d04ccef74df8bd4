use std::sync::Arc;
use std::time::Duration;

use cache_tunnel_instruments::{
    OperationRecord, RequestOutcome, TransportErrorKind, DEFAULT_REQUEST_TIMEOUT,
};

/// Issues a single GET request and reports what happened.
///
/// Implementations never fail. Anything that prevents a response from being received is reported
/// through [RequestOutcome::error] with a status code of 0. Implementations must not retry.
pub trait RequestClient: Send + Sync {
    fn get(&self, url: &str) -> RequestOutcome;
}

impl<T: RequestClient + ?Sized> RequestClient for Arc<T> {
    fn get(&self, url: &str) -> RequestOutcome {
        (**self).get(url)
    }
}

/// [RequestClient] backed by a [ureq::Agent].
///
/// The agent pools connections and is shared by every virtual user that holds a clone of this
/// client. Redirects are followed using the ureq default policy. Non-2xx statuses are returned as
/// statuses rather than errors.
#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpClient {
    pub fn new(request_timeout: Duration) -> Self {
        let agent = ureq::config::Config::builder()
            .timeout_global(Some(request_timeout))
            .http_status_as_error(false)
            .build()
            .new_agent();

        Self { agent }
    }
}

impl RequestClient for HttpClient {
    fn get(&self, url: &str) -> RequestOutcome {
        let record = OperationRecord::new(url);

        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(e) => {
                log::debug!("Request to {url} failed: {e}");
                return record.fail(classify_error(&e));
            }
        };

        let status_code = response.status().as_u16();
        let mut body = response.into_body();
        match std::io::copy(&mut body.as_reader(), &mut std::io::sink()) {
            Ok(body_size) => {
                log::trace!("GET {url} returned {status_code} with {body_size} bytes");
                record.complete(status_code, body_size)
            }
            Err(e) => {
                log::debug!("Failed to read response body from {url}: {e}");
                record.fail(classify_io_error(&e))
            }
        }
    }
}

fn classify_error(err: &ureq::Error) -> TransportErrorKind {
    match err {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::HostNotFound,
        ureq::Error::ConnectionFailed => TransportErrorKind::ConnectionRefused,
        ureq::Error::BadUri(_) | ureq::Error::Http(_) => TransportErrorKind::InvalidRequest,
        ureq::Error::Io(e) => classify_io_error(e),
        _ => TransportErrorKind::Other,
    }
}

fn classify_io_error(err: &std::io::Error) -> TransportErrorKind {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => TransportErrorKind::Timeout,
        std::io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
        _ => TransportErrorKind::Io,
    }
}
