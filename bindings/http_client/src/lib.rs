mod client;

pub mod prelude {
    pub use crate::client::{HttpClient, RequestClient};

    // The outcome types are defined by the instruments but are needed by anyone implementing or
    // calling a client, so they are re-exported here.
    pub use cache_tunnel_instruments::{RequestOutcome, TransportErrorKind, DEFAULT_REQUEST_TIMEOUT};
}
