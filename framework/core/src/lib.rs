mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{InvalidInputError, RunNotCompleteError};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
