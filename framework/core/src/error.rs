/// Return this error when the configuration of a run cannot be used.
///
/// This is raised during setup, before any virtual user has started. Nothing is sent to the target
/// service when a run fails with this error.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("Invalid input: {msg}")]
pub struct InvalidInputError {
    msg: String,
}

impl InvalidInputError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

/// Returned when a summary is requested before every virtual user has finished.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("{msg}")]
pub struct RunNotCompleteError {
    msg: String,
}

impl Default for RunNotCompleteError {
    fn default() -> Self {
        Self {
            msg: "Run has not completed, summary is not available yet".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_display_includes_message() {
        let err = InvalidInputError::new("nonce must not be empty");
        assert_eq!("Invalid input: nonce must not be empty", err.to_string());
        assert_eq!("nonce must not be empty", err.message());
    }

    #[test]
    fn errors_survive_anyhow_round_trip() {
        let err: anyhow::Error = RunNotCompleteError::default().into();
        assert!(err.is::<RunNotCompleteError>());
        assert!(!err.is::<InvalidInputError>());
    }
}
