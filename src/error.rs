use std::fmt::Display;

/// Failure of a whole operation.
///
/// Decoding problems never show up here: header, body, UTF-7 and base64
/// decoders resolve to a fallback value instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session could not be established or authenticated.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A single protocol command returned a non-success status.
    #[error("{command} failed: {reason}")]
    Protocol {
        command: &'static str,
        reason: String,
    },

    /// Message, attachment or trash match absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Malformed caller input, rejected before any protocol traffic.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The blocking worker running the session was cancelled or panicked.
    #[error("worker task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn protocol(command: &'static str, reason: impl Display) -> Self {
        Error::Protocol {
            command,
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Marks a step as non-fatal: the failure is logged and dropped.
///
/// Call sites that must abort use `?` instead, so every fallible step
/// states which of the two it is.
pub trait Degrade<T> {
    fn or_skip(self, what: &str) -> Option<T>;
}

impl<T> Degrade<T> for Result<T> {
    fn or_skip(self, what: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("{what}: {e} (skipped)");
                None
            }
        }
    }
}
