//! Error handling module
//!
//! Structured error types for the negotiation helper. Guesser-time
//! provider failures are logged and swallowed by the callers in this
//! crate (another guesser may still produce a viable selection);
//! acquisition-time failures are surfaced verbatim through these types.

use thiserror::Error;

use crate::providers::ProviderError;

/// Main error type for negotiation and credential acquisition
#[derive(Error, Debug)]
pub enum NahError {
    /// No username was supplied and none could be resolved from the OS
    #[error("no username available: {0}")]
    NoUsername(String),

    /// The guessers produced zero candidate selections
    #[error("no authentication mechanism available: {0}")]
    NoMechanism(String),

    /// The session was canceled while the operation was pending
    #[error("operation canceled: {0}")]
    Canceled(String),

    /// A provider reported a failure during acquisition
    #[error("{mech} provider failure ({code}): {message}")]
    ProviderFailure {
        mech: &'static str,
        code: i32,
        message: String,
    },

    /// A name or key could not be parsed
    #[error("failed to parse: {0}")]
    ParseFailure(String),

    /// Realm discovery or preference lookup failed
    #[error("I/O failure: {0}")]
    IoFailure(String),
}

impl NahError {
    /// Wraps a provider error, tagging it with the mechanism it came from.
    pub(crate) fn provider(mech: &'static str, err: ProviderError) -> Self {
        NahError::ProviderFailure {
            mech,
            code: err.code,
            message: err.message,
        }
    }

    /// Acquisition was requested with neither a password nor a certificate.
    pub(crate) fn insufficient_credentials(mech: &'static str) -> Self {
        NahError::ProviderFailure {
            mech,
            code: 0,
            message: "insufficient credentials: no password or certificate".to_string(),
        }
    }
}

impl From<std::io::Error> for NahError {
    fn from(err: std::io::Error) -> Self {
        NahError::IoFailure(err.to_string())
    }
}

/// Result type alias for negotiation operations
pub type Result<T> = std::result::Result<T, NahError>;
