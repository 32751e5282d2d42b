//! Unified error type for Tally operations.
//!
//! A single flat enum keeps the error surface small: the only failures this
//! system produces are bad configuration, bounded-await timeouts, and
//! execution contexts disappearing with work still queued on them.

/// Unified error type for all Tally operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TallyError {
    /// Invalid input or configuration.
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input.
        message: String,
    },

    /// A bounded await expired before the operation completed.
    #[error("Timeout: {message}")]
    Timeout {
        /// Description of what timed out.
        message: String,
    },

    /// An execution context dropped queued work before completing it.
    #[error("Context lost: {message}")]
    ContextLost {
        /// Description of the lost work.
        message: String,
    },

    /// Internal failure (runtime construction, thread spawn).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal failure.
        message: String,
    },
}

impl TallyError {
    /// Create an invalid input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a lost-context error.
    pub fn context_lost(message: impl Into<String>) -> Self {
        Self::ContextLost {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
