//! Error types for KV-store operations.

use thiserror::Error;

/// Primary error type for KV operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// The connection to the store was lost or refused.
    #[error("kv connection error: {message}")]
    Connection {
        /// Transport-level detail.
        message: String,
    },
    /// The operation did not complete within the socket timeout.
    #[error("kv operation timed out: {message}")]
    Timeout {
        /// Transport-level detail.
        message: String,
    },
    /// The store answered with something the client could not interpret.
    #[error("kv protocol error: {message}")]
    Protocol {
        /// Transport-level detail.
        message: String,
    },
}

impl KvError {
    /// Whether a retry has a realistic chance of succeeding.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout { message }
        } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            Self::Connection { message }
        } else {
            Self::Protocol { message }
        }
    }
}

/// Convenience alias for KV operation results.
pub type KvResult<T> = Result<T, KvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_timeout_are_retryable() {
        assert!(
            KvError::Connection {
                message: "reset".into()
            }
            .is_retryable()
        );
        assert!(
            KvError::Timeout {
                message: "deadline".into()
            }
            .is_retryable()
        );
        assert!(
            !KvError::Protocol {
                message: "bad reply".into()
            }
            .is_retryable()
        );
    }
}
