//! Transport error classification (§4.5): every failure is bucketed into one
//! of a fixed set of kinds by substring match, since the underlying overlay
//! fabric is an external collaborator and reports errors as opaque strings.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("dial to {target} timed out after {timeout:?}")]
    DialTimeout { target: String, timeout: Duration },

    #[error("send to {target} timed out after {timeout:?}")]
    SendTimeout { target: String, timeout: Duration },

    #[error("close of stream to {target} timed out after {timeout:?}")]
    CloseTimeout { target: String, timeout: Duration },

    #[error("connection to {target} was reset")]
    ConnectionReset { target: String },

    #[error("stream to {target} hit unexpected eof")]
    Eof { target: String },

    #[error("transport error dialing {target}: {message}")]
    Other { target: String, message: String },
}

impl TransportError {
    /// Classify an opaque error message by substring (§4.6 step 5), the way
    /// the router needs to in order to decide whether a retry is worthwhile.
    pub fn classify(target: &str, timeout: Duration, message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("reset") {
            TransportError::ConnectionReset {
                target: target.to_string(),
            }
        } else if lower.contains("eof") || lower.contains("closed") {
            TransportError::Eof {
                target: target.to_string(),
            }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            TransportError::DialTimeout {
                target: target.to_string(),
                timeout,
            }
        } else {
            TransportError::Other {
                target: target.to_string(),
                message: message.to_string(),
            }
        }
    }

    /// A coarse label used for metrics/logging and for the router's retry
    /// classification (§4.6 step 5).
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::DialTimeout { .. } => "dial-timeout",
            TransportError::SendTimeout { .. } => "send-timeout",
            TransportError::CloseTimeout { .. } => "close-timeout",
            TransportError::ConnectionReset { .. } => "connection-reset",
            TransportError::Eof { .. } => "eof",
            TransportError::Other { .. } => "transport-error",
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
