//! Error kinds for the Pode core, one `thiserror` enum per the propagation
//! policy in the spec's error-handling design: errors attributable to a
//! single request are caught at the request boundary and turned into a
//! response status, everything else bubbles up and terminates the server.

use thiserror::Error;

/// Top-level error type returned by `pode-core` APIs.
///
/// Each variant corresponds one-to-one with an error kind from the design:
/// Configuration and Bind are fatal at startup, the rest are either
/// connection-local or per-request.
#[derive(Debug, Error)]
pub enum PodeError {
    /// Bad endpoint, duplicate name, missing TLS material. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Address in use, permission denied, or a low port without elevated
    /// privileges. Fatal at startup.
    #[error("bind error on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake failure. Connection-local: sets `SslError` and closes.
    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),

    /// Malformed request line, headers, or body. Connection-local.
    #[error("protocol parse error: {0}")]
    ProtocolParse(String),

    /// Authentication failed or could not be completed. Carries the status
    /// code and message to use for the response.
    #[error("auth failed ({code}): {message}")]
    AuthFail { code: u16, message: String },

    /// A route handler, middleware stage, or endware panicked or returned an
    /// error. Logged, converted to a 500 response.
    #[error("handler exception: {0}")]
    HandlerException(String),

    /// A timer or schedule tick raised an error. Logged, the tick is
    /// skipped, the next tick proceeds normally.
    #[error("scheduler tick error in '{job}': {source}")]
    SchedulerTick {
        job: String,
        #[source]
        source: Box<PodeError>,
    },

    /// I/O failure not otherwise classified (socket read/write, file access).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PodeError>;

impl PodeError {
    /// Whether this error kind is attributable to a single request (and so
    /// should be caught at the request boundary rather than bubbled up).
    pub fn is_request_local(&self) -> bool {
        matches!(
            self,
            PodeError::ProtocolParse(_) | PodeError::AuthFail { .. } | PodeError::HandlerException(_)
        )
    }

    /// The HTTP status code a request-local error should be reported as.
    pub fn status_code(&self) -> u16 {
        match self {
            PodeError::ProtocolParse(_) => 400,
            PodeError::AuthFail { code, .. } => *code,
            PodeError::HandlerException(_) => 500,
            _ => 500,
        }
    }
}
