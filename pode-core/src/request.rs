//! The per-connection state machine: `New -> Open -> Receiving -> Received
//! -> Processing`, looping back to `Receiving` on keep-alive or falling to
//! `Closed`; `Error`/`SslError` are terminal. Grounded on the teacher's
//! `server_speak.rs` connection task, which drives an implicit version of
//! this same cycle inline in its accept-loop body — this crate makes the
//! states explicit so the listener can report on or recover from each one.

use crate::error::{PodeError, Result};
use crate::http::{parse_request, ParseOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Open,
    Receiving,
    Received,
    Processing,
    Closed,
    Error(String),
    SslError(String),
}

/// Accumulates bytes for one connection and drives it through
/// [`ConnectionState`] as requests are parsed and answered.
pub struct RequestContext {
    state: ConnectionState,
    buffer: Vec<u8>,
    pub endpoint_name: Option<String>,
}

impl RequestContext {
    pub fn new(endpoint_name: Option<String>) -> Self {
        Self {
            state: ConnectionState::New,
            buffer: Vec::new(),
            endpoint_name,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn open(&mut self) {
        self.state = ConnectionState::Open;
    }

    pub fn mark_ssl_error(&mut self, message: impl Into<String>) {
        self.state = ConnectionState::SslError(message.into());
    }

    /// Appends newly read bytes and attempts to parse one complete
    /// request. Returns `Ok(None)` if more bytes are needed.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<crate::http::HttpRequest>> {
        self.state = ConnectionState::Receiving;
        self.buffer.extend_from_slice(bytes);

        match parse_request(&self.buffer) {
            Ok(ParseOutcome::Incomplete) => Ok(None),
            Ok(ParseOutcome::Complete { request, consumed }) => {
                self.buffer.drain(..consumed);
                self.state = ConnectionState::Received;
                Ok(Some(request))
            }
            Err(e) => {
                self.state = ConnectionState::Error(e.to_string());
                Err(e)
            }
        }
    }

    pub fn begin_processing(&mut self) {
        self.state = ConnectionState::Processing;
    }

    /// Call once a response has been written. `keep_alive` decides whether
    /// the connection loops back to receive another pipelined request or
    /// closes.
    pub fn finish_response(&mut self, keep_alive: bool) {
        self.state = if keep_alive {
            ConnectionState::Receiving
        } else {
            ConnectionState::Closed
        };
    }

    pub fn fail(&mut self, err: &PodeError) {
        self.state = ConnectionState::Error(err.to_string());
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Closed | ConnectionState::Error(_) | ConnectionState::SslError(_)
        )
    }

    /// Whether another pipelined request might still be sitting in the
    /// buffer (relevant after draining one request off a keep-alive
    /// connection).
    pub fn has_buffered_bytes(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feeds_partial_then_complete_request() {
        let mut ctx = RequestContext::new(None);
        ctx.open();
        assert!(ctx.feed(b"GET / HTTP/1.1\r\nHost: x").unwrap().is_none());
        assert_eq!(*ctx.state(), ConnectionState::Receiving);

        let req = ctx.feed(b"\r\n\r\n").unwrap().unwrap();
        assert_eq!(req.path, "/");
        assert_eq!(*ctx.state(), ConnectionState::Received);
    }

    #[test]
    fn keep_alive_loops_back_to_receiving() {
        let mut ctx = RequestContext::new(None);
        ctx.open();
        ctx.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        ctx.begin_processing();
        assert_eq!(*ctx.state(), ConnectionState::Processing);

        ctx.finish_response(true);
        assert_eq!(*ctx.state(), ConnectionState::Receiving);
        assert!(!ctx.is_closed());
    }

    #[test]
    fn non_keep_alive_closes() {
        let mut ctx = RequestContext::new(None);
        ctx.open();
        ctx.feed(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        ctx.finish_response(false);
        assert!(ctx.is_closed());
    }

    #[test]
    fn malformed_request_enters_error_state() {
        let mut ctx = RequestContext::new(None);
        ctx.open();
        assert!(ctx.feed(b"NOT A REQUEST LINE AT ALL\r\n\r\n").is_err());
        assert!(ctx.is_closed());
    }
}
