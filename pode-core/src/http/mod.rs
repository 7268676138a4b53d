//! HTTP/1.1 request and response types plus the wire parser. Body handling
//! follows `Content-Length` or `Transfer-Encoding: chunked`; `Content-Type`
//! drives automatic decoding for the forms the spec names.

mod body;
mod parser;

pub use body::{decode_body, Body};
pub use parser::{parse_request, ParseOutcome};

use std::collections::HashMap;

use crate::router::Method;

/// A fully parsed HTTP/1.1 request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub raw_method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub version_minor: u8,
    pub headers: Vec<(String, String)>,
    pub cookies: HashMap<String, String>,
    pub body: Vec<u8>,
    pub decoded_body: Body,
    /// `true` when `Connection` is absent/`keep-alive` on HTTP/1.1.
    pub keep_alive: bool,
    /// `true` when the handshake headers for a WebSocket upgrade are present
    /// and valid (`Upgrade: websocket`, `Connection: Upgrade`, a well-formed
    /// `Sec-WebSocket-Key`).
    pub is_upgrade: bool,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response under construction. Defaults to `200 OK` with no body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }
}

impl HttpResponse {
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.set_header("Content-Type", "application/json");
        self.body = serde_json::to_vec(value).unwrap_or_default();
        self
    }

    /// Serializes the status line, headers, and body to the wire format.
    pub fn to_bytes(&self, keep_alive: bool) -> Vec<u8> {
        let reason = reason_phrase(self.status);
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        let mut wrote_content_length = false;
        let mut wrote_connection = false;
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                wrote_content_length = true;
            }
            if name.eq_ignore_ascii_case("connection") {
                wrote_connection = true;
            }
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        if !wrote_content_length {
            out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        if !wrote_connection {
            out.push_str(&format!(
                "Connection: {}\r\n",
                if keep_alive { "keep-alive" } else { "close" }
            ));
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
