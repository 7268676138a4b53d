//! Wire-level HTTP/1.1 parsing: request line, headers, and
//! `Content-Length`/chunked body framing.

use std::collections::HashMap;

use crate::error::{PodeError, Result};
use crate::router::Method;

use super::{decode_body, HttpRequest};

/// Outcome of attempting to parse one request out of a connection buffer.
pub enum ParseOutcome {
    /// Not enough bytes buffered yet; caller should read more and retry.
    Incomplete,
    /// A full request was parsed; `consumed` is how many bytes of `buf`
    /// belonged to it, so the caller can drain them before looking for the
    /// next pipelined request.
    Complete { request: HttpRequest, consumed: usize },
}

const MAX_HEADER_BYTES: usize = 64 * 1024;

pub fn parse_request(buf: &[u8]) -> Result<ParseOutcome> {
    let Some(header_end) = find_subslice(buf, b"\r\n\r\n") else {
        if buf.len() > MAX_HEADER_BYTES {
            return Err(PodeError::ProtocolParse("request headers too large".into()));
        }
        return Ok(ParseOutcome::Incomplete);
    };

    let head = std::str::from_utf8(&buf[..header_end])
        .map_err(|_| PodeError::ProtocolParse("request headers are not valid UTF-8".into()))?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let raw_method = parts
        .next()
        .ok_or_else(|| PodeError::ProtocolParse("missing request method".into()))?
        .to_string();
    let target = parts
        .next()
        .ok_or_else(|| PodeError::ProtocolParse("missing request target".into()))?;
    let version = parts
        .next()
        .ok_or_else(|| PodeError::ProtocolParse("missing HTTP version".into()))?;

    let version_minor = match version {
        "HTTP/1.0" => 0,
        "HTTP/1.1" => 1,
        other => {
            return Err(PodeError::ProtocolParse(format!(
                "unsupported HTTP version: {other}"
            )))
        }
    };

    let method = Method::parse(&raw_method)
        .ok_or_else(|| PodeError::ProtocolParse(format!("unsupported method: {raw_method}")))?;

    let (path, query) = split_target(target);

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(PodeError::ProtocolParse(format!("malformed header line: {line}")));
        };
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let header_lookup = |name: &str| -> Option<&str> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    let body_start = header_end + 4;

    let (body, consumed) = if let Some(te) = header_lookup("transfer-encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            match decode_chunked(&buf[body_start..])? {
                Some((body, used)) => (body, body_start + used),
                None => return Ok(ParseOutcome::Incomplete),
            }
        } else {
            return Err(PodeError::ProtocolParse(format!(
                "unsupported transfer-encoding: {te}"
            )));
        }
    } else if let Some(len) = header_lookup("content-length") {
        let len: usize = len
            .trim()
            .parse()
            .map_err(|_| PodeError::ProtocolParse(format!("invalid content-length: {len}")))?;
        if buf.len() < body_start + len {
            return Ok(ParseOutcome::Incomplete);
        }
        (buf[body_start..body_start + len].to_vec(), body_start + len)
    } else {
        (Vec::new(), body_start)
    };

    let cookies = header_lookup("cookie").map(parse_cookie_header).unwrap_or_default();
    let content_type = header_lookup("content-type").map(str::to_string);
    let decoded_body = decode_body(content_type.as_deref(), &body);

    let connection = header_lookup("connection").map(str::to_ascii_lowercase);
    let keep_alive = match (version_minor, connection.as_deref()) {
        (1, Some("close")) => false,
        (1, _) => true,
        (_, Some("keep-alive")) => true,
        _ => false,
    };

    let is_upgrade = header_lookup("upgrade")
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
        && header_lookup("connection")
            .map(|v| v.to_ascii_lowercase().contains("upgrade"))
            .unwrap_or(false)
        && header_lookup("sec-websocket-key").is_some();

    let request = HttpRequest {
        method,
        raw_method,
        path,
        query,
        version_minor,
        headers,
        cookies,
        body,
        decoded_body,
        keep_alive,
        is_upgrade,
    };

    Ok(ParseOutcome::Complete { request, consumed })
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        None => (target.to_string(), HashMap::new()),
        Some((path, query_str)) => {
            let query = query_str
                .split('&')
                .filter(|p| !p.is_empty())
                .filter_map(|pair| {
                    let mut it = pair.splitn(2, '=');
                    let key = it.next()?;
                    let value = it.next().unwrap_or("");
                    Some((
                        urlencoding::decode(key).ok()?.into_owned(),
                        urlencoding::decode(value).ok()?.into_owned(),
                    ))
                })
                .collect();
            (path.to_string(), query)
        }
    }
}

fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            let (name, value) = part.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Decodes a chunked body. Returns `Ok(None)` if the terminating zero-size
/// chunk hasn't arrived yet.
fn decode_chunked(buf: &[u8]) -> Result<Option<(Vec<u8>, usize)>> {
    let mut out = Vec::new();
    let mut pos = 0usize;

    loop {
        let Some(line_end) = find_subslice(&buf[pos..], b"\r\n") else {
            return Ok(None);
        };
        let size_line = std::str::from_utf8(&buf[pos..pos + line_end])
            .map_err(|_| PodeError::ProtocolParse("invalid chunk size line".into()))?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| PodeError::ProtocolParse(format!("invalid chunk size: {size_str}")))?;
        pos += line_end + 2;

        if size == 0 {
            // Trailer section, terminated by a bare CRLF.
            let Some(trailer_end) = find_subslice(&buf[pos..], b"\r\n") else {
                return Ok(None);
            };
            pos += trailer_end + 2;
            return Ok(Some((out, pos)));
        }

        if buf.len() < pos + size + 2 {
            return Ok(None);
        }
        out.extend_from_slice(&buf[pos..pos + size]);
        pos += size + 2;
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get_request() {
        let raw = b"GET /users?active=true HTTP/1.1\r\nHost: example.com\r\n\r\n";
        match parse_request(raw).unwrap() {
            ParseOutcome::Complete { request, consumed } => {
                assert_eq!(request.path, "/users");
                assert_eq!(request.query.get("active"), Some(&"true".to_string()));
                assert!(request.keep_alive);
                assert_eq!(consumed, raw.len());
            }
            ParseOutcome::Incomplete => panic!("expected complete parse"),
        }
    }

    #[test]
    fn incomplete_headers_report_incomplete() {
        let raw = b"GET / HTTP/1.1\r\nHost: example";
        assert!(matches!(parse_request(raw).unwrap(), ParseOutcome::Incomplete));
    }

    #[test]
    fn waits_for_full_content_length_body() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhel";
        assert!(matches!(parse_request(raw).unwrap(), ParseOutcome::Incomplete));

        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        match parse_request(raw).unwrap() {
            ParseOutcome::Complete { request, .. } => assert_eq!(request.body, b"hello"),
            ParseOutcome::Incomplete => panic!("expected complete parse"),
        }
    }

    #[test]
    fn decodes_chunked_body() {
        let raw = b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        match parse_request(raw).unwrap() {
            ParseOutcome::Complete { request, consumed } => {
                assert_eq!(request.body, b"Wikipedia");
                assert_eq!(consumed, raw.len());
            }
            ParseOutcome::Incomplete => panic!("expected complete parse"),
        }
    }

    #[test]
    fn detects_websocket_upgrade_headers() {
        let raw = b"GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        match parse_request(raw).unwrap() {
            ParseOutcome::Complete { request, .. } => assert!(request.is_upgrade),
            ParseOutcome::Incomplete => panic!("expected complete parse"),
        }
    }

    #[test]
    fn parses_cookie_header_into_map() {
        let raw = b"GET / HTTP/1.1\r\nCookie: a=1; b=2\r\n\r\n";
        match parse_request(raw).unwrap() {
            ParseOutcome::Complete { request, .. } => {
                assert_eq!(request.cookies.get("a"), Some(&"1".to_string()));
                assert_eq!(request.cookies.get("b"), Some(&"2".to_string()));
            }
            ParseOutcome::Incomplete => panic!("expected complete parse"),
        }
    }
}
