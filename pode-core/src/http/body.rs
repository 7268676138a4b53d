//! Automatic body decoding driven by `Content-Type`, per the spec: JSON,
//! XML (kept as raw text — a full XML DOM is outside this crate's scope),
//! form-urlencoded, and a minimal multipart/form-data split.

use std::collections::HashMap;

/// The decoded form of a request body, chosen by `Content-Type`.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Raw,
    Json(serde_json::Value),
    Xml(String),
    Form(HashMap<String, String>),
    Multipart(Vec<MultipartPart>),
}

#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

pub fn decode_body(content_type: Option<&str>, raw: &[u8]) -> Body {
    let Some(content_type) = content_type else {
        return Body::Raw;
    };
    let ct = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();

    match ct.as_str() {
        "application/json" => serde_json::from_slice(raw)
            .map(Body::Json)
            .unwrap_or(Body::Raw),
        "application/xml" | "text/xml" => {
            String::from_utf8(raw.to_vec()).map(Body::Xml).unwrap_or(Body::Raw)
        }
        "application/x-www-form-urlencoded" => {
            let text = String::from_utf8_lossy(raw);
            let map = text
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
            Body::Form(map)
        }
        "multipart/form-data" => {
            let boundary = content_type
                .split(';')
                .find_map(|p| p.trim().strip_prefix("boundary="))
                .map(|b| b.trim_matches('"').to_string());
            match boundary {
                Some(b) => Body::Multipart(parse_multipart(raw, &b)),
                None => Body::Raw,
            }
        }
        _ => Body::Raw,
    }
}

fn parse_multipart(raw: &[u8], boundary: &str) -> Vec<MultipartPart> {
    let delimiter = format!("--{boundary}");
    let text_chunks: Vec<&[u8]> = split_on(raw, delimiter.as_bytes());
    let mut parts = Vec::new();

    for chunk in text_chunks {
        let chunk = trim_crlf(chunk);
        if chunk.is_empty() || chunk == b"--" {
            continue;
        }
        let Some(header_end) = find_subslice(chunk, b"\r\n\r\n") else {
            continue;
        };
        let header_bytes = &chunk[..header_end];
        let body = &chunk[header_end + 4..];
        let headers = String::from_utf8_lossy(header_bytes);

        let mut name = String::new();
        let mut filename = None;
        let mut content_type = None;
        for line in headers.lines() {
            if let Some(rest) = line.strip_prefix("Content-Disposition:") {
                for field in rest.split(';') {
                    let field = field.trim();
                    if let Some(v) = field.strip_prefix("name=") {
                        name = v.trim_matches('"').to_string();
                    } else if let Some(v) = field.strip_prefix("filename=") {
                        filename = Some(v.trim_matches('"').to_string());
                    }
                }
            } else if let Some(rest) = line.strip_prefix("Content-Type:") {
                content_type = Some(rest.trim().to_string());
            }
        }

        parts.push(MultipartPart {
            name,
            filename,
            content_type,
            data: trim_crlf(body).to_vec(),
        });
    }

    parts
}

fn trim_crlf(mut b: &[u8]) -> &[u8] {
    while b.ends_with(b"\r\n") {
        b = &b[..b.len() - 2];
    }
    while b.starts_with(b"\r\n") {
        b = &b[2..];
    }
    b
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find_subslice(rest, needle) {
        out.push(&rest[..pos]);
        rest = &rest[pos + needle.len()..];
    }
    out.push(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_json_body() {
        let body = decode_body(Some("application/json"), br#"{"a":1}"#);
        match body {
            Body::Json(v) => assert_eq!(v["a"], 1),
            _ => panic!("expected json"),
        }
    }

    #[test]
    fn decodes_form_urlencoded_body() {
        let body = decode_body(
            Some("application/x-www-form-urlencoded"),
            b"username=alice&password=hunter%202",
        );
        match body {
            Body::Form(map) => {
                assert_eq!(map.get("username"), Some(&"alice".to_string()));
                assert_eq!(map.get("password"), Some(&"hunter 2".to_string()));
            }
            _ => panic!("expected form"),
        }
    }

    #[test]
    fn decodes_multipart_body() {
        let boundary = "XYZ";
        let raw = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"field\"\r\n\r\nvalue\r\n--{b}--\r\n",
            b = boundary
        );
        let body = decode_body(
            Some(&format!("multipart/form-data; boundary={boundary}")),
            raw.as_bytes(),
        );
        match body {
            Body::Multipart(parts) => {
                assert_eq!(parts.len(), 1);
                assert_eq!(parts[0].name, "field");
                assert_eq!(parts[0].data, b"value");
            }
            _ => panic!("expected multipart"),
        }
    }
}
