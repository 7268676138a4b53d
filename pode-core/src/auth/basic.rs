//! HTTP Basic (RFC 7617): `Authorization: Basic base64(user:pass)`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::http::HttpRequest;

use super::{Challenge, Credentials, Scheme};

pub struct BasicScheme {
    pub realm: String,
}

impl BasicScheme {
    pub fn new(realm: impl Into<String>) -> Self {
        Self { realm: realm.into() }
    }
}

impl Scheme for BasicScheme {
    fn name(&self) -> &str {
        "Basic"
    }

    fn extract(&self, request: &HttpRequest) -> Result<Credentials, Challenge> {
        let header = request
            .header("authorization")
            .ok_or_else(|| Challenge::unauthorized(format!("Basic realm=\"{}\"", self.realm)))?;

        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| Challenge::unauthorized(format!("Basic realm=\"{}\"", self.realm)))?;

        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| Challenge::bad_request())?;
        let text = String::from_utf8(decoded).map_err(|_| Challenge::bad_request())?;
        let (username, password) = text.split_once(':').ok_or_else(Challenge::bad_request)?;

        Ok(Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Method;
    use std::collections::HashMap;

    fn request_with_auth(header: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            raw_method: "GET".into(),
            path: "/".into(),
            query: HashMap::new(),
            version_minor: 1,
            headers: vec![("Authorization".into(), header.into())],
            cookies: HashMap::new(),
            body: Vec::new(),
            decoded_body: crate::http::Body::Raw,
            keep_alive: true,
            is_upgrade: false,
        }
    }

    #[test]
    fn extracts_username_and_password() {
        let scheme = BasicScheme::new("test");
        let request = request_with_auth("Basic YWxpY2U6c2VjcmV0"); // alice:secret
        match scheme.extract(&request).unwrap() {
            Credentials::Basic { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, "secret");
            }
            _ => panic!("expected basic credentials"),
        }
    }

    #[test]
    fn missing_header_challenges_with_realm() {
        let scheme = BasicScheme::new("test");
        let request = request_with_auth("");
        let request = HttpRequest { headers: Vec::new(), ..request };
        let err = scheme.extract(&request).unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.www_authenticate, Some("Basic realm=\"test\"".to_string()));
    }
}
