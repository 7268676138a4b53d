//! Client-certificate auth. TLS handshake and peer-certificate
//! verification happen in the listener, below this crate's request
//! pipeline; by the time a request reaches [`ClientCertScheme`], the
//! listener has already surfaced the verified peer certificate's subject
//! (if any) as the `X-Pode-Client-Cert-Subject` pseudo-header it attaches
//! to connections accepted over a `tls_required` endpoint configured to
//! request (not mandate) a client certificate.

use crate::http::HttpRequest;

use super::{Challenge, Credentials, Scheme};

pub struct ClientCertScheme;

impl Scheme for ClientCertScheme {
    fn name(&self) -> &str {
        "ClientCertificate"
    }

    fn extract(&self, request: &HttpRequest) -> std::result::Result<Credentials, Challenge> {
        let subject = request
            .header("x-pode-client-cert-subject")
            .ok_or_else(|| Challenge { status: 401, www_authenticate: None })?;
        Ok(Credentials::ClientCert { subject: subject.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Body;
    use crate::router::Method;
    use std::collections::HashMap;

    #[test]
    fn missing_peer_certificate_is_unauthorized() {
        let request = HttpRequest {
            method: Method::Get,
            raw_method: "GET".into(),
            path: "/".into(),
            query: HashMap::new(),
            version_minor: 1,
            headers: Vec::new(),
            cookies: HashMap::new(),
            body: Vec::new(),
            decoded_body: Body::Raw,
            keep_alive: true,
            is_upgrade: false,
        };
        assert_eq!(ClientCertScheme.extract(&request).unwrap_err().status, 401);
    }
}
