//! Loads a `rustls::ServerConfig` from an endpoint's [`TlsMaterial`].
//! Generalized from the teacher's `server_dummy.rs::load_rustls_config`,
//! which reads a fixed cert/key pair off disk; this version dispatches on
//! the endpoint's TLS kind and adds the client-certificate verifier mode
//! the spec's "allow, don't require" option needs.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as RustlsServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use crate::endpoint::TlsMaterial;
use crate::error::{PodeError, Result};

pub fn load_server_config(material: &TlsMaterial, allow_client_certificate: bool) -> Result<Arc<RustlsServerConfig>> {
    let (certs, key) = match material {
        TlsMaterial::CertKeyPair { cert_path, key_path } => load_cert_key_pair(cert_path, key_path)?,
        TlsMaterial::SelfSigned => {
            return Err(PodeError::Configuration(
                "self-signed certificate generation is not implemented; supply a cert/key pair".into(),
            ))
        }
        TlsMaterial::Thumbprint(thumbprint) => {
            return Err(PodeError::Configuration(format!(
                "platform certificate store lookup by thumbprint '{thumbprint}' is not supported on this platform"
            )))
        }
    };

    let builder = RustlsServerConfig::builder();

    let config = if allow_client_certificate {
        let roots = RootCertStore::empty();
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .allow_unauthenticated()
            .build()
            .map_err(|e| PodeError::TlsHandshake(format!("cannot build client verifier: {e}")))?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| PodeError::TlsHandshake(e.to_string()))?
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| PodeError::TlsHandshake(e.to_string()))?
    };

    Ok(Arc::new(config))
}

fn load_cert_key_pair(cert_path: &str, key_path: &str) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_file = File::open(cert_path)
        .map_err(|e| PodeError::Configuration(format!("cannot open certificate {cert_path}: {e}")))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| PodeError::Configuration(format!("cannot parse certificate {cert_path}: {e}")))?;
    if certs.is_empty() {
        return Err(PodeError::Configuration(format!("no certificates found in {cert_path}")));
    }

    let key_file = File::open(key_path)
        .map_err(|e| PodeError::Configuration(format!("cannot open private key {key_path}: {e}")))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .map_err(|e| PodeError::Configuration(format!("cannot parse private key {key_path}: {e}")))?
        .ok_or_else(|| PodeError::Configuration(format!("no private key found in {key_path}")))?;

    Ok((certs, key))
}
