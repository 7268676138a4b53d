//! Per-endpoint accept loop. Generalizes the teacher's
//! `server_speak.rs::tokio_main`, which binds one `TcpListener` and spawns
//! a task per accepted connection, into a loop parameterized over
//! protocol (HTTP/HTTPS/WS/WSS share one path, SMTP another) and endpoint
//! identity, driving each connection through [`crate::request::RequestContext`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::endpoint::{Endpoint, EndpointAddress, Family};
use crate::error::{PodeError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::middleware::RequestEvent;
use crate::request::RequestContext;
use crate::server::ServerContext;
use crate::smtp::{Dialog, Outcome as SmtpOutcome};
use crate::{tls, ws};

trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Binds and serves one endpoint until the server shuts down. Enforces the
/// elevated-privilege-for-low-ports invariant here, at bind time, rather
/// than at registration.
pub async fn serve_endpoint(endpoint: Endpoint, server: Arc<ServerContext>) -> Result<()> {
    if endpoint.requires_elevated_privileges() && !crate::endpoint::has_elevated_privileges() {
        return Err(PodeError::Bind {
            addr: format!("{}:{}", endpoint.address.as_str(), endpoint.port),
            source: std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "binding ports below 1024 requires elevated privileges",
            ),
        });
    }

    let ip = match &endpoint.address {
        EndpointAddress::Ip(ip) => *ip,
        EndpointAddress::Wildcard => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        EndpointAddress::Host(host) => resolve_host(host).await?,
    };
    let socket_addr = SocketAddr::new(ip, endpoint.port);

    let listener = TcpListener::bind(socket_addr)
        .await
        .map_err(|source| PodeError::Bind { addr: socket_addr.to_string(), source })?;
    info!(addr = %socket_addr, protocol = %endpoint.protocol, "listening");

    let tls_acceptor = match &endpoint.tls {
        Some(material) => Some(TlsAcceptor::from(tls::load_server_config(material, endpoint.allow_client_certificate)?)),
        None => None,
    };

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed, continuing");
                continue;
            }
        };

        let server = server.clone();
        let endpoint = endpoint.clone();
        let tls_acceptor = tls_acceptor.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, peer, endpoint, tls_acceptor, server).await {
                debug!(peer = %peer, error = %e, "connection ended with an error");
            }
        });
    }
}

async fn resolve_host(host: &str) -> Result<IpAddr> {
    use tokio::net::lookup_host;
    lookup_host((host, 0))
        .await
        .map_err(|source| PodeError::Bind { addr: host.to_string(), source })?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| PodeError::Configuration(format!("could not resolve host: {host}")))
}

async fn handle_connection(
    socket: TcpStream,
    peer: SocketAddr,
    endpoint: Endpoint,
    tls_acceptor: Option<TlsAcceptor>,
    server: Arc<ServerContext>,
) -> Result<()> {
    socket.set_nodelay(true).ok();

    let (stream, client_cert_subject): (Box<dyn AsyncStream>, Option<String>) = if let Some(acceptor) = tls_acceptor {
        match acceptor.accept(socket).await {
            Ok(tls_stream) => {
                let subject = peer_cert_subject(&tls_stream);
                (Box::new(tls_stream), subject)
            }
            Err(e) => return Err(PodeError::TlsHandshake(e.to_string())),
        }
    } else {
        (Box::new(socket), None)
    };

    match endpoint.protocol.family() {
        Family::Smtp => serve_smtp(stream, server).await,
        Family::Tcp => serve_raw_tcp(stream, peer, server).await,
        Family::Web => serve_http(stream, endpoint, server, client_cert_subject).await,
    }
}

/// Surfaces the verified peer certificate as a pseudo-identity string, read
/// by [`crate::auth::client_cert::ClientCertScheme`] off the
/// `X-Pode-Client-Cert-Subject` header this function's caller attaches.
/// Rather than parsing the certificate's Distinguished Name (no X.509 crate
/// is in the dependency stack), the leaf certificate's SHA-256 fingerprint
/// stands in for its subject — stable per-certificate, sufficient to key an
/// identity lookup against a known set of client certificates.
fn peer_cert_subject(tls_stream: &tokio_rustls::server::TlsStream<TcpStream>) -> Option<String> {
    let (_, connection) = tls_stream.get_ref();
    let leaf = connection.peer_certificates()?.first()?;
    let mut hasher = Sha256::new();
    hasher.update(leaf.as_ref());
    Some(hex::encode(hasher.finalize()))
}

async fn serve_http(
    mut stream: Box<dyn AsyncStream>,
    endpoint: Endpoint,
    server: Arc<ServerContext>,
    client_cert_subject: Option<String>,
) -> Result<()> {
    let mut ctx = RequestContext::new(endpoint.name.clone());
    ctx.open();
    let mut read_buf = vec![0u8; 8192];

    loop {
        let mut request = loop {
            let n = stream.read(&mut read_buf).await.map_err(PodeError::Io)?;
            if n == 0 {
                return Ok(()); // peer closed
            }
            if let Some(request) = ctx.feed(&read_buf[..n])? {
                break request;
            }
        };

        if let Some(subject) = &client_cert_subject {
            request.headers.push(("X-Pode-Client-Cert-Subject".to_string(), subject.clone()));
        }

        if request.is_upgrade {
            let client_id = uuid::Uuid::new_v4().to_string();
            let response = ws::build_handshake_response(&request, &client_id)?;
            stream.write_all(&response.to_bytes(false)).await.map_err(PodeError::Io)?;
            info!(client_id, "websocket upgrade complete");
            return Ok(());
        }

        ctx.begin_processing();
        let keep_alive = request.keep_alive;
        let response = server.handle_request(request, endpoint.name.clone()).await;
        let response = response.unwrap_or_else(error_response);
        stream.write_all(&response.to_bytes(keep_alive)).await.map_err(PodeError::Io)?;
        ctx.finish_response(keep_alive);

        if ctx.is_closed() {
            return Ok(());
        }
    }
}

fn error_response(error: PodeError) -> HttpResponse {
    let status = error.status_code();
    HttpResponse::default()
        .with_status(status)
        .with_json(&serde_json::json!({ "error": error.to_string() }))
}

async fn serve_smtp(mut stream: Box<dyn AsyncStream>, server: Arc<ServerContext>) -> Result<()> {
    let mut dialog = Dialog::new();
    let greeting = Dialog::greeting(&server.hostname);
    stream.write_all(greeting.to_line().as_bytes()).await.map_err(PodeError::Io)?;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let n = stream.read(&mut chunk).await.map_err(PodeError::Io)?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);

        while let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
            let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
            buf.drain(..pos + 2);

            match dialog.feed_line(&line)? {
                SmtpOutcome::Reply(reply) => {
                    if !reply.text.is_empty() {
                        stream.write_all(reply.to_line().as_bytes()).await.map_err(PodeError::Io)?;
                    }
                }
                SmtpOutcome::MessageReady(envelope) => {
                    server.deliver_mail(envelope).await;
                    stream
                        .write_all("250 message accepted\r\n".as_bytes())
                        .await
                        .map_err(PodeError::Io)?;
                }
                SmtpOutcome::CloseConnection(reply) => {
                    stream.write_all(reply.to_line().as_bytes()).await.map_err(PodeError::Io)?;
                    return Ok(());
                }
            }
        }
    }
}

/// Raw TCP endpoints hand every byte read to a single handler call, with
/// no protocol parsing at all — the spec's lowest-level escape hatch.
async fn serve_raw_tcp(mut stream: Box<dyn AsyncStream>, peer: SocketAddr, server: Arc<ServerContext>) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut buf).await.map_err(PodeError::Io)?;
        if n == 0 {
            return Ok(());
        }
        let reply = server.handle_raw_tcp(peer, &buf[..n]).await?;
        if !reply.is_empty() {
            stream.write_all(&reply).await.map_err(PodeError::Io)?;
        }
    }
}

impl ServerContext {
    async fn handle_request(&self, request: HttpRequest, endpoint_name: Option<String>) -> Result<HttpResponse> {
        let method = request.method;
        let path = request.path.clone();

        let router = self.router.read().unwrap();
        let matched = router.matches(method, &path, endpoint_name.as_deref());

        let Some(matched) = matched else {
            drop(router);
            return Ok(HttpResponse::default()
                .with_status(404)
                .with_json(&serde_json::json!({ "error": "not found" })));
        };

        let handler = matched.route.handler.clone();
        let route_middleware = matched.route.middleware.clone();
        let params = matched.params.clone();
        let auth_name = matched.route.auth_name.clone();
        drop(router);

        let mut event = RequestEvent::new(request, self.shared.clone());
        event.params = params;
        event.endpoint_name = endpoint_name;

        if let Some(signed) = event.request.cookies.get(self.sessions.cookie_name()).cloned() {
            event.session = self.sessions.load(&signed);
        }

        let auth_middleware = auth_name.as_deref().and_then(|name| self.auth_middleware(name));

        let pipeline = self.pipeline.clone();
        let result = pipeline.run(&mut event, auth_middleware.as_ref(), &route_middleware, &handler);

        if let Some(session) = event.session.take() {
            self.sessions.save(session);
        }

        result.map(|_| event.response)
    }

    async fn handle_raw_tcp(&self, peer: SocketAddr, data: &[u8]) -> Result<Vec<u8>> {
        match &self.raw_tcp_handler {
            Some(handler) => handler(peer, data),
            None => {
                error!(peer = %peer, "no raw TCP handler registered");
                Ok(Vec::new())
            }
        }
    }
}
