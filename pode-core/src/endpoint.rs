//! Endpoints: a bound `(protocol, address, port)` with optional name, plus
//! the registry invariants from the spec's data model and testable
//! properties (endpoint uniqueness, protocol family exclusivity, low-port
//! privilege checks).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{PodeError, Result};

/// Protocol an endpoint listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
    Smtp,
    Tcp,
    Ws,
    Wss,
}

impl Protocol {
    /// The mutual-exclusion family this protocol belongs to. The server as a
    /// whole may host endpoints from at most one family at a time.
    pub fn family(self) -> Family {
        match self {
            Protocol::Http | Protocol::Https | Protocol::Ws | Protocol::Wss => Family::Web,
            Protocol::Smtp => Family::Smtp,
            Protocol::Tcp => Family::Tcp,
        }
    }

    /// Whether this protocol family requires a TLS handshake during `Open`.
    pub fn is_secure(self) -> bool {
        matches!(self, Protocol::Https | Protocol::Wss)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Protocol::Http => "HTTP",
            Protocol::Https => "HTTPS",
            Protocol::Smtp => "SMTP",
            Protocol::Tcp => "TCP",
            Protocol::Ws => "WS",
            Protocol::Wss => "WSS",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Web,
    Smtp,
    Tcp,
}

/// The bind target of an endpoint, before DNS resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointAddress {
    Ip(IpAddr),
    /// A hostname that resolves at bind time.
    Host(String),
    /// `all` / `*` / empty — binds to `0.0.0.0`.
    Wildcard,
}

impl EndpointAddress {
    /// The literal address string used for display/comparison purposes
    /// (`0.0.0.0` for the wildcard, the numeric form for an IP, the
    /// hostname itself otherwise — hostnames are only resolved at bind
    /// time, per the listener contract).
    pub fn as_str(&self) -> String {
        match self {
            EndpointAddress::Ip(ip) => ip.to_string(),
            EndpointAddress::Host(h) => h.clone(),
            EndpointAddress::Wildcard => "0.0.0.0".to_string(),
        }
    }

    pub fn host_name(&self) -> Option<&str> {
        match self {
            EndpointAddress::Host(h) => Some(h.as_str()),
            _ => None,
        }
    }
}

/// TLS material for an endpoint. Either a loaded certificate/key pair, a
/// thumbprint reference into a platform certificate store, or a flag asking
/// the listener to generate a self-signed certificate at bind time.
#[derive(Debug, Clone)]
pub enum TlsMaterial {
    CertKeyPair { cert_path: String, key_path: String },
    Thumbprint(String),
    SelfSigned,
}

/// A bound `(protocol, address, port)` with optional name and hostname
/// filter, per the spec's data model.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub protocol: Protocol,
    pub address: EndpointAddress,
    pub port: u16,
    pub name: Option<String>,
    pub tls: Option<TlsMaterial>,
    pub allow_client_certificate: bool,
}

impl Endpoint {
    pub fn new(protocol: Protocol, address: EndpointAddress, port: u16) -> Self {
        Self {
            protocol,
            address,
            port,
            name: None,
            tls: None,
            allow_client_certificate: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn allow_client_cert(mut self) -> Self {
        self.allow_client_certificate = true;
        self
    }

    /// `true` when this port requires elevated privileges to bind (the
    /// well-known port range, &lt; 1024).
    pub fn requires_elevated_privileges(&self) -> bool {
        self.port != 0 && self.port < 1024
    }

    fn key(&self) -> (Protocol, String, u16) {
        (self.protocol, self.address.as_str(), self.port)
    }
}

/// Parses an endpoint address string per the listener's edge-case rules:
/// `host:port` splits on the last colon, `host:` means "assign a port",
/// `:port` means a wildcard host, a bare integer is a port with a wildcard
/// host, and anything else is a bare host with no explicit port.
pub fn parse_address(input: &str) -> Result<(EndpointAddress, Option<u16>)> {
    let trimmed = input.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") || trimmed == "*" {
        return Ok((EndpointAddress::Wildcard, None));
    }

    if let Ok(port) = trimmed.parse::<u16>() {
        return Ok((EndpointAddress::Wildcard, Some(port)));
    }

    // Bracketed IPv6 literal, optionally with a trailing `:port`.
    if trimmed.starts_with('[') {
        let close = trimmed
            .find(']')
            .ok_or_else(|| PodeError::Configuration(format!("invalid IP address: {input}")))?;
        let host = &trimmed[1..close];
        let ip = host
            .parse::<Ipv6Addr>()
            .map_err(|_| PodeError::Configuration(format!("invalid IP address: {input}")))?;
        let rest = &trimmed[close + 1..];
        let port = match rest.strip_prefix(':') {
            Some("") | None => None,
            Some(p) => Some(
                p.parse::<u16>()
                    .map_err(|_| PodeError::Configuration(format!("invalid port: {p}")))?,
            ),
        };
        return Ok((EndpointAddress::Ip(IpAddr::V6(ip)), port));
    }

    // Bare IPv6 literal with no port (contains more than one colon).
    if trimmed.matches(':').count() > 1 {
        let ip = trimmed
            .parse::<Ipv6Addr>()
            .map_err(|_| PodeError::Configuration(format!("invalid IP address: {input}")))?;
        return Ok((EndpointAddress::Ip(IpAddr::V6(ip)), None));
    }

    match trimmed.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = if port_str.is_empty() {
                None
            } else {
                Some(
                    port_str
                        .parse::<u16>()
                        .map_err(|_| PodeError::Configuration(format!("invalid port: {port_str}")))?,
                )
            };
            let address = parse_host(host)?;
            Ok((address, port))
        }
        None => Ok((parse_host(trimmed)?, None)),
    }
}

fn parse_host(host: &str) -> Result<EndpointAddress> {
    if host.is_empty() || host.eq_ignore_ascii_case("all") || host == "*" {
        return Ok(EndpointAddress::Wildcard);
    }
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(EndpointAddress::Ip(IpAddr::V4(ip)));
    }
    // A dotted quad of four numeric segments that failed to parse as an
    // IPv4Addr (e.g. `256.0.0.1`) is a malformed literal, not a hostname.
    let segments: Vec<&str> = host.split('.').collect();
    if segments.len() == 4 && segments.iter().all(|s| s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty()) {
        return Err(PodeError::Configuration(format!("invalid IP address: {host}")));
    }
    Ok(EndpointAddress::Host(host.to_string()))
}

/// Holds the registered set of endpoints and enforces the invariants from
/// the spec's data model: unique `(protocol, address, port)`, unique names,
/// and protocol-family exclusivity.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Registers a new endpoint. Re-adding an identical
    /// `(protocol, address, port)` is a no-op (returns `Ok(false)`); a
    /// genuinely new endpoint returns `Ok(true)`.
    pub fn add(&mut self, endpoint: Endpoint) -> Result<bool> {
        if let Some(name) = &endpoint.name {
            if self
                .endpoints
                .iter()
                .any(|e| e.name.as_deref() == Some(name.as_str()))
            {
                return Err(PodeError::Configuration(format!(
                    "endpoint name '{name}' is already registered"
                )));
            }
        }

        if self.endpoints.iter().any(|e| e.key() == endpoint.key()) {
            return Ok(false);
        }

        if let Some(existing_family) = self.endpoints.first().map(|e| e.protocol.family()) {
            let new_family = endpoint.protocol.family();
            if existing_family != new_family {
                return Err(PodeError::Configuration(format!(
                    "cannot add {} endpoint: server already hosts {:?} endpoints",
                    endpoint.protocol, existing_family
                )));
            }
            match new_family {
                Family::Smtp if !self.endpoints.is_empty() => {
                    return Err(PodeError::Configuration(
                        "cannot add SMTP endpoint: server already hosts an SMTP endpoint".into(),
                    ))
                }
                Family::Tcp if !self.endpoints.is_empty() => {
                    return Err(PodeError::Configuration(
                        "cannot add TCP endpoint: server already hosts a TCP endpoint".into(),
                    ))
                }
                _ => {}
            }
        }

        // Elevated-privilege requirements for low ports are enforced when the
        // listener actually binds the socket (invariant (c) is about the
        // server refusing to *start*, not about registration), not here.
        self.endpoints.push(endpoint);
        Ok(true)
    }
}

/// Whether the current process can bind low (&lt;1024) ports. On Unix this
/// is true only for the root user; other platforms are assumed unrestricted.
#[cfg(unix)]
pub fn has_elevated_privileges() -> bool {
    // SAFETY: `geteuid` takes no arguments and never fails.
    unsafe extern "C" {
        fn geteuid() -> u32;
    }
    unsafe { geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn has_elevated_privileges() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_forms() {
        assert_eq!(
            parse_address("127.0.0.1:80").unwrap(),
            (EndpointAddress::Ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))), Some(80))
        );
        assert_eq!(
            parse_address("pode.foo.com:80").unwrap(),
            (EndpointAddress::Host("pode.foo.com".into()), Some(80))
        );
        assert_eq!(parse_address(":8080").unwrap(), (EndpointAddress::Wildcard, Some(8080)));
        assert_eq!(parse_address("9000").unwrap(), (EndpointAddress::Wildcard, Some(9000)));
        assert_eq!(parse_address("all").unwrap(), (EndpointAddress::Wildcard, None));
        assert_eq!(parse_address("*").unwrap(), (EndpointAddress::Wildcard, None));
    }

    #[test]
    fn rejects_invalid_ipv4_literal() {
        assert!(parse_address("256.0.0.1:80").is_err());
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let (addr, port) = parse_address("[::1]:443").unwrap();
        assert_eq!(addr, EndpointAddress::Ip(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(port, Some(443));
    }

    #[test]
    fn registers_endpoints_with_unique_names_and_addresses() {
        let mut reg = EndpointRegistry::new();
        let e1 = Endpoint::new(Protocol::Http, EndpointAddress::Ip(Ipv4Addr::new(127, 0, 0, 1).into()), 8080);
        let e2 = Endpoint::new(Protocol::Http, EndpointAddress::Host("pode.foo.com".into()), 8080);
        assert!(reg.add(e1.clone()).unwrap());
        assert!(reg.add(e2).unwrap());
        assert_eq!(reg.endpoints()[0].address.as_str(), "127.0.0.1");
        assert_eq!(reg.endpoints()[1].address.host_name(), Some("pode.foo.com"));

        // Re-adding an identical endpoint is a no-op.
        assert!(!reg.add(e1).unwrap());
        assert_eq!(reg.endpoints().len(), 2);
    }

    #[test]
    fn rejects_mixed_protocol_families() {
        let mut reg = EndpointRegistry::new();
        reg.add(Endpoint::new(Protocol::Http, EndpointAddress::Ip(Ipv4Addr::new(127, 0, 0, 1).into()), 8080))
            .unwrap();
        let err = reg
            .add(Endpoint::new(Protocol::Smtp, EndpointAddress::Host("pode.foo.com".into()), 25))
            .unwrap_err();
        assert!(err.to_string().contains("cannot add SMTP endpoint"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut reg = EndpointRegistry::new();
        reg.add(
            Endpoint::new(Protocol::Http, EndpointAddress::Ip(Ipv4Addr::new(127, 0, 0, 1).into()), 8080)
                .with_name("web"),
        )
        .unwrap();
        let err = reg
            .add(
                Endpoint::new(Protocol::Http, EndpointAddress::Ip(Ipv4Addr::new(127, 0, 0, 1).into()), 8081)
                    .with_name("web"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }
}
