//! Authentication core: a three-phase `Scheme -> Validator -> PostValidator`
//! composition per the spec, wired in as a regular [`Middleware`] so it
//! slots into the pipeline the same way route-local middleware does.
//!
//! The phase split is grounded on the teacher's `Dispatcher`, which
//! composes its own request handling out of a small ordered list of
//! `Arc<dyn Trait>` stages; here the three stages are fixed by name
//! (extract credentials, validate them, then run any number of
//! post-validation checks such as a scope gate) rather than open-ended.

pub mod basic;
pub mod bearer;
pub mod client_cert;
pub mod digest;
pub mod form;
pub mod userfile;

use std::sync::Arc;

use crate::error::Result;
use crate::http::HttpRequest;
use crate::middleware::{AuthContext, HandlerResult, Middleware, RequestEvent};

/// Credentials extracted from a request by a [`Scheme`], before they've
/// been checked against anything.
#[derive(Debug, Clone)]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
    Digest(digest::DigestCredentials),
    Form { username: String, password: String },
    ClientCert { subject: String },
    Custom(serde_json::Value),
}

/// What the client should be told when a scheme can't extract credentials:
/// a status code and, for challenge-based schemes, a `WWW-Authenticate`
/// header value.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub status: u16,
    pub www_authenticate: Option<String>,
}

impl Challenge {
    pub fn unauthorized(www_authenticate: impl Into<String>) -> Self {
        Self {
            status: 401,
            www_authenticate: Some(www_authenticate.into()),
        }
    }

    pub fn bad_request() -> Self {
        Self {
            status: 400,
            www_authenticate: None,
        }
    }
}

/// Phase one: pulls a [`Credentials`] value out of the raw request, or
/// explains why it couldn't.
pub trait Scheme: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, request: &HttpRequest) -> std::result::Result<Credentials, Challenge>;
}

/// Phase two: turns credentials into an authenticated identity, or `None`
/// if they're simply wrong (still a 401, distinct from a hard error).
pub trait Validator: Send + Sync {
    fn validate(&self, credentials: &Credentials) -> Result<Option<AuthContext>>;
}

/// Phase three: runs after a successful validation; a `false` or rejected
/// result becomes a 403 rather than a 401, since the identity itself was
/// fine but failed some further check (a scope gate, for instance).
pub trait PostValidator: Send + Sync {
    fn check(&self, context: &AuthContext) -> Result<bool>;
}

/// The composed three-phase chain, usable anywhere a [`Middleware`] is
/// accepted.
pub struct AuthMethod {
    pub name: String,
    pub scheme: Arc<dyn Scheme>,
    pub validator: Arc<dyn Validator>,
    pub post_validators: Vec<Arc<dyn PostValidator>>,
    /// Attach the resulting identity to the request's session, if one is
    /// present, so subsequent requests skip re-authenticating.
    pub attach_to_session: bool,
}

impl AuthMethod {
    pub fn new(name: impl Into<String>, scheme: Arc<dyn Scheme>, validator: Arc<dyn Validator>) -> Self {
        Self {
            name: name.into(),
            scheme,
            validator,
            post_validators: Vec::new(),
            attach_to_session: true,
        }
    }

    pub fn with_post_validator(mut self, post_validator: Arc<dyn PostValidator>) -> Self {
        self.post_validators.push(post_validator);
        self
    }
}

impl Middleware for AuthMethod {
    fn call(&self, event: &mut RequestEvent) -> HandlerResult {
        if let Some(session) = &event.session {
            if let Some(cached) = session.data.get("__pode_auth__") {
                if let Ok(context) = serde_json::from_value::<AuthContext>(cached.clone()) {
                    event.auth = Some(context);
                    return Ok(true);
                }
            }
        }

        let credentials = match self.scheme.extract(&event.request) {
            Ok(credentials) => credentials,
            Err(challenge) => {
                apply_challenge(event, &challenge);
                return Ok(false);
            }
        };

        let context = match self.validator.validate(&credentials)? {
            Some(context) => context,
            None => {
                apply_challenge(event, &Challenge::unauthorized(format!("{} realm=\"pode\"", self.scheme.name())));
                return Ok(false);
            }
        };

        for post_validator in &self.post_validators {
            if !post_validator.check(&context)? {
                event.response.status = 403;
                return Ok(false);
            }
        }

        if self.attach_to_session {
            if let Some(session) = &mut event.session {
                if let Ok(value) = serde_json::to_value(&context) {
                    session.data.insert("__pode_auth__".to_string(), value);
                }
            }
        }

        event.auth = Some(context);
        Ok(true)
    }
}

fn apply_challenge(event: &mut RequestEvent, challenge: &Challenge) {
    event.response.status = challenge.status;
    if let Some(value) = &challenge.www_authenticate {
        event.response.set_header("WWW-Authenticate", value.clone());
    }
}

impl serde::Serialize for AuthContext {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AuthContext", 3)?;
        s.serialize_field("scheme", &self.scheme)?;
        s.serialize_field("user", &self.user)?;
        s.serialize_field("scopes", &self.scopes)?;
        s.end()
    }
}

impl<'de> serde::Deserialize<'de> for AuthContext {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        struct Shadow {
            scheme: String,
            user: serde_json::Value,
            scopes: Vec<String>,
        }
        let shadow = Shadow::deserialize(deserializer)?;
        Ok(AuthContext {
            scheme: shadow.scheme,
            user: shadow.user,
            scopes: shadow.scopes,
        })
    }
}
