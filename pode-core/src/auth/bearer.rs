//! Bearer tokens (RFC 6750): `Authorization: Bearer <token>`. The
//! token-to-identity mapping lives in a [`super::Validator`]; the scope
//! check the spec calls out for Bearer auth is a [`super::PostValidator`].

use crate::error::Result;
use crate::http::HttpRequest;
use crate::middleware::AuthContext;

use super::{Challenge, Credentials, PostValidator, Scheme};

pub struct BearerScheme;

impl Scheme for BearerScheme {
    fn name(&self) -> &str {
        "Bearer"
    }

    fn extract(&self, request: &HttpRequest) -> std::result::Result<Credentials, Challenge> {
        let header = request
            .header("authorization")
            .ok_or_else(|| Challenge::unauthorized("Bearer"))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| Challenge::unauthorized("Bearer"))?;
        if token.trim().is_empty() {
            return Err(Challenge::bad_request());
        }
        Ok(Credentials::Bearer { token: token.trim().to_string() })
    }
}

/// Rejects with 403 unless the identity carries every scope in
/// `required`.
pub struct ScopeGate {
    pub required: Vec<String>,
}

impl ScopeGate {
    pub fn new(required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }
}

impl PostValidator for ScopeGate {
    fn check(&self, context: &AuthContext) -> Result<bool> {
        Ok(self.required.iter().all(|scope| context.scopes.iter().any(|s| s == scope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_gate_requires_every_listed_scope() {
        let gate = ScopeGate::new(["read", "write"]);
        let context = AuthContext {
            scheme: "Bearer".into(),
            user: serde_json::json!("svc"),
            scopes: vec!["read".into()],
        };
        assert!(!gate.check(&context).unwrap());

        let context = AuthContext { scopes: vec!["read".into(), "write".into()], ..context };
        assert!(gate.check(&context).unwrap());
    }
}
