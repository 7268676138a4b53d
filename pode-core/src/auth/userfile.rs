//! A [`Validator`] backed by a flat JSON file of user records, each
//! carrying an HMAC-SHA-256 password hash and salt. Comparison uses
//! `subtle` for constant time, the same crate the `ScriptSmith-hadrian`
//! manifest in the example pack imports for password checks.

use std::fs;
use std::path::Path;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{PodeError, Result};
use crate::middleware::AuthContext;

use super::{Credentials, Validator};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub username: String,
    /// Hex-encoded HMAC-SHA-256 of `password` keyed by `salt`.
    pub password_hash: String,
    pub salt: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub extra: serde_json::Value,
}

pub struct UserFileValidator {
    users: Vec<UserRecord>,
}

impl UserFileValidator {
    pub fn from_records(users: Vec<UserRecord>) -> Self {
        Self { users }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| PodeError::Configuration(format!("cannot read {}: {e}", path.as_ref().display())))?;
        let users: Vec<UserRecord> = serde_json::from_str(&text)
            .map_err(|e| PodeError::Configuration(format!("invalid user file: {e}")))?;
        Ok(Self { users })
    }

    fn find(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    fn password_matches(record: &UserRecord, password: &str) -> bool {
        let mut mac = match HmacSha256::new_from_slice(record.salt.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(password.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());
        let expected = record.password_hash.to_ascii_lowercase();
        computed.as_bytes().ct_eq(expected.as_bytes()).into()
    }
}

impl Validator for UserFileValidator {
    fn validate(&self, credentials: &Credentials) -> Result<Option<AuthContext>> {
        let (username, password) = match credentials {
            Credentials::Basic { username, password } => (username, password),
            Credentials::Form { username, password } => (username, password),
            _ => return Ok(None),
        };

        let Some(record) = self.find(username) else {
            return Ok(None);
        };
        if !Self::password_matches(record, password) {
            return Ok(None);
        }

        Ok(Some(AuthContext {
            scheme: "UserFile".to_string(),
            user: serde_json::json!({ "username": record.username, "extra": record.extra }),
            scopes: record.scopes.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_for(password: &str, salt: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).unwrap();
        mac.update(password.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_correct_password_and_rejects_wrong_one() {
        let salt = "pepper";
        let validator = UserFileValidator {
            users: vec![UserRecord {
                username: "alice".into(),
                password_hash: hash_for("hunter2", salt),
                salt: salt.into(),
                scopes: vec!["read".into()],
                extra: serde_json::Value::Null,
            }],
        };

        let good = Credentials::Basic { username: "alice".into(), password: "hunter2".into() };
        let context = validator.validate(&good).unwrap().unwrap();
        assert_eq!(context.scopes, vec!["read".to_string()]);

        let bad = Credentials::Basic { username: "alice".into(), password: "wrong".into() };
        assert!(validator.validate(&bad).unwrap().is_none());
    }

    #[test]
    fn unknown_username_is_not_validated() {
        let validator = UserFileValidator { users: Vec::new() };
        let creds = Credentials::Basic { username: "ghost".into(), password: "x".into() };
        assert!(validator.validate(&creds).unwrap().is_none());
    }
}
