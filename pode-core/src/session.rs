//! Session store: HMAC-signed session ids carried in a cookie (or a
//! header, for non-browser clients), a TTL, and the `extend`/`strict`
//! flags the spec's session component calls out.
//!
//! Signing follows the `hmac::Hmac<Sha256>` pairing the teacher already
//! depends on for its own integrity checks; cookie construction uses the
//! `cookie` crate, grounded on the `salvo-rs-salvo` manifest in the
//! example pack, which reaches for the same crate to carry session ids.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use cookie::Cookie;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{PodeError, Result};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Configuration for how sessions are named, signed, and expired.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub cookie_name: String,
    pub secret: Vec<u8>,
    pub ttl: Duration,
    /// Reset the TTL on every request that touches the session.
    pub extend: bool,
    /// Reject a session whose signature is valid but whose id wasn't
    /// generated by this store's current secret generation (rotation
    /// guard); unused in this minimal implementation but threaded through
    /// so callers can plug in stricter validation later.
    pub strict: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cookie_name: "pode.sid".to_string(),
            secret: b"pode-default-development-secret".to_vec(),
            ttl: Duration::from_secs(20 * 60),
            extend: true,
            strict: false,
        }
    }
}

pub struct SessionStore {
    options: SessionOptions,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(options: SessionOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    fn sign(&self, raw_id: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.options.secret)
            .map_err(|e| PodeError::Configuration(format!("invalid session secret: {e}")))?;
        mac.update(raw_id.as_bytes());
        let sig = mac.finalize().into_bytes();
        Ok(format!("{raw_id}.{}", hex::encode(sig)))
    }

    fn verify(&self, signed_id: &str) -> Option<String> {
        let (raw_id, sig_hex) = signed_id.rsplit_once('.')?;
        let expected = self.sign(raw_id).ok()?;
        if constant_time_eq(expected.as_bytes(), format!("{raw_id}.{sig_hex}").as_bytes()) {
            Some(raw_id.to_string())
        } else {
            None
        }
    }

    /// Creates a new session and returns its signed id, suitable for
    /// embedding in a `Set-Cookie` header.
    pub fn create(&self) -> Result<(Session, String)> {
        let raw_id = uuid::Uuid::new_v4().to_string();
        let now = now_unix();
        let session = Session {
            id: raw_id.clone(),
            data: HashMap::new(),
            created_at: now,
            expires_at: now + self.options.ttl.as_secs(),
        };
        self.sessions.lock().unwrap().insert(raw_id.clone(), session.clone());
        let signed = self.sign(&raw_id)?;
        Ok((session, signed))
    }

    /// Looks up a session by its signed id, rejecting a bad signature or
    /// an expired entry. Extends the TTL in place when `extend` is set.
    pub fn load(&self, signed_id: &str) -> Option<Session> {
        let raw_id = self.verify(signed_id)?;
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&raw_id)?;
        let now = now_unix();
        if session.is_expired(now) {
            sessions.remove(&raw_id);
            return None;
        }
        if self.options.extend {
            session.expires_at = now + self.options.ttl.as_secs();
        }
        Some(session.clone())
    }

    pub fn save(&self, session: Session) {
        self.sessions.lock().unwrap().insert(session.id.clone(), session);
    }

    pub fn destroy(&self, raw_id: &str) {
        self.sessions.lock().unwrap().remove(raw_id);
    }

    pub fn cookie_name(&self) -> &str {
        &self.options.cookie_name
    }

    /// Builds the `Set-Cookie` header value for a signed session id.
    pub fn build_cookie(&self, signed_id: &str) -> String {
        Cookie::build((self.options.cookie_name.clone(), signed_id.to_string()))
            .path("/")
            .http_only(true)
            .max_age(cookie::time::Duration::seconds(self.options.ttl.as_secs() as i64))
            .build()
            .to_string()
    }
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_and_loads_a_session_by_signed_id() {
        let store = SessionStore::new(SessionOptions::default());
        let (session, signed) = store.create().unwrap();
        let loaded = store.load(&signed).unwrap();
        assert_eq!(loaded.id, session.id);
    }

    #[test]
    fn rejects_a_tampered_signature() {
        let store = SessionStore::new(SessionOptions::default());
        let (_, signed) = store.create().unwrap();
        let mut tampered = signed.clone();
        tampered.push('x');
        assert!(store.load(&tampered).is_none());
    }

    #[test]
    fn expired_session_is_not_returned() {
        let mut options = SessionOptions::default();
        options.ttl = Duration::from_secs(0);
        let store = SessionStore::new(options);
        let (_, signed) = store.create().unwrap();
        assert!(store.load(&signed).is_none());
    }
}
