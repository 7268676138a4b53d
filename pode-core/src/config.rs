//! Configuration loading. The JSON document described in the spec's
//! external-interfaces section is deserialized into the recognized fields
//! below; everything else is kept verbatim in `extra`, reachable from
//! handlers — the Rust expression of "dynamic configuration objects map to
//! an explicit record with enumerated optional fields; unknown keys are
//! preserved in a free-form mapping."
//!
//! Grounded on the teacher's `config_sys.rs`, which does the analogous
//! "typed fields plus a free-form `BTreeMap` of everything else" split for
//! its own runtime config, though that one reads layered files rather than
//! a single JSON document.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PodeError;

/// `server.restart` — installs timers/schedules per the auto-restart rules.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RestartConfig {
    /// Minutes between restarts. Installs timer `__pode_restart_period__`.
    #[serde(default)]
    pub period: Option<u64>,
    /// Wall-clock `HH:MM` restart times. Installs schedule
    /// `__pode_restart_times__`.
    #[serde(default)]
    pub times: Vec<String>,
    /// Cron expressions. Installs schedule `__pode_restart_crons__`.
    #[serde(default)]
    pub crons: Vec<String>,
}

/// `server.request` — per-request limits.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestConfig {
    /// Hard per-request timeout in seconds. Not enforced by the core itself
    /// per the concurrency model's explicit statement that handlers are
    /// trusted to return; kept here so a caller may enforce it if desired.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Maximum accepted body size in bytes.
    #[serde(rename = "bodySize", default)]
    pub body_size: Option<u64>,
}

/// `server.*`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerSection {
    #[serde(default)]
    pub restart: RestartConfig,
    #[serde(default)]
    pub request: RequestConfig,
}

/// `web.static.cache`
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StaticCacheConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(rename = "maxAge", default)]
    pub max_age: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StaticConfig {
    #[serde(default)]
    pub cache: StaticCacheConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WebSection {
    #[serde(default)]
    pub static_content: StaticConfig,
}

/// The parsed configuration document.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub web: WebSection,
    /// Every key of the original document, untouched — reachable from
    /// handlers via [`ServerConfig::extra`] regardless of whether it was
    /// also hoisted into a typed field above.
    raw: Value,
}

impl ServerConfig {
    /// Parses a config document already loaded into memory.
    pub fn from_value(raw: Value) -> crate::error::Result<Self> {
        let server = raw
            .get("server")
            .cloned()
            .map(serde_json::from_value::<ServerSection>)
            .transpose()
            .map_err(|e| PodeError::Configuration(format!("invalid 'server' section: {e}")))?
            .unwrap_or_default();

        let web_static = raw
            .get("web")
            .and_then(|w| w.get("static"))
            .cloned()
            .map(serde_json::from_value::<StaticConfig>)
            .transpose()
            .map_err(|e| PodeError::Configuration(format!("invalid 'web.static' section: {e}")))?
            .unwrap_or_default();

        Ok(Self {
            server,
            web: WebSection {
                static_content: web_static,
            },
            raw,
        })
    }

    pub fn from_json_str(text: &str) -> crate::error::Result<Self> {
        let raw: Value = serde_json::from_str(text)
            .map_err(|e| PodeError::Configuration(format!("invalid JSON: {e}")))?;
        Self::from_value(raw)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            PodeError::Configuration(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Looks up an arbitrary key from the original document — for
    /// passthrough keys that have no typed field above.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hoists_known_keys_and_keeps_unknown_ones() {
        let cfg = ServerConfig::from_value(serde_json::json!({
            "server": {
                "restart": { "period": 180, "crons": ["@minutely"] },
                "request": { "bodySize": 1024 }
            },
            "web": { "static": { "cache": { "enable": true, "maxAge": 3600 } } },
            "custom": { "anything": "goes" }
        }))
        .unwrap();

        assert_eq!(cfg.server.restart.period, Some(180));
        assert_eq!(cfg.server.restart.crons, vec!["@minutely".to_string()]);
        assert_eq!(cfg.server.request.body_size, Some(1024));
        assert!(cfg.web.static_content.cache.enable);
        assert_eq!(cfg.web.static_content.cache.max_age, Some(3600));
        assert_eq!(cfg.extra("custom").unwrap()["anything"], "goes");
    }

    #[test]
    fn absent_restart_keys_install_nothing() {
        let cfg = ServerConfig::from_value(serde_json::json!({})).unwrap();
        assert_eq!(cfg.server.restart, RestartConfig::default());
    }
}
