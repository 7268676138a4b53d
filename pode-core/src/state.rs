//! Process-wide shared state: a lockable key/value store reachable from
//! every handler and scheduler job, with JSON save/restore for the
//! restart-preserving-state scenario the spec calls out.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde_json::Value;

use crate::error::{PodeError, Result};

/// An entry's scope, mirroring the spec's "scope tags" on shared state:
/// entries scoped to a single endpoint are not visible to others.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Endpoint(String),
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct Key {
    scope: Scope,
    name: String,
}

pub struct SharedState {
    entries: RwLock<HashMap<Key, Value>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, scope: Scope, name: &str, value: Value) {
        let key = Key { scope, name: name.to_string() };
        self.entries.write().unwrap().insert(key, value);
    }

    pub fn get(&self, scope: &Scope, name: &str) -> Option<Value> {
        let key = Key { scope: scope.clone(), name: name.to_string() };
        self.entries.read().unwrap().get(&key).cloned()
    }

    pub fn remove(&self, scope: &Scope, name: &str) -> Option<Value> {
        let key = Key { scope: scope.clone(), name: name.to_string() };
        self.entries.write().unwrap().remove(&key)
    }

    /// Serializes the entire store to a JSON document, for persisting
    /// across a scheduled restart.
    pub fn to_json(&self) -> Value {
        let entries = self.entries.read().unwrap();
        let mut global = serde_json::Map::new();
        let mut endpoints: serde_json::Map<String, Value> = serde_json::Map::new();

        for (key, value) in entries.iter() {
            match &key.scope {
                Scope::Global => {
                    global.insert(key.name.clone(), value.clone());
                }
                Scope::Endpoint(name) => {
                    let bucket = endpoints
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(serde_json::Map::new()));
                    if let Value::Object(map) = bucket {
                        map.insert(key.name.clone(), value.clone());
                    }
                }
            }
        }

        serde_json::json!({ "global": global, "endpoints": endpoints })
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = self.to_json();
        let text = serde_json::to_string_pretty(&json)
            .map_err(|e| PodeError::Configuration(format!("cannot serialize shared state: {e}")))?;
        fs::write(path, text).map_err(PodeError::Io)
    }

    pub fn restore_from_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| PodeError::Configuration(format!("cannot read {}: {e}", path.as_ref().display())))?;
        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| PodeError::Configuration(format!("invalid shared state JSON: {e}")))?;

        let mut entries = self.entries.write().unwrap();
        entries.clear();

        if let Some(Value::Object(global)) = parsed.get("global") {
            for (name, value) in global {
                entries.insert(
                    Key { scope: Scope::Global, name: name.clone() },
                    value.clone(),
                );
            }
        }
        if let Some(Value::Object(endpoints)) = parsed.get("endpoints") {
            for (endpoint_name, bucket) in endpoints {
                if let Value::Object(map) = bucket {
                    for (name, value) in map {
                        entries.insert(
                            Key {
                                scope: Scope::Endpoint(endpoint_name.clone()),
                                name: name.clone(),
                            },
                            value.clone(),
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_scoped_entries_are_not_visible_globally() {
        let state = SharedState::new();
        state.set(Scope::Endpoint("api".into()), "hits", serde_json::json!(1));
        assert!(state.get(&Scope::Global, "hits").is_none());
        assert_eq!(state.get(&Scope::Endpoint("api".into()), "hits"), Some(serde_json::json!(1)));
    }

    #[test]
    fn round_trips_through_json_save_and_restore() {
        let state = SharedState::new();
        state.set(Scope::Global, "counter", serde_json::json!(42));
        state.set(Scope::Endpoint("web".into()), "visits", serde_json::json!(7));

        let dir = std::env::temp_dir().join(format!("pode-state-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        state.save_to_path(&path).unwrap();

        let restored = SharedState::new();
        restored.restore_from_path(&path).unwrap();
        assert_eq!(restored.get(&Scope::Global, "counter"), Some(serde_json::json!(42)));
        assert_eq!(
            restored.get(&Scope::Endpoint("web".into()), "visits"),
            Some(serde_json::json!(7))
        );

        fs::remove_dir_all(&dir).ok();
    }
}
