//! Settings - caller-supplied mapping, handler profiles, and the layered resolver
//!
//! # Layers (later wins)
//!
//! ```text
//! profile defaults                      (baked into the handler)
//!   └── settings[domain][symbol_id]     (caller settings, native ticker)
//!         └── settings[domain][symbol]  (caller settings, unique symbol)
//!               └── overrides[symbol]   (registry configure_coin)
//!                     └── coin inline   (setting_host/port/user/pass, then setting_json)
//! ```
//!
//! Null and empty-string values never override a lower layer. Keys nobody declared pass through verbatim.

mod profile;
mod resolver;

pub use profile::SettingsProfile;
pub use resolver::{CoinSettings, ResolvedSettings, SettingsResolver};

use crate::error::{CoinError, CoinResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Options keyed by symbol (or symbol_id), then by setting key.
pub type SymbolSettings = BTreeMap<String, Map<String, Value>>;

/// Caller settings: `{ domain: { symbol: { key: value } } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerSettings {
    domains: BTreeMap<String, SymbolSettings>,
}

impl HandlerSettings {
    pub fn new() -> Self { Self::default() }

    pub fn from_json_str(json: &str) -> CoinResult<Self> { Ok(serde_json::from_str(json)?) }

    pub fn load(path: impl AsRef<Path>) -> CoinResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoinError::config(format!("read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Builder form of [`HandlerSettings::merge`].
    pub fn with(mut self, domain: &str, symbol: &str, options: Value) -> CoinResult<Self> {
        match options {
            Value::Object(map) => { self.merge(domain, symbol, map); Ok(self) }
            other => Err(CoinError::config(format!("settings for {}/{} must be a mapping, got {}", domain, symbol, other))),
        }
    }

    /// Merge options into `domain/symbol`, last write wins per key.
    pub fn merge(&mut self, domain: &str, symbol: &str, options: Map<String, Value>) {
        let entry = self.domains.entry(domain.to_string()).or_default().entry(symbol.to_string()).or_default();
        for (k, v) in options { entry.insert(k, v); }
    }

    pub fn set(&mut self, domain: &str, symbol: &str, key: &str, value: impl Into<Value>) {
        self.domains
            .entry(domain.to_string()).or_default()
            .entry(symbol.to_string()).or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn domain(&self, domain: &str) -> Option<&SymbolSettings> { self.domains.get(domain) }

    pub fn symbol(&self, domain: &str, symbol: &str) -> Option<&Map<String, Value>> {
        self.domains.get(domain).and_then(|d| d.get(symbol))
    }

    pub fn clear_symbol(&mut self, domain: &str, symbol: &str) {
        if let Some(d) = self.domains.get_mut(domain) { d.remove(symbol); }
    }

    pub fn is_empty(&self) -> bool { self.domains.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_merge_last_write_wins() {
        let mut s = HandlerSettings::new();
        s.merge("COIND_RPC", "BTC", json!({"user": "a", "port": 8332}).as_object().unwrap().clone());
        s.merge("COIND_RPC", "BTC", json!({"user": "b"}).as_object().unwrap().clone());
        let btc = s.symbol("COIND_RPC", "BTC").unwrap();
        assert_eq!(btc["user"], "b");
        assert_eq!(btc["port"], 8332);
    }

    #[test]
    fn test_with_rejects_non_mapping() {
        assert!(HandlerSettings::new().with("COIND_RPC", "BTC", json!([1])).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"COIND_RPC": {{"LTC": {{"port": 9332, "confirms_needed": 4}}}}}}"#).unwrap();
        let s = HandlerSettings::load(file.path()).unwrap();
        assert_eq!(s.symbol("COIND_RPC", "LTC").unwrap()["port"], 9332);
        assert!(s.symbol("COIND_RPC", "BTC").is_none());
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let err = HandlerSettings::load(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CoinError::Configuration(_)));
    }
}
