//! Resolver - flattens the settings layers into one mapping per coin symbol

use super::{HandlerSettings, SettingsProfile, SymbolSettings};
use crate::core::Coin;
use crate::error::{CoinError, CoinResult};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flattened settings for one coin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoinSettings {
    symbol: String,
    values: Map<String, Value>,
}

impl CoinSettings {
    pub fn symbol(&self) -> &str { &self.symbol }
    pub fn get(&self, key: &str) -> Option<&Value> { self.values.get(key) }
    pub fn get_str(&self, key: &str) -> Option<&str> { self.values.get(key).and_then(|v| v.as_str()) }
    pub fn contains(&self, key: &str) -> bool { self.values.contains_key(key) }
    pub fn as_map(&self) -> &Map<String, Value> { &self.values }

    /// Deserialize into a backend's typed config. Type mismatches are configuration errors.
    pub fn parse<T: DeserializeOwned>(&self) -> CoinResult<T> {
        serde_json::from_value(Value::Object(self.values.clone()))
            .map_err(|e| CoinError::config(format!("invalid settings for {}: {}", self.symbol, e)))
    }
}

/// Resolved settings for every coin a handler instance owns, keyed by `symbol`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSettings {
    domain: String,
    coins: BTreeMap<String, CoinSettings>,
}

impl ResolvedSettings {
    pub(crate) fn from_coins(domain: &str, coins: Vec<CoinSettings>) -> Self {
        Self { domain: domain.to_string(), coins: coins.into_iter().map(|c| (c.symbol.clone(), c)).collect() }
    }

    pub fn domain(&self) -> &str { &self.domain }

    pub fn get(&self, symbol: &str) -> CoinResult<&CoinSettings> {
        self.coins.get(symbol).ok_or_else(|| CoinError::config(format!("no settings resolved for {}", symbol)))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> { self.coins.keys().map(|s| s.as_str()) }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoinSettings)> { self.coins.iter().map(|(k, v)| (k.as_str(), v)) }
    pub fn len(&self) -> usize { self.coins.len() }
    pub fn is_empty(&self) -> bool { self.coins.is_empty() }
}

/// Borrowed view over every settings source; cheap to build per resolution.
pub struct SettingsResolver<'a> {
    profile: &'a SettingsProfile,
    settings: &'a HandlerSettings,
    handler_options: Option<&'a Map<String, Value>>,
    overrides: Option<&'a SymbolSettings>,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(profile: &'a SettingsProfile, settings: &'a HandlerSettings) -> Self {
        Self { profile, settings, handler_options: None, overrides: None }
    }

    /// Handler-wide options layered just above the profile defaults.
    pub fn with_handler_options(mut self, options: &'a Map<String, Value>) -> Self {
        self.handler_options = Some(options);
        self
    }

    /// Per-symbol options layered above domain settings and below coin inline fields.
    pub fn with_overrides(mut self, overrides: &'a SymbolSettings) -> Self { self.overrides = Some(overrides); self }

    pub fn resolve(&self, coins: &[Coin]) -> CoinResult<ResolvedSettings> {
        let mut out = BTreeMap::new();
        for coin in coins {
            out.insert(coin.symbol().to_string(), self.resolve_coin(coin)?);
        }
        Ok(ResolvedSettings { domain: self.profile.domain().to_string(), coins: out })
    }

    pub fn resolve_coin(&self, coin: &Coin) -> CoinResult<CoinSettings> {
        let domain = self.profile.domain();
        let mut values = self.profile.defaults().clone();
        if let Some(opts) = self.handler_options { overlay(&mut values, opts); }

        if let Some(s) = self.settings.symbol(domain, coin.symbol_id()) { overlay(&mut values, s); }
        if coin.symbol() != coin.symbol_id() {
            if let Some(s) = self.settings.symbol(domain, coin.symbol()) { overlay(&mut values, s); }
        }
        if let Some(s) = self.overrides.and_then(|o| o.get(coin.symbol())) { overlay(&mut values, s); }
        overlay(&mut values, &coin.inline_settings());

        let missing: Vec<&str> = self.profile.required().iter()
            .map(|k| k.as_str())
            .filter(|k| values.get(*k).map(is_unset).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(CoinError::config(format!(
                "missing required setting(s) {} for {} in {}", missing.join(", "), coin.symbol(), domain
            )));
        }

        tracing::debug!(symbol = coin.symbol(), domain, keys = values.len(), "resolved coin settings");
        Ok(CoinSettings { symbol: coin.symbol().to_string(), values })
    }
}

fn is_unset(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn overlay(base: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (k, v) in layer {
        if is_unset(v) { continue; }
        base.insert(k.clone(), v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn profile() -> SettingsProfile {
        SettingsProfile::new("COIND_RPC")
            .with_default("host", "127.0.0.1")
            .with_default("port", 8332)
            .with_default("user", Value::Null)
            .require("host")
    }

    #[test]
    fn test_layers_override_in_order() {
        let settings = HandlerSettings::new()
            .with("COIND_RPC", "BTC", json!({"port": 8400, "user": "domain", "confirms_needed": 6})).unwrap();
        let mut overrides = SymbolSettings::new();
        overrides.insert("BTC".into(), json!({"user": "configured", "password": "pw"}).as_object().unwrap().clone());
        let coin = Coin::from_symbol("BTC").unwrap().with_pass("inline");

        let p = profile();
        let resolved = SettingsResolver::new(&p, &settings).with_overrides(&overrides).resolve_coin(&coin).unwrap();
        assert_eq!(resolved.get_str("host"), Some("127.0.0.1"));
        assert_eq!(resolved.get("port"), Some(&json!(8400)));
        assert_eq!(resolved.get_str("user"), Some("configured"));
        assert_eq!(resolved.get_str("password"), Some("inline"));
        assert_eq!(resolved.get("confirms_needed"), Some(&json!(6)));
    }

    #[test]
    fn test_handler_options_sit_above_defaults_only() {
        let settings = HandlerSettings::new().with("COIND_RPC", "BTC", json!({"port": 8400})).unwrap();
        let opts = json!({"host": "10.1.1.1", "port": 9999, "kwargs": {"example": "hello"}}).as_object().unwrap().clone();
        let p = profile();
        let resolved = SettingsResolver::new(&p, &settings)
            .with_handler_options(&opts)
            .resolve_coin(&Coin::from_symbol("BTC").unwrap())
            .unwrap();
        assert_eq!(resolved.get_str("host"), Some("10.1.1.1"));
        assert_eq!(resolved.get("port"), Some(&json!(8400)));
        assert_eq!(resolved.get("kwargs"), Some(&json!({"example": "hello"})));
    }

    #[test]
    fn test_symbol_entry_beats_symbol_id_entry() {
        let settings = HandlerSettings::new()
            .with("COIND_RPC", "BTC", json!({"port": 8332, "wallet": "main"})).unwrap()
            .with("COIND_RPC", "BTC_COLD", json!({"port": 9000})).unwrap();
        let coin = Coin::new("BTC_COLD", "BTC").unwrap();
        let p = profile();
        let resolved = SettingsResolver::new(&p, &settings).resolve(&[coin]).unwrap();
        let cold = resolved.get("BTC_COLD").unwrap();
        assert_eq!(cold.get("port"), Some(&json!(9000)));
        assert_eq!(cold.get_str("wallet"), Some("main"));
        assert!(resolved.get("BTC").is_err());
    }

    #[test]
    fn test_null_and_empty_never_override() {
        let settings = HandlerSettings::new()
            .with("COIND_RPC", "LTC", json!({"host": "", "port": null})).unwrap();
        let p = profile();
        let resolved = SettingsResolver::new(&p, &settings).resolve_coin(&Coin::from_symbol("LTC").unwrap()).unwrap();
        assert_eq!(resolved.get_str("host"), Some("127.0.0.1"));
        assert_eq!(resolved.get("port"), Some(&json!(8332)));
    }

    #[test]
    fn test_missing_required_fails_at_resolution() {
        let p = SettingsProfile::new("XMR_RPC").require("host").require("wallet");
        let settings = HandlerSettings::new().with("XMR_RPC", "XMR", json!({"host": "10.0.0.2"})).unwrap();
        let err = SettingsResolver::new(&p, &settings).resolve_coin(&Coin::from_symbol("XMR").unwrap()).unwrap_err();
        match err {
            CoinError::Configuration(msg) => assert!(msg.contains("wallet") && !msg.contains("host")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_typed_config() {
        #[derive(Deserialize)]
        struct Rpc { host: String, port: u16 }
        let p = profile();
        let settings = HandlerSettings::new();
        let resolved = SettingsResolver::new(&p, &settings).resolve_coin(&Coin::from_symbol("BTC").unwrap()).unwrap();
        let rpc: Rpc = resolved.parse().unwrap();
        assert_eq!((rpc.host.as_str(), rpc.port), ("127.0.0.1", 8332));

        let bad = Coin::from_symbol("BTC").unwrap().with_json(r#"{"port": "not-a-port"}"#).unwrap();
        let resolved = SettingsResolver::new(&p, &settings).resolve_coin(&bad).unwrap();
        assert!(matches!(resolved.parse::<Rpc>(), Err(CoinError::Configuration(_))));
    }
}
