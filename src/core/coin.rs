//! Coin - one tracked currency and its inline settings

use crate::core::keys::setting;
use crate::error::{CoinError, CoinResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tracked coin. `symbol` is the caller's unique key, `symbol_id` the ticker the daemon understands.
///
/// Several coins may share a `symbol_id` (two wallets on one chain) as long as their `symbol`s differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCoin")]
pub struct Coin {
    symbol: String,
    symbol_id: String,
    #[serde(skip_serializing_if = "Option::is_none")] display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] coin_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] our_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] setting_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] setting_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")] setting_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] setting_pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] setting_json: Option<Map<String, Value>>,
}

/// Wire form. `setting_json` may arrive JSON-encoded (string) or already decoded (object).
#[derive(Deserialize)]
struct RawCoin {
    symbol: String,
    #[serde(default)] symbol_id: Option<String>,
    #[serde(default)] display_name: Option<String>,
    #[serde(default)] coin_type: Option<String>,
    #[serde(default)] our_account: Option<String>,
    #[serde(default)] setting_host: Option<String>,
    #[serde(default)] setting_port: Option<u16>,
    #[serde(default)] setting_user: Option<String>,
    #[serde(default)] setting_pass: Option<String>,
    #[serde(default)] setting_json: Option<Value>,
}

impl TryFrom<RawCoin> for Coin {
    type Error = CoinError;

    fn try_from(raw: RawCoin) -> CoinResult<Self> {
        let symbol_id = raw.symbol_id.unwrap_or_else(|| raw.symbol.clone());
        let mut coin = Coin::new(raw.symbol, symbol_id)?;
        coin.display_name = raw.display_name;
        coin.coin_type = raw.coin_type;
        coin.our_account = raw.our_account;
        coin.setting_host = raw.setting_host;
        coin.setting_port = raw.setting_port;
        coin.setting_user = raw.setting_user;
        coin.setting_pass = raw.setting_pass;
        coin.setting_json = match raw.setting_json {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => decode_json(&coin.symbol, &s)?,
            Some(Value::Object(map)) => Some(map),
            Some(other) => return Err(CoinError::config(format!("setting_json for {} must be a mapping, got {}", coin.symbol, other))),
        };
        Ok(coin)
    }
}

fn decode_json(symbol: &str, json: &str) -> CoinResult<Option<Map<String, Value>>> {
    if json.trim().is_empty() { return Ok(None); }
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(other) => Err(CoinError::config(format!("setting_json for {} must be a mapping, got {}", symbol, other))),
        Err(e) => Err(CoinError::config(format!("setting_json for {} is not valid JSON: {}", symbol, e))),
    }
}

impl Coin {
    pub fn new(symbol: impl Into<String>, symbol_id: impl Into<String>) -> CoinResult<Self> {
        let (symbol, symbol_id) = (symbol.into(), symbol_id.into());
        if symbol.trim().is_empty() { return Err(CoinError::config("coin symbol must not be empty")); }
        if symbol_id.trim().is_empty() {
            return Err(CoinError::config(format!("symbol_id for {} must not be empty", symbol)));
        }
        Ok(Self {
            symbol, symbol_id,
            display_name: None, coin_type: None, our_account: None,
            setting_host: None, setting_port: None, setting_user: None, setting_pass: None, setting_json: None,
        })
    }

    /// Coin whose `symbol_id` equals its `symbol`.
    pub fn from_symbol(symbol: impl Into<String>) -> CoinResult<Self> {
        let symbol = symbol.into();
        Self::new(symbol.clone(), symbol)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self { self.setting_user = Some(user.into()); self }
    pub fn with_pass(mut self, pass: impl Into<String>) -> Self { self.setting_pass = Some(pass.into()); self }
    pub fn with_host(mut self, host: impl Into<String>) -> Self { self.setting_host = Some(host.into()); self }
    pub fn with_port(mut self, port: u16) -> Self { self.setting_port = Some(port); self }
    pub fn with_account(mut self, account: impl Into<String>) -> Self { self.our_account = Some(account.into()); self }
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self { self.display_name = Some(name.into()); self }
    pub fn with_coin_type(mut self, coin_type: impl Into<String>) -> Self { self.coin_type = Some(coin_type.into()); self }

    /// Attach JSON-encoded extra options. Anything but a JSON object is rejected.
    pub fn with_json(mut self, json: &str) -> CoinResult<Self> {
        self.setting_json = decode_json(&self.symbol, json)?;
        Ok(self)
    }

    pub fn with_options(mut self, options: Map<String, Value>) -> Self { self.setting_json = Some(options); self }

    pub fn symbol(&self) -> &str { &self.symbol }
    pub fn symbol_id(&self) -> &str { &self.symbol_id }
    pub fn display_name(&self) -> &str { self.display_name.as_deref().unwrap_or(&self.symbol) }
    pub fn coin_type(&self) -> Option<&str> { self.coin_type.as_deref() }
    pub fn our_account(&self) -> Option<&str> { self.our_account.as_deref() }
    pub fn setting_host(&self) -> Option<&str> { self.setting_host.as_deref() }
    pub fn setting_port(&self) -> Option<u16> { self.setting_port }
    pub fn setting_user(&self) -> Option<&str> { self.setting_user.as_deref() }
    pub fn setting_pass(&self) -> Option<&str> { self.setting_pass.as_deref() }
    pub fn setting_json(&self) -> Option<&Map<String, Value>> { self.setting_json.as_ref() }

    /// Inline settings flattened to resolver keys: connection fields first, then `setting_json` entries.
    pub fn inline_settings(&self) -> Map<String, Value> {
        let mut out = Map::new();
        if let Some(ref host) = self.setting_host { out.insert(setting::HOST.into(), Value::from(host.as_str())); }
        if let Some(port) = self.setting_port { out.insert(setting::PORT.into(), Value::from(port)); }
        if let Some(ref user) = self.setting_user { out.insert(setting::USER.into(), Value::from(user.as_str())); }
        if let Some(ref pass) = self.setting_pass { out.insert(setting::PASSWORD.into(), Value::from(pass.as_str())); }
        if let Some(ref json) = self.setting_json {
            for (k, v) in json { out.insert(k.clone(), v.clone()); }
        }
        out
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> CoinResult<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}
