//! Typed connection settings for one bitcoind-compatible daemon

use crate::core::keys::{domain, setting};
use crate::settings::SettingsProfile;
use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8332;

/// Defaults and required keys for the `COIND_RPC` domain.
pub fn profile() -> SettingsProfile {
    SettingsProfile::new(domain::COIND_RPC)
        .with_default(setting::HOST, DEFAULT_HOST)
        .with_default(setting::PORT, DEFAULT_PORT)
        .with_default(setting::USER, Value::Null)
        .with_default(setting::PASSWORD, Value::Null)
        .with_default(setting::CONFIRMS_NEEDED, 0)
        .with_default(setting::USE_TRUSTED, true)
        .with_default(setting::STRING_AMT, true)
        .require(setting::HOST)
        .require(setting::PORT)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BitcoindConfig {
    pub host: String,
    #[serde(deserialize_with = "port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, deserialize_with = "count")]
    pub confirms_needed: u32,
    /// Accept under-confirmed transactions the daemon marks as trusted.
    #[serde(default = "yes", deserialize_with = "flag")]
    pub use_trusted: bool,
    /// Send amounts as 8dp strings rather than floats.
    #[serde(default = "yes", deserialize_with = "flag")]
    pub string_amt: bool,
    /// Multi-wallet daemons: routes calls to `/wallet/<name>`.
    #[serde(default)]
    pub wallet: Option<String>,
}

impl BitcoindConfig {
    pub fn url(&self) -> String {
        match self.wallet.as_deref() {
            Some(w) if !w.is_empty() => format!("http://{}:{}/wallet/{}", self.host, self.port, w),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn auth(&self) -> bitcoincore_rpc::Auth {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => {
                bitcoincore_rpc::Auth::UserPass(user.to_string(), self.password.clone().unwrap_or_default())
            }
            _ => bitcoincore_rpc::Auth::None,
        }
    }
}

fn yes() -> bool { true }

/// `true`, `"true"`/`"yes"` in any case, or `1`.
pub(crate) fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(truthy(&Value::deserialize(d)?))
}

fn integer<'de, D: Deserializer<'de>>(d: D, what: &str) -> Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n.as_u64().ok_or_else(|| de::Error::custom(format!("{} must be a non-negative integer", what))),
        Value::String(s) => s.trim().parse().map_err(|_| de::Error::custom(format!("{} must be an integer, got {:?}", what, s))),
        other => Err(de::Error::custom(format!("{} must be an integer, got {}", what, other))),
    }
}

fn port<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
    let n = integer(d, "port")?;
    u16::try_from(n).map_err(|_| de::Error::custom(format!("port {} out of range", n)))
}

fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let n = integer(d, "confirms_needed")?;
    u32::try_from(n).map_err(|_| de::Error::custom(format!("confirms_needed {} out of range", n)))
}
