//! Bitcoind - Loader and Manager for any daemon speaking the bitcoind JSON-RPC dialect
//!
//! Known to fit bitcoind, litecoind and dogecoind. Settings live in the `COIND_RPC` domain:
//!
//! ```json
//! { "COIND_RPC": { "LTC": { "host": "10.0.0.3", "port": 9332, "user": "ltcrpc", "password": "..." } } }
//! ```
//!
//! Construction only parses settings; connections open with the handler scope.

mod config;
mod loader;
mod manager;
mod rpc;

pub use config::{profile, BitcoindConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use loader::BitcoindLoader;
pub use manager::BitcoindManager;
pub use rpc::{BitcoindRpc, CoreRpcConnector, RpcConnector};

use crate::core::Coin;
use crate::error::{CoinError, CoinResult};
use crate::handler::{Loader, Manager};
use crate::registry::HandlerSpec;
use crate::settings::ResolvedSettings;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

/// Conventional registry name.
pub const HANDLER_NAME: &str = "Bitcoin";

/// Loader + Manager over real daemons.
pub fn handler_spec() -> HandlerSpec {
    HandlerSpec::new(profile())
        .with_description("bitcoind-compatible JSON-RPC daemons")
        .loader::<BitcoindLoader>()
        .manager::<BitcoindManager>()
}

/// Same roles, connections made by `connector`.
pub fn handler_spec_with(connector: Arc<dyn RpcConnector>) -> HandlerSpec {
    let for_manager = connector.clone();
    HandlerSpec::new(profile())
        .with_description("bitcoind-compatible JSON-RPC daemons")
        .loader_fn(move |settings: &ResolvedSettings, coins: Vec<Coin>| {
            Ok(Box::new(BitcoindLoader::with_connector(settings, coins, connector.clone())?) as Box<dyn Loader>)
        })
        .manager_fn(move |settings: &ResolvedSettings, coin: Coin| {
            Ok(Box::new(BitcoindManager::with_connector(settings, coin, for_manager.clone())?) as Box<dyn Manager>)
        })
}

/// Daemon amounts arrive as JSON floats or strings; floats go through 8dp text so
/// `0.00012434` never becomes `0.000124339999...`.
pub(crate) fn parse_amount(v: &Value) -> CoinResult<Decimal> {
    let parsed = match v {
        Value::Number(n) if n.is_f64() => n.as_f64().and_then(|f| Decimal::from_str(&format!("{:.8}", f)).ok()),
        Value::Number(n) => n.as_i64().map(Decimal::from),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CoinError::Rpc(format!("malformed amount {}", v)))
}
