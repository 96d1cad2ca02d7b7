//! JSON-RPC seam: the handlers speak generic `call`s, `bitcoincore-rpc` does the wire

use super::config::BitcoindConfig;
use crate::error::{CoinError, CoinResult};
use bitcoincore_rpc::{jsonrpc, Client, RpcApi};
use serde_json::Value;

/// One daemon connection.
pub trait BitcoindRpc: Send {
    fn call(&self, method: &str, params: &[Value]) -> CoinResult<Value>;
}

/// Creates connections when a handler scope opens.
pub trait RpcConnector: Send + Sync {
    fn connect(&self, symbol: &str, config: &BitcoindConfig) -> CoinResult<Box<dyn BitcoindRpc>>;
}

/// Connects over HTTP with `bitcoincore_rpc::Client`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreRpcConnector;

impl RpcConnector for CoreRpcConnector {
    fn connect(&self, symbol: &str, config: &BitcoindConfig) -> CoinResult<Box<dyn BitcoindRpc>> {
        let client = Client::new(&config.url(), config.auth())
            .map_err(|e| CoinError::connection(format!("{} RPC connect: {}", symbol, e)))?;
        tracing::debug!(symbol, host = config.host.as_str(), port = config.port, "connected to daemon");
        Ok(Box::new(CoreRpc { symbol: symbol.to_string(), client }))
    }
}

struct CoreRpc {
    symbol: String,
    client: Client,
}

impl BitcoindRpc for CoreRpc {
    fn call(&self, method: &str, params: &[Value]) -> CoinResult<Value> {
        self.client.call::<Value>(method, params).map_err(|e| map_error(&self.symbol, method, e))
    }
}

/// Transport failures mean the daemon is unreachable; anything else is the daemon answering with an error.
fn map_error(symbol: &str, method: &str, e: bitcoincore_rpc::Error) -> CoinError {
    match e {
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::Error::Transport(t)) => {
            CoinError::connection(format!("{} daemon is not responding ({}): {}", symbol, method, t))
        }
        bitcoincore_rpc::Error::Io(io) => {
            CoinError::connection(format!("{} daemon is not responding ({}): {}", symbol, method, io))
        }
        other => CoinError::Rpc(format!("{} {}: {}", symbol, method, other)),
    }
}
