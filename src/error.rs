//! Errors - one enum for registry, resolver and backend failures

use thiserror::Error;

pub type CoinResult<T> = Result<T, CoinError>;

#[derive(Debug, Error)]
pub enum CoinError {
    /// Missing or malformed settings. Raised while constructing, never at call time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    #[error("No enabled handler for {0}")]
    NoHandler(String),

    #[error("Symbol {symbol} is claimed by more than one enabled handler: {}", .handlers.join(", "))]
    AmbiguousHandler { symbol: String, handlers: Vec<String> },

    /// Backend unreachable.
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send failed: {0}")]
    SendFailed(#[from] SendFailure),

    /// Malformed address or amount.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} does not support issuing")]
    IssueNotSupported(String),

    /// Handler used before its scope was entered.
    #[error("{0} is not open")]
    NotOpen(String),

    /// Backend reachable but answered with an error.
    #[error("RPC error: {0}")]
    Rpc(String),
}

#[derive(Debug, Error)]
pub enum SendFailure {
    #[error("not enough {symbol} balance, need {needed}, have {available}")]
    InsufficientBalance { symbol: String, needed: String, available: String },

    #[error("{0}")]
    Rejected(String),
}

impl CoinError {
    pub fn config(msg: impl Into<String>) -> Self { Self::Configuration(msg.into()) }
    pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
    pub fn connection(msg: impl Into<String>) -> Self { Self::Connection(msg.into()) }

    pub fn is_connection(&self) -> bool { matches!(self, Self::Connection(_)) }
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, Self::SendFailed(SendFailure::InsufficientBalance { .. }))
    }
}

impl From<serde_json::Error> for CoinError {
    fn from(e: serde_json::Error) -> Self { Self::Configuration(format!("invalid JSON: {}", e)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_lists_every_handler() {
        let err = CoinError::AmbiguousHandler { symbol: "BTC".into(), handlers: vec!["Bitcoin".into(), "Electrum".into()] };
        assert_eq!(err.to_string(), "Symbol BTC is claimed by more than one enabled handler: Bitcoin, Electrum");
    }

    #[test]
    fn test_insufficient_balance_is_send_error() {
        let err: CoinError = SendFailure::InsufficientBalance { symbol: "LTC".into(), needed: "2".into(), available: "1".into() }.into();
        assert!(err.is_insufficient_balance());
        assert!(!err.is_connection());
        assert!(err.to_string().contains("need 2, have 1"));
    }
}
