//! coin-handlers: one Loader/Manager contract over heterogeneous coin daemons.
//!
//! # Architecture
//!
//! ```text
//! HandlerRegistry (entry point)
//!   │
//!   ├── register_handler(name, HandlerSpec)   profile + Loader and/or Manager
//!   ├── enable_handler / add_handler_coin     which backend owns which symbol
//!   ├── configure_coin / configure_handler    per-symbol and handler-wide options
//!   ├── loaders() / managers()                (symbol, handler) over enabled backends
//!   │
//!   └── get_loader(symbol) / get_manager(symbol)
//!         │
//!         ├── SettingsResolver (defaults → handler options → caller settings → overrides → coin inline)
//!         └── fresh handler, no I/O until its Scope opens
//! ```
//!
//! # Handler roles
//!
//! | Role | Method | Description |
//! |------|--------|-------------|
//! | Loader | `list_txs()` | Lazily poll incoming deposits |
//! | Manager | `get_deposit()` | Issue a deposit address |
//! | Manager | `send(address, amount)` | Pay out, returning a receipt |
//! | Manager | `health()` / `health_test()` | Status table / cheap liveness check |
//!
//! # Features
//!
//! - `bitcoind` (default) - Loader + Manager for bitcoind-compatible JSON-RPC daemons
//!
//! # Usage
//!
//! ```ignore
//! use coin_handlers::{backends, scoped, Coin, HandlerRegistry};
//!
//! let registry = HandlerRegistry::new();
//! backends::register_builtin(&registry)?;
//! registry.enable_handler(["Bitcoin"])?;
//! registry.add_handler_coin("Bitcoin", Coin::from_symbol("DOGE")?)?;
//! registry.configure_coin("DOGE", serde_json::json!({"user": "dogerpc", "password": "...", "port": 22555}))?;
//!
//! let mut loader = registry.get_loader("DOGE")?;
//! let deposits = scoped(&mut loader, |l| l.list_txs()?.collect::<Result<Vec<_>, _>>())?;
//! ```

pub mod backends;
pub mod core;
pub mod error;
pub mod handler;
pub mod logging;
pub mod registry;
pub mod settings;

pub use crate::core::{Coin, Deposit, DepositKey};
pub use error::{CoinError, CoinResult, SendFailure};
pub use handler::{
    scoped, BuildLoader, BuildManager, DepositStream, Handler, HealthReport, HealthRow, HealthStatus, Loader, Manager,
    Scope, SendReceipt, SendType,
};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use registry::{HandlerRegistry, HandlerSpec};
pub use settings::{CoinSettings, HandlerSettings, ResolvedSettings, SettingsProfile, SettingsResolver};
