//! Handlers - per-backend Loader and Manager roles
//!
//! # Roles
//!
//! | Trait | Built from | Does |
//! |-------|------------|------|
//! | [`Loader`] | settings + coins | polls incoming deposits |
//! | [`Manager`] | settings + one coin | issues addresses, sends, reports health |
//!
//! A backend implements either role or both. Every handler also carries the [`Handler`] lifecycle:
//! construction performs no I/O, [`Scope`] opens connections and guarantees they are closed.

mod report;
mod scope;

pub use report::{HealthReport, HealthRow, HealthStatus, SendReceipt, SendType};
pub use scope::{scoped, Scope};

use crate::core::{Coin, Deposit};
use crate::error::{CoinError, CoinResult};
use crate::settings::ResolvedSettings;
use rust_decimal::Decimal;

/// Lazy, finite result of one poll.
pub type DepositStream<'a> = Box<dyn Iterator<Item = CoinResult<Deposit>> + 'a>;

/// Lifecycle shared by every handler.
///
/// `open` must be idempotent and `close` must be a no-op on a closed handler.
pub trait Handler: Send {
    fn name(&self) -> &str;
    fn open(&mut self) -> CoinResult<()> { Ok(()) }
    fn close(&mut self) -> CoinResult<()> { Ok(()) }
}

pub trait Loader: Handler {
    fn coins(&self) -> &[Coin];

    /// Re-query the backend from scratch. Overlapping results across polls are expected;
    /// dedupe by [`Deposit::key`].
    fn list_txs(&mut self) -> CoinResult<DepositStream<'_>>;
}

pub trait Manager: Handler {
    fn coin(&self) -> &Coin;

    /// `(label, address)`; the label says whether `address` is an address or an account.
    fn get_deposit(&mut self) -> CoinResult<(String, String)>;

    fn send(&mut self, address: &str, amount: Decimal) -> CoinResult<SendReceipt>;

    /// Cheap liveness check. `Ok(false)` when reachable but degraded.
    fn health_test(&mut self) -> CoinResult<bool>;

    fn health(&mut self) -> HealthReport;

    fn address_valid(&mut self, address: &str) -> CoinResult<bool>;

    fn balance(&mut self) -> CoinResult<Decimal>;

    fn issue(&mut self, _address: &str, _amount: Decimal) -> CoinResult<SendReceipt> {
        Err(CoinError::IssueNotSupported(self.name().to_string()))
    }

    /// Send, falling back to `issue` only when the wallet lacks the balance.
    fn send_or_issue(&mut self, address: &str, amount: Decimal) -> CoinResult<SendReceipt> {
        match self.send(address, amount) {
            Err(e) if e.is_insufficient_balance() => {
                tracing::info!(handler = self.name(), symbol = self.coin().symbol(), "insufficient balance, issuing instead");
                self.issue(address, amount)
            }
            other => other,
        }
    }
}

/// Constructor contract for loaders: `(settings, coins)`. Must not touch the network.
pub trait BuildLoader: Loader + Sized + 'static {
    fn build(settings: &ResolvedSettings, coins: Vec<Coin>) -> CoinResult<Self>;
}

/// Constructor contract for managers: `(settings, coin)`. Must not touch the network.
pub trait BuildManager: Manager + Sized + 'static {
    fn build(settings: &ResolvedSettings, coin: Coin) -> CoinResult<Self>;
}
