//! Backends shipped with the crate, each behind its own cargo feature

#[cfg(feature = "bitcoind")]
pub mod bitcoind;

use crate::error::CoinResult;
use crate::registry::HandlerRegistry;

/// Register every compiled-in backend under its conventional name. Nothing is enabled.
#[cfg_attr(not(feature = "bitcoind"), allow(unused_variables))]
pub fn register_builtin(registry: &HandlerRegistry) -> CoinResult<()> {
    #[cfg(feature = "bitcoind")]
    registry.register_handler(bitcoind::HANDLER_NAME, bitcoind::handler_spec())?;
    Ok(())
}
