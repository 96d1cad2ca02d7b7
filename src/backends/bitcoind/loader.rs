//! BitcoindLoader - pages `listtransactions` and keeps confirmed incoming payments

use super::config::{truthy, BitcoindConfig};
use super::parse_amount;
use super::rpc::{BitcoindRpc, CoreRpcConnector, RpcConnector};
use crate::core::{Coin, Deposit};
use crate::error::{CoinError, CoinResult};
use crate::handler::{BuildLoader, DepositStream, Handler, Loader};
use crate::settings::ResolvedSettings;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

const BATCH_SIZE: usize = 100;
const TX_COUNT: usize = 1000;

struct CoinConn {
    symbol: String,
    config: BitcoindConfig,
    /// `None` until open. A failed connect is kept so the poll can report it per coin.
    rpc: Option<Result<Box<dyn BitcoindRpc>, String>>,
}

pub struct BitcoindLoader {
    coins: Vec<Coin>,
    conns: Vec<CoinConn>,
    connector: Arc<dyn RpcConnector>,
    open: bool,
    batch_size: usize,
    tx_count: usize,
}

impl BitcoindLoader {
    pub fn with_connector(settings: &ResolvedSettings, coins: Vec<Coin>, connector: Arc<dyn RpcConnector>) -> CoinResult<Self> {
        let mut conns = Vec::with_capacity(coins.len());
        for coin in &coins {
            let config: BitcoindConfig = settings.get(coin.symbol())?.parse()?;
            conns.push(CoinConn { symbol: coin.symbol().to_string(), config, rpc: None });
        }
        Ok(Self { coins, conns, connector, open: false, batch_size: BATCH_SIZE, tx_count: TX_COUNT })
    }

    /// Page size and the most recent transactions inspected per coin.
    pub fn with_window(mut self, batch_size: usize, tx_count: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.tx_count = tx_count;
        self
    }

    pub fn config(&self, symbol: &str) -> Option<&BitcoindConfig> {
        self.conns.iter().find(|c| c.symbol == symbol).map(|c| &c.config)
    }
}

impl BuildLoader for BitcoindLoader {
    fn build(settings: &ResolvedSettings, coins: Vec<Coin>) -> CoinResult<Self> {
        Self::with_connector(settings, coins, Arc::new(CoreRpcConnector))
    }
}

impl Handler for BitcoindLoader {
    fn name(&self) -> &str { "BitcoindLoader" }

    fn open(&mut self) -> CoinResult<()> {
        if self.open { return Ok(()); }
        for conn in &mut self.conns {
            let rpc = self.connector.connect(&conn.symbol, &conn.config).map_err(|e| {
                tracing::warn!(symbol = conn.symbol.as_str(), error = %e, "daemon connect failed");
                e.to_string()
            });
            conn.rpc = Some(rpc);
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> CoinResult<()> {
        for conn in &mut self.conns { conn.rpc = None; }
        self.open = false;
        Ok(())
    }
}

impl Loader for BitcoindLoader {
    fn coins(&self) -> &[Coin] { &self.coins }

    fn list_txs(&mut self) -> CoinResult<DepositStream<'_>> {
        if !self.open { return Err(CoinError::NotOpen(self.name().to_string())); }
        let (batch, limit) = (self.batch_size, self.tx_count);
        let pages = self.conns.iter().map(move |conn| TxPager::new(conn, batch, limit));
        Ok(Box::new(pages.flatten()))
    }
}

/// Lazily walks one coin's history, newest first, one RPC page at a time.
struct TxPager<'a> {
    conn: &'a CoinConn,
    batch: usize,
    limit: usize,
    offset: usize,
    buffer: VecDeque<Value>,
    done: bool,
}

impl<'a> TxPager<'a> {
    fn new(conn: &'a CoinConn, batch: usize, limit: usize) -> Self {
        Self { conn, batch, limit, offset: 0, buffer: VecDeque::new(), done: false }
    }

    fn fetch(&mut self) -> CoinResult<()> {
        let conn = self.conn;
        let rpc = match &conn.rpc {
            Some(Ok(rpc)) => rpc,
            Some(Err(msg)) => return Err(CoinError::connection(msg.clone())),
            None => return Err(CoinError::NotOpen(conn.symbol.clone())),
        };
        let count = self.batch.min(self.limit - self.offset);
        tracing::debug!(symbol = conn.symbol.as_str(), count, skip = self.offset, "loading transaction batch");
        let page = match rpc.call("listtransactions", &[json!("*"), json!(count), json!(self.offset)])? {
            Value::Array(txs) => txs,
            other => return Err(CoinError::Rpc(format!("listtransactions returned {}", other))),
        };
        if page.len() < count { self.done = true; }
        self.offset += page.len();
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for TxPager<'_> {
    type Item = CoinResult<Deposit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(tx) = self.buffer.pop_front() {
                match clean_tx(&self.conn.symbol, &self.conn.config, &tx) {
                    Ok(Some(deposit)) => return Some(Ok(deposit)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }
            if self.done || self.offset >= self.limit { return None; }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

/// `Ok(None)` for anything that is not a spendable incoming payment.
fn clean_tx(symbol: &str, config: &BitcoindConfig, tx: &Value) -> CoinResult<Option<Deposit>> {
    let txid = tx.get("txid").and_then(Value::as_str).unwrap_or_default();
    if tx.get("category").and_then(Value::as_str) != Some("receive") { return Ok(None); }
    if tx.get("generated").map(truthy).unwrap_or(false) { return Ok(None); }

    let confirmations = tx.get("confirmations").and_then(Value::as_i64).unwrap_or(0);
    if confirmations < i64::from(config.confirms_needed) {
        let trusted = tx.get("trusted").map(truthy).unwrap_or(false);
        if !config.use_trusted || !trusted {
            tracing::debug!(symbol, txid, confirmations, needed = config.confirms_needed, "skipping unconfirmed transaction");
            return Ok(None);
        }
    }

    if txid.is_empty() { return Err(CoinError::Rpc(format!("{} transaction without txid", symbol))); }
    let amount = parse_amount(tx.get("amount").unwrap_or(&Value::Null))?;
    let time = tx.get("time").and_then(Value::as_i64)
        .and_then(|t| Utc.timestamp_opt(t, 0).single())
        .ok_or_else(|| CoinError::Rpc(format!("{} transaction {} has no valid time", symbol, txid)))?;
    let vout = tx.get("vout").and_then(Value::as_u64).and_then(|v| u32::try_from(v).ok()).unwrap_or(0);

    let mut deposit = Deposit::new(symbol, txid, amount, time).with_vout(vout);
    if let Some(address) = tx.get("address").and_then(Value::as_str) {
        deposit = deposit.with_address(address);
    }
    Ok(Some(deposit))
}
