//! BitcoindManager - addresses, balance, sending and health for one coin

use super::config::{truthy, BitcoindConfig};
use super::parse_amount;
use super::rpc::{BitcoindRpc, CoreRpcConnector, RpcConnector};
use crate::core::keys::deposit;
use crate::core::Coin;
use crate::error::{CoinError, CoinResult, SendFailure};
use crate::handler::{BuildManager, Handler, HealthReport, HealthRow, HealthStatus, Manager, SendReceipt, SendType};
use crate::settings::ResolvedSettings;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{json, Value};
use std::sync::Arc;

/// Smallest unit a bitcoind wallet can send.
const SATOSHI_DP: u32 = 8;

pub struct BitcoindManager {
    coin: Coin,
    config: BitcoindConfig,
    connector: Arc<dyn RpcConnector>,
    rpc: Option<Box<dyn BitcoindRpc>>,
}

impl BitcoindManager {
    pub fn with_connector(settings: &ResolvedSettings, coin: Coin, connector: Arc<dyn RpcConnector>) -> CoinResult<Self> {
        let config = settings.get(coin.symbol())?.parse()?;
        Ok(Self { coin, config, connector, rpc: None })
    }

    pub fn config(&self) -> &BitcoindConfig { &self.config }

    fn rpc(&self) -> CoinResult<&dyn BitcoindRpc> {
        self.rpc.as_deref().ok_or_else(|| CoinError::NotOpen(self.name().to_string()))
    }

    fn symbol(&self) -> &str { self.coin.symbol() }

    /// The amount that actually leaves the wallet. Anything finer than a satoshi is refused
    /// rather than truncated.
    fn sendable(&self, amount: Decimal) -> CoinResult<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(CoinError::validation(format!("amount must be positive, got {}", amount)));
        }
        let sent = amount.round_dp_with_strategy(SATOSHI_DP, RoundingStrategy::ToZero);
        if amount.normalize().scale() > SATOSHI_DP || sent.is_zero() {
            return Err(CoinError::validation(format!(
                "{} amount {} has more than {} decimal places", self.symbol(), amount, SATOSHI_DP
            )));
        }
        Ok(sent)
    }

    /// Amount as the daemon expects it: 8dp string, or float when `string_amt` is off.
    fn wire_amount(&self, amount: Decimal) -> CoinResult<Value> {
        if self.config.string_amt {
            return Ok(json!(format!("{:.8}", amount)));
        }
        amount.to_f64().map(|f| json!(f))
            .ok_or_else(|| CoinError::validation(format!("amount {} not representable", amount)))
    }

    /// Fee, net amount and senders of a sent transaction.
    fn lookup_sent(&self, txid: &str) -> CoinResult<(Decimal, Decimal, Option<String>)> {
        let tx = self.rpc()?.call("gettransaction", &[json!(txid)])?;
        let fee = parse_amount(tx.get("fee").unwrap_or(&Value::Null))?.abs();
        let amount = parse_amount(tx.get("amount").unwrap_or(&Value::Null))?.abs();
        let senders: Vec<&str> = tx.get("details").and_then(Value::as_array)
            .map(|details| details.iter()
                .filter(|d| d.get("category").and_then(Value::as_str) == Some("send"))
                .filter_map(|d| d.get("address").and_then(Value::as_str))
                .collect())
            .unwrap_or_default();
        let from = if senders.is_empty() { None } else { Some(senders.join(",")) };
        Ok((fee, amount, from))
    }

    /// Online row from the modern calls, falling back to the pre-0.16 `getinfo`.
    fn health_row(&self) -> CoinResult<HealthRow> {
        let rpc = self.rpc()?;
        let mut row = HealthRow::new(self.symbol(), HealthStatus::Online);
        match rpc.call("getblockchaininfo", &[]) {
            Ok(chain) => {
                let blocks = chain.get("blocks").and_then(Value::as_u64).unwrap_or(0);
                let mut block = group_thousands(blocks);
                if let Some(headers) = chain.get("headers").and_then(Value::as_u64) {
                    block.push_str(&format!(" (Headers: {})", group_thousands(headers)));
                }
                row.block = Some(block);
                let syncing = chain.get("initialblockdownload").map(truthy).unwrap_or(false);
                if syncing { row.status = HealthStatus::Degraded; }

                // chain state is known; a failing network call only degrades the row
                match rpc.call("getnetworkinfo", &[]) {
                    Ok(net) => {
                        row.version = Some(format!(
                            "{} ({})",
                            net.get("version").map(Value::to_string).unwrap_or_default(),
                            net.get("subversion").and_then(Value::as_str).unwrap_or_default()
                        ));
                        let peers = net.get("connections").and_then(Value::as_u64);
                        row.peers = peers.map(|p| p.to_string());
                        if peers == Some(0) { row.status = HealthStatus::Degraded; }
                    }
                    Err(e) if e.is_connection() => return Err(e),
                    Err(e) => {
                        tracing::warn!(symbol = self.symbol(), error = %e, "getnetworkinfo failed");
                        row.status = HealthStatus::Degraded;
                    }
                }
                match rpc.call("getbalance", &[]).and_then(|b| parse_amount(&b)) {
                    Ok(balance) => row.balance = Some(format!("{:.8}", balance)),
                    Err(e) if e.is_connection() => return Err(e),
                    Err(e) => {
                        tracing::warn!(symbol = self.symbol(), error = %e, "getbalance failed");
                        row.status = HealthStatus::Degraded;
                    }
                }
            }
            Err(e) if e.is_connection() => return Err(e),
            Err(_) => {
                let info = rpc.call("getinfo", &[])?;
                row.block = info.get("blocks").and_then(Value::as_u64).map(group_thousands);
                row.version = info.get("version").map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()));
                row.balance = info.get("balance").map(parse_amount).transpose()?.map(|b| format!("{:.8}", b));
                row.peers = info.get("connections").and_then(Value::as_u64).map(|p| p.to_string());
            }
        }
        Ok(row)
    }
}

impl BuildManager for BitcoindManager {
    fn build(settings: &ResolvedSettings, coin: Coin) -> CoinResult<Self> {
        Self::with_connector(settings, coin, Arc::new(CoreRpcConnector))
    }
}

impl Handler for BitcoindManager {
    fn name(&self) -> &str { "BitcoindManager" }

    fn open(&mut self) -> CoinResult<()> {
        if self.rpc.is_none() {
            self.rpc = Some(self.connector.connect(self.coin.symbol(), &self.config)?);
        }
        Ok(())
    }

    fn close(&mut self) -> CoinResult<()> {
        self.rpc = None;
        Ok(())
    }
}

impl Manager for BitcoindManager {
    fn coin(&self) -> &Coin { &self.coin }

    fn get_deposit(&mut self) -> CoinResult<(String, String)> {
        let reply = self.rpc()?.call("getnewaddress", &[])?;
        let address = reply.as_str()
            .ok_or_else(|| CoinError::Rpc(format!("getnewaddress returned {}", reply)))?;
        Ok((deposit::ADDRESS.to_string(), address.to_string()))
    }

    fn send(&mut self, address: &str, amount: Decimal) -> CoinResult<SendReceipt> {
        let amount = self.sendable(amount)?;
        if !self.address_valid(address)? {
            return Err(CoinError::validation(format!("Invalid {} address {}", self.symbol(), address)));
        }
        let balance = self.balance()?;
        if balance < amount {
            return Err(SendFailure::InsufficientBalance {
                symbol: self.symbol().to_string(),
                needed: amount.to_string(),
                available: balance.to_string(),
            }.into());
        }

        let params = [json!(address), self.wire_amount(amount)?, json!(""), json!(""), json!(true)];
        let reply = self.rpc()?.call("sendtoaddress", &params).map_err(|e| {
            tracing::error!(symbol = self.symbol(), address, %amount, error = %e, "send failed");
            e
        })?;
        let txid = reply.as_str()
            .ok_or_else(|| SendFailure::Rejected(format!("sendtoaddress returned {}", reply)))?
            .to_string();

        // the coins are gone at this point; a failed lookup must not look like a failed send
        let (fee, sent, from) = match self.lookup_sent(&txid) {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(symbol = self.symbol(), txid = txid.as_str(), error = %e, "fee, amount and sender may be inaccurate");
                (Decimal::ZERO, amount, None)
            }
        };
        tracing::info!(symbol = self.symbol(), txid = txid.as_str(), %sent, %fee, "sent");
        Ok(SendReceipt { txid, coin: self.symbol().to_string(), amount: sent, fee, from, send_type: SendType::Send })
    }

    fn health_test(&mut self) -> CoinResult<bool> {
        let rpc = self.rpc()?;
        let chain = match rpc.call("getblockchaininfo", &[]) {
            Ok(chain) => chain,
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => {
                tracing::warn!(symbol = self.symbol(), error = %e, "health check rejected");
                return Ok(false);
            }
        };
        if chain.get("initialblockdownload").map(truthy).unwrap_or(false) { return Ok(false); }
        match rpc.call("getnetworkinfo", &[]) {
            Ok(net) => Ok(net.get("connections").and_then(Value::as_u64).map(|p| p > 0).unwrap_or(false)),
            Err(e) if e.is_connection() => Err(e),
            Err(_) => Ok(false),
        }
    }

    fn health(&mut self) -> HealthReport {
        let row = self.health_row().unwrap_or_else(|e| {
            tracing::warn!(symbol = self.symbol(), error = %e, "health check failed");
            HealthRow::new(self.symbol(), HealthStatus::Offline)
        });
        HealthReport::new(self.name()).with_row(row)
    }

    fn address_valid(&mut self, address: &str) -> CoinResult<bool> {
        match self.rpc()?.call("validateaddress", &[json!(address)]) {
            Ok(v) => Ok(v.get("isvalid").map(truthy).unwrap_or(false)),
            Err(e) if e.is_connection() => Err(e),
            Err(e) => {
                tracing::debug!(symbol = self.symbol(), address, error = %e, "validateaddress rejected");
                Ok(false)
            }
        }
    }

    fn balance(&mut self) -> CoinResult<Decimal> {
        let reply = self.rpc()?.call("getbalance", &[json!("*"), json!(self.config.confirms_needed)])?;
        parse_amount(&reply)
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 { out.push(','); }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::bitcoind::mock::MockConnector;
    use crate::backends::bitcoind::profile;
    use crate::handler::{scoped, Scope};
    use crate::settings::{HandlerSettings, SettingsResolver};
    use std::str::FromStr;

    fn manager(conn: MockConnector) -> BitcoindManager {
        let coin = Coin::from_symbol("BTC").unwrap();
        let p = profile();
        let resolved = SettingsResolver::new(&p, &HandlerSettings::new()).resolve(std::slice::from_ref(&coin)).unwrap();
        BitcoindManager::with_connector(&resolved, coin, Arc::new(conn)).unwrap()
    }

    fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

    fn wallet(balance: f64) -> MockConnector {
        MockConnector::new(move |_, method, params| match method {
            "validateaddress" => Ok(json!({"isvalid": params[0] != json!("garbage")})),
            "getbalance" => Ok(json!(balance)),
            "sendtoaddress" => Ok(json!("f00d")),
            "gettransaction" => Ok(json!({"amount": -0.5, "fee": -0.0001,
                "details": [{"category": "send", "address": "bc1qfrom"}, {"category": "receive", "address": "x"}]})),
            "getnewaddress" => Ok(json!("bc1qnew")),
            other => Err(CoinError::Rpc(format!("unexpected {}", other))),
        })
    }

    #[test]
    fn test_send_reports_fee_and_sender() {
        let conn = wallet(2.0);
        let mut m = manager(conn.clone());
        let receipt = scoped(&mut m, |m| m.send("bc1qdest", dec("0.5"))).unwrap();
        assert_eq!(receipt.txid, "f00d");
        assert_eq!(receipt.amount, dec("0.5"));
        assert_eq!(receipt.fee, dec("0.0001"));
        assert_eq!(receipt.from.as_deref(), Some("bc1qfrom"));
        assert_eq!(receipt.send_type, SendType::Send);

        let calls = conn.calls.lock().unwrap();
        let (_, _, params) = calls.iter().find(|(_, m, _)| m == "sendtoaddress").unwrap();
        assert_eq!(params[1], json!("0.50000000"));
    }

    #[test]
    fn test_send_rejects_invalid_address() {
        let conn = wallet(2.0);
        let mut m = manager(conn.clone());
        let err = scoped(&mut m, |m| m.send("garbage", dec("0.5"))).unwrap_err();
        assert!(matches!(err, CoinError::Validation(_)));
        assert!(!conn.methods().contains(&"sendtoaddress".to_string()));
    }

    #[test]
    fn test_overdraft_is_insufficient_balance() {
        let mut m = manager(wallet(0.1));
        let err = scoped(&mut m, |m| m.send("bc1qdest", dec("0.5"))).unwrap_err();
        assert!(err.is_insufficient_balance());
    }

    #[test]
    fn test_send_or_issue_falls_back_to_issue() {
        let mut m = manager(wallet(0.1));
        let err = scoped(&mut m, |m| m.send_or_issue("bc1qdest", dec("0.5"))).unwrap_err();
        assert!(matches!(err, CoinError::IssueNotSupported(_)));
    }

    #[test]
    fn test_get_deposit_returns_address() {
        let mut m = manager(wallet(0.0));
        let (label, addr) = scoped(&mut m, |m| m.get_deposit()).unwrap();
        assert_eq!((label.as_str(), addr.as_str()), ("address", "bc1qnew"));
    }

    #[test]
    fn test_health_test_states() {
        let online = MockConnector::new(|_, method, _| match method {
            "getblockchaininfo" => Ok(json!({"blocks": 800000, "initialblockdownload": false})),
            _ => Ok(json!({"connections": 8})),
        });
        let mut m = manager(online);
        assert!(scoped(&mut m, |m| m.health_test()).unwrap());

        let syncing = MockConnector::new(|_, method, _| match method {
            "getblockchaininfo" => Ok(json!({"blocks": 10, "initialblockdownload": true})),
            _ => Ok(json!({"connections": 8})),
        });
        let mut m = manager(syncing);
        assert!(!scoped(&mut m, |m| m.health_test()).unwrap());

        let down = MockConnector::new(|_, _, _| Err(CoinError::connection("refused")));
        let mut m = manager(down);
        assert!(scoped(&mut m, |m| m.health_test()).unwrap_err().is_connection());
    }

    #[test]
    fn test_health_offline_uses_placeholders() {
        let mut m = manager(MockConnector::new(|_, _, _| Err(CoinError::connection("refused"))));
        let mut scope = Scope::enter(&mut m).unwrap();
        let report = scope.health();
        assert_eq!(report.handler, "BitcoindManager");
        assert_eq!(report.rows[0], vec!["BTC", "Offline", "-", "-", "-", "-"]);
    }

    #[test]
    fn test_health_online_row() {
        let conn = MockConnector::new(|_, method, _| match method {
            "getblockchaininfo" => Ok(json!({"blocks": 1234567, "headers": 1234568})),
            "getnetworkinfo" => Ok(json!({"version": 250000, "subversion": "/Satoshi:25.0.0/", "connections": 10})),
            "getbalance" => Ok(json!(1.5)),
            other => Err(CoinError::Rpc(other.to_string())),
        });
        let mut m = manager(conn);
        let report = scoped(&mut m, |m| Ok(m.health())).unwrap();
        assert_eq!(report.rows[0], vec![
            "BTC", "Online", "1,234,567 (Headers: 1,234,568)", "250000 (/Satoshi:25.0.0/)", "1.50000000", "10",
        ]);
    }

    #[test]
    fn test_send_refuses_sub_satoshi_amounts() {
        let conn = wallet(2.0);
        let mut m = manager(conn.clone());
        let dust = scoped(&mut m, |m| m.send("bc1qdest", dec("0.000000001"))).unwrap_err();
        assert!(matches!(dust, CoinError::Validation(_)));
        let precise = scoped(&mut m, |m| m.send("bc1qdest", dec("1.123456789"))).unwrap_err();
        assert!(matches!(precise, CoinError::Validation(_)));
        assert!(!conn.methods().contains(&"sendtoaddress".to_string()));

        // trailing zeros beyond 8dp are not extra precision
        let receipt = scoped(&mut m, |m| m.send("bc1qdest", dec("0.5000000000"))).unwrap();
        assert_eq!(receipt.txid, "f00d");
    }

    #[test]
    fn test_receipt_fallback_reports_sent_amount() {
        let conn = MockConnector::new(|_, method, _| match method {
            "validateaddress" => Ok(json!({"isvalid": true})),
            "getbalance" => Ok(json!(5.0)),
            "sendtoaddress" => Ok(json!("beef")),
            _ => Err(CoinError::Rpc("Invalid or non-wallet transaction id".into())),
        });
        let mut m = manager(conn.clone());
        let receipt = scoped(&mut m, |m| m.send("bc1qdest", dec("1.12345678"))).unwrap();
        assert_eq!(receipt.amount, dec("1.12345678"));
        assert_eq!(receipt.fee, Decimal::ZERO);
        assert_eq!(receipt.from, None);

        let calls = conn.calls.lock().unwrap();
        let (_, _, params) = calls.iter().find(|(_, m, _)| m == "sendtoaddress").unwrap();
        assert_eq!(params[1], json!("1.12345678"));
    }

    #[test]
    fn test_health_network_failure_degrades_row() {
        let conn = MockConnector::new(|_, method, _| match method {
            "getblockchaininfo" => Ok(json!({"blocks": 800000, "headers": 800000})),
            "getbalance" => Ok(json!(0.25)),
            other => Err(CoinError::Rpc(format!("Method not found: {}", other))),
        });
        let mut m = manager(conn);
        let report = scoped(&mut m, |m| Ok(m.health())).unwrap();
        assert_eq!(report.rows[0], vec![
            "BTC", "Degraded", "800,000 (Headers: 800,000)", "-", "0.25000000", "-",
        ]);
    }

    #[test]
    fn test_used_before_open() {
        let mut m = manager(wallet(1.0));
        assert!(matches!(m.balance(), Err(CoinError::NotOpen(_))));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(12345678), "12,345,678");
    }
}
