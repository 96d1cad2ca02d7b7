//! Reports returned by managers: send receipts and fixed-shape health tables

use crate::core::keys::health as cells;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendType { Send, Issue }

/// Reference to an outgoing payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub txid: String,
    pub coin: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub from: Option<String>,
    pub send_type: SendType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus { Online, Degraded, Offline }

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self { HealthStatus::Online => cells::ONLINE, HealthStatus::Degraded => cells::DEGRADED, HealthStatus::Offline => cells::OFFLINE }
    }
}

/// One coin's health. Unknown fields stay `None` and render as the placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthRow {
    pub symbol: String,
    pub status: HealthStatus,
    pub block: Option<String>,
    pub version: Option<String>,
    pub balance: Option<String>,
    pub peers: Option<String>,
}

impl HealthRow {
    pub fn new(symbol: impl Into<String>, status: HealthStatus) -> Self {
        Self { symbol: symbol.into(), status, block: None, version: None, balance: None, peers: None }
    }

    fn cells(&self) -> Vec<String> {
        let fill = |v: &Option<String>| v.clone().unwrap_or_else(|| cells::PLACEHOLDER.to_string());
        vec![
            self.symbol.clone(), self.status.as_str().to_string(),
            fill(&self.block), fill(&self.version), fill(&self.balance), fill(&self.peers),
        ]
    }
}

/// Handler name, column headers, and one row per managed coin. Every row has exactly one cell per header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub handler: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl HealthReport {
    pub fn new(handler: impl Into<String>) -> Self {
        Self { handler: handler.into(), headers: cells::COLUMNS.iter().map(|s| (*s).to_string()).collect(), rows: Vec::new() }
    }

    pub fn with_row(mut self, row: HealthRow) -> Self { self.rows.push(row.cells()); self }

    /// Status cell of the first row whose symbol matches.
    pub fn status_of(&self, symbol: &str) -> Option<&str> {
        self.rows.iter().find(|r| r.first().map(|s| s == symbol).unwrap_or(false)).and_then(|r| r.get(1)).map(|s| s.as_str())
    }

    pub fn is_online(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.get(1).map(|s| s == cells::ONLINE).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_fixed_width() {
        let mut row = HealthRow::new("BTC", HealthStatus::Offline);
        row.version = Some("210000".into());
        let report = HealthReport::new("BitcoindManager").with_row(row);
        assert_eq!(report.rows[0].len(), report.headers.len());
        assert_eq!(report.rows[0], vec!["BTC", "Offline", "-", "210000", "-", "-"]);
        assert_eq!(report.status_of("BTC"), Some("Offline"));
        assert!(!report.is_online());
    }

    #[test]
    fn test_empty_report_is_not_online() {
        assert!(!HealthReport::new("X").is_online());
        let report = HealthReport::new("X").with_row(HealthRow::new("X", HealthStatus::Online));
        assert!(report.is_online());
    }
}
