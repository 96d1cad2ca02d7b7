//! Deposit - one observed incoming transaction

use crate::error::CoinResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An incoming transaction as seen by a Loader.
///
/// `(coin, txid, vout)` identifies a deposit; re-polling the same transaction yields the same key so
/// callers can deduplicate. Amounts are exact decimals and serialize as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub coin: String,
    pub txid: String,
    #[serde(default)]
    pub vout: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub amount: Decimal,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub tx_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
}

/// Deduplication key of a deposit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepositKey {
    pub coin: String,
    pub txid: String,
    pub vout: u32,
}

impl Deposit {
    pub fn new(coin: impl Into<String>, txid: impl Into<String>, amount: Decimal, tx_timestamp: DateTime<Utc>) -> Self {
        Self {
            coin: coin.into(), txid: txid.into(), vout: 0, address: None, amount, tx_timestamp,
            memo: None, from_account: None, to_account: None,
        }
    }

    pub fn with_vout(mut self, vout: u32) -> Self { self.vout = vout; self }
    pub fn with_address(mut self, address: impl Into<String>) -> Self { self.address = Some(address.into()); self }
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self { self.memo = Some(memo.into()); self }
    pub fn with_accounts(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.from_account = Some(from.into());
        self.to_account = Some(to.into());
        self
    }

    pub fn key(&self) -> DepositKey {
        DepositKey { coin: self.coin.clone(), txid: self.txid.clone(), vout: self.vout }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> CoinResult<Self> {
        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Accepts RFC 3339 strings (any offset, normalized to UTC) or unix seconds.
mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw { Unix(i64), Text(String) }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Unix(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}", secs))),
            Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| de::Error::custom(format!("invalid timestamp '{}': {}", s, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::str::FromStr;

    fn sample() -> Deposit {
        let ts = Utc.with_ymd_and_hms(2019, 3, 14, 10, 20, 30).unwrap();
        Deposit::new("BTC", "a1b2c3", Decimal::from_str("0.00012434").unwrap(), ts)
            .with_vout(1)
            .with_address("1Br7KPLQJFuS2naqidyzdciWUYhnMZAzKA")
    }

    #[test]
    fn test_map_round_trip_keeps_precision() {
        let deposit = sample();
        let map = deposit.to_map();
        assert_eq!(map["amount"], "0.00012434");
        let back = Deposit::from_map(map).unwrap();
        assert_eq!(back, deposit);
        assert_eq!(back.amount.to_string(), "0.00012434");
        assert_eq!(back.amount.scale(), 8);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let map = sample().to_map();
        assert!(!map.contains_key("memo"));
        assert!(!map.contains_key("from_account"));
        assert_eq!(map["vout"], 1);
    }

    #[test]
    fn test_timestamp_forms() {
        let unix = json!({"coin": "LTC", "txid": "ff", "amount": "1.5", "tx_timestamp": 1552558830});
        let d = Deposit::from_map(unix.as_object().unwrap().clone()).unwrap();
        assert_eq!(d.tx_timestamp, Utc.with_ymd_and_hms(2019, 3, 14, 10, 20, 30).unwrap());
        assert_eq!(d.vout, 0);

        let offset = json!({"coin": "LTC", "txid": "ff", "amount": "1.5", "tx_timestamp": "2019-03-14T12:20:30+02:00"});
        let d2 = Deposit::from_map(offset.as_object().unwrap().clone()).unwrap();
        assert_eq!(d2.tx_timestamp, d.tx_timestamp);

        let bad = json!({"coin": "LTC", "txid": "ff", "amount": "1.5", "tx_timestamp": "yesterday"});
        assert!(Deposit::from_map(bad.as_object().unwrap().clone()).is_err());
    }

    #[test]
    fn test_key_identifies_output() {
        let a = sample();
        let b = sample().with_vout(2);
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), sample().key());
    }
}
