use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::trade::{FieldError, RawSource, TradeError, TradeRecord};

/// Trades built from one input plus the entries that had to be dropped.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub trades: Vec<TradeRecord>,
    pub rejected: Vec<RejectedEntry>,
}

/// A raw entry that could not be turned into a trade.
#[derive(Debug, Clone)]
pub struct RejectedEntry {
    /// Mapping key (JSON) or `line N` (CSV).
    pub key: String,
    pub raw: String,
    pub error: TradeError,
}

impl LoadOutcome {
    fn accept(
        &mut self,
        key: &str,
        raw: impl FnOnce() -> String,
        built: Result<TradeRecord, TradeError>,
    ) {
        match built {
            Ok(trade) => self.trades.push(trade),
            Err(error) => {
                let raw = raw();
                tracing::warn!(entry = %key, raw = %raw, "Skipping unexpected record: {error}");
                self.rejected.push(RejectedEntry {
                    key: key.to_string(),
                    raw,
                    error,
                });
            }
        }
    }
}

impl RawSource for Map<String, Value> {
    fn field(&self, name: &'static str) -> Result<&str, FieldError> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(FieldError::NotAString(name)),
            None => Err(FieldError::Missing(name)),
        }
    }
}

struct CsvRow<'a> {
    columns: &'a HashMap<String, usize>,
    record: &'a csv::StringRecord,
}

impl RawSource for CsvRow<'_> {
    fn field(&self, name: &'static str) -> Result<&str, FieldError> {
        self.columns
            .get(name)
            .and_then(|&i| self.record.get(i))
            .ok_or(FieldError::Missing(name))
    }
}

/// Builds trades from a CoinTracking `getTrades` response or JSON export.
///
/// The export is a mapping of id -> trade object. The API mixes in entries such as
/// `"success": 1` and `"method": "getTrades"`; anything that is not an object is
/// skipped silently. Objects that fail validation are logged and skipped.
pub fn load_trades_from_value(export: &Value) -> Result<LoadOutcome> {
    let entries = export
        .as_object()
        .ok_or_else(|| anyhow!("trade export must be a JSON object of id -> trade"))?;

    let mut outcome = LoadOutcome::default();

    for (key, entry) in entries {
        let Some(obj) = entry.as_object() else {
            tracing::debug!(entry = %key, "ignoring non-trade entry {entry}");
            continue;
        };
        outcome.accept(key, || entry.to_string(), TradeRecord::from_raw(obj));
    }

    Ok(outcome)
}

pub fn load_trades_from_json_str(json: &str) -> Result<LoadOutcome> {
    let value: Value = serde_json::from_str(json).context("trade export is not valid JSON")?;
    load_trades_from_value(&value)
}

pub fn load_trades_from_json_reader<R: Read>(mut reader: R) -> Result<LoadOutcome> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    load_trades_from_json_str(&buf)
}

/// Builds trades from a CSV whose header names the trade fields (any order).
///
/// A missing column is reported per row. A broken CSV stream aborts the load.
pub fn load_trades_from_csv<R: Read>(reader: R) -> Result<LoadOutcome> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers().context("Missing CSV headers")?.clone();
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_string(), i))
        .collect();

    let mut outcome = LoadOutcome::default();

    for (row_idx, rec) in csv_reader.records().enumerate() {
        let line = row_idx + 2;
        let rec = rec.with_context(|| format!("CSV read error at row {}", line))?;
        let row = CsvRow {
            columns: &columns,
            record: &rec,
        };
        outcome.accept(
            &format!("line {}", line),
            || rec.iter().collect::<Vec<_>>().join(","),
            TradeRecord::from_raw(&row),
        );
    }

    Ok(outcome)
}

/// Loads a trade file: `.csv` files as a CSV trade list, everything else as JSON export.
pub fn load_trades_from_file<P: AsRef<Path>>(path: P) -> Result<LoadOutcome> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;

    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    let outcome = if is_csv {
        load_trades_from_csv(file)
    } else {
        load_trades_from_json_reader(file)
    };
    outcome.with_context(|| format!("Cannot load trades from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::TradeType;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn movement(kind: &str, currency_field: &str, amount_field: &str, amount: &str) -> Value {
        let mut trade = json!({
            "type": kind,
            "time": "1000",
            "trade_id": "",
            "buy_currency": "",
            "sell_currency": "",
            "fee_currency": "BTC",
            "buy_amount": "",
            "sell_amount": "",
            "fee_amount": "0.01",
            "exchange": "Wallet",
            "group": "",
            "comment": "",
            "imported_from": "",
            "imported_time": "1000"
        });
        trade[currency_field] = json!("BTC");
        trade[amount_field] = json!(amount);
        trade
    }

    #[test]
    fn test_sentinels_are_skipped() {
        let export = json!({
            "success": 1,
            "0": movement("Withdrawal", "sell_currency", "sell_amount", "1.0"),
            "1": movement("Deposit", "buy_currency", "buy_amount", "0.98"),
            "method": "getTrades"
        });

        let outcome = load_trades_from_value(&export).unwrap();

        assert_eq!(outcome.trades.len(), 2);
        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.trades[0].trade_type, TradeType::Withdrawal);
        assert_eq!(outcome.trades[1].buy_amount, dec!(0.98));
    }

    #[test]
    fn test_bad_record_does_not_abort_batch() {
        let mut broken = movement("Deposit", "buy_currency", "buy_amount", "not-a-number");
        broken.as_object_mut().unwrap().remove("imported_from");

        let export = json!({
            "0": movement("Withdrawal", "sell_currency", "sell_amount", "1.0"),
            "1": broken,
            "2": movement("Deposit", "buy_currency", "buy_amount", "0.98")
        });

        let outcome = load_trades_from_value(&export).unwrap();

        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].key, "1");
        assert_eq!(outcome.rejected[0].error.fields.len(), 2);
        assert!(outcome.rejected[0].raw.contains("not-a-number"));
    }

    #[test]
    fn test_non_string_field_is_rejected() {
        let mut trade = movement("Deposit", "buy_currency", "buy_amount", "0.98");
        trade["time"] = json!(1000);

        let outcome = load_trades_from_value(&json!({ "0": trade })).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(
            outcome.rejected[0].error.fields,
            vec![FieldError::NotAString("time")]
        );
    }

    #[test]
    fn test_over_precise_amount_is_rejected() {
        let amount = "0.123456789012345678901234567891234";
        let export = json!({ "0": movement("Deposit", "buy_currency", "buy_amount", amount) });

        let outcome = load_trades_from_value(&export).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(
            outcome.rejected[0].error.fields,
            vec![FieldError::InvalidDecimal {
                field: "buy_amount",
                value: amount.to_string(),
            }]
        );
    }

    #[test]
    fn test_input_order_is_preserved() {
        let json = r#"{
            "9": {"type":"Trade","time":"3","trade_id":"c","buy_currency":"","sell_currency":"","fee_currency":"","buy_amount":"","sell_amount":"","fee_amount":"","exchange":"","group":"","comment":"","imported_from":"","imported_time":"0"},
            "1": {"type":"Trade","time":"1","trade_id":"a","buy_currency":"","sell_currency":"","fee_currency":"","buy_amount":"","sell_amount":"","fee_amount":"","exchange":"","group":"","comment":"","imported_from":"","imported_time":"0"},
            "5": {"type":"Trade","time":"2","trade_id":"b","buy_currency":"","sell_currency":"","fee_currency":"","buy_amount":"","sell_amount":"","fee_amount":"","exchange":"","group":"","comment":"","imported_from":"","imported_time":"0"}
        }"#;

        let outcome = load_trades_from_json_str(json).unwrap();
        let ids: Vec<&str> = outcome.trades.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_repeated_loads_give_same_keys() {
        let export = json!({
            "0": movement("Withdrawal", "sell_currency", "sell_amount", "1.00000000"),
            "1": movement("Deposit", "buy_currency", "buy_amount", "0.98")
        });

        let first = load_trades_from_value(&export).unwrap();
        let second = load_trades_from_value(&export).unwrap();

        let first_keys: Vec<_> = first.trades.iter().map(|t| t.key()).collect();
        let second_keys: Vec<_> = second.trades.iter().map(|t| t.key()).collect();
        assert_eq!(first_keys, second_keys);
    }

    #[test]
    fn test_top_level_must_be_object() {
        assert!(load_trades_from_value(&json!([1, 2, 3])).is_err());
        assert!(load_trades_from_json_str("{not json").is_err());
    }

    #[test]
    fn test_load_from_csv() {
        let csv = "\
time,type,trade_id,buy_amount,buy_currency,sell_amount,sell_currency,fee_amount,fee_currency,exchange,group,comment,imported_from,imported_time
1472563860,Trade,T1,1.95852928,BTC,1312.95150627,XMR,,,Poloniex,margin,,api,1472600000
oops,Trade,T2,1,BTC,1,XMR,,,Poloniex,,,api,1472600000
1472563900,Deposit,,0.5,BTC,,,,,Kraken,,,,1472600000
";

        let outcome = load_trades_from_csv(csv.as_bytes()).unwrap();

        assert_eq!(outcome.trades.len(), 2);
        assert_eq!(outcome.trades[0].sell_amount, dec!(1312.95150627));
        assert_eq!(outcome.trades[0].fee_amount, dec!(0));
        assert_eq!(outcome.trades[1].trade_type, TradeType::Deposit);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].key, "line 3");
    }

    #[test]
    fn test_csv_missing_column_is_per_row() {
        let csv = "time,type\n1000,Trade\n";

        let outcome = load_trades_from_csv(csv.as_bytes()).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.rejected[0]
            .error
            .fields
            .contains(&FieldError::Missing("trade_id")));
    }
}
