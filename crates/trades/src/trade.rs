use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Marker that flags a repeated entry as an accepted duplicate.
pub const DUPOK_MARKER: &str = "dupok";

/// Transaction types as labelled by CoinTracking's trade list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TradeType {
    Trade,
    Deposit,
    Withdrawal,
    Income,
    Mining,
    GiftTipIn,
    Spend,
    Donation,
    GiftOut,
    Stolen,
    Lost,
    /// Any label the service adds later. Kept verbatim, never a movement.
    Other(String),
}

impl TradeType {
    pub fn as_str(&self) -> &str {
        match self {
            TradeType::Trade => "Trade",
            TradeType::Deposit => "Deposit",
            TradeType::Withdrawal => "Withdrawal",
            TradeType::Income => "Income",
            TradeType::Mining => "Mining",
            TradeType::GiftTipIn => "Gift/Tip(In)",
            TradeType::Spend => "Spend",
            TradeType::Donation => "Donation",
            TradeType::GiftOut => "Gift(Out)",
            TradeType::Stolen => "Stolen",
            TradeType::Lost => "Lost",
            TradeType::Other(label) => label,
        }
    }

    /// Deposits and withdrawals are the two sides of a transfer between accounts.
    pub fn is_movement(&self) -> bool {
        matches!(self, TradeType::Deposit | TradeType::Withdrawal)
    }
}

impl From<&str> for TradeType {
    fn from(label: &str) -> Self {
        match label {
            "Trade" => TradeType::Trade,
            "Deposit" => TradeType::Deposit,
            "Withdrawal" => TradeType::Withdrawal,
            "Income" => TradeType::Income,
            "Mining" => TradeType::Mining,
            "Gift/Tip(In)" => TradeType::GiftTipIn,
            "Spend" => TradeType::Spend,
            "Donation" => TradeType::Donation,
            "Gift(Out)" => TradeType::GiftOut,
            "Stolen" => TradeType::Stolen,
            "Lost" => TradeType::Lost,
            other => TradeType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TradeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a single field of a raw entry could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field '{0}'")]
    Missing(&'static str),

    #[error("field '{0}' is not a string")]
    NotAString(&'static str),

    #[error("field 'type' is empty")]
    EmptyType,

    #[error("field '{field}' has invalid timestamp '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("field '{field}' has invalid decimal '{value}'")]
    InvalidDecimal { field: &'static str, value: String },
}

/// All field problems found while building one trade record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_field_errors(.fields))]
pub struct TradeError {
    pub fields: Vec<FieldError>,
}

fn join_field_errors(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A raw, not yet validated entry (a JSON object or a CSV row).
pub trait RawSource {
    /// Returns the untrimmed text of `name`, or why it cannot be read.
    fn field(&self, name: &'static str) -> Result<&str, FieldError>;
}

/// One normalized CoinTracking ledger entry.
///
/// Two records are equal when their identity keys are equal: annotations such as
/// `comment`, `group` or `exchange` never make two otherwise identical trades differ.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    #[serde(rename = "type")]
    pub trade_type: TradeType,
    #[serde(serialize_with = "serialize_time")]
    pub time: NaiveDateTime,
    pub trade_id: String,
    pub buy_currency: String,
    pub sell_currency: String,
    pub fee_currency: String,
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
    pub fee_amount: Decimal,
    pub exchange: String,
    pub group: String,
    pub comment: String,
    pub imported_from: String,
    #[serde(serialize_with = "serialize_time")]
    pub imported_time: NaiveDateTime,
}

/// The fields that make up a trade's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TradeKey<'a> {
    pub trade_id: &'a str,
    pub trade_type: &'a TradeType,
    pub time: NaiveDateTime,
    pub buy_currency: &'a str,
    pub sell_currency: &'a str,
    pub fee_currency: &'a str,
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
    pub fee_amount: Decimal,
}

impl TradeRecord {
    /// Validates every field of `source` and builds a record.
    ///
    /// String fields are trimmed, `time`/`imported_time` are epoch seconds (UTC)
    /// and blank amounts become zero. All problems are reported together.
    pub fn from_raw<S: RawSource + ?Sized>(source: &S) -> Result<Self, TradeError> {
        let mut errors = Vec::new();

        let type_label = take_text(source, "type", &mut errors);
        if type_label.is_empty() && errors.is_empty() {
            errors.push(FieldError::EmptyType);
        }

        let record = TradeRecord {
            trade_type: TradeType::from(type_label.as_str()),
            time: take_time(source, "time", &mut errors),
            trade_id: take_text(source, "trade_id", &mut errors),
            buy_currency: take_text(source, "buy_currency", &mut errors),
            sell_currency: take_text(source, "sell_currency", &mut errors),
            fee_currency: take_text(source, "fee_currency", &mut errors),
            buy_amount: take_amount(source, "buy_amount", &mut errors),
            sell_amount: take_amount(source, "sell_amount", &mut errors),
            fee_amount: take_amount(source, "fee_amount", &mut errors),
            exchange: take_text(source, "exchange", &mut errors),
            group: take_text(source, "group", &mut errors),
            comment: take_text(source, "comment", &mut errors),
            imported_from: take_text(source, "imported_from", &mut errors),
            imported_time: take_time(source, "imported_time", &mut errors),
        };

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(TradeError { fields: errors })
        }
    }

    pub fn key(&self) -> TradeKey<'_> {
        TradeKey {
            trade_id: &self.trade_id,
            trade_type: &self.trade_type,
            time: self.time,
            buy_currency: &self.buy_currency,
            sell_currency: &self.sell_currency,
            fee_currency: &self.fee_currency,
            buy_amount: self.buy_amount,
            sell_amount: self.sell_amount,
            fee_amount: self.fee_amount,
        }
    }

    /// True when the comment carries the `dupok` marker.
    pub fn is_dup_ok(&self) -> bool {
        self.comment.contains(DUPOK_MARKER)
    }

    /// Natural ordering of trades: by time only.
    pub fn cmp_time(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time)
    }
}

impl PartialEq for TradeRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TradeRecord {}

impl Hash for TradeRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for TradeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} -> {} {} (fee {} {}) @ {}",
            format_time(&self.time),
            self.trade_type,
            self.sell_amount,
            self.sell_currency,
            self.buy_amount,
            self.buy_currency,
            self.fee_amount,
            self.fee_currency,
            self.exchange
        )
    }
}

/// Stable sort by time; trades sharing a timestamp keep their input order.
pub fn sort_by_time(trades: &mut [TradeRecord]) {
    trades.sort_by(TradeRecord::cmp_time);
}

/// ISO-8601 with second resolution, e.g. `2016-08-30T13:31:00`.
pub fn format_time(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn serialize_time<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format("%Y-%m-%dT%H:%M:%S"))
}

/// Parses an exact decimal; blank input is zero.
///
/// Values that do not fit a `Decimal` without rounding are rejected.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return Some(Decimal::ZERO);
    }
    let value = Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()?;

    let parsed = value.normalize().mantissa().unsigned_abs().to_string();
    (significant_digits(s) == significant_digits(&parsed)).then_some(value)
}

/// Digits of the mantissa without leading or trailing zeros.
fn significant_digits(number: &str) -> usize {
    let mantissa = number.split(['e', 'E']).next().unwrap_or("");
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    digits.trim_matches('0').len()
}

/// Parses integer epoch seconds into a UTC timestamp.
pub fn parse_epoch_seconds(raw: &str) -> Option<NaiveDateTime> {
    let secs: i64 = raw.trim().parse().ok()?;
    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

fn take_text<S: RawSource + ?Sized>(
    source: &S,
    name: &'static str,
    errors: &mut Vec<FieldError>,
) -> String {
    match source.field(name) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            errors.push(e);
            String::new()
        }
    }
}

fn take_time<S: RawSource + ?Sized>(
    source: &S,
    name: &'static str,
    errors: &mut Vec<FieldError>,
) -> NaiveDateTime {
    let raw = match source.field(name) {
        Ok(s) => s,
        Err(e) => {
            errors.push(e);
            return NaiveDateTime::default();
        }
    };
    parse_epoch_seconds(raw).unwrap_or_else(|| {
        errors.push(FieldError::InvalidTimestamp {
            field: name,
            value: raw.trim().to_string(),
        });
        NaiveDateTime::default()
    })
}

fn take_amount<S: RawSource + ?Sized>(
    source: &S,
    name: &'static str,
    errors: &mut Vec<FieldError>,
) -> Decimal {
    let raw = match source.field(name) {
        Ok(s) => s,
        Err(e) => {
            errors.push(e);
            return Decimal::ZERO;
        }
    };
    parse_amount(raw).unwrap_or_else(|| {
        errors.push(FieldError::InvalidDecimal {
            field: name,
            value: raw.trim().to_string(),
        });
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct Fields(HashMap<&'static str, &'static str>);

    impl RawSource for Fields {
        fn field(&self, name: &'static str) -> Result<&str, FieldError> {
            self.0.get(name).copied().ok_or(FieldError::Missing(name))
        }
    }

    fn raw_withdrawal() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("type", " Withdrawal "),
            ("time", "1472563860"),
            ("trade_id", ""),
            ("buy_currency", ""),
            ("sell_currency", " BTC"),
            ("fee_currency", "BTC"),
            ("buy_amount", ""),
            ("sell_amount", "1.95852928"),
            ("fee_amount", "0.0005"),
            ("exchange", "Poloniex"),
            ("group", ""),
            ("comment", "to cold storage"),
            ("imported_from", "poloniex_api"),
            ("imported_time", "1472600000"),
        ])
    }

    #[test]
    fn test_from_raw_trims_and_parses() {
        let trade = TradeRecord::from_raw(&Fields(raw_withdrawal())).unwrap();

        assert_eq!(trade.trade_type, TradeType::Withdrawal);
        assert_eq!(trade.sell_currency, "BTC");
        assert_eq!(trade.sell_amount, dec!(1.95852928));
        assert_eq!(trade.buy_amount, Decimal::ZERO);
        assert_eq!(format_time(&trade.time), "2016-08-30T13:31:00");
        assert_eq!(trade.sell_amount.to_string(), "1.95852928");
    }

    #[test]
    fn test_from_raw_collects_every_field_error() {
        let mut raw = raw_withdrawal();
        raw.remove("exchange");
        raw.insert("time", "yesterday");
        raw.insert("fee_amount", "0,5");

        let err = TradeRecord::from_raw(&Fields(raw)).unwrap_err();

        assert_eq!(err.fields.len(), 3);
        assert!(err.fields.contains(&FieldError::Missing("exchange")));
        assert!(err.fields.contains(&FieldError::InvalidTimestamp {
            field: "time",
            value: "yesterday".to_string()
        }));
        assert!(err.to_string().contains("invalid decimal '0,5'"));
    }

    #[test]
    fn test_blank_type_is_rejected() {
        let mut raw = raw_withdrawal();
        raw.insert("type", "   ");

        let err = TradeRecord::from_raw(&Fields(raw)).unwrap_err();
        assert_eq!(err.fields, vec![FieldError::EmptyType]);
    }

    #[test]
    fn test_type_labels_round_trip() {
        for label in ["Gift/Tip(In)", "Gift(Out)", "Deposit", "Margin Profit"] {
            assert_eq!(TradeType::from(label).as_str(), label);
        }
        assert_eq!(
            TradeType::from("Margin Profit"),
            TradeType::Other("Margin Profit".to_string())
        );
        assert!(!TradeType::from("Margin Profit").is_movement());
    }

    #[test]
    fn test_identity_ignores_annotations() {
        let a = TradeRecord::from_raw(&Fields(raw_withdrawal())).unwrap();
        let mut b = a.clone();
        b.comment = "dupok".to_string();
        b.group = "cold".to_string();
        b.exchange = "Kraken".to_string();
        b.fee_amount = dec!(0.00050);

        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());

        b.trade_id = "X1".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("  "), Some(Decimal::ZERO));
        assert_eq!(parse_amount("1312.95150627"), Some(dec!(1312.95150627)));
        assert_eq!(parse_amount("1e-8"), Some(dec!(0.00000001)));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("-0.50"), Some(dec!(-0.5)));
        assert_eq!(parse_amount("1000"), Some(dec!(1000)));
        assert_eq!(parse_amount("0.10000000000000000000000000000000"), Some(dec!(0.1)));
    }

    #[test]
    fn test_parse_amount_refuses_rounding() {
        assert_eq!(
            parse_amount("0.1234567890123456789012345678"),
            Some(dec!(0.1234567890123456789012345678))
        );
        assert_eq!(parse_amount("0.123456789012345678901234567891234"), None);
        assert_eq!(parse_amount("0.00000000000000000000000000001"), None);
    }

    #[test]
    fn test_sort_by_time_is_stable() {
        let base = TradeRecord::from_raw(&Fields(raw_withdrawal())).unwrap();
        let mut late = base.clone();
        late.time = parse_epoch_seconds("1472563900").unwrap();
        let mut tie = base.clone();
        tie.trade_id = "second".to_string();

        let mut trades = vec![late.clone(), base.clone(), tie.clone()];
        sort_by_time(&mut trades);

        let ids: Vec<&str> = trades.iter().map(|t| t.trade_id.as_str()).collect();
        assert_eq!(ids, vec!["", "second", ""]);
        assert_eq!(trades[2].time, late.time);
    }

    #[test]
    fn test_serialized_field_order() {
        let trade = TradeRecord::from_raw(&Fields(raw_withdrawal())).unwrap();
        let value = serde_json::to_value(&trade).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();

        assert_eq!(keys[0], "type");
        assert_eq!(keys[1], "time");
        assert_eq!(keys[13], "imported_time");
        assert_eq!(value["sell_amount"], "1.95852928");
        assert_eq!(value["type"], "Withdrawal");
    }
}
