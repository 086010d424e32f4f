//! Folds same-day trades into one row, e.g. for reporting margin trades.
//!
//! Rows can be combined when they share the currency pair, the exchange and
//! the date. Only neighbouring rows are folded, so the input is expected to be
//! the trade list export sorted by date.
//!
//! Basic layout (set the trade list columns up this way):
//!
//! ```text
//! Buy amount, Buy currency, Buy in EUR, Sell amount, Sell currency, Sell in EUR, Exchange, Date
//! 1.95852928, BTC, 114.87092795, 1312.95150627, XMR, 116.15735953, Poloniex, 30.08.2016 13:31
//! ```
//!
//! The extended layout appends `Fee amount, Fee currency, Group, Comment, Tx-ID`.

use anyhow::{anyhow, bail, Context, Result};
use csv::StringRecord;
use rust_decimal::Decimal;
use std::io::{Read, Write};

use crate::trade::parse_amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayLayout {
    Basic,
    Extended,
}

impl DayLayout {
    pub fn from_width(columns: usize) -> Option<Self> {
        match columns {
            8 => Some(DayLayout::Basic),
            13 => Some(DayLayout::Extended),
            _ => None,
        }
    }

    pub fn width(self) -> usize {
        match self {
            DayLayout::Basic => 8,
            DayLayout::Extended => 13,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DayRecord {
    pub buy_amount: Decimal,
    pub buy_currency: String,
    pub buy_value_eur: Decimal,
    pub sell_amount: Decimal,
    pub sell_currency: String,
    pub sell_value_eur: Decimal,
    pub exchange: String,
    /// Calendar day, kept in the export's own format.
    pub date: String,
    pub fee_amount: Decimal,
    pub fee_currency: String,
    pub group: String,
    pub comment: String,
    pub tx_id: String,
}

impl DayRecord {
    /// Parses one data row. The time of day is dropped from the date cell.
    pub fn from_row(row: &StringRecord, layout: DayLayout) -> Result<Self> {
        if row.len() != layout.width() {
            bail!("expected {} columns, found {}", layout.width(), row.len());
        }

        let cell = |i: usize| row.get(i).unwrap_or("").trim();
        let amount = |i: usize, name: &str| {
            parse_amount(cell(i)).ok_or_else(|| anyhow!("invalid {} '{}'", name, cell(i)))
        };

        let mut record = DayRecord {
            buy_amount: amount(0, "buy amount")?,
            buy_currency: cell(1).to_string(),
            buy_value_eur: amount(2, "buy value")?,
            sell_amount: amount(3, "sell amount")?,
            sell_currency: cell(4).to_string(),
            sell_value_eur: amount(5, "sell value")?,
            exchange: cell(6).to_string(),
            date: cell(7).split_whitespace().next().unwrap_or("").to_string(),
            ..DayRecord::default()
        };

        if layout == DayLayout::Extended {
            record.fee_amount = amount(8, "fee amount")?;
            record.fee_currency = cell(9).to_string();
            record.group = cell(10).to_string();
            record.comment = cell(11).to_string();
            record.tx_id = cell(12).to_string();
        }

        Ok(record)
    }

    pub fn to_row(&self, layout: DayLayout) -> Vec<String> {
        let mut row = vec![
            self.buy_amount.to_string(),
            self.buy_currency.clone(),
            self.buy_value_eur.to_string(),
            self.sell_amount.to_string(),
            self.sell_currency.clone(),
            self.sell_value_eur.to_string(),
            self.exchange.clone(),
            self.date.clone(),
        ];
        if layout == DayLayout::Extended {
            row.extend([
                self.fee_amount.to_string(),
                self.fee_currency.clone(),
                self.group.clone(),
                self.comment.clone(),
                self.tx_id.clone(),
            ]);
        }
        row
    }

    /// Same currency pair, same exchange, same day.
    pub fn is_combinable(&self, other: &Self) -> bool {
        self.buy_currency == other.buy_currency
            && self.sell_currency == other.sell_currency
            && self.exchange == other.exchange
            && self.date == other.date
    }

    /// Sums the amounts of two combinable rows into a new one.
    ///
    /// Text fields keep the first non-empty value.
    pub fn combine(&self, other: &Self) -> Result<Self> {
        let sum = |a: Decimal, b: Decimal| {
            a.checked_add(b)
                .ok_or_else(|| anyhow!("amount overflow adding {} and {}", a, b))
        };

        Ok(DayRecord {
            buy_amount: sum(self.buy_amount, other.buy_amount)?,
            buy_currency: self.buy_currency.clone(),
            buy_value_eur: sum(self.buy_value_eur, other.buy_value_eur)?,
            sell_amount: sum(self.sell_amount, other.sell_amount)?,
            sell_currency: self.sell_currency.clone(),
            sell_value_eur: sum(self.sell_value_eur, other.sell_value_eur)?,
            exchange: self.exchange.clone(),
            date: self.date.clone(),
            fee_amount: sum(self.fee_amount, other.fee_amount)?,
            fee_currency: first_non_empty(&self.fee_currency, &other.fee_currency),
            group: first_non_empty(&self.group, &other.group),
            comment: first_non_empty(&self.comment, &other.comment),
            tx_id: first_non_empty(&self.tx_id, &other.tx_id),
        })
    }
}

fn first_non_empty(first: &str, second: &str) -> String {
    let chosen = if first.is_empty() { second } else { first };
    chosen.to_string()
}

/// Single pass over `records`, merging each row into the pending one while they combine.
pub fn fold_by_day(records: Vec<DayRecord>) -> Result<Vec<DayRecord>> {
    let mut output = Vec::new();
    let mut pending: Option<DayRecord> = None;

    for record in records {
        pending = Some(match pending.take() {
            Some(previous) if previous.is_combinable(&record) => previous.combine(&record)?,
            Some(previous) => {
                output.push(previous);
                record
            }
            None => record,
        });
    }

    output.extend(pending);
    Ok(output)
}

#[derive(Debug, Clone)]
pub struct DayGroupingSummary {
    pub header: Vec<String>,
    pub rows_read: usize,
    pub records_written: usize,
}

/// A trade list after folding, ready to be written out.
#[derive(Debug, Clone)]
pub struct GroupedDays {
    /// Header row exactly as read.
    pub header: StringRecord,
    pub layout: DayLayout,
    pub rows_read: usize,
    pub records: Vec<DayRecord>,
}

/// Reads a whole trade list CSV and folds same-day rows.
///
/// Fails on the first unreadable row, naming its line, before anything is written.
pub fn read_grouped_days<R: Read>(input: R) -> Result<GroupedDays> {
    // Cells are trimmed in `DayRecord::from_row`; the header stays untouched.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let header = reader.headers().context("Missing CSV headers")?.clone();
    let layout = DayLayout::from_width(header.len()).ok_or_else(|| {
        anyhow!(
            "unsupported CSV layout: expected 8 or 13 columns, header has {}",
            header.len()
        )
    })?;

    let mut records = Vec::new();
    for (row_idx, rec) in reader.records().enumerate() {
        let line = row_idx + 2;
        let rec = rec.with_context(|| format!("CSV read error at line {}", line))?;
        let record = DayRecord::from_row(&rec, layout)
            .with_context(|| format!("Invalid row at line {}", line))?;
        records.push(record);
    }
    let rows_read = records.len();

    let records = fold_by_day(records)?;
    tracing::debug!(rows_read, grouped = records.len(), "folded same-day rows");

    Ok(GroupedDays {
        header,
        layout,
        rows_read,
        records,
    })
}

/// Writes folded rows below the original header.
pub fn write_grouped_days<W: Write>(
    grouped: &GroupedDays,
    output: W,
) -> Result<DayGroupingSummary> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(&grouped.header)?;
    for record in &grouped.records {
        writer.write_record(record.to_row(grouped.layout))?;
    }
    writer.flush()?;

    Ok(DayGroupingSummary {
        header: grouped.header.iter().map(|h| h.to_string()).collect(),
        rows_read: grouped.rows_read,
        records_written: grouped.records.len(),
    })
}

/// Reads a trade list CSV, folds same-day rows and writes the result with the original header.
pub fn group_by_day<R: Read, W: Write>(input: R, output: W) -> Result<DayGroupingSummary> {
    let grouped = read_grouped_days(input)?;
    write_grouped_days(&grouped, output)
}
