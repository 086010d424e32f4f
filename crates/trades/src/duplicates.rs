use serde::Serialize;
use std::collections::HashSet;

use crate::trade::TradeRecord;

/// Result of a duplicate scan over a trade list.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport<'a> {
    pub checked: usize,
    pub duplicates: Vec<&'a TradeRecord>,
}

impl DuplicateReport<'_> {
    pub fn has_duplicates(&self) -> bool {
        !self.duplicates.is_empty()
    }
}

/// Returns every repeat of an already seen trade, in input order.
///
/// The first occurrence of a key is never reported. A key seen k times yields
/// k - 1 repeats; repeats whose comment contains `dupok` are left out without
/// affecting the other repeats of the same key.
pub fn find_duplicates(trades: &[TradeRecord]) -> Vec<&TradeRecord> {
    let mut seen = HashSet::with_capacity(trades.len());
    let mut duplicates = Vec::new();

    for trade in trades {
        if seen.insert(trade.key()) {
            continue;
        }
        if trade.is_dup_ok() {
            tracing::debug!(trade_id = %trade.trade_id, "duplicate marked as dupok: {trade}");
            continue;
        }
        duplicates.push(trade);
    }

    duplicates
}

pub fn duplicate_report(trades: &[TradeRecord]) -> DuplicateReport<'_> {
    DuplicateReport {
        checked: trades.len(),
        duplicates: find_duplicates(trades),
    }
}
