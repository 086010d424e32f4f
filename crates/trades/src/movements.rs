//! Double-entry check for transfers between accounts.
//!
//! Every withdrawal should have exactly one deposit booked at the same second
//! (and vice versa) moving the same net amount of the same currency.

use serde::Serialize;

use crate::trade::{TradeRecord, TradeType};

/// A movement with more than one possible counterpart.
#[derive(Debug, Clone, Serialize)]
pub struct AmbiguousMovement<'a> {
    pub movement: &'a TradeRecord,
    pub candidates: Vec<&'a TradeRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementReport<'a> {
    pub checked: usize,
    pub unmatched: Vec<&'a TradeRecord>,
    /// Reported as warnings; not part of the unmatched total.
    pub ambiguous: Vec<AmbiguousMovement<'a>>,
}

impl MovementReport<'_> {
    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.unmatched.is_empty() && self.ambiguous.is_empty()
    }
}

/// True when one side is a withdrawal and the other a deposit of the same
/// currency, booked at the same second, with equal net amounts:
/// `sell_amount - fee` sent equals `buy_amount + fee` received.
pub fn movements_match(a: &TradeRecord, b: &TradeRecord) -> bool {
    if a.time != b.time {
        return false;
    }

    let (withdrawal, deposit) = match (&a.trade_type, &b.trade_type) {
        (TradeType::Withdrawal, TradeType::Deposit) => (a, b),
        (TradeType::Deposit, TradeType::Withdrawal) => (b, a),
        _ => return false,
    };

    if withdrawal.sell_currency != deposit.buy_currency {
        return false;
    }

    let sent = withdrawal.sell_amount.checked_sub(withdrawal.fee_amount);
    let received = deposit.buy_amount.checked_add(deposit.fee_amount);
    matches!((sent, received), (Some(s), Some(r)) if s == r)
}

/// Pairs every deposit and withdrawal with its counterpart.
///
/// Trades are viewed in time order (stable, ties keep input order). For each
/// movement only the band of trades sharing its exact timestamp is searched:
/// no match makes it unmatched, more than one makes it ambiguous.
pub fn reconcile_movements(trades: &[TradeRecord]) -> MovementReport<'_> {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by(|a, b| a.cmp_time(b));

    let mut unmatched = Vec::new();
    let mut ambiguous = Vec::new();

    for (i, &trade) in ordered.iter().enumerate() {
        if !trade.trade_type.is_movement() {
            continue;
        }

        let before = ordered[..i]
            .iter()
            .rev()
            .take_while(|other| other.time == trade.time);
        let after = ordered[i + 1..]
            .iter()
            .take_while(|other| other.time == trade.time);

        let candidates: Vec<&TradeRecord> = before
            .chain(after)
            .copied()
            .filter(|other| movements_match(other, trade))
            .collect();

        match candidates.len() {
            0 => {
                tracing::debug!("no counterpart for {trade}");
                unmatched.push(trade);
            }
            1 => {}
            n => {
                tracing::warn!("{n} possible counterparts for {trade}, check for duplicates");
                ambiguous.push(AmbiguousMovement {
                    movement: trade,
                    candidates,
                });
            }
        }
    }

    MovementReport {
        checked: trades.len(),
        unmatched,
        ambiguous,
    }
}
