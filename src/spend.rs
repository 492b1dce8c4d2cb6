// ===============================
// src/spend.rs (ad spend joiner)
// ===============================
use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::{AdSpendRecord, DateRange};

pub const DEFAULT_MVA_RATE: Decimal = dec!(0.25);

/// VAT ("MVA") markup applied to raw spend when `include` is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MvaConfig {
    pub include: bool,
    pub rate: Decimal,
}

impl Default for MvaConfig {
    fn default() -> Self {
        Self { include: false, rate: DEFAULT_MVA_RATE }
    }
}

impl MvaConfig {
    pub fn included(rate: Decimal) -> Self {
        Self { include: true, rate }
    }

    pub fn apply(&self, amount: Decimal) -> Decimal {
        if self.include {
            amount * (Decimal::ONE + self.rate)
        } else {
            amount
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedDay {
    pub date: NaiveDate,
    pub ad_spend: Decimal,
    pub revenue: Decimal,
    pub tickets: i64,
}

/// Folds records into `date -> amount`; several records on one date add up.
pub fn spend_by_date(records: &[AdSpendRecord]) -> BTreeMap<NaiveDate, Decimal> {
    let mut out = BTreeMap::new();
    for r in records {
        *out.entry(r.date).or_insert(Decimal::ZERO) += r.amount;
    }
    out
}

/// One row per date in `window`. Missing spend or sales default to zero.
pub fn join(
    window: DateRange,
    spend: &BTreeMap<NaiveDate, Decimal>,
    sales: &BTreeMap<NaiveDate, (i64, Decimal)>,
    mva: MvaConfig,
) -> Vec<JoinedDay> {
    window
        .dates()
        .map(|date| {
            let raw = spend.get(&date).copied().unwrap_or(Decimal::ZERO);
            let (tickets, revenue) = sales.get(&date).copied().unwrap_or((0, Decimal::ZERO));
            JoinedDay { date, ad_spend: mva.apply(raw), revenue, tickets }
        })
        .collect()
}
