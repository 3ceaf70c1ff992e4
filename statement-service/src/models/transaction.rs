//! Provider transactions and the report rows derived from them.
//! Nothing here is persisted; every request re-fetches from the provider.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Direction of money relative to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    Incoming,
    Outgoing,
}

impl Flow {
    /// Positive amounts are incoming, negative outgoing. Zero has no flow.
    pub fn of(amount: i64) -> Option<Self> {
        match amount {
            a if a > 0 => Some(Self::Incoming),
            a if a < 0 => Some(Self::Outgoing),
            _ => None,
        }
    }
}

/// Section label naming the flows actually present for an account.
pub fn flow_label(flows: &BTreeSet<Flow>) -> &'static str {
    match (
        flows.contains(&Flow::Incoming),
        flows.contains(&Flow::Outgoing),
    ) {
        (true, true) => "incoming and outgoing payments",
        (false, true) => "outgoing payments",
        _ => "incoming payments",
    }
}

/// One statement item as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unix seconds.
    pub time: i64,
    /// Signed amount in minor units (kopiykas for UAH).
    pub amount: i64,
    #[serde(rename = "counterIban", default)]
    pub counter_iban: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Transaction {
    pub fn flow(&self) -> Option<Flow> {
        Flow::of(self.amount)
    }

    /// Free text shown under the entry: the payer comment, else the description.
    pub fn note(&self) -> Option<&str> {
        self.comment
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.description.as_deref().filter(|d| !d.trim().is_empty()))
    }

    /// Identity used to drop duplicates that overlapping pages can produce.
    pub fn dedup_key(&self) -> (i64, i64, Option<String>, Option<String>) {
        (
            self.time,
            self.amount,
            self.counter_iban.clone(),
            self.note().map(str::to_string),
        )
    }

    /// Amount in major units, e.g. `-1234` becomes `-12.34`.
    pub fn decimal_amount(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }
}

/// Inclusive `[from, to]` window in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub fn span_days(&self) -> f64 {
        (self.to - self.from) as f64 / SECONDS_PER_DAY
    }
}

/// One kept transaction, annotated for the spreadsheet renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub organization_id: i64,
    pub account_id: i64,
    pub organization_name: String,
    pub account_name: String,
    pub time: i64,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub datetime: String,
    pub amount: Decimal,
    pub comment: String,
    pub flow: Flow,
    pub account_flow_label: String,
}
