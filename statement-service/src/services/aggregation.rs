//! Shapes filtered statements into the text summary and report rows.

use crate::models::{flow_label, Account, AccountSelector, Flow, ReportRow, Transaction};
use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kept transactions of one account, oldest first.
#[derive(Debug, Clone)]
pub struct AccountStatement {
    pub organization_id: i64,
    pub organization_name: String,
    pub account: Account,
    pub transactions: Vec<Transaction>,
    pub flows: BTreeSet<Flow>,
}

impl AccountStatement {
    pub fn new(
        organization_id: i64,
        organization_name: impl Into<String>,
        account: Account,
        mut transactions: Vec<Transaction>,
        flows: BTreeSet<Flow>,
    ) -> Self {
        transactions.sort_by_key(|tx| tx.time);
        Self {
            organization_id,
            organization_name: organization_name.into(),
            account,
            transactions,
            flows,
        }
    }

    pub fn flow_label(&self) -> &'static str {
        flow_label(&self.flows)
    }

    pub fn title(&self) -> String {
        format!("{} – {}", self.organization_name, self.account.name)
    }
}

pub fn format_local(time: i64, tz: Tz) -> String {
    match Utc.timestamp_opt(time, 0).single() {
        Some(dt) => dt.with_timezone(&tz).format(DATETIME_FORMAT).to_string(),
        None => time.to_string(),
    }
}

/// Chat-friendly listing. With several accounts requested each section gets
/// a header and sections are separated by a blank line.
pub fn render_text(sections: &[AccountStatement], selector: AccountSelector, tz: Tz) -> String {
    let mut lines: Vec<String> = Vec::new();

    for section in sections {
        if selector.is_all() {
            lines.push(format!("💳 {} — {}:", section.title(), section.flow_label()));
        }

        let currency = section.account.currency();
        for tx in &section.transactions {
            lines.push(format!(
                "{} — {} {}",
                format_local(tx.time, tz),
                tx.decimal_amount(),
                currency
            ));
            if let Some(note) = tx.note() {
                lines.push(format!("  {}", note));
            }
        }

        if selector.is_all() {
            lines.push(String::new());
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// One row per kept transaction, ordered by organization, account, time.
pub fn build_rows(sections: &[AccountStatement], tz: Tz) -> Vec<ReportRow> {
    let mut rows: Vec<ReportRow> = sections
        .iter()
        .flat_map(|section| {
            let label = section.flow_label();
            section.transactions.iter().filter_map(move |tx| {
                Some(ReportRow {
                    organization_id: section.organization_id,
                    account_id: section.account.id,
                    organization_name: section.organization_name.clone(),
                    account_name: section.account.name.clone(),
                    time: tx.time,
                    datetime: format_local(tx.time, tz),
                    amount: tx.decimal_amount(),
                    comment: tx.note().unwrap_or_default().to_string(),
                    flow: tx.flow()?,
                    account_flow_label: label.to_string(),
                })
            })
        })
        .collect();

    rows.sort_by_key(|r| (r.organization_id, r.account_id, r.time));
    rows
}
