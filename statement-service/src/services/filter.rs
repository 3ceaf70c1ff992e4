//! Counter-party ignore list and flow filtering.

use crate::models::{Flow, PermissionSet, Transaction};
use std::collections::{BTreeSet, HashSet};

/// Canonical form used in the ignore list: no whitespace, lowercase.
pub fn normalize_iban(iban: &str) -> String {
    iban.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Builds the ignore set from stored entries as written by hand: any case,
/// grouped with spaces. Blank entries are dropped.
pub fn ignore_set<I, S>(raw: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|iban| normalize_iban(iban.as_ref()))
        .filter(|iban| !iban.is_empty())
        .collect()
}

/// Whether a transaction survives the ignore list. Zero amounts never do.
pub fn keep(tx: &Transaction, ignore: &HashSet<String>) -> bool {
    if tx.amount == 0 {
        return false;
    }
    match tx.counter_iban.as_deref() {
        Some(iban) if !iban.trim().is_empty() => !ignore.contains(&normalize_iban(iban)),
        _ => true,
    }
}

/// Kept transactions and the flows actually present among them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filtered {
    pub kept: Vec<Transaction>,
    pub flows: BTreeSet<Flow>,
}

/// Applies the ignore list and the account's allowed flows.
pub fn filter_transactions(
    transactions: impl IntoIterator<Item = Transaction>,
    ignore: &HashSet<String>,
    allowed: &PermissionSet,
) -> Filtered {
    let mut out = Filtered::default();
    for tx in transactions {
        if !keep(&tx, ignore) {
            continue;
        }
        let Some(flow) = tx.flow() else { continue };
        if !allowed.allows(flow) {
            continue;
        }
        out.flows.insert(flow);
        out.kept.push(tx);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(time: i64, amount: i64, iban: Option<&str>) -> Transaction {
        Transaction {
            time,
            amount,
            counter_iban: iban.map(str::to_string),
            comment: None,
            description: None,
        }
    }

    fn ignore(ibans: &[&str]) -> HashSet<String> {
        ignore_set(ibans)
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx(1, 500, Some("UA00 0000 0000 0000 0000 0000 0000 01")),
            tx(2, -300, None),
            tx(3, 0, None),
            tx(4, 700, Some("ua0000000000000000000000000002")),
            tx(5, -50, Some("UA0000000000000000000000000003")),
            tx(6, 0, Some("UA0000000000000000000000000001")),
        ]
    }

    #[test]
    fn iban_match_is_case_and_space_insensitive() {
        let set = ignore(&["UA0000000000000000000000000001"]);
        assert!(!keep(&tx(1, 10, Some("ua00 0000 0000 0000 0000 0000 0000 01")), &set));
        assert!(keep(&tx(1, 10, Some("UA0000000000000000000000000002")), &set));
        assert!(keep(&tx(1, 10, None), &set));
    }

    #[test]
    fn stored_entries_are_normalized() {
        let set = ignore_set(["UA00 0000 0000 0000 0000 0000 0000 01", "  ", ""]);
        assert_eq!(set, HashSet::from(["ua0000000000000000000000000001".to_string()]));
        assert!(!keep(&tx(1, 10, Some("UA0000000000000000000000000001")), &set));
    }

    #[test]
    fn zero_amounts_are_never_kept() {
        for allowed in [PermissionSet::incoming_only(), PermissionSet::full()] {
            for set in [ignore(&[]), ignore(&["UA0000000000000000000000000002"])] {
                let out = filter_transactions(sample(), &set, &allowed);
                assert!(out.kept.iter().all(|t| t.amount != 0));
            }
        }
    }

    #[test]
    fn filtering_is_idempotent() {
        let set = ignore(&["UA0000000000000000000000000001"]);
        for allowed in [
            PermissionSet::incoming_only(),
            PermissionSet::normalize("out"),
            PermissionSet::full(),
        ] {
            let once = filter_transactions(sample(), &set, &allowed);
            let twice = filter_transactions(once.kept.clone(), &set, &allowed);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn flows_report_what_is_present_not_what_is_allowed() {
        let only_incoming = vec![tx(1, 100, None), tx(2, 200, None)];
        let out = filter_transactions(only_incoming, &ignore(&[]), &PermissionSet::full());
        assert_eq!(out.flows, BTreeSet::from([Flow::Incoming]));
    }

    #[test]
    fn outgoing_dropped_without_permission() {
        let out = filter_transactions(sample(), &ignore(&[]), &PermissionSet::incoming_only());
        assert!(out.kept.iter().all(|t| t.amount > 0));
        assert_eq!(out.kept.len(), 2);
    }
}
