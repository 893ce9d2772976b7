//! Internal transfer detection for one customer's batch.
//!
//! `TransferDetector::learn` scans the whole batch first; only the value it
//! returns can answer `is_internal`, so matching always sees the complete
//! account signature.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::{Direction, Transaction};

const TRANSFER_KEYWORDS: &[&str] = &[
    "TFER",
    "TRANSFER",
    "FUNDS TFER",
    "M-BANKING FUNDS",
    "INTERNET BANKING PAYMENT",
    "MOBILE BANKING PAYMENT",
];

const PAIR_DAY_TOLERANCE: i64 = 1;
const PAIR_AMOUNT_TOLERANCE: f64 = 0.01;
const MIN_PARTIAL_MATCH_LEN: usize = 6;

fn account_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b(\d{3})[- ]?(\d{6,9})\b",
            r"(?i)\b(?:to|from)\s+(\d{6,9})\b",
            r"(?i)\btransfer\s+\d+\s+(?:to|from)\s+(\d{6,9})\b",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Account identifiers referenced in a description.
pub fn extract_account_ids(description: &str) -> HashSet<String> {
    let mut ids = HashSet::new();
    for re in account_patterns() {
        for caps in re.captures_iter(description) {
            let id: String = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect();
            if !id.is_empty() {
                ids.insert(id);
            }
        }
    }
    ids
}

pub fn has_transfer_keyword(description: &str) -> bool {
    let upper = description.to_uppercase();
    TRANSFER_KEYWORDS.iter().any(|k| upper.contains(k))
}

pub fn hint_marks_internal(hint: Option<&str>) -> bool {
    hint.is_some_and(|h| h.to_lowercase().contains("internal transfer"))
}

/// Digits-only identifier for the customer's own account, when supplied.
fn own_account_id(txn: &Transaction) -> Option<String> {
    let account: String = txn
        .account_number
        .as_deref()?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if account.is_empty() {
        return None;
    }
    let bsb: String = txn
        .bsb
        .as_deref()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    Some(format!("{bsb}{account}"))
}

/// Learned state for one customer batch. Dropped with the batch.
#[derive(Debug, Default)]
pub struct TransferDetector {
    internal_ids: HashSet<String>,
    referenced: Vec<HashSet<String>>,
    paired: HashSet<usize>,
}

impl TransferDetector {
    pub fn learn(batch: &[Transaction]) -> Self {
        let referenced: Vec<HashSet<String>> = batch
            .iter()
            .map(|t| extract_account_ids(&t.description))
            .collect();

        let mut internal_ids = HashSet::new();
        let mut sides: HashMap<&str, (bool, bool)> = HashMap::new();
        for (txn, ids) in batch.iter().zip(&referenced) {
            if let Some(own) = own_account_id(txn) {
                internal_ids.insert(own.clone());
                if let Some(account) = txn.account_number.as_deref() {
                    let digits: String = account.chars().filter(|c| c.is_ascii_digit()).collect();
                    if digits.len() >= MIN_PARTIAL_MATCH_LEN {
                        internal_ids.insert(digits);
                    }
                }
            }
            let hinted = hint_marks_internal(txn.hint.as_deref());
            for id in ids {
                if hinted {
                    internal_ids.insert(id.clone());
                }
                let entry = sides.entry(id.as_str()).or_default();
                match txn.direction() {
                    Direction::Credit => entry.0 = true,
                    Direction::Debit => entry.1 = true,
                    Direction::Zero => {}
                }
            }
        }
        for (id, (credit, debit)) in sides {
            if credit && debit {
                internal_ids.insert(id.to_string());
            }
        }

        let paired = find_pairs(batch, &referenced);
        for &i in &paired {
            internal_ids.extend(referenced[i].iter().cloned());
        }

        debug!(
            transactions = batch.len(),
            internal_ids = internal_ids.len(),
            paired = paired.len(),
            "learned account signature"
        );
        Self {
            internal_ids,
            referenced,
            paired,
        }
    }

    /// `index` is the transaction's position in the batch passed to `learn`.
    pub fn is_internal(&self, index: usize, txn: &Transaction) -> bool {
        if hint_marks_internal(txn.hint.as_deref()) || self.paired.contains(&index) {
            return true;
        }
        let owned;
        let ids = match self.referenced.get(index) {
            Some(ids) => ids,
            None => {
                owned = extract_account_ids(&txn.description);
                &owned
            }
        };
        ids.iter().any(|id| self.is_internal_id(id))
    }

    fn is_internal_id(&self, id: &str) -> bool {
        if self.internal_ids.contains(id) {
            return true;
        }
        id.len() >= MIN_PARTIAL_MATCH_LEN
            && self.internal_ids.iter().any(|known| {
                known.len() >= MIN_PARTIAL_MATCH_LEN && (known.contains(id) || id.contains(known.as_str()))
            })
    }

    pub fn internal_ids(&self) -> &HashSet<String> {
        &self.internal_ids
    }
}

/// Indices of transactions that mirror another one: equal magnitude,
/// opposite sign, at most a day apart, and either both worded as transfers
/// or sharing an account identifier.
fn find_pairs(batch: &[Transaction], referenced: &[HashSet<String>]) -> HashSet<usize> {
    let mut order: Vec<usize> = (0..batch.len()).collect();
    order.sort_by_key(|&i| batch[i].date);

    let mut paired = HashSet::new();
    for (pos, &i) in order.iter().enumerate() {
        let a = &batch[i];
        if a.direction() == Direction::Zero {
            continue;
        }
        for &j in &order[pos + 1..] {
            let b = &batch[j];
            if (b.date - a.date).num_days() > PAIR_DAY_TOLERANCE {
                break;
            }
            let mirrored = a.direction() != b.direction()
                && b.direction() != Direction::Zero
                && (a.amount.abs() - b.amount.abs()).abs() < PAIR_AMOUNT_TOLERANCE;
            if !mirrored {
                continue;
            }
            let worded = has_transfer_keyword(&a.description) && has_transfer_keyword(&b.description);
            let shared = !referenced[i].is_disjoint(&referenced[j]);
            if worded || shared {
                paired.insert(i);
                paired.insert(j);
            }
        }
    }
    paired
}
