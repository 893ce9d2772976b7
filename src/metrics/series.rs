use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::CategorizedTransaction;
use crate::normalizer::normalize_description;

use super::config::MetricsConfig;

pub const NORMALIZED_MONTH_DAYS: f64 = 30.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 30,
    }
}

pub fn in_codes(codes: &[String], code: &str) -> bool {
    codes.iter().any(|c| c == code)
}

/// Stable identity of an income source or payee: the normalized merchant
/// key, or the lowercased description when normalization strips it all.
pub fn source_key(description: &str) -> String {
    let key = normalize_description(description);
    if key.is_empty() {
        description.trim().to_lowercase()
    } else {
        key.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// Reporting window
// ---------------------------------------------------------------------------

/// Transactions inside the reporting window with internal transfers removed.
pub struct Window<'a> {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub recent_start: NaiveDate,
    pub txns: Vec<&'a CategorizedTransaction>,
}

impl<'a> Window<'a> {
    /// The window ends at `as_of` when given, else at the latest transaction
    /// date, else today.
    pub fn new(
        all: &'a [CategorizedTransaction],
        transfer_code: &str,
        config: &MetricsConfig,
        as_of: Option<NaiveDate>,
    ) -> Self {
        let end = as_of
            .or_else(|| all.iter().map(|c| c.txn.date).max())
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let start = end - Duration::days(config.reporting_period_days);
        let recent_start = end - Duration::days(config.recent_months * 30);
        let txns = all
            .iter()
            .filter(|c| c.txn.date >= start && c.txn.date <= end)
            .filter(|c| c.decision.code != transfer_code)
            .collect();
        Self {
            start,
            end,
            recent_start,
            txns,
        }
    }

    pub fn credits(&self) -> impl Iterator<Item = &'a CategorizedTransaction> + '_ {
        self.txns.iter().copied().filter(|c| c.txn.amount > 0.0)
    }

    pub fn debits(&self) -> impl Iterator<Item = &'a CategorizedTransaction> + '_ {
        self.txns.iter().copied().filter(|c| c.txn.amount < 0.0)
    }

    pub fn credits_in<'c>(
        &'c self,
        codes: &'c [String],
    ) -> impl Iterator<Item = &'a CategorizedTransaction> + 'c {
        self.credits().filter(move |c| in_codes(codes, &c.decision.code))
    }

    pub fn debits_in<'c>(
        &'c self,
        codes: &'c [String],
    ) -> impl Iterator<Item = &'a CategorizedTransaction> + 'c {
        self.debits().filter(move |c| in_codes(codes, &c.decision.code))
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.txns.iter().any(|c| c.decision.code == code)
    }

    pub fn has_debit_in(&self, codes: &[String]) -> bool {
        self.debits_in(codes).next().is_some()
    }
}

/// Sum of absolute amounts.
pub fn total<'a>(txns: impl Iterator<Item = &'a CategorizedTransaction>) -> f64 {
    txns.map(|c| c.txn.amount.abs()).sum()
}

/// Distinct (code, source) pairs.
pub fn count_sources<'a>(txns: impl Iterator<Item = &'a CategorizedTransaction>) -> usize {
    txns.map(|c| (c.decision.code.as_str(), source_key(&c.txn.description)))
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn count_merchants<'a>(txns: impl Iterator<Item = &'a CategorizedTransaction>) -> usize {
    txns.map(|c| source_key(&c.txn.description))
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn group_by_source<'a>(
    txns: impl Iterator<Item = &'a CategorizedTransaction>,
) -> BTreeMap<(String, String), Vec<&'a CategorizedTransaction>> {
    let mut groups: BTreeMap<(String, String), Vec<&'a CategorizedTransaction>> = BTreeMap::new();
    for c in txns {
        groups
            .entry((c.decision.code.clone(), source_key(&c.txn.description)))
            .or_default()
            .push(c);
    }
    groups
}

// ---------------------------------------------------------------------------
// Monthly series
// ---------------------------------------------------------------------------

/// Absolute amounts summed per calendar month, each month scaled to 30 days.
/// Only months with activity appear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySeries {
    sums: BTreeMap<(i32, u32), f64>,
}

impl MonthlySeries {
    pub fn from_txns<'a>(txns: impl Iterator<Item = &'a CategorizedTransaction>) -> Self {
        let mut series = Self::default();
        for c in txns {
            series.add(c.txn.date, c.txn.amount.abs());
        }
        series
    }

    pub fn add(&mut self, date: NaiveDate, amount: f64) {
        *self.sums.entry((date.year(), date.month())).or_insert(0.0) += amount;
    }

    pub fn merge(&mut self, other: &MonthlySeries) {
        for (month, sum) in &other.sums {
            *self.sums.entry(*month).or_insert(0.0) += sum;
        }
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    /// Normalized monthly values, oldest first.
    pub fn values(&self) -> Vec<f64> {
        self.sums
            .iter()
            .map(|(&(year, month), sum)| {
                sum * NORMALIZED_MONTH_DAYS / days_in_month(year, month) as f64
            })
            .collect()
    }

    pub fn mean(&self) -> f64 {
        let values = self.values();
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    pub fn median(&self) -> f64 {
        let mut values = self.values();
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }

    /// Consecutive months, counted back from the latest, each within
    /// `threshold` of the month before it. None below three months.
    pub fn stable_months(&self, threshold: f64) -> Option<i64> {
        self.count_back(|prev, cur| {
            if prev == 0.0 {
                return cur == 0.0;
            }
            (cur - prev).abs() / prev.abs() <= threshold
        })
    }

    /// Like `stable_months`, but any increase also counts.
    pub fn secure_months(&self, threshold: f64) -> Option<i64> {
        self.count_back(|prev, cur| {
            if prev == 0.0 {
                return cur >= 0.0;
            }
            (cur - prev) / prev.abs() >= -threshold
        })
    }

    fn count_back(&self, holds: impl Fn(f64, f64) -> bool) -> Option<i64> {
        let values = self.values();
        if values.len() < 3 {
            return None;
        }
        let mut count = 1;
        for pair in values.windows(2).rev() {
            if !holds(pair[0], pair[1]) {
                break;
            }
            count += 1;
        }
        Some(count)
    }
}

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Weekly,
    Fortnightly,
    Monthly,
}

/// Classifies the mean gap between dates. Too few occurrences, or a gap
/// outside every band, is undetermined.
pub fn detect_frequency(dates: &[NaiveDate], config: &MetricsConfig) -> Option<Frequency> {
    if dates.len() < config.minimum_frequency_count.max(2) {
        return None;
    }
    let mut sorted = dates.to_vec();
    sorted.sort_unstable();
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();
    let mean_gap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let bands = &config.frequency_bands;
    if bands.weekly.contains(mean_gap) {
        Some(Frequency::Weekly)
    } else if bands.fortnightly.contains(mean_gap) {
        Some(Frequency::Fortnightly)
    } else if bands.monthly.contains(mean_gap) {
        Some(Frequency::Monthly)
    } else {
        None
    }
}

pub fn frequency_of(txns: &[&CategorizedTransaction], config: &MetricsConfig) -> Option<Frequency> {
    let dates: Vec<NaiveDate> = txns.iter().map(|c| c.txn.date).collect();
    detect_frequency(&dates, config)
}
