use crate::models::AccountData;

use super::config::MetricsConfig;
use super::series::{count_merchants, frequency_of, group_by_source, MonthlySeries, Window};
use super::{MetricMap, MetricValue};

pub fn calculate(
    window: &Window,
    config: &MetricsConfig,
    account: Option<&AccountData>,
    out: &mut MetricMap,
) {
    let lenders = &config.expenses.lenders;
    out.insert(
        "ME008",
        MetricValue::money(MonthlySeries::from_txns(window.debits_in(lenders)).mean()),
    );
    out.insert("ME009", MetricValue::count(count_merchants(window.debits_in(lenders))));

    let (limit, balance) = match account {
        Some(a) => (
            MetricValue::money(a.credit_card_limits.iter().sum()),
            MetricValue::money(a.credit_card_balances.iter().sum()),
        ),
        None => (MetricValue::Null, MetricValue::Null),
    };
    out.insert("ME010", limit);
    out.insert("ME011", balance);

    out.insert("ME046", ongoing_lender_payments(window, config));
    out.insert("ME048", ongoing_mortgage_payment(window, config));
}

/// Mean monthly outflow to lenders paid on a detectable schedule. Null when
/// there are lender payments but none of them recur.
fn ongoing_lender_payments(window: &Window, config: &MetricsConfig) -> MetricValue {
    let groups = group_by_source(window.debits_in(&config.expenses.lenders));
    if groups.is_empty() {
        return MetricValue::money(0.0);
    }
    let mut ongoing = MonthlySeries::default();
    let mut recurring = 0;
    for group in groups.values() {
        if frequency_of(group, config).is_some() {
            ongoing.merge(&MonthlySeries::from_txns(group.iter().copied()));
            recurring += 1;
        }
    }
    if recurring == 0 {
        return MetricValue::Null;
    }
    MetricValue::money(ongoing.mean())
}

fn ongoing_mortgage_payment(window: &Window, config: &MetricsConfig) -> MetricValue {
    let payments: Vec<_> = window
        .debits()
        .filter(|c| c.decision.code == config.codes.mortgage)
        .collect();
    if payments.is_empty() {
        return MetricValue::money(0.0);
    }
    match frequency_of(&payments, config) {
        Some(_) => MetricValue::money(MonthlySeries::from_txns(payments.into_iter()).mean()),
        None => MetricValue::Null,
    }
}
