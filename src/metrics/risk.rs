use std::collections::BTreeSet;

use crate::models::AccountData;

use super::config::MetricsConfig;
use super::series::{count_merchants, source_key, total, Window};
use super::{MetricMap, MetricValue};

pub fn calculate(window: &Window, config: &MetricsConfig, out: &mut MetricMap) {
    let codes = &config.codes;
    let income = total(window.credits());

    let sacc = window
        .debits()
        .filter(|c| c.decision.code == codes.small_amount_lending);
    out.insert("ME017", MetricValue::count(count_merchants(sacc)));

    let atm = total(window.debits().filter(|c| c.decision.code == codes.atm));
    out.insert("ME018", MetricValue::percent(atm, income));

    let dishonours = window
        .txns
        .iter()
        .filter(|c| c.decision.code == codes.dishonour)
        .count();
    out.insert("ME019", MetricValue::count(dishonours));

    let high_risk = total(window.debits_in(&config.high_risk_codes));
    out.insert("ME020", MetricValue::percent(high_risk, income));
    out.insert("ME021", MetricValue::money(high_risk));
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

pub fn calculate_flags(
    window: &Window,
    config: &MetricsConfig,
    account: Option<&AccountData>,
    out: &mut MetricMap,
) {
    let codes = &config.codes;
    let flag = MetricValue::Boolean;

    out.insert("ME022", flag(salary_changed(window, config)));
    out.insert("ME023", flag(window.has_code(&codes.crisis_support)));
    out.insert("ME024", flag(window.has_code(&codes.superannuation)));
    out.insert("ME025", flag(window.has_code(&codes.cash_advance)));
    out.insert("ME026", flag(window.has_code(&codes.redraw)));
    out.insert("ME027", flag(window.has_debit_in(&config.expenses.high_cost_lenders)));
    out.insert("ME028", flag(!window.has_code(&codes.groceries)));
    out.insert("ME029", flag(!window.has_code(&codes.telecommunications)));
    out.insert("ME030", flag(!window.has_code(&codes.utilities)));
    out.insert("ME031", flag(window.has_code(&codes.unemployment)));
    out.insert("ME032", flag(window.has_code(&codes.child_support)));
    out.insert("ME047", unshared_mortgage(window, config, account));
}

/// A salary source appeared or stopped in the recent months. Needs history
/// before the recent period to compare against.
fn salary_changed(window: &Window, config: &MetricsConfig) -> bool {
    let salary: Vec<_> = window.credits_in(&config.salary_codes).collect();
    if salary.is_empty() || !window.txns.iter().any(|c| c.txn.date < window.recent_start) {
        return false;
    }
    let (recent, older): (Vec<_>, Vec<_>) = salary
        .into_iter()
        .partition(|c| c.txn.date >= window.recent_start);
    let sources = |txns: Vec<&crate::models::CategorizedTransaction>| -> BTreeSet<String> {
        txns.iter().map(|c| source_key(&c.txn.description)).collect()
    };
    sources(recent) != sources(older)
}

/// Mortgage payments seen but no mortgage account shared. Undeterminable
/// without account data.
fn unshared_mortgage(
    window: &Window,
    config: &MetricsConfig,
    account: Option<&AccountData>,
) -> MetricValue {
    if !window.has_code(&config.codes.mortgage) {
        return MetricValue::Boolean(false);
    }
    match account.and_then(|a| a.has_mortgage_account) {
        Some(shared) => MetricValue::Boolean(!shared),
        None => MetricValue::Null,
    }
}
