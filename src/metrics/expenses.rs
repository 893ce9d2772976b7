use crate::taxonomy::UNKNOWN_CODE;

use super::config::MetricsConfig;
use super::series::{in_codes, total, MonthlySeries, Window};
use super::{MetricMap, MetricValue};

pub fn calculate(window: &Window, config: &MetricsConfig, out: &mut MetricMap) {
    let classes = &config.expenses;
    let other = config.other_expense_codes();

    let non_disc = MonthlySeries::from_txns(window.debits_in(&classes.non_discretionary));
    let disc = MonthlySeries::from_txns(window.debits_in(&classes.discretionary));
    let other_monthly = MonthlySeries::from_txns(window.debits_in(other));

    // Shares are over categorized outflow; UNKNOWN debits stay out of the
    // denominator.
    let categorized = total(window.debits().filter(|c| c.decision.code != UNKNOWN_CODE));
    let non_disc_total = total(window.debits_in(&classes.non_discretionary));
    let disc_total = total(window.debits_in(&classes.discretionary));

    out.insert("ME012", MetricValue::money(non_disc.mean()));
    out.insert("ME013", MetricValue::percent(non_disc_total, categorized));
    out.insert("ME014", MetricValue::money(disc.mean()));
    out.insert("ME015", MetricValue::percent(disc_total, categorized));
    out.insert("ME016", MetricValue::money(other_monthly.mean()));

    out.insert(
        "ME034",
        MetricValue::money(MonthlySeries::from_txns(window.debits()).mean()),
    );
    let non_liability = window
        .debits()
        .filter(|c| !in_codes(&classes.liabilities, &c.decision.code));
    out.insert(
        "ME039",
        MetricValue::money(MonthlySeries::from_txns(non_liability).mean()),
    );
}
