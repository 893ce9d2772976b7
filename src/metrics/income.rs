use super::config::MetricsConfig;
use super::series::{count_sources, frequency_of, group_by_source, MonthlySeries, Window};
use super::{MetricMap, MetricValue};

pub fn calculate(window: &Window, config: &MetricsConfig, out: &mut MetricMap) {
    let salary = MonthlySeries::from_txns(window.credits_in(&config.salary_codes));
    let all_income = MonthlySeries::from_txns(window.credits_in(&config.all_income_codes));
    let other_income = MonthlySeries::from_txns(
        window
            .credits_in(&config.all_income_codes)
            .filter(|c| !config.salary_codes.contains(&c.decision.code)),
    );
    let debits = MonthlySeries::from_txns(window.debits());

    let salary_mean = MetricValue::money(salary.mean());
    let salary_median = MetricValue::money(salary.median());
    let salary_stable = MetricValue::months(salary.stable_months(config.stability_threshold));

    out.insert("ME001", MetricValue::count(count_sources(window.credits_in(&config.salary_codes))));
    out.insert("ME002", salary_mean.clone());
    out.insert("ME003", salary_stable.clone());
    out.insert("ME004", MetricValue::money(other_income.mean()));
    out.insert("ME033", salary_mean);
    out.insert("ME035", salary_stable);
    out.insert("ME036", salary_median.clone());
    out.insert("ME037", salary_median);
    out.insert("ME040", MetricValue::money(all_income.mean()));
    out.insert("ME041", MetricValue::money(debits.mean()));

    let recent = window.credits().filter(|c| c.txn.date >= window.recent_start);
    out.insert("ME042", MetricValue::count(count_sources(recent)));

    let ongoing = group_by_source(window.credits())
        .values()
        .filter(|group| frequency_of(group, config).is_some())
        .count();
    out.insert("ME043", MetricValue::count(ongoing));
    out.insert(
        "ME045",
        MetricValue::months(all_income.secure_months(config.stability_threshold)),
    );
}

// ---------------------------------------------------------------------------
// Government services
// ---------------------------------------------------------------------------

pub fn calculate_government(window: &Window, config: &MetricsConfig, out: &mut MetricMap) {
    let gov = &config.government;
    let monthly_mean = |code: &str| {
        MonthlySeries::from_txns(window.credits().filter(|c| c.decision.code == code)).mean()
    };
    out.insert("ME005", MetricValue::money(monthly_mean(&gov.youth_allowance)));
    out.insert("ME006", MetricValue::money(monthly_mean(&gov.rental_assistance)));
    out.insert(
        "ME007",
        MetricValue::money(MonthlySeries::from_txns(window.credits_in(&gov.other_benefits)).mean()),
    );
}
