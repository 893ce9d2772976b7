//! Affordability metrics derived from a customer's categorized history.
//!
//! Every report carries all 46 metric ids. A metric that cannot be
//! determined is `Null`, which is distinct from zero.

pub mod commitments;
pub mod config;
pub mod expenses;
pub mod income;
pub mod risk;
pub mod series;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::Result;
use crate::models::{AccountData, CategorizedTransaction};
use crate::taxonomy::Taxonomy;

pub use config::MetricsConfig;
use series::{round2, Window};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Money,
    Percent,
    Integer,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Money(f64),
    Percent(f64),
    Integer(i64),
    Boolean(bool),
    Null,
}

impl MetricValue {
    pub fn money(value: f64) -> Self {
        MetricValue::Money(round2(value))
    }

    /// `part` as a percentage of `whole`; Null when `whole` is zero.
    pub fn percent(part: f64, whole: f64) -> Self {
        if whole == 0.0 {
            return MetricValue::Null;
        }
        MetricValue::Percent(round2(part / whole * 100.0))
    }

    pub fn count(n: usize) -> Self {
        MetricValue::Integer(n as i64)
    }

    pub fn months(n: Option<i64>) -> Self {
        n.map_or(MetricValue::Null, MetricValue::Integer)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, MetricValue::Null)
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            MetricValue::Money(v) | MetricValue::Percent(v) => serializer.serialize_f64(*v),
            MetricValue::Integer(n) => serializer.serialize_i64(*n),
            MetricValue::Boolean(b) => serializer.serialize_bool(*b),
            MetricValue::Null => serializer.serialize_none(),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Money(v) => write!(f, "{}", crate::fmt::money(*v)),
            MetricValue::Percent(v) => write!(f, "{}", crate::fmt::percent(*v)),
            MetricValue::Integer(n) => write!(f, "{n}"),
            MetricValue::Boolean(b) => write!(f, "{}", if *b { "yes" } else { "no" }),
            MetricValue::Null => write!(f, "n/a"),
        }
    }
}

pub type MetricMap = BTreeMap<&'static str, MetricValue>;

pub struct MetricDef {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: MetricType,
    pub section: &'static str,
}

const fn def(id: &'static str, name: &'static str, kind: MetricType, section: &'static str) -> MetricDef {
    MetricDef { id, name, kind, section }
}

use MetricType::{Boolean, Integer, Money, Percent};

pub const METRICS: &[MetricDef] = &[
    // Income
    def("ME001", "# of identified salary sources", Integer, "income"),
    def("ME002", "Average monthly amount from salary", Money, "income"),
    def("ME003", "Salary has been stable for (months)", Integer, "income"),
    def("ME004", "Other possible income monthly", Money, "income"),
    def("ME033", "Average Income monthly (salary only)", Money, "income"),
    def("ME035", "Total Income has been stable for (months)", Integer, "income"),
    def("ME036", "Median monthly amount from Salary", Money, "income"),
    def("ME037", "Median Income monthly (salary only)", Money, "income"),
    def("ME040", "Average Monthly Credits", Money, "income"),
    def("ME041", "Average Monthly Debits", Money, "income"),
    def("ME042", "# of recent income sources", Integer, "income"),
    def("ME043", "# of ongoing regular income sources", Integer, "income"),
    def("ME045", "Total Income has been secure for (months)", Integer, "income"),
    // Government services
    def("ME005", "Youth Allowance monthly", Money, "government_services"),
    def("ME006", "Rental Assistance monthly", Money, "government_services"),
    def("ME007", "Misc Government services monthly", Money, "government_services"),
    // Financial commitments
    def("ME008", "Average monthly amount to lenders", Money, "financial_commitments"),
    def("ME009", "# of identified lending companies", Integer, "financial_commitments"),
    def("ME010", "Total credit card limit", Money, "financial_commitments"),
    def("ME011", "Total credit card balance", Money, "financial_commitments"),
    def("ME046", "Average monthly ongoing amount to lenders", Money, "financial_commitments"),
    def("ME048", "Ongoing Monthly Mortgage Repayment", Money, "financial_commitments"),
    // Expenses
    def("ME012", "Monthly spend on non-discretionary expenses", Money, "expenses"),
    def("ME013", "% of spend on non-discretionary expenses", Percent, "expenses"),
    def("ME014", "Monthly spend on discretionary expenses", Money, "expenses"),
    def("ME015", "% of spend on discretionary expenses", Percent, "expenses"),
    def("ME016", "Monthly spend on other expenses", Money, "expenses"),
    def("ME034", "Average Outgoings monthly", Money, "expenses"),
    def("ME039", "Average outgoings excluding liabilities", Money, "expenses"),
    // Risk metrics
    def("ME017", "# of SACC loans", Integer, "risk_metrics"),
    def("ME018", "% of income withdrawn via ATM", Percent, "risk_metrics"),
    def("ME019", "# of financial dishonours", Integer, "risk_metrics"),
    def("ME020", "% of income spent on High Risk Activities", Percent, "risk_metrics"),
    def("ME021", "Total spend on High Risk Activities", Money, "risk_metrics"),
    // Risk flags
    def("ME022", "Has recent changes to salary circumstances", Boolean, "risk_flags"),
    def("ME023", "Has received crisis support payments", Boolean, "risk_flags"),
    def("ME024", "Has superannuation credits", Boolean, "risk_flags"),
    def("ME025", "Has cash advances", Boolean, "risk_flags"),
    def("ME026", "Has redraws", Boolean, "risk_flags"),
    def("ME027", "Has High-Cost Finance", Boolean, "risk_flags"),
    def("ME028", "Missing non-discretionary expenses: groceries", Boolean, "risk_flags"),
    def("ME029", "Missing non-discretionary expenses: telecommunication", Boolean, "risk_flags"),
    def("ME030", "Missing non-discretionary expenses: utilities", Boolean, "risk_flags"),
    def("ME031", "Has Unemployment Benefit", Boolean, "risk_flags"),
    def("ME032", "Receives Child Support", Boolean, "risk_flags"),
    def("ME047", "Has unshared mortgage account", Boolean, "risk_flags"),
];

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub customer_id: String,
    pub reporting_period_days: i64,
    pub calculation_date: String,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    #[serde(flatten)]
    pub metrics: MetricMap,
}

impl MetricsReport {
    pub fn get(&self, id: &str) -> Option<&MetricValue> {
        self.metrics.get(id)
    }
}

pub struct MetricsEngine {
    config: MetricsConfig,
    transfer_code: String,
    as_of: Option<NaiveDate>,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig, taxonomy: &Taxonomy) -> Result<Self> {
        Ok(Self {
            config: config.resolve(taxonomy)?,
            transfer_code: taxonomy.transfer_code().to_string(),
            as_of: None,
        })
    }

    /// Ends every window at `date` instead of the latest transaction.
    pub fn with_as_of(mut self, date: Option<NaiveDate>) -> Self {
        self.as_of = date;
        self
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn calculate(
        &self,
        customer_id: &str,
        txns: &[CategorizedTransaction],
        account: Option<&AccountData>,
    ) -> MetricsReport {
        let window = Window::new(txns, &self.transfer_code, &self.config, self.as_of);
        debug!(
            customer = customer_id,
            in_window = window.txns.len(),
            total = txns.len(),
            "calculating metrics"
        );

        let mut metrics = MetricMap::new();
        expenses::calculate(&window, &self.config, &mut metrics);
        income::calculate(&window, &self.config, &mut metrics);
        income::calculate_government(&window, &self.config, &mut metrics);
        commitments::calculate(&window, &self.config, account, &mut metrics);
        risk::calculate(&window, &self.config, &mut metrics);
        risk::calculate_flags(&window, &self.config, account, &mut metrics);
        debug_assert_eq!(metrics.len(), METRICS.len());

        MetricsReport {
            customer_id: customer_id.to_string(),
            reporting_period_days: self.config.reporting_period_days,
            calculation_date: chrono::Local::now().to_rfc3339(),
            window_start: window.start,
            window_end: window.end,
            metrics,
        }
    }

    /// Metric definitions as a JSON document.
    pub fn schema(&self) -> serde_json::Value {
        let metrics: serde_json::Map<String, serde_json::Value> = METRICS
            .iter()
            .map(|m| {
                (
                    m.id.to_string(),
                    serde_json::json!({ "name": m.name, "type": m.kind, "section": m.section }),
                )
            })
            .collect();
        serde_json::json!({
            "reporting_period_days": self.config.reporting_period_days,
            "metrics": metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryDecision, DecisionSource, Transaction};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ct(date: NaiveDate, description: &str, amount: f64, code: &str) -> CategorizedTransaction {
        CategorizedTransaction {
            txn: Transaction::new(date, description, amount),
            decision: CategoryDecision::new(code, 0.97, DecisionSource::RuleMatcher),
        }
    }

    fn engine() -> MetricsEngine {
        MetricsEngine::new(MetricsConfig::default(), &Taxonomy::builtin()).unwrap()
    }

    fn money(report: &MetricsReport, id: &str) -> f64 {
        match report.get(id) {
            Some(MetricValue::Money(v)) | Some(MetricValue::Percent(v)) => *v,
            other => panic!("{id} is {other:?}"),
        }
    }

    fn salaried_history() -> Vec<CategorizedTransaction> {
        let mut txns = Vec::new();
        // Salary, groceries and gambling in three 30-day months.
        for (m, day) in [(6, 15), (9, 15), (11, 15)] {
            txns.push(ct(d(2025, m, day), "ACME PAYROLL", 3000.0, "INC-009"));
            txns.push(ct(d(2025, m, day + 1), "WOOLWORTHS 1234", -300.0, "EXP-016"));
            txns.push(ct(d(2025, m, day + 2), "BET365", -100.0, "EXP-014"));
        }
        txns
    }

    #[test]
    fn test_report_has_every_metric() {
        let report = engine().calculate("c1", &salaried_history(), None);
        assert_eq!(report.metrics.len(), 46);
        for m in METRICS {
            assert!(report.get(m.id).is_some(), "missing {}", m.id);
        }
        assert!(report.get("ME038").is_none());
        assert!(report.get("ME044").is_none());
    }

    #[test]
    fn test_metric_table_is_complete() {
        let mut ids: Vec<&str> = METRICS.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        let expected: Vec<String> = (1..=48)
            .filter(|n| *n != 38 && *n != 44)
            .map(|n| format!("ME{n:03}"))
            .collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_income_and_expense_metrics() {
        let report = engine().calculate("c1", &salaried_history(), None);
        assert_eq!(report.get("ME001"), Some(&MetricValue::Integer(1)));
        assert_eq!(money(&report, "ME002"), 3000.0);
        assert_eq!(report.get("ME003"), Some(&MetricValue::Integer(3)));
        assert_eq!(money(&report, "ME040"), 3000.0);
        assert_eq!(money(&report, "ME041"), 400.0);
        assert_eq!(money(&report, "ME012"), 300.0);
        assert_eq!(money(&report, "ME014"), 100.0);
        assert_eq!(money(&report, "ME013"), 75.0);
        assert_eq!(money(&report, "ME015"), 25.0);
        assert_eq!(money(&report, "ME021"), 300.0);
        assert_eq!(money(&report, "ME020"), 3.33);
        assert_eq!(report.get("ME028"), Some(&MetricValue::Boolean(false)));
        assert_eq!(report.get("ME029"), Some(&MetricValue::Boolean(true)));
    }

    #[test]
    fn test_internal_transfers_excluded() {
        let mut txns = salaried_history();
        txns.push(ct(d(2025, 11, 20), "TRANSFER TO SAVINGS", -5000.0, "EXP-013"));
        txns.push(ct(d(2025, 11, 20), "TRANSFER FROM CHEQUE", 5000.0, "EXP-013"));
        let report = engine().calculate("c1", &txns, None);
        assert_eq!(money(&report, "ME041"), 400.0);
        assert_eq!(money(&report, "ME040"), 3000.0);
    }

    #[test]
    fn test_unknown_debits_outside_share_denominator() {
        let mut txns = salaried_history();
        txns.push(ct(d(2025, 11, 25), "MYSTERY", -400.0, "UNKNOWN"));
        let report = engine().calculate("c1", &txns, None);
        assert_eq!(money(&report, "ME013"), 75.0);
        assert_eq!(money(&report, "ME041"), 533.33);
    }

    #[test]
    fn test_two_occurrences_are_undetermined() {
        let txns = vec![
            ct(d(2025, 6, 15), "ACME PAYROLL", 3000.0, "INC-009"),
            ct(d(2025, 7, 15), "ACME PAYROLL", 3000.0, "INC-009"),
            ct(d(2025, 6, 1), "HOMELOAN REPAY", -2000.0, "EXP-056"),
            ct(d(2025, 7, 1), "HOMELOAN REPAY", -2000.0, "EXP-056"),
        ];
        let report = engine().calculate("c1", &txns, None);
        assert_eq!(report.get("ME003"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME035"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME045"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME043"), Some(&MetricValue::Integer(0)));
        assert_eq!(report.get("ME048"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME046"), Some(&MetricValue::Null));
    }

    #[test]
    fn test_regular_mortgage_is_ongoing() {
        let txns: Vec<_> = [(4, 1), (5, 1), (6, 1)]
            .iter()
            .map(|&(m, day)| ct(d(2025, m, day), "HOMELOAN REPAY", -2000.0, "EXP-056"))
            .collect();
        let report = engine().calculate("c1", &txns, None);
        assert!(matches!(report.get("ME048"), Some(MetricValue::Money(v)) if *v > 1900.0));
        assert!(matches!(report.get("ME046"), Some(MetricValue::Money(_))));
        assert_eq!(report.get("ME047"), Some(&MetricValue::Null));
    }

    #[test]
    fn test_account_data_metrics() {
        let txns = vec![ct(d(2025, 6, 1), "HOMELOAN REPAY", -2000.0, "EXP-056")];
        let report = engine().calculate("c1", &txns, None);
        assert_eq!(report.get("ME010"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME011"), Some(&MetricValue::Null));

        let account = AccountData {
            credit_card_limits: vec![3000.0, 2000.0],
            credit_card_balances: vec![450.5],
            has_mortgage_account: Some(false),
        };
        let report = engine().calculate("c1", &txns, Some(&account));
        assert_eq!(money(&report, "ME010"), 5000.0);
        assert_eq!(money(&report, "ME011"), 450.5);
        assert_eq!(report.get("ME047"), Some(&MetricValue::Boolean(true)));
    }

    #[test]
    fn test_empty_history() {
        let engine = engine().with_as_of(Some(d(2025, 12, 31)));
        let report = engine.calculate("c1", &[], None);
        assert_eq!(report.metrics.len(), 46);
        assert_eq!(money(&report, "ME002"), 0.0);
        assert_eq!(report.get("ME013"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME018"), Some(&MetricValue::Null));
        assert_eq!(report.get("ME047"), Some(&MetricValue::Boolean(false)));
        assert_eq!(report.get("ME048"), Some(&MetricValue::Money(0.0)));
        assert_eq!(report.window_end, d(2025, 12, 31));
    }

    #[test]
    fn test_window_excludes_old_transactions() {
        let mut txns = salaried_history();
        txns.push(ct(d(2024, 1, 10), "OLD EMPLOYER", 9000.0, "INC-009"));
        let report = engine().calculate("c1", &txns, None);
        assert_eq!(report.get("ME001"), Some(&MetricValue::Integer(1)));
        assert_eq!(report.window_end, d(2025, 11, 17));
    }

    #[test]
    fn test_salary_change_flag() {
        let mut txns = salaried_history();
        assert_eq!(
            engine().calculate("c1", &txns, None).get("ME022"),
            Some(&MetricValue::Boolean(false))
        );
        txns.push(ct(d(2025, 11, 28), "NEWCO WAGES", 2500.0, "INC-009"));
        assert_eq!(
            engine().calculate("c1", &txns, None).get("ME022"),
            Some(&MetricValue::Boolean(true))
        );
    }

    #[test]
    fn test_report_serializes_nulls() {
        let report = engine().calculate("c1", &[], None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["customer_id"], "c1");
        assert!(json["ME010"].is_null());
        assert_eq!(json["ME028"], true);
        assert_eq!(json["reporting_period_days"], 180);
    }

    #[test]
    fn test_schema_lists_all_metrics() {
        let schema = engine().schema();
        let metrics = schema["metrics"].as_object().unwrap();
        assert_eq!(metrics.len(), 46);
        assert_eq!(schema["metrics"]["ME013"]["type"], "percent");
    }
}
