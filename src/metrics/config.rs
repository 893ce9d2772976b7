use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::taxonomy::{DirectionClass, Taxonomy};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min_days: f64,
    pub max_days: f64,
}

impl Band {
    pub fn contains(&self, gap: f64) -> bool {
        self.min_days <= gap && gap <= self.max_days
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBands {
    #[serde(default = "default_weekly")]
    pub weekly: Band,
    #[serde(default = "default_fortnightly")]
    pub fortnightly: Band,
    #[serde(default = "default_monthly")]
    pub monthly: Band,
}

impl Default for FrequencyBands {
    fn default() -> Self {
        Self {
            weekly: default_weekly(),
            fortnightly: default_fortnightly(),
            monthly: default_monthly(),
        }
    }
}

fn default_weekly() -> Band {
    Band { min_days: 3.0, max_days: 9.0 }
}

fn default_fortnightly() -> Band {
    Band { min_days: 10.0, max_days: 17.0 }
}

fn default_monthly() -> Band {
    Band { min_days: 25.0, max_days: 35.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernmentCodes {
    pub youth_allowance: String,
    pub rental_assistance: String,
    pub other_benefits: Vec<String>,
}

impl Default for GovernmentCodes {
    fn default() -> Self {
        Self {
            youth_allowance: "INC-012".into(),
            rental_assistance: "INC-013".into(),
            other_benefits: codes(&["INC-014", "INC-015", "INC-016", "INC-017", "INC-018", "INC-021"]),
        }
    }
}

/// Necessity classes for expense codes. `other` left unset means every
/// expense code in neither of the first two lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpenseClasses {
    pub non_discretionary: Vec<String>,
    pub discretionary: Vec<String>,
    pub other: Option<Vec<String>>,
    pub liabilities: Vec<String>,
    pub lenders: Vec<String>,
    pub high_cost_lenders: Vec<String>,
}

impl Default for ExpenseClasses {
    fn default() -> Self {
        let lending = codes(&["EXP-023", "EXP-025", "EXP-026", "EXP-033", "EXP-056", "EXP-057", "EXP-061"]);
        Self {
            non_discretionary: codes(&[
                "EXP-011", "EXP-015", "EXP-016", "EXP-018", "EXP-021", "EXP-028", "EXP-030",
                "EXP-036", "EXP-040", "EXP-041", "EXP-056",
            ]),
            discretionary: codes(&[
                "EXP-004", "EXP-007", "EXP-008", "EXP-010", "EXP-012", "EXP-014", "EXP-017",
                "EXP-019", "EXP-024", "EXP-027", "EXP-031", "EXP-035", "EXP-038", "EXP-051",
                "EXP-052", "EXP-055",
            ]),
            other: None,
            liabilities: lending.clone(),
            lenders: lending,
            high_cost_lenders: codes(&["EXP-033"]),
        }
    }
}

/// Single codes that individual metrics and flags look for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagCodes {
    pub atm: String,
    pub dishonour: String,
    pub cash_advance: String,
    pub redraw: String,
    pub small_amount_lending: String,
    pub superannuation: String,
    pub crisis_support: String,
    pub unemployment: String,
    pub child_support: String,
    pub mortgage: String,
    pub groceries: String,
    pub telecommunications: String,
    pub utilities: String,
}

impl Default for FlagCodes {
    fn default() -> Self {
        Self {
            atm: "EXP-001".into(),
            dishonour: "EXP-009".into(),
            cash_advance: "EXP-003".into(),
            redraw: "EXP-029".into(),
            small_amount_lending: "EXP-033".into(),
            superannuation: "INC-010".into(),
            crisis_support: "INC-021".into(),
            unemployment: "INC-016".into(),
            child_support: "INC-002".into(),
            mortgage: "EXP-056".into(),
            groceries: "EXP-016".into(),
            telecommunications: "EXP-036".into(),
            utilities: "EXP-040".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_reporting_period_days")]
    pub reporting_period_days: i64,
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: f64,
    #[serde(default = "default_recent_months")]
    pub recent_months: i64,
    #[serde(default = "default_minimum_frequency_count")]
    pub minimum_frequency_count: usize,
    #[serde(default)]
    pub frequency_bands: FrequencyBands,
    #[serde(default = "default_salary_codes")]
    pub salary_codes: Vec<String>,
    /// Empty means every income-class code in the taxonomy.
    #[serde(default)]
    pub all_income_codes: Vec<String>,
    #[serde(default)]
    pub government: GovernmentCodes,
    #[serde(default)]
    pub expenses: ExpenseClasses,
    #[serde(default = "default_high_risk_codes")]
    pub high_risk_codes: Vec<String>,
    #[serde(default)]
    pub codes: FlagCodes,
}

/// Upper bounds that keep window date arithmetic in range.
pub const MAX_REPORTING_PERIOD_DAYS: i64 = 3660;
pub const MAX_RECENT_MONTHS: i64 = 120;

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

fn default_reporting_period_days() -> i64 {
    180
}

fn default_stability_threshold() -> f64 {
    0.10
}

fn default_recent_months() -> i64 {
    2
}

fn default_minimum_frequency_count() -> usize {
    3
}

fn default_salary_codes() -> Vec<String> {
    codes(&["INC-009"])
}

fn default_high_risk_codes() -> Vec<String> {
    codes(&["EXP-014", "EXP-005"])
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            reporting_period_days: default_reporting_period_days(),
            stability_threshold: default_stability_threshold(),
            recent_months: default_recent_months(),
            minimum_frequency_count: default_minimum_frequency_count(),
            frequency_bands: FrequencyBands::default(),
            salary_codes: default_salary_codes(),
            all_income_codes: Vec::new(),
            government: GovernmentCodes::default(),
            expenses: ExpenseClasses::default(),
            high_risk_codes: default_high_risk_codes(),
            codes: FlagCodes::default(),
        }
    }
}

impl MetricsConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MetricsConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Fills taxonomy-derived defaults and checks every configured code.
    pub fn resolve(mut self, taxonomy: &Taxonomy) -> Result<Self> {
        if !(1..=MAX_REPORTING_PERIOD_DAYS).contains(&self.reporting_period_days) {
            return Err(TallyError::MetricsConfig(format!(
                "reporting_period_days must be between 1 and {MAX_REPORTING_PERIOD_DAYS}, got {}",
                self.reporting_period_days
            )));
        }
        if !(1..=MAX_RECENT_MONTHS).contains(&self.recent_months) {
            return Err(TallyError::MetricsConfig(format!(
                "recent_months must be between 1 and {MAX_RECENT_MONTHS}, got {}",
                self.recent_months
            )));
        }
        if !(0.0..=1.0).contains(&self.stability_threshold) {
            return Err(TallyError::MetricsConfig(
                "stability_threshold must be between 0 and 1".into(),
            ));
        }
        if self.minimum_frequency_count < 2 {
            return Err(TallyError::MetricsConfig(
                "minimum_frequency_count must be at least 2".into(),
            ));
        }
        if self.all_income_codes.is_empty() {
            self.all_income_codes = taxonomy
                .codes_with_class(DirectionClass::Income)
                .into_iter()
                .map(str::to_string)
                .collect();
        }
        if self.expenses.other.is_none() {
            let other = taxonomy
                .codes_with_class(DirectionClass::Expense)
                .into_iter()
                .filter(|c| {
                    !self.expenses.non_discretionary.iter().any(|n| n == c)
                        && !self.expenses.discretionary.iter().any(|d| d == c)
                })
                .map(str::to_string)
                .collect();
            self.expenses.other = Some(other);
        }

        let single = [
            &self.government.youth_allowance,
            &self.government.rental_assistance,
            &self.codes.atm,
            &self.codes.dishonour,
            &self.codes.cash_advance,
            &self.codes.redraw,
            &self.codes.small_amount_lending,
            &self.codes.superannuation,
            &self.codes.crisis_support,
            &self.codes.unemployment,
            &self.codes.child_support,
            &self.codes.mortgage,
            &self.codes.groceries,
            &self.codes.telecommunications,
            &self.codes.utilities,
        ];
        let lists = [
            &self.salary_codes,
            &self.all_income_codes,
            &self.government.other_benefits,
            &self.expenses.non_discretionary,
            &self.expenses.discretionary,
            &self.expenses.liabilities,
            &self.expenses.lenders,
            &self.expenses.high_cost_lenders,
            &self.high_risk_codes,
        ];
        let all = single
            .into_iter()
            .map(String::as_str)
            .chain(lists.into_iter().flatten().map(String::as_str))
            .chain(self.expenses.other.iter().flatten().map(String::as_str));
        taxonomy
            .require_all(all)
            .map_err(|e| TallyError::MetricsConfig(e.to_string()))?;
        Ok(self)
    }

    pub fn other_expense_codes(&self) -> &[String] {
        self.expenses.other.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_resolve_against_builtin_taxonomy() {
        let config = MetricsConfig::default().resolve(&Taxonomy::builtin()).unwrap();
        assert!(config.all_income_codes.iter().any(|c| c == "INC-009"));
        assert!(!config.all_income_codes.iter().any(|c| c.starts_with("EXP")));
        let other = config.other_expense_codes();
        assert!(other.iter().any(|c| c == "EXP-001"));
        assert!(!other.iter().any(|c| c == "EXP-016"));
        assert!(!other.iter().any(|c| c == "EXP-013"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: MetricsConfig =
            serde_json::from_str(r#"{"reporting_period_days": 90, "high_risk_codes": ["EXP-014"]}"#).unwrap();
        assert_eq!(config.reporting_period_days, 90);
        assert_eq!(config.high_risk_codes, vec!["EXP-014".to_string()]);
        assert_eq!(config.stability_threshold, 0.10);
        assert_eq!(config.frequency_bands.monthly.max_days, 35.0);
    }

    #[test]
    fn test_unknown_code_rejected() {
        let mut config = MetricsConfig::default();
        config.codes.groceries = "EXP-999".into();
        let err = config.resolve(&Taxonomy::builtin()).unwrap_err();
        assert!(matches!(err, TallyError::MetricsConfig(_)));
    }

    #[test]
    fn test_bad_window_rejected() {
        let config = MetricsConfig {
            reporting_period_days: 0,
            ..MetricsConfig::default()
        };
        assert!(config.resolve(&Taxonomy::builtin()).is_err());
    }

    #[test]
    fn test_huge_window_rejected() {
        let config = MetricsConfig {
            reporting_period_days: i64::MAX,
            ..MetricsConfig::default()
        };
        let err = config.resolve(&Taxonomy::builtin()).unwrap_err();
        assert!(matches!(err, TallyError::MetricsConfig(_)));

        let config = MetricsConfig {
            recent_months: i64::MAX / 30 + 1,
            ..MetricsConfig::default()
        };
        assert!(config.resolve(&Taxonomy::builtin()).is_err());

        let config = MetricsConfig {
            reporting_period_days: MAX_REPORTING_PERIOD_DAYS,
            recent_months: MAX_RECENT_MONTHS,
            ..MetricsConfig::default()
        };
        assert!(config.resolve(&Taxonomy::builtin()).is_ok());
    }

    #[test]
    fn test_partial_nested_objects_use_defaults() {
        let config: MetricsConfig = serde_json::from_str(
            r#"{"expenses": {"high_cost_lenders": ["EXP-025"]}, "government": {"youth_allowance": "INC-014"}}"#,
        )
        .unwrap();
        assert_eq!(config.expenses.high_cost_lenders, vec!["EXP-025".to_string()]);
        assert_eq!(config.expenses.discretionary, ExpenseClasses::default().discretionary);
        assert_eq!(config.expenses.other, None);
        assert_eq!(config.government.youth_allowance, "INC-014");
        assert_eq!(config.government.rental_assistance, "INC-013");
        assert!(config.resolve(&Taxonomy::builtin()).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, r#"{"recent_months": 3}"#).unwrap();
        let config = MetricsConfig::load(&path).unwrap();
        assert_eq!(config.recent_months, 3);
        assert_eq!(config.salary_codes, vec!["INC-009".to_string()]);
    }
}
