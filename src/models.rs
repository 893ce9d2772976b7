use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Sign of a transaction amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
    Zero,
}

impl Direction {
    pub fn of(amount: f64) -> Self {
        if amount > 0.0 {
            Direction::Credit
        } else if amount < 0.0 {
            Direction::Debit
        } else {
            Direction::Zero
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
            Direction::Zero => "zero",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "credit" => Some(Direction::Credit),
            "debit" => Some(Direction::Debit),
            "zero" => Some(Direction::Zero),
            _ => None,
        }
    }
}

/// A validated bank transaction. Immutable once ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub hint: Option<String>,
    pub account_number: Option<String>,
    pub bsb: Option<String>,
}

impl Transaction {
    pub fn new(date: NaiveDate, description: &str, amount: f64) -> Self {
        Self {
            date,
            description: description.to_string(),
            amount,
            hint: None,
            account_number: None,
            bsb: None,
        }
    }

    #[cfg(test)]
    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }

    pub fn direction(&self) -> Direction {
        Direction::of(self.amount)
    }
}

/// Which tier produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    TransferDetector,
    IncomePrioritizer,
    RuleMatcher,
    LearnedCache,
    ExternalClassifier,
    HintMapping,
    Unknown,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::TransferDetector => "transfer_detector",
            DecisionSource::IncomePrioritizer => "income_prioritizer",
            DecisionSource::RuleMatcher => "rule_matcher",
            DecisionSource::LearnedCache => "learned_cache",
            DecisionSource::ExternalClassifier => "external_classifier",
            DecisionSource::HintMapping => "hint_mapping",
            DecisionSource::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// No tier produced anything.
    NoMatch,
    /// Some tier matched, but not confidently enough.
    BelowThreshold,
}

impl UnknownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownReason::NoMatch => "no_match",
            UnknownReason::BelowThreshold => "below_threshold",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDecision {
    pub code: String,
    pub confidence: f64,
    pub source: DecisionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnknownReason>,
}

impl CategoryDecision {
    pub fn new(code: &str, confidence: f64, source: DecisionSource) -> Self {
        Self {
            code: code.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
            reason: None,
        }
    }

    pub fn unknown(reason: UnknownReason, confidence: f64) -> Self {
        Self {
            code: crate::taxonomy::UNKNOWN_CODE.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            source: DecisionSource::Unknown,
            reason: Some(reason),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.source == DecisionSource::Unknown
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedTransaction {
    pub txn: Transaction,
    pub decision: CategoryDecision,
}

/// Account-level facts supplied alongside a customer's transactions.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AccountData {
    pub credit_card_limits: Vec<f64>,
    pub credit_card_balances: Vec<f64>,
    pub has_mortgage_account: Option<bool>,
}
