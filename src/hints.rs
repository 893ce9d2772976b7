use std::collections::HashMap;

use crate::error::{Result, TallyError};
use crate::taxonomy::Taxonomy;

/// Provider labels that carry no category information.
const IGNORED_HINTS: &[&str] = &[
    "uncategorised",
    "uncategorized",
    "other",
    "unknown",
    "all other credits",
    "all other debits",
];

// (provider label, code, confidence)
const HINT_MAP: &[(&str, &str, f64)] = &[
    ("wages", "INC-009", 0.93),
    ("salary", "INC-009", 0.93),
    ("earned interest", "INC-004", 0.92),
    ("interest", "INC-004", 0.90),
    ("medicare", "INC-015", 0.92),
    ("centrelink", "INC-014", 0.92),
    ("benefits", "INC-001", 0.85),
    ("pension", "INC-018", 0.88),
    ("groceries", "EXP-016", 0.92),
    ("supermarkets", "EXP-016", 0.92),
    ("dining out", "EXP-008", 0.90),
    ("restaurants", "EXP-008", 0.90),
    ("takeaway", "EXP-012", 0.90),
    ("utilities", "EXP-040", 0.92),
    ("insurance", "EXP-021", 0.90),
    ("health", "EXP-018", 0.88),
    ("medical", "EXP-018", 0.90),
    ("transport", "EXP-041", 0.88),
    ("fuel", "EXP-041", 0.90),
    ("automotive", "EXP-002", 0.88),
    ("shopping", "EXP-031", 0.85),
    ("retail", "EXP-031", 0.88),
    ("department stores", "EXP-007", 0.90),
    ("online retail", "EXP-024", 0.90),
    ("education", "EXP-011", 0.90),
    ("travel", "EXP-038", 0.88),
    ("rent", "EXP-030", 0.90),
    ("mortgage", "EXP-056", 0.92),
    ("loan repayments", "EXP-057", 0.90),
    ("atm", "EXP-001", 0.93),
    ("cash withdrawals", "EXP-001", 0.93),
    ("subscriptions", "EXP-035", 0.90),
    ("tax", "EXP-015", 0.88),
    ("government", "EXP-015", 0.88),
    ("donations", "EXP-010", 0.90),
    ("clothing", "EXP-055", 0.90),
    ("fitness", "EXP-017", 0.90),
    ("gambling", "EXP-014", 0.93),
    ("alcohol", "EXP-051", 0.90),
    ("telecommunications", "EXP-036", 0.92),
    ("phone", "EXP-036", 0.88),
    ("internet", "EXP-036", 0.88),
    ("pet", "EXP-028", 0.88),
    ("personal care", "EXP-027", 0.88),
    ("credit card", "EXP-061", 0.90),
    ("bank fees", "EXP-006", 0.92),
    ("dishonours", "EXP-009", 0.93),
    ("refunds", "EXP-032", 0.90),
];

#[derive(Debug, Clone, PartialEq)]
pub struct HintMatch {
    pub code: String,
    pub confidence: f64,
}

/// Maps an upstream provider's category label to a taxonomy code.
pub struct HintMapper {
    exact: HashMap<String, (String, f64)>,
    // Longest label first so "online retail" beats "retail".
    ordered: Vec<(String, String, f64)>,
}

impl HintMapper {
    pub fn new(taxonomy: &Taxonomy) -> Result<Self> {
        let mut exact = HashMap::new();
        let mut ordered = Vec::new();
        for (label, code, confidence) in HINT_MAP {
            if !taxonomy.contains(code) {
                return Err(TallyError::UnknownCategory(format!("hint '{label}' maps to {code}")));
            }
            exact.insert(label.to_string(), (code.to_string(), *confidence));
            ordered.push((label.to_string(), code.to_string(), *confidence));
        }
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self { exact, ordered })
    }

    /// Exact label first, then the longest known label appearing in it as
    /// whole words.
    pub fn map(&self, hint: &str) -> Option<HintMatch> {
        let hint = hint.trim().to_lowercase();
        if hint.is_empty() || IGNORED_HINTS.contains(&hint.as_str()) {
            return None;
        }
        if let Some((code, confidence)) = self.exact.get(&hint) {
            return Some(HintMatch {
                code: code.clone(),
                confidence: *confidence,
            });
        }
        let words: String = hint
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let padded = format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "));
        self.ordered
            .iter()
            .find(|(label, _, _)| padded.contains(&format!(" {label} ")))
            .map(|(_, code, confidence)| HintMatch {
                code: code.clone(),
                confidence: *confidence,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> HintMapper {
        HintMapper::new(&Taxonomy::builtin()).unwrap()
    }

    #[test]
    fn test_exact_case_insensitive() {
        let m = mapper().map("Groceries").unwrap();
        assert_eq!(m.code, "EXP-016");
    }

    #[test]
    fn test_partial_prefers_longest_label() {
        assert_eq!(mapper().map("Online Retail Purchases").unwrap().code, "EXP-024");
        assert_eq!(mapper().map("Retail - General").unwrap().code, "EXP-031");
    }

    #[test]
    fn test_ignored_labels() {
        let m = mapper();
        assert!(m.map("Uncategorised").is_none());
        assert!(m.map("All Other Debits").is_none());
        assert!(m.map("   ").is_none());
    }

    #[test]
    fn test_unmapped_label() {
        assert!(mapper().map("Spaceflight").is_none());
        assert!(mapper().map("Carpet Cleaning").is_none());
    }
}
