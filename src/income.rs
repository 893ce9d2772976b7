use regex::Regex;

use crate::error::{Result, TallyError};
use crate::models::Direction;
use crate::taxonomy::Taxonomy;

pub const SALARY_CONFIDENCE: f64 = 0.99;
pub const BENEFIT_CONFIDENCE: f64 = 0.99;
pub const REFUND_CONFIDENCE: f64 = 0.98;
pub const OTHER_INCOME_CONFIDENCE: f64 = 0.98;

struct IncomeGroup {
    label: &'static str,
    code: &'static str,
    confidence: f64,
    keywords: &'static [&'static str],
}

/// Evaluated top to bottom; the first group with a whole-word hit wins.
const INCOME_GROUPS: &[IncomeGroup] = &[
    // Salary
    IncomeGroup {
        label: "salary",
        code: "INC-009",
        confidence: SALARY_CONFIDENCE,
        keywords: &[
            "wage", "wages", "salary", "salaries", "pay from", "payment from", "payroll",
            "fortnightly pay", "weekly pay", "monthly pay", "net pay", "gross pay",
            "employer payment", "employment income",
        ],
    },
    // Government benefits
    IncomeGroup {
        label: "youth_allowance",
        code: "INC-012",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &["youth allowance", "austudy", "abstudy"],
    },
    IncomeGroup {
        label: "jobseeker",
        code: "INC-016",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &["jobseeker", "job seeker", "newstart"],
    },
    IncomeGroup {
        label: "age_pension",
        code: "INC-017",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &["age pension"],
    },
    IncomeGroup {
        label: "disability_support",
        code: "INC-018",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &["disability support", "dsp", "disability pension"],
    },
    IncomeGroup {
        label: "rental_assistance",
        code: "INC-013",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &["rent assistance", "rental assistance"],
    },
    IncomeGroup {
        label: "crisis_support",
        code: "INC-021",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &["crisis payment", "disaster recovery", "hardship payment"],
    },
    IncomeGroup {
        label: "centrelink",
        code: "INC-014",
        confidence: BENEFIT_CONFIDENCE,
        keywords: &[
            "centrelink", "services australia", "family tax benefit", "ftb",
            "parenting payment", "carer payment",
        ],
    },
    // Refunds
    IncomeGroup {
        label: "refund",
        code: "EXP-032",
        confidence: REFUND_CONFIDENCE,
        keywords: &[
            "refund", "return", "reversal", "reversed", "credit adjustment", "chargeback",
            "reimbursement", "rebate",
        ],
    },
    // Other income
    IncomeGroup {
        label: "business",
        code: "INC-001",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["invoice payment", "business income", "client payment", "abn"],
    },
    IncomeGroup {
        label: "child_support",
        code: "INC-002",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["child support", "csa payment"],
    },
    IncomeGroup {
        label: "dividends",
        code: "INC-005",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["dividend", "dividends", "distribution", "investment return", "bond payment"],
    },
    IncomeGroup {
        label: "rental",
        code: "INC-008",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["rental income", "rent received", "board payment", "tenant payment"],
    },
    IncomeGroup {
        label: "superannuation",
        code: "INC-010",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["super payment", "superannuation payment", "super release"],
    },
    IncomeGroup {
        label: "interest",
        code: "INC-004",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["interest credit", "interest received", "interest paid", "credit interest"],
    },
    IncomeGroup {
        label: "medicare",
        code: "INC-015",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["medicare benefit", "medicare rebate", "medicare claim"],
    },
    IncomeGroup {
        label: "lump_sum",
        code: "INC-019",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["inheritance", "estate payment", "lump sum"],
    },
    IncomeGroup {
        label: "commission",
        code: "INC-020",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["commission", "sales commission"],
    },
    IncomeGroup {
        label: "bonus",
        code: "INC-006",
        confidence: OTHER_INCOME_CONFIDENCE,
        keywords: &["bonus", "incentive payment", "performance payment"],
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeMatch {
    pub code: String,
    pub confidence: f64,
    pub group: &'static str,
}

struct CompiledGroup {
    label: &'static str,
    code: &'static str,
    confidence: f64,
    pattern: Regex,
}

/// Keyword-group classifier for credits, run before any merchant lookup.
pub struct IncomePrioritizer {
    groups: Vec<CompiledGroup>,
}

impl IncomePrioritizer {
    /// Every group code must exist and be allowed on a credit.
    pub fn new(taxonomy: &Taxonomy) -> Result<Self> {
        let mut groups = Vec::with_capacity(INCOME_GROUPS.len());
        for group in INCOME_GROUPS {
            if !taxonomy.permits(group.code, Direction::Credit) {
                return Err(TallyError::UnknownCategory(format!(
                    "income group '{}' maps to {} which cannot take a credit",
                    group.label, group.code
                )));
            }
            let alternation = group
                .keywords
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = Regex::new(&format!(r"\b(?:{alternation})\b")).map_err(|e| {
                TallyError::InvalidRule {
                    pattern: group.label.to_string(),
                    reason: e.to_string(),
                }
            })?;
            groups.push(CompiledGroup {
                label: group.label,
                code: group.code,
                confidence: group.confidence,
                pattern,
            });
        }
        Ok(Self { groups })
    }

    /// `text` is the cleaned, lowercased description.
    pub fn check(&self, text: &str) -> Option<IncomeMatch> {
        self.groups
            .iter()
            .find(|g| g.pattern.is_match(text))
            .map(|g| IncomeMatch {
                code: g.code.to_string(),
                confidence: g.confidence,
                group: g.label,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn prioritizer() -> IncomePrioritizer {
        IncomePrioritizer::new(&Taxonomy::builtin()).unwrap()
    }

    #[test]
    fn test_salary_wins_over_merchant_name() {
        let m = prioritizer().check("woolworths limited wages").unwrap();
        assert_eq!(m.code, "INC-009");
        assert_eq!(m.confidence, SALARY_CONFIDENCE);
    }

    #[test]
    fn test_refund() {
        let m = prioritizer().check("refund from kmart").unwrap();
        assert_eq!(m.code, "EXP-032");
        assert_eq!(m.group, "refund");
    }

    #[test]
    fn test_benefit_subtypes() {
        let p = prioritizer();
        assert_eq!(p.check("centrelink ftb a").unwrap().code, "INC-014");
        assert_eq!(p.check("services australia jobseeker").unwrap().code, "INC-016");
        assert_eq!(p.check("austudy payment").unwrap().code, "INC-012");
        assert_eq!(p.check("dsp 123").unwrap().code, "INC-018");
    }

    #[test]
    fn test_whole_word_only() {
        let p = prioritizer();
        assert!(p.check("returnable deposits ltd").is_none());
        assert!(p.check("wagerworks").is_none());
    }

    #[test]
    fn test_salary_precedes_refund() {
        let m = prioritizer().check("salary return adjustment").unwrap();
        assert_eq!(m.code, "INC-009");
    }

    #[test]
    fn test_no_match_falls_through() {
        assert!(prioritizer().check("netflix com").is_none());
        assert!(prioritizer().check("").is_none());
    }

    #[test]
    fn test_keywords_belong_to_one_group() {
        let mut seen = HashSet::new();
        for group in INCOME_GROUPS {
            for kw in group.keywords {
                assert!(seen.insert(*kw), "keyword '{kw}' appears in two groups");
            }
        }
    }

    #[test]
    fn test_rejects_taxonomy_without_income_codes() {
        use crate::taxonomy::{CategoryMeta, DirectionClass};
        let cats = vec![
            CategoryMeta { code: "T".into(), name: "T".into(), direction: DirectionClass::Transfer, group: String::new() },
            CategoryMeta { code: "R".into(), name: "R".into(), direction: DirectionClass::Refund, group: String::new() },
        ];
        let taxonomy = Taxonomy::from_categories(cats).unwrap();
        assert!(IncomePrioritizer::new(&taxonomy).is_err());
    }
}
