use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::models::Direction;

/// Reserved sentinel for "no confident category". Never part of a taxonomy.
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// Which side of the ledger a category code may appear on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionClass {
    Expense,
    Income,
    Refund,
    Transfer,
}

impl DirectionClass {
    /// Debits take expense or transfer codes, credits take income, refund
    /// or transfer codes. A zero amount takes anything.
    pub fn permits(&self, direction: Direction) -> bool {
        match direction {
            Direction::Zero => true,
            Direction::Debit => matches!(self, DirectionClass::Expense | DirectionClass::Transfer),
            Direction::Credit => matches!(
                self,
                DirectionClass::Income | DirectionClass::Refund | DirectionClass::Transfer
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMeta {
    pub code: String,
    pub name: String,
    pub direction: DirectionClass,
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    Valid,
    NotInTaxonomy,
    WrongDirection,
}

#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: BTreeMap<String, CategoryMeta>,
    transfer_code: String,
}

const DEFAULT_CATEGORIES: &[(&str, &str, DirectionClass, &str)] = &[
    // Expenses
    ("EXP-001", "ATM Withdrawals", DirectionClass::Expense, "cash"),
    ("EXP-002", "Automotive", DirectionClass::Expense, "transport"),
    ("EXP-003", "Cash Advances", DirectionClass::Expense, "finance"),
    ("EXP-004", "Childrens Retail and Gaming", DirectionClass::Expense, "retail"),
    ("EXP-005", "Collection Agencies", DirectionClass::Expense, "finance"),
    ("EXP-006", "Bank Fees", DirectionClass::Expense, "fees"),
    ("EXP-007", "Department Stores", DirectionClass::Expense, "retail"),
    ("EXP-008", "Dining Out", DirectionClass::Expense, "lifestyle"),
    ("EXP-009", "Dishonours", DirectionClass::Expense, "fees"),
    ("EXP-010", "Donations", DirectionClass::Expense, "lifestyle"),
    ("EXP-011", "Education and Childcare", DirectionClass::Expense, "household"),
    ("EXP-012", "Takeaway", DirectionClass::Expense, "lifestyle"),
    ("EXP-013", "Internal Transfers", DirectionClass::Transfer, "transfers"),
    ("EXP-014", "Gambling", DirectionClass::Expense, "lifestyle"),
    ("EXP-015", "Government and Council Services", DirectionClass::Expense, "household"),
    ("EXP-016", "Groceries", DirectionClass::Expense, "household"),
    ("EXP-017", "Gyms and Memberships", DirectionClass::Expense, "lifestyle"),
    ("EXP-018", "Medical and Health", DirectionClass::Expense, "household"),
    ("EXP-019", "Home Improvement", DirectionClass::Expense, "household"),
    ("EXP-020", "Insolvency", DirectionClass::Expense, "finance"),
    ("EXP-021", "Insurance", DirectionClass::Expense, "household"),
    ("EXP-023", "Motor Finance", DirectionClass::Expense, "finance"),
    ("EXP-024", "Online Retail", DirectionClass::Expense, "retail"),
    ("EXP-025", "Other Finance", DirectionClass::Expense, "finance"),
    ("EXP-026", "Peer to Peer Finance", DirectionClass::Expense, "finance"),
    ("EXP-027", "Personal Care", DirectionClass::Expense, "lifestyle"),
    ("EXP-028", "Pet Care", DirectionClass::Expense, "household"),
    ("EXP-029", "Redraws", DirectionClass::Expense, "finance"),
    ("EXP-030", "Rent", DirectionClass::Expense, "household"),
    ("EXP-031", "Retail", DirectionClass::Expense, "retail"),
    ("EXP-032", "Returns and Refunds", DirectionClass::Refund, "refunds"),
    ("EXP-033", "Small Amount Lending", DirectionClass::Expense, "finance"),
    ("EXP-034", "Superannuation", DirectionClass::Expense, "finance"),
    ("EXP-035", "Subscription Media and Software", DirectionClass::Expense, "lifestyle"),
    ("EXP-036", "Telecommunications", DirectionClass::Expense, "household"),
    ("EXP-038", "Travel and Accommodation", DirectionClass::Expense, "lifestyle"),
    ("EXP-039", "Uncategorised Debits", DirectionClass::Expense, "other"),
    ("EXP-040", "Utilities", DirectionClass::Expense, "household"),
    ("EXP-041", "Vehicle and Transport", DirectionClass::Expense, "transport"),
    ("EXP-051", "Alcohol and Tobacco", DirectionClass::Expense, "lifestyle"),
    ("EXP-052", "Sports and Hobbies", DirectionClass::Expense, "lifestyle"),
    ("EXP-055", "Clothing and Footwear", DirectionClass::Expense, "retail"),
    ("EXP-056", "Mortgage Repayments", DirectionClass::Expense, "finance"),
    ("EXP-057", "Other Lending", DirectionClass::Expense, "finance"),
    ("EXP-061", "Credit Card Repayments", DirectionClass::Expense, "finance"),
    // Income
    ("INC-001", "Business Income", DirectionClass::Income, "other_income"),
    ("INC-002", "Child Support", DirectionClass::Income, "other_income"),
    ("INC-003", "Insurance Credits", DirectionClass::Income, "other_income"),
    ("INC-004", "Interest Income", DirectionClass::Income, "other_income"),
    ("INC-005", "Investment Income", DirectionClass::Income, "other_income"),
    ("INC-006", "Other Earnings", DirectionClass::Income, "other_income"),
    ("INC-007", "Other Credits", DirectionClass::Income, "other_income"),
    ("INC-008", "Rent and Board", DirectionClass::Income, "other_income"),
    ("INC-009", "Salary", DirectionClass::Income, "salary"),
    ("INC-010", "Superannuation Credits", DirectionClass::Income, "other_income"),
    ("INC-012", "Youth Allowance", DirectionClass::Income, "government"),
    ("INC-013", "Rental Assistance", DirectionClass::Income, "government"),
    ("INC-014", "Centrelink", DirectionClass::Income, "government"),
    ("INC-015", "Medicare", DirectionClass::Income, "government"),
    ("INC-016", "Jobseeker", DirectionClass::Income, "government"),
    ("INC-017", "Age Pension", DirectionClass::Income, "government"),
    ("INC-018", "Disability Support Pension", DirectionClass::Income, "government"),
    ("INC-019", "Lump Sum Payments", DirectionClass::Income, "other_income"),
    ("INC-020", "Commission Income", DirectionClass::Income, "other_income"),
    ("INC-021", "Crisis Support", DirectionClass::Income, "government"),
];

impl Taxonomy {
    /// Validate and index a category list.
    pub fn from_categories(categories: Vec<CategoryMeta>) -> Result<Self> {
        if categories.is_empty() {
            return Err(TallyError::Taxonomy("no categories".into()));
        }
        let mut by_code = BTreeMap::new();
        let mut transfer_codes = Vec::new();
        let mut has_refund = false;
        for cat in categories {
            let code = cat.code.trim().to_string();
            if code.is_empty() {
                return Err(TallyError::Taxonomy(format!("empty code for '{}'", cat.name)));
            }
            if code.eq_ignore_ascii_case(UNKNOWN_CODE) {
                return Err(TallyError::Taxonomy(format!("{UNKNOWN_CODE} is reserved")));
            }
            match cat.direction {
                DirectionClass::Transfer => transfer_codes.push(code.clone()),
                DirectionClass::Refund => has_refund = true,
                _ => {}
            }
            if by_code.contains_key(&code) {
                return Err(TallyError::Taxonomy(format!("duplicate code {code}")));
            }
            by_code.insert(code.clone(), CategoryMeta { code, ..cat });
        }
        if transfer_codes.len() != 1 {
            return Err(TallyError::Taxonomy(format!(
                "expected exactly one transfer code, found {}",
                transfer_codes.len()
            )));
        }
        if !has_refund {
            return Err(TallyError::Taxonomy("no refund code".into()));
        }
        Ok(Self {
            categories: by_code,
            transfer_code: transfer_codes.remove(0),
        })
    }

    /// Load a JSON list of `{code, name, direction, group}` objects.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let categories: Vec<CategoryMeta> = serde_json::from_str(&content)?;
        Self::from_categories(categories)
    }

    pub fn builtin() -> Self {
        let mut categories = BTreeMap::new();
        for (code, name, direction, group) in DEFAULT_CATEGORIES {
            categories.insert(
                code.to_string(),
                CategoryMeta {
                    code: code.to_string(),
                    name: name.to_string(),
                    direction: *direction,
                    group: group.to_string(),
                },
            );
        }
        Self {
            categories,
            transfer_code: "EXP-013".to_string(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&CategoryMeta> {
        self.categories.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.categories.contains_key(code)
    }

    pub fn transfer_code(&self) -> &str {
        &self.transfer_code
    }

    pub fn check(&self, code: &str, direction: Direction) -> CodeCheck {
        match self.categories.get(code) {
            None => CodeCheck::NotInTaxonomy,
            Some(meta) if meta.direction.permits(direction) => CodeCheck::Valid,
            Some(_) => CodeCheck::WrongDirection,
        }
    }

    pub fn permits(&self, code: &str, direction: Direction) -> bool {
        self.check(code, direction) == CodeCheck::Valid
    }

    pub fn name_of(&self, code: &str) -> &str {
        self.categories
            .get(code)
            .map(|c| c.name.as_str())
            .unwrap_or(UNKNOWN_CODE)
    }

    pub fn codes_with_class(&self, class: DirectionClass) -> Vec<&str> {
        self.categories
            .values()
            .filter(|c| c.direction == class)
            .map(|c| c.code.as_str())
            .collect()
    }

    /// Fail if any of `codes` is missing from the taxonomy.
    pub fn require_all<'a>(&self, codes: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let missing: HashSet<&str> = codes.into_iter().filter(|c| !self.contains(c)).collect();
        if missing.is_empty() {
            return Ok(());
        }
        let mut missing: Vec<&str> = missing.into_iter().collect();
        missing.sort_unstable();
        Err(TallyError::UnknownCategory(missing.join(", ")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryMeta> {
        self.categories.values()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(code: &str, direction: DirectionClass) -> CategoryMeta {
        CategoryMeta {
            code: code.to_string(),
            name: code.to_string(),
            direction,
            group: String::new(),
        }
    }

    #[test]
    fn test_builtin_passes_validation() {
        let builtin = Taxonomy::builtin();
        let rebuilt = Taxonomy::from_categories(builtin.iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.len(), builtin.len());
        assert_eq!(rebuilt.transfer_code(), "EXP-013");
    }

    #[test]
    fn test_direction_classes() {
        let t = Taxonomy::builtin();
        assert!(t.permits("EXP-016", Direction::Debit));
        assert!(!t.permits("EXP-016", Direction::Credit));
        assert!(t.permits("INC-009", Direction::Credit));
        assert!(!t.permits("INC-009", Direction::Debit));
        assert!(t.permits("EXP-032", Direction::Credit));
        assert!(t.permits("EXP-013", Direction::Credit));
        assert!(t.permits("EXP-013", Direction::Debit));
        assert!(t.permits("INC-009", Direction::Zero));
    }

    #[test]
    fn test_check_unknown_code() {
        let t = Taxonomy::builtin();
        assert_eq!(t.check("EXP-999", Direction::Debit), CodeCheck::NotInTaxonomy);
        assert_eq!(t.check(UNKNOWN_CODE, Direction::Debit), CodeCheck::NotInTaxonomy);
        assert_eq!(t.check("INC-009", Direction::Debit), CodeCheck::WrongDirection);
    }

    #[test]
    fn test_rejects_duplicate_codes() {
        let cats = vec![
            meta("T-1", DirectionClass::Transfer),
            meta("R-1", DirectionClass::Refund),
            meta("R-1", DirectionClass::Expense),
        ];
        assert!(matches!(Taxonomy::from_categories(cats), Err(TallyError::Taxonomy(_))));
    }

    #[test]
    fn test_requires_single_transfer_code() {
        let none = vec![meta("R-1", DirectionClass::Refund)];
        assert!(Taxonomy::from_categories(none).is_err());
        let two = vec![
            meta("T-1", DirectionClass::Transfer),
            meta("T-2", DirectionClass::Transfer),
            meta("R-1", DirectionClass::Refund),
        ];
        assert!(Taxonomy::from_categories(two).is_err());
    }

    #[test]
    fn test_rejects_reserved_unknown() {
        let cats = vec![
            meta("T-1", DirectionClass::Transfer),
            meta("R-1", DirectionClass::Refund),
            meta("unknown", DirectionClass::Expense),
        ];
        assert!(Taxonomy::from_categories(cats).is_err());
    }

    #[test]
    fn test_load_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(
            &path,
            r#"[
                {"code": "X-TR", "name": "Transfers", "direction": "transfer"},
                {"code": "X-RF", "name": "Refunds", "direction": "refund", "group": "refunds"},
                {"code": "X-GR", "name": "Groceries", "direction": "expense", "group": "household"}
            ]"#,
        )
        .unwrap();
        let t = Taxonomy::load(&path).unwrap();
        assert_eq!(t.transfer_code(), "X-TR");
        assert_eq!(t.name_of("X-GR"), "Groceries");
    }

    #[test]
    fn test_load_rejects_unknown_direction_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(&path, r#"[{"code": "A", "name": "A", "direction": "sideways"}]"#).unwrap();
        assert!(matches!(Taxonomy::load(&path), Err(TallyError::Json(_))));
    }

    #[test]
    fn test_require_all_lists_missing() {
        let t = Taxonomy::builtin();
        assert!(t.require_all(["EXP-016", "INC-009"]).is_ok());
        match t.require_all(["EXP-016", "EXP-998"]) {
            Err(TallyError::UnknownCategory(missing)) => assert_eq!(missing, "EXP-998"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
