use std::sync::atomic::{AtomicU64, Ordering};

use regex::Regex;
use tracing::debug;

use crate::error::{Result, TallyError};
use crate::models::Direction;
use crate::taxonomy::Taxonomy;

pub const DEFAULT_RULE_CONFIDENCE: f64 = 0.97;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Whole-word match, case-insensitive.
    Word,
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "word" => Some(MatchType::Word),
            "contains" => Some(MatchType::Contains),
            "starts_with" => Some(MatchType::StartsWith),
            "regex" => Some(MatchType::Regex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Word => "word",
            MatchType::Contains => "contains",
            MatchType::StartsWith => "starts_with",
            MatchType::Regex => "regex",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Database id for user rules, `None` for built-ins.
    pub id: Option<i64>,
    pub pattern: String,
    pub match_type: MatchType,
    pub code: String,
    pub confidence: f64,
    pub priority: i64,
    /// Narrows the directions the code's class allows.
    pub direction: Option<Direction>,
}

impl Rule {
    pub fn builtin(pattern: &str, code: &str, confidence: f64) -> Self {
        Self {
            id: None,
            pattern: pattern.to_string(),
            match_type: MatchType::Word,
            code: code.to_string(),
            confidence,
            priority: 0,
            direction: None,
        }
    }
}

// Australian merchants and transaction phrases: (patterns, code, confidence).
const BUILTIN_RULES: &[(&[&str], &str, f64)] = &[
    (&["woolworths", "woolies", "coles", "aldi", "iga", "foodworks", "harris farm"], "EXP-016", 0.98),
    (&["dan murphy", "dan murphys", "bws", "liquorland", "first choice liquor", "vintage cellars"], "EXP-051", 0.98),
    (&["caltex", "shell", "bp", "7-eleven", "ampol", "united petroleum", "metro petroleum"], "EXP-041", 0.97),
    (&["myki", "opal", "translink", "go card", "linkt", "citylink", "uber trip", "didi"], "EXP-041", 0.99),
    (&["kfc", "mcdonalds", "hungry jacks", "dominos", "subway", "guzman y gomez", "grill d"], "EXP-008", 0.97),
    (&["uber eats", "menulog", "menu log", "doordash", "deliveroo"], "EXP-012", 0.97),
    (&["netflix", "spotify", "stan", "disney plus", "binge", "youtube premium", "apple com bill"], "EXP-035", 0.97),
    (&["telstra", "optus", "vodafone", "tpg", "aussie broadband", "belong", "amaysim", "boost mobile"], "EXP-036", 0.97),
    (&["agl", "origin energy", "energyaustralia", "momentum energy", "red energy", "alinta", "simply energy", "sydney water", "yarra valley water"], "EXP-040", 0.97),
    (&["bupa", "medibank", "nib", "hcf", "aami", "nrma insurance", "allianz", "youi", "budget direct"], "EXP-021", 0.97),
    (&["sportsbet", "bet365", "tab", "ladbrokes", "lotto", "the lott", "pointsbet", "neds"], "EXP-014", 0.99),
    (&["kmart", "target", "big w"], "EXP-031", 0.93),
    (&["myer", "david jones"], "EXP-007", 0.96),
    (&["amazon", "ebay", "catch com", "temu", "shein"], "EXP-024", 0.95),
    (&["bunnings", "mitre 10", "ikea"], "EXP-019", 0.96),
    (&["chemist warehouse", "priceline", "terry white", "pathology", "medical centre"], "EXP-018", 0.96),
    (&["anytime fitness", "fitness first", "snap fitness", "f45", "goodlife"], "EXP-017", 0.97),
    (&["petbarn", "vet", "veterinary", "pet stock", "petstock"], "EXP-028", 0.96),
    (&["dishonour fee", "dishonour", "overdrawn fee", "overdrawn", "direct debit reject"], "EXP-009", 0.98),
    (&["atm withdrawal", "atm", "cash out"], "EXP-001", 0.97),
    (&["cash advance"], "EXP-003", 0.98),
    (&["redraw"], "EXP-029", 0.97),
    (&["mortgage", "home loan"], "EXP-056", 0.97),
    (&["nab cards", "credit card payment", "credit card repayment", "card repayment"], "EXP-061", 0.96),
    (&["cash converters", "nimble", "moneyme", "cash train", "sunshine loans", "wallet wizard", "beforepay", "fundo"], "EXP-033", 0.97),
    (&["afterpay", "zip pay", "zipmoney", "humm", "latitude pay"], "EXP-025", 0.96),
    (&["plenti", "ratesetter", "society one", "societyone"], "EXP-026", 0.96),
    (&["credit corp", "collection house", "baycorp", "panthera finance", "recoveries corporation"], "EXP-005", 0.97),
    (&["tax office", "ato", "council rates", "service nsw", "vicroads", "transport for nsw"], "EXP-015", 0.96),
    (&["monthly account fee", "account fee", "international transaction fee", "bank fee"], "EXP-006", 0.96),
    (&["red cross", "salvation army", "world vision", "unicef", "oxfam"], "EXP-010", 0.97),
    (&["qantas", "virgin australia", "jetstar", "airbnb", "booking com", "hotel"], "EXP-038", 0.95),
    (&["hairdresser", "barber", "beauty", "nail salon"], "EXP-027", 0.95),
    (&["rebel sport", "bcf", "anaconda"], "EXP-052", 0.95),
    (&["uniqlo", "cotton on", "h m", "zara", "rebel", "platypus", "athletes foot"], "EXP-055", 0.95),
    (&["rent payment", "real estate", "realestate", "property management"], "EXP-030", 0.95),
    (&["childcare", "early learning", "school fees", "tafe", "university"], "EXP-011", 0.96),
    (&["toyota finance", "ford credit", "macquarie leasing", "car loan"], "EXP-023", 0.96),
    (&["personal loan", "loan repayment"], "EXP-057", 0.95),
];

pub fn builtin_rules() -> Vec<Rule> {
    BUILTIN_RULES
        .iter()
        .flat_map(|(patterns, code, confidence)| {
            patterns.iter().map(move |p| Rule::builtin(p, code, *confidence))
        })
        .collect()
}

enum Matcher {
    Word(Regex),
    Contains(String),
    StartsWith(String),
    Regex(Regex),
}

impl Matcher {
    fn compile(rule: &Rule) -> Result<Self> {
        let invalid = |e: regex::Error| TallyError::InvalidRule {
            pattern: rule.pattern.clone(),
            reason: e.to_string(),
        };
        let lowered = rule.pattern.trim().to_lowercase();
        if lowered.is_empty() {
            return Err(TallyError::InvalidRule {
                pattern: rule.pattern.clone(),
                reason: "empty pattern".to_string(),
            });
        }
        Ok(match rule.match_type {
            MatchType::Word => {
                let re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&lowered))).map_err(invalid)?;
                Matcher::Word(re)
            }
            MatchType::Contains => Matcher::Contains(lowered),
            MatchType::StartsWith => Matcher::StartsWith(lowered),
            MatchType::Regex => Matcher::Regex(Regex::new(&format!("(?i){}", rule.pattern)).map_err(invalid)?),
        })
    }

    /// `text` is already lowercased.
    fn is_match(&self, text: &str) -> bool {
        match self {
            Matcher::Word(re) | Matcher::Regex(re) => re.is_match(text),
            Matcher::Contains(p) => text.contains(p.as_str()),
            Matcher::StartsWith(p) => text.starts_with(p.as_str()),
        }
    }
}

struct CompiledRule {
    rule: Rule,
    matcher: Matcher,
    allows_credit: bool,
    allows_debit: bool,
    hits: AtomicU64,
}

impl CompiledRule {
    fn allows(&self, direction: Direction) -> bool {
        match direction {
            Direction::Credit => self.allows_credit,
            Direction::Debit => self.allows_debit,
            Direction::Zero => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub code: String,
    pub confidence: f64,
    pub pattern: String,
    pub rule_id: Option<i64>,
}

/// Ordered rule list: higher priority first, then declaration order.
pub struct RuleMatcher {
    rules: Vec<CompiledRule>,
}

impl RuleMatcher {
    /// Compiles and validates every rule. A rule whose code is missing from
    /// the taxonomy, or whose narrowed direction its code cannot take,
    /// fails construction.
    pub fn new(rules: Vec<Rule>, taxonomy: &Taxonomy) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let Some(meta) = taxonomy.get(&rule.code) else {
                return Err(TallyError::UnknownCategory(format!(
                    "rule '{}' maps to {}",
                    rule.pattern, rule.code
                )));
            };
            let mut allows_credit = meta.direction.permits(Direction::Credit);
            let mut allows_debit = meta.direction.permits(Direction::Debit);
            match rule.direction {
                Some(Direction::Credit) => allows_debit = false,
                Some(Direction::Debit) => allows_credit = false,
                _ => {}
            }
            if !allows_credit && !allows_debit {
                return Err(TallyError::InvalidRule {
                    pattern: rule.pattern.clone(),
                    reason: format!("{} cannot take a {}", rule.code, rule.direction.map_or("any", |d| d.as_str())),
                });
            }
            compiled.push(CompiledRule {
                matcher: Matcher::compile(&rule)?,
                rule,
                allows_credit,
                allows_debit,
                hits: AtomicU64::new(0),
            });
        }
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Ok(Self { rules: compiled })
    }

    /// User rules ahead of built-ins at equal priority.
    pub fn with_builtins(user_rules: Vec<Rule>, taxonomy: &Taxonomy) -> Result<Self> {
        let mut rules = user_rules;
        rules.extend(builtin_rules());
        Self::new(rules, taxonomy)
    }

    /// First rule whose pattern matches and whose directions allow the
    /// transaction. Matches on a disallowed direction are skipped.
    pub fn find(&self, text: &str, direction: Direction) -> Option<RuleHit> {
        let text = text.to_lowercase();
        for compiled in &self.rules {
            if !compiled.matcher.is_match(&text) {
                continue;
            }
            if !compiled.allows(direction) {
                debug!(
                    pattern = %compiled.rule.pattern,
                    code = %compiled.rule.code,
                    direction = direction.as_str(),
                    "rule hit rejected by direction"
                );
                continue;
            }
            compiled.hits.fetch_add(1, Ordering::Relaxed);
            return Some(RuleHit {
                code: compiled.rule.code.clone(),
                confidence: compiled.rule.confidence,
                pattern: compiled.rule.pattern.clone(),
                rule_id: compiled.rule.id,
            });
        }
        None
    }

    /// Hits recorded this session for persisted rules.
    pub fn hit_counts(&self) -> Vec<(i64, u64)> {
        self.rules
            .iter()
            .filter_map(|c| {
                let hits = c.hits.load(Ordering::Relaxed);
                c.rule.id.filter(|_| hits > 0).map(|id| (id, hits))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::builtin()
    }

    fn user_rule(id: i64, pattern: &str, match_type: MatchType, code: &str, priority: i64) -> Rule {
        Rule {
            id: Some(id),
            pattern: pattern.to_string(),
            match_type,
            code: code.to_string(),
            confidence: DEFAULT_RULE_CONFIDENCE,
            priority,
            direction: None,
        }
    }

    #[test]
    fn test_builtin_groceries() {
        let m = RuleMatcher::with_builtins(vec![], &taxonomy()).unwrap();
        let hit = m.find("woolworths", Direction::Debit).unwrap();
        assert_eq!(hit.code, "EXP-016");
        assert!(hit.confidence >= 0.95);
    }

    #[test]
    fn test_word_boundary() {
        let m = RuleMatcher::with_builtins(vec![], &taxonomy()).unwrap();
        assert!(m.find("bpost parcels", Direction::Debit).is_none());
        assert_eq!(m.find("bp express 1234", Direction::Debit).unwrap().code, "EXP-041");
    }

    #[test]
    fn test_direction_rejection_falls_through() {
        let m = RuleMatcher::with_builtins(vec![], &taxonomy()).unwrap();
        assert!(m.find("woolworths", Direction::Credit).is_none());
    }

    #[test]
    fn test_rejected_hit_continues_to_next_rule() {
        let rules = vec![
            user_rule(1, "acme", MatchType::Contains, "EXP-031", 5),
            user_rule(2, "acme", MatchType::Contains, "EXP-032", 1),
        ];
        let m = RuleMatcher::new(rules, &taxonomy()).unwrap();
        assert_eq!(m.find("acme store", Direction::Credit).unwrap().code, "EXP-032");
        assert_eq!(m.find("acme store", Direction::Debit).unwrap().code, "EXP-031");
    }

    #[test]
    fn test_priority_order() {
        let rules = vec![
            user_rule(1, "amazon", MatchType::Contains, "EXP-024", 0),
            user_rule(2, "amazon prime", MatchType::Contains, "EXP-035", 10),
        ];
        let m = RuleMatcher::new(rules, &taxonomy()).unwrap();
        assert_eq!(m.find("AMAZON PRIME AU", Direction::Debit).unwrap().code, "EXP-035");
        assert_eq!(m.find("AMAZON MKTPLACE", Direction::Debit).unwrap().code, "EXP-024");
    }

    #[test]
    fn test_user_rules_precede_builtins() {
        let rules = vec![user_rule(9, "woolworths", MatchType::StartsWith, "EXP-024", 0)];
        let m = RuleMatcher::with_builtins(rules, &taxonomy()).unwrap();
        assert_eq!(m.find("woolworths online", Direction::Debit).unwrap().code, "EXP-024");
    }

    #[test]
    fn test_regex_rule() {
        let rules = vec![user_rule(1, r"^sq \*.*coffee", MatchType::Regex, "EXP-008", 0)];
        let m = RuleMatcher::new(rules, &taxonomy()).unwrap();
        assert!(m.find("sq *bean coffee co", Direction::Debit).is_some());
        assert!(m.find("sq *bean bakery", Direction::Debit).is_none());
    }

    #[test]
    fn test_invalid_regex_fails_construction() {
        let rules = vec![user_rule(1, "(unclosed", MatchType::Regex, "EXP-008", 0)];
        assert!(matches!(
            RuleMatcher::new(rules, &taxonomy()),
            Err(TallyError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_unknown_code_fails_construction() {
        let rules = vec![user_rule(1, "acme", MatchType::Contains, "EXP-999", 0)];
        assert!(matches!(
            RuleMatcher::new(rules, &taxonomy()),
            Err(TallyError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_impossible_direction_fails_construction() {
        let mut rule = user_rule(1, "acme", MatchType::Contains, "EXP-016", 0);
        rule.direction = Some(Direction::Credit);
        assert!(RuleMatcher::new(vec![rule], &taxonomy()).is_err());
    }

    #[test]
    fn test_narrowed_direction() {
        let mut rule = user_rule(1, "acme", MatchType::Contains, "EXP-013", 0);
        rule.direction = Some(Direction::Debit);
        let m = RuleMatcher::new(vec![rule], &taxonomy()).unwrap();
        assert!(m.find("acme", Direction::Debit).is_some());
        assert!(m.find("acme", Direction::Credit).is_none());
    }

    #[test]
    fn test_hit_counts_only_for_persisted_rules() {
        let rules = vec![user_rule(7, "acme", MatchType::Contains, "EXP-031", 0)];
        let m = RuleMatcher::with_builtins(rules, &taxonomy()).unwrap();
        m.find("acme", Direction::Debit);
        m.find("acme two", Direction::Debit);
        m.find("woolworths", Direction::Debit);
        assert_eq!(m.hit_counts(), vec![(7, 2)]);
    }

    #[test]
    fn test_all_builtins_compile() {
        let m = RuleMatcher::with_builtins(vec![], &taxonomy()).unwrap();
        assert_eq!(m.len(), builtin_rules().len());
    }

    #[test]
    fn test_match_type_parse() {
        assert_eq!(MatchType::parse("starts_with"), Some(MatchType::StartsWith));
        assert_eq!(MatchType::parse("fuzzy"), None);
    }
}
