//! Description normalization: raw bank description -> canonical merchant key.
//!
//! Everything here is pure and total. Empty or garbage input produces an
//! empty key, never an error.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

/// Transaction-type prefixes banks prepend to the merchant name.
const PREFIXES: &[&str] = &[
    "anz m-banking funds tfer transfer",
    "anz internet banking payment",
    "anz mobile banking payment",
    "visa debit purchase card",
    "funds tfer transfer",
    "recurring payment",
    "internet banking",
    "pay/salary from",
    "mobile banking",
    "atm withdrawal",
    "transfer from",
    "visa purchase",
    "card purchase",
    "direct credit",
    "direct debit",
    "transfer to",
    "payment to",
    "pending -",
    "m-banking",
    "pending",
    "eftpos",
    "paypal",
    "bpay",
];

const SUFFIXES: &[&str] = &["pty ltd", "australia", "ltd", "pty", "au"];

const LOCATIONS: &[&str] = &[
    "nsw", "vic", "qld", "wa", "sa", "tas", "act", "nt", "sydney", "melbourne", "brisbane",
    "perth", "adelaide", "hobart", "darwin", "canberra", "parramatta", "geelong", "newcastle",
    "wollongong", "cairns", "townsville", "ballarat", "bendigo", "launceston",
];

/// Brands whose name spans more than one word, or whose first word alone is
/// the brand. Checked before falling back to the first two words.
const MULTI_WORD_BRANDS: &[&str] = &[
    "momentum energy",
    "origin energy",
    "agl energy",
    "red energy",
    "uber eats",
    "menu log",
    "uber taxi",
    "tax office",
    "services australia",
    "medicare australia",
    "woolworths",
    "coles",
    "aldi",
    "iga",
];

fn reference_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"\b\d{5,}\b", r"\{\d+\}", r"\breference\s*\d+", r"\bref\s*\d+"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s]").expect("static regex"))
}

/// Canonical matching key for a description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short non-reversible tag for log lines.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NormalizedKey {
    fn from(value: &str) -> Self {
        normalize_description(value)
    }
}

pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..6])
}

/// Lowercased, trimmed, whitespace-collapsed description with reference
/// numbers removed. Punctuation is kept so word-boundary rules see the
/// same text the bank printed.
pub fn clean_description(description: &str) -> String {
    let lowered = description.trim().to_lowercase();
    collapse_whitespace(&remove_reference_numbers(&lowered))
}

pub fn normalize_description(description: &str) -> NormalizedKey {
    let text = description.trim().to_lowercase();
    if text.is_empty() {
        return NormalizedKey::default();
    }
    let text = strip_prefixes(&text);
    let text = remove_reference_numbers(&text);
    let text = remove_locations(&text);
    let text = non_alphanumeric().replace_all(&text, " ");
    let text = strip_suffixes(&collapse_whitespace(&text));
    NormalizedKey(merchant_core(&text))
}

/// Full key, then the first word (3+ chars), then the first two words.
/// Duplicates and empties are dropped.
pub fn normalize_variants(description: &str) -> Vec<NormalizedKey> {
    let key = normalize_description(description);
    if key.is_empty() {
        return Vec::new();
    }
    let words: Vec<&str> = key.as_str().split(' ').collect();
    let mut variants = vec![key.clone()];
    if words[0].len() >= 3 {
        variants.push(NormalizedKey(words[0].to_string()));
    }
    if words.len() >= 2 {
        variants.push(NormalizedKey(words[..2].join(" ")));
    }
    let mut seen = std::collections::HashSet::new();
    variants.retain(|v| seen.insert(v.clone()));
    variants
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with_word(text: &str, prefix: &str) -> bool {
    text.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || !rest.starts_with(|c: char| c.is_alphanumeric()))
}

fn strip_prefixes(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let Some(prefix) = PREFIXES.iter().find(|p| starts_with_word(&current, p)) else {
            return current;
        };
        current = current[prefix.len()..].trim_start().to_string();
    }
}

fn remove_reference_numbers(text: &str) -> String {
    let mut current = text.to_string();
    for re in reference_patterns() {
        current = re.replace_all(&current, " ").into_owned();
    }
    current
}

fn remove_locations(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| !LOCATIONS.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_suffixes(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let stripped = SUFFIXES.iter().find_map(|suffix| {
            current
                .strip_suffix(suffix)
                .and_then(|rest| rest.strip_suffix(' '))
                .map(|rest| rest.trim_end().to_string())
        });
        match stripped {
            Some(next) => current = next,
            None => return current,
        }
    }
}

fn merchant_core(text: &str) -> String {
    // store and terminal numbers are noise; "7 eleven" style tokens survive
    let words: Vec<&str> = text
        .split(' ')
        .filter(|w| !w.is_empty())
        .filter(|w| !(w.len() >= 3 && w.chars().all(|c| c.is_ascii_digit())))
        .collect();
    if words.len() <= 2 {
        return words.join(" ");
    }
    let joined = words.join(" ");
    if let Some(brand) = MULTI_WORD_BRANDS.iter().find(|b| starts_with_word(&joined, b)) {
        return brand.to_string();
    }
    words[..2].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        normalize_description(s).as_str().to_string()
    }

    #[test]
    fn test_strips_store_number_and_location() {
        assert_eq!(key("WOOLWORTHS 1234 MELBOURNE VIC"), "woolworths");
        assert_eq!(key("KFC PARRAMATTA NSW"), "kfc");
    }

    #[test]
    fn test_strips_prefix_and_reference() {
        assert_eq!(key("PAYMENT TO MOMENTUM ENERGY 23522784"), "momentum energy");
        assert_eq!(key("EFTPOS YELLOW CAB SA 132227 GLANDORE AU"), "yellow cab");
    }

    #[test]
    fn test_prefixes_stripped_repeatedly() {
        assert_eq!(key("PENDING - VISA PURCHASE NETFLIX.COM"), "netflix com");
    }

    #[test]
    fn test_prefix_needs_word_boundary() {
        assert_eq!(key("BPAYMENTS PLUS"), "bpayments plus");
    }

    #[test]
    fn test_suffixes_stripped() {
        assert_eq!(key("ACME WIDGETS PTY LTD"), "acme widgets");
        assert_eq!(key("Danau"), "danau");
    }

    #[test]
    fn test_multi_word_brand_kept_whole() {
        assert_eq!(key("UBER EATS SYDNEY HELP.UBER.COM"), "uber eats");
        assert_eq!(key("COLES EXPRESS 2215 BRUNSWICK"), "coles");
    }

    #[test]
    fn test_short_digit_tokens_survive() {
        assert_eq!(key("7-ELEVEN 2231 CARLTON"), "7 eleven");
    }

    #[test]
    fn test_reference_forms_removed() {
        assert_eq!(key("ACME {778899} REF 1234"), "acme");
        assert_eq!(key("ACME REFERENCE 99"), "acme");
    }

    #[test]
    fn test_empty_and_garbage_give_empty_key() {
        assert!(normalize_description("").is_empty());
        assert!(normalize_description("   ").is_empty());
        assert!(normalize_description("!!! ###").is_empty());
        assert!(normalize_description("123456789").is_empty());
    }

    #[test]
    fn test_equal_keys_for_branch_variants() {
        assert_eq!(key("KFC MELBOURNE"), key("KFC SYDNEY NSW"));
    }

    #[test]
    fn test_deterministic() {
        let a = normalize_description("VISA DEBIT PURCHASE CARD 3960 OTR BLACKWOOD");
        let b = normalize_description("VISA DEBIT PURCHASE CARD 3960 OTR BLACKWOOD");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "otr blackwood");
    }

    #[test]
    fn test_variants() {
        let v = normalize_variants("ALPHA BETA GAMMA");
        let v: Vec<&str> = v.iter().map(|k| k.as_str()).collect();
        assert_eq!(v, vec!["alpha beta", "alpha"]);
        let single = normalize_variants("NETFLIX");
        assert_eq!(single.len(), 1);
        assert!(normalize_variants("").is_empty());
    }

    #[test]
    fn test_clean_description_keeps_words() {
        assert_eq!(
            clean_description("  ATM WITHDRAWAL   12345678 CBD "),
            "atm withdrawal cbd"
        );
    }

    #[test]
    fn test_fingerprint_is_stable_and_opaque() {
        let f = fingerprint("woolworths");
        assert_eq!(f.len(), 12);
        assert_eq!(f, fingerprint("woolworths"));
        assert!(!f.contains("wool"));
    }
}
