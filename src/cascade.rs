//! The categorization cascade.
//!
//! Tiers run in a fixed order and the first confident decision wins:
//! transfer detector, income prioritizer, rule matcher, learned cache,
//! external classifier, hint mapping. A transaction nobody decides on gets
//! `UNKNOWN` with a reason.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::{LearnedPatternCache, StoreOutcome};
use crate::error::Result;
use crate::external::{ClassifierError, ClassifyRequest, GuardedClassifier};
use crate::hints::HintMapper;
use crate::income::IncomePrioritizer;
use crate::models::{CategoryDecision, DecisionSource, Direction, Transaction, UnknownReason};
use crate::normalizer::{clean_description, normalize_description, normalize_variants, NormalizedKey};
use crate::rules::RuleMatcher;
use crate::taxonomy::{CodeCheck, Taxonomy, UNKNOWN_CODE};
use crate::transfer::TransferDetector;

pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.95;
pub const DEFAULT_EXTERNAL_MIN_CONFIDENCE: f64 = 0.70;
pub const TRANSFER_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    /// Rule hits under this confidence do not stop the cascade.
    pub accept_threshold: f64,
    /// External answers under this confidence are only candidates.
    pub external_min_confidence: f64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            accept_threshold: DEFAULT_ACCEPT_THRESHOLD,
            external_min_confidence: DEFAULT_EXTERNAL_MIN_CONFIDENCE,
        }
    }
}

/// Shared stop switch. Checked between transactions, never mid-decision.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a tier may look at besides the transaction itself.
pub struct TierContext<'a> {
    pub index: usize,
    pub key: &'a NormalizedKey,
    pub fallback_keys: &'a [NormalizedKey],
    /// Cleaned, lowercased description.
    pub text: &'a str,
    pub direction: Direction,
    pub transfers: &'a TransferDetector,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Decided(CategoryDecision),
    /// A match that is not confident enough to stop the cascade.
    Candidate(CategoryDecision),
    Pass,
}

pub trait Tier: Send + Sync {
    fn source(&self) -> DecisionSource;
    fn attempt(&self, txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome;
}

fn gate(decision: CategoryDecision, threshold: f64) -> TierOutcome {
    if decision.confidence >= threshold {
        TierOutcome::Decided(decision)
    } else {
        TierOutcome::Candidate(decision)
    }
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

pub struct TransferTier {
    code: String,
}

impl Tier for TransferTier {
    fn source(&self) -> DecisionSource {
        DecisionSource::TransferDetector
    }

    fn attempt(&self, txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome {
        if ctx.transfers.is_internal(ctx.index, txn) {
            TierOutcome::Decided(CategoryDecision::new(&self.code, TRANSFER_CONFIDENCE, self.source()))
        } else {
            TierOutcome::Pass
        }
    }
}

pub struct IncomeTier {
    prioritizer: IncomePrioritizer,
    threshold: f64,
}

impl Tier for IncomeTier {
    fn source(&self) -> DecisionSource {
        DecisionSource::IncomePrioritizer
    }

    fn attempt(&self, _txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome {
        if ctx.direction != Direction::Credit {
            return TierOutcome::Pass;
        }
        match self.prioritizer.check(ctx.text) {
            Some(m) => gate(CategoryDecision::new(&m.code, m.confidence, self.source()), self.threshold),
            None => TierOutcome::Pass,
        }
    }
}

pub struct RuleTier {
    matcher: Arc<RuleMatcher>,
    threshold: f64,
}

impl Tier for RuleTier {
    fn source(&self) -> DecisionSource {
        DecisionSource::RuleMatcher
    }

    fn attempt(&self, _txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome {
        match self.matcher.find(ctx.text, ctx.direction) {
            Some(hit) => gate(CategoryDecision::new(&hit.code, hit.confidence, self.source()), self.threshold),
            None => TierOutcome::Pass,
        }
    }
}

pub struct CacheTier {
    cache: Arc<LearnedPatternCache>,
    taxonomy: Arc<Taxonomy>,
}

impl Tier for CacheTier {
    fn source(&self) -> DecisionSource {
        DecisionSource::LearnedCache
    }

    // A hit is final: entries were learned at or above the learn threshold
    // and stay bound until retrained.
    fn attempt(&self, _txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome {
        let Some(pattern) = self.cache.lookup(ctx.key, ctx.fallback_keys) else {
            return TierOutcome::Pass;
        };
        match self.taxonomy.check(&pattern.code, ctx.direction) {
            CodeCheck::Valid => {
                self.cache.record_hit(&pattern.key);
                TierOutcome::Decided(CategoryDecision::new(&pattern.code, pattern.confidence, self.source()))
            }
            CodeCheck::NotInTaxonomy => {
                error!(key = %ctx.key.fingerprint(), code = %pattern.code, "learned pattern holds a code outside the taxonomy");
                TierOutcome::Pass
            }
            CodeCheck::WrongDirection => {
                debug!(key = %ctx.key.fingerprint(), code = %pattern.code, "learned pattern does not fit direction");
                TierOutcome::Pass
            }
        }
    }
}

pub struct ExternalTier {
    classifier: Arc<GuardedClassifier>,
    cache: Arc<LearnedPatternCache>,
    taxonomy: Arc<Taxonomy>,
    min_confidence: f64,
}

impl Tier for ExternalTier {
    fn source(&self) -> DecisionSource {
        DecisionSource::ExternalClassifier
    }

    fn attempt(&self, txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome {
        if ctx.key.is_empty() {
            return TierOutcome::Pass;
        }
        let request = ClassifyRequest {
            key: ctx.key.as_str().to_string(),
            direction: ctx.direction,
            hint: txn.hint.clone(),
        };
        let result = match self.classifier.classify(&request) {
            Ok(result) => result,
            Err(ClassifierError::CircuitOpen) => return TierOutcome::Pass,
            Err(e) => {
                warn!(key = %ctx.key.fingerprint(), error = %e, "external classifier failed");
                return TierOutcome::Pass;
            }
        };
        if result.code == UNKNOWN_CODE {
            return TierOutcome::Pass;
        }
        match self.taxonomy.check(&result.code, ctx.direction) {
            CodeCheck::Valid => {}
            CodeCheck::NotInTaxonomy => {
                error!(key = %ctx.key.fingerprint(), code = %result.code, "external classifier returned a code outside the taxonomy");
                return TierOutcome::Pass;
            }
            CodeCheck::WrongDirection => {
                warn!(key = %ctx.key.fingerprint(), code = %result.code, direction = ctx.direction.as_str(), "external classifier ignored direction");
                return TierOutcome::Pass;
            }
        }
        let stored = self.cache.store(
            ctx.key,
            &result.code,
            result.confidence,
            self.classifier.name(),
            &txn.description,
        );
        if stored == StoreOutcome::Inserted {
            debug!(key = %ctx.key.fingerprint(), code = %result.code, "learned new pattern");
        }
        gate(
            CategoryDecision::new(&result.code, result.confidence, self.source()),
            self.min_confidence,
        )
    }
}

pub struct HintTier {
    mapper: HintMapper,
    taxonomy: Arc<Taxonomy>,
}

impl Tier for HintTier {
    fn source(&self) -> DecisionSource {
        DecisionSource::HintMapping
    }

    fn attempt(&self, txn: &Transaction, ctx: &TierContext<'_>) -> TierOutcome {
        let Some(hint) = txn.hint.as_deref() else {
            return TierOutcome::Pass;
        };
        match self.mapper.map(hint) {
            Some(m) if self.taxonomy.permits(&m.code, ctx.direction) => {
                TierOutcome::Decided(CategoryDecision::new(&m.code, m.confidence, self.source()))
            }
            _ => TierOutcome::Pass,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Cascade {
    taxonomy: Arc<Taxonomy>,
    tiers: Vec<Box<dyn Tier>>,
    external: Option<Arc<GuardedClassifier>>,
}

impl Cascade {
    /// Builds the fixed tier list. Static tier tables are checked against the
    /// taxonomy here, so a bad table fails before any transaction is seen.
    pub fn new(
        taxonomy: Arc<Taxonomy>,
        rules: Arc<RuleMatcher>,
        cache: Arc<LearnedPatternCache>,
        external: Option<Arc<GuardedClassifier>>,
        config: &CascadeConfig,
    ) -> Result<Self> {
        let mut tiers: Vec<Box<dyn Tier>> = vec![
            Box::new(TransferTier {
                code: taxonomy.transfer_code().to_string(),
            }),
            Box::new(IncomeTier {
                prioritizer: IncomePrioritizer::new(&taxonomy)?,
                threshold: config.accept_threshold,
            }),
            Box::new(RuleTier {
                matcher: rules,
                threshold: config.accept_threshold,
            }),
            Box::new(CacheTier {
                cache: Arc::clone(&cache),
                taxonomy: Arc::clone(&taxonomy),
            }),
        ];
        if let Some(classifier) = &external {
            tiers.push(Box::new(ExternalTier {
                classifier: Arc::clone(classifier),
                cache,
                taxonomy: Arc::clone(&taxonomy),
                min_confidence: config.external_min_confidence,
            }));
        }
        tiers.push(Box::new(HintTier {
            mapper: HintMapper::new(&taxonomy)?,
            taxonomy: Arc::clone(&taxonomy),
        }));
        Ok(Self {
            taxonomy,
            tiers,
            external,
        })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn tier_order(&self) -> Vec<DecisionSource> {
        self.tiers.iter().map(|t| t.source()).collect()
    }

    pub fn external(&self) -> Option<&GuardedClassifier> {
        self.external.as_deref()
    }

    /// Called once per batch run; gives an open breaker its trial call.
    pub fn begin_batch(&self) {
        if let Some(external) = &self.external {
            external.begin_batch();
        }
    }

    /// One customer's transactions, in order. Returns fewer decisions than
    /// transactions only when `cancel` fires part way through.
    pub fn categorize(&self, txns: &[Transaction], cancel: &CancelFlag) -> Vec<CategoryDecision> {
        let transfers = TransferDetector::learn(txns);
        let mut decisions = Vec::with_capacity(txns.len());
        for (index, txn) in txns.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(done = index, remaining = txns.len() - index, "categorization cancelled");
                break;
            }
            let key = normalize_description(&txn.description);
            let variants = normalize_variants(&txn.description);
            let fallback_keys = variants.get(1..).unwrap_or_default();
            let text = clean_description(&txn.description);
            let ctx = TierContext {
                index,
                key: &key,
                fallback_keys,
                text: &text,
                direction: txn.direction(),
                transfers: &transfers,
            };
            decisions.push(self.decide(txn, &ctx));
        }
        decisions
    }

    fn decide(&self, txn: &Transaction, ctx: &TierContext<'_>) -> CategoryDecision {
        let mut candidate: Option<CategoryDecision> = None;
        for tier in &self.tiers {
            match tier.attempt(txn, ctx) {
                TierOutcome::Decided(decision) => {
                    if self.taxonomy.permits(&decision.code, ctx.direction) {
                        debug!(
                            key = %ctx.key.fingerprint(),
                            source = decision.source.as_str(),
                            code = %decision.code,
                            confidence = decision.confidence,
                            "decided"
                        );
                        return decision;
                    }
                    error!(
                        source = decision.source.as_str(),
                        code = %decision.code,
                        direction = ctx.direction.as_str(),
                        "tier decision violates the taxonomy; ignored"
                    );
                }
                TierOutcome::Candidate(decision) => {
                    let better = candidate
                        .as_ref()
                        .map_or(true, |c| decision.confidence > c.confidence);
                    if better && self.taxonomy.permits(&decision.code, ctx.direction) {
                        candidate = Some(decision);
                    }
                }
                TierOutcome::Pass => {}
            }
        }
        let (reason, confidence) = match &candidate {
            Some(c) => (UnknownReason::BelowThreshold, c.confidence),
            None => (UnknownReason::NoMatch, 0.0),
        };
        info!(
            key = %ctx.key.fingerprint(),
            reason = reason.as_str(),
            best = candidate.as_ref().map(|c| c.code.as_str()).unwrap_or("-"),
            "left uncategorized"
        );
        CategoryDecision::unknown(reason, confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_LEARN_THRESHOLD;
    use crate::external::tests::Scripted;
    use crate::external::{Classification, GuardPolicy};
    use crate::rules::builtin_rules;
    use chrono::NaiveDate;
    use std::sync::atomic::Ordering as AtomicOrdering;
    use std::time::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn build(external: Option<Arc<Scripted>>) -> (Cascade, Arc<LearnedPatternCache>) {
        let taxonomy = Arc::new(Taxonomy::builtin());
        let rules = Arc::new(RuleMatcher::new(builtin_rules(), &taxonomy).unwrap());
        let cache = Arc::new(LearnedPatternCache::new(DEFAULT_LEARN_THRESHOLD));
        let guard = external.map(|s| {
            Arc::new(GuardedClassifier::new(
                s,
                GuardPolicy {
                    timeout: Duration::from_millis(500),
                    max_retries: 0,
                    backoff: Duration::ZERO,
                    failure_threshold: 3,
                },
            ))
        });
        let cascade = Cascade::new(taxonomy, rules, Arc::clone(&cache), guard, &CascadeConfig::default()).unwrap();
        (cascade, cache)
    }

    fn run(cascade: &Cascade, txns: &[Transaction]) -> Vec<CategoryDecision> {
        cascade.categorize(txns, &CancelFlag::default())
    }

    #[test]
    fn test_tier_order() {
        let (with_external, _) = build(Some(Arc::new(Scripted::answering("EXP-008", 0.9))));
        assert_eq!(
            with_external.tier_order(),
            vec![
                DecisionSource::TransferDetector,
                DecisionSource::IncomePrioritizer,
                DecisionSource::RuleMatcher,
                DecisionSource::LearnedCache,
                DecisionSource::ExternalClassifier,
                DecisionSource::HintMapping,
            ]
        );
        let (offline, _) = build(None);
        assert!(!offline.tier_order().contains(&DecisionSource::ExternalClassifier));
    }

    #[test]
    fn test_salary_credit_from_merchant_employer() {
        let (cascade, _) = build(None);
        let d = &run(&cascade, &[Transaction::new(date(2), "WOOLWORTHS LIMITED WAGES", 580.0)])[0];
        assert_eq!(d.code, "INC-009");
        assert_eq!(d.source, DecisionSource::IncomePrioritizer);
    }

    #[test]
    fn test_grocery_debit() {
        let (cascade, _) = build(None);
        let d = &run(&cascade, &[Transaction::new(date(2), "WOOLWORTHS", -45.0)])[0];
        assert_eq!(d.code, "EXP-016");
        assert_eq!(d.source, DecisionSource::RuleMatcher);
    }

    #[test]
    fn test_refund_credit() {
        let (cascade, _) = build(None);
        let d = &run(&cascade, &[Transaction::new(date(2), "REFUND FROM KMART", 50.0)])[0];
        assert_eq!(d.code, "EXP-032");
        assert_eq!(d.source, DecisionSource::IncomePrioritizer);
    }

    #[test]
    fn test_mirrored_transfers() {
        let (cascade, _) = build(None);
        let txns = vec![
            Transaction::new(date(9), "TRANSFER FROM 123456789", 500.0),
            Transaction::new(date(9), "TRANSFER TO 123456789", -500.0),
        ];
        for d in run(&cascade, &txns) {
            assert_eq!(d.code, "EXP-013");
            assert_eq!(d.source, DecisionSource::TransferDetector);
            assert_eq!(d.confidence, TRANSFER_CONFIDENCE);
        }
    }

    #[test]
    fn test_closure_and_direction_invariants() {
        let (cascade, _) = build(Some(Arc::new(Scripted::answering("INC-009", 0.99))));
        let taxonomy = Taxonomy::builtin();
        let txns = vec![
            Transaction::new(date(1), "WOOLWORTHS", 12.0),
            Transaction::new(date(1), "MYSTERY MERCHANT", -19.0),
            Transaction::new(date(2), "NETFLIX.COM", -17.99),
            Transaction::new(date(3), "ACME PAYROLL", 1500.0),
            Transaction::new(date(4), "SOMETHING", 0.0),
            Transaction::new(date(5), "", -3.0).with_hint("Groceries"),
        ];
        let decisions = run(&cascade, &txns);
        assert_eq!(decisions.len(), txns.len());
        for (t, d) in txns.iter().zip(&decisions) {
            if d.is_unknown() {
                assert_eq!(d.code, UNKNOWN_CODE);
                assert!(d.reason.is_some());
                continue;
            }
            assert!(taxonomy.contains(&d.code), "{} outside taxonomy", d.code);
            assert!(taxonomy.permits(&d.code, t.direction()), "{} on {:?}", d.code, t.direction());
        }
        // the classifier's salary answer cannot land on a debit
        assert!(decisions[1].is_unknown());
        assert_eq!(decisions[5].source, DecisionSource::HintMapping);
    }

    #[test]
    fn test_hint_respects_direction() {
        let (cascade, _) = build(None);
        let d = &run(&cascade, &[Transaction::new(date(6), "ODD CREDIT", 40.0).with_hint("Groceries")])[0];
        assert!(d.is_unknown());
        assert_eq!(d.reason, Some(UnknownReason::NoMatch));
    }

    #[test]
    fn test_deterministic_across_runs() {
        let (cascade, _) = build(None);
        let txns = vec![
            Transaction::new(date(1), "KFC MELBOURNE", -14.0),
            Transaction::new(date(2), "KFC SYDNEY NSW", -11.0),
            Transaction::new(date(3), "UNHEARD OF", -2.0),
        ];
        let first = run(&cascade, &txns);
        let second = run(&cascade, &txns);
        assert_eq!(first, second);
        assert_eq!(first[0].code, first[1].code);
    }

    #[test]
    fn test_confident_rule_skips_external() {
        let scripted = Arc::new(Scripted::answering("EXP-031", 0.99));
        let (cascade, _) = build(Some(Arc::clone(&scripted)));
        run(&cascade, &[Transaction::new(date(2), "WOOLWORTHS", -45.0)]);
        assert_eq!(scripted.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn test_external_result_is_learned_and_reused() {
        let scripted = Arc::new(Scripted::answering("EXP-008", 0.93));
        let (cascade, cache) = build(Some(Arc::clone(&scripted)));
        let txns = vec![
            Transaction::new(date(2), "BLUE BOTTLE CAFE 11223344", -6.5),
            Transaction::new(date(3), "BLUE BOTTLE CAFE 99887766", -7.0),
        ];
        let decisions = run(&cascade, &txns);
        assert_eq!(decisions[0].source, DecisionSource::ExternalClassifier);
        assert_eq!(decisions[1].source, DecisionSource::LearnedCache);
        assert_eq!(decisions[1].code, "EXP-008");
        assert_eq!(scripted.calls.load(AtomicOrdering::SeqCst), 1);
        assert_eq!(cache.get("blue bottle").unwrap().code, "EXP-008");
    }

    #[test]
    fn test_below_threshold_rule_escalates_then_unknown() {
        let (cascade, _) = build(None);
        let d = &run(&cascade, &[Transaction::new(date(2), "KMART 1042 BURWOOD", -30.0)])[0];
        assert!(d.is_unknown());
        assert_eq!(d.reason, Some(UnknownReason::BelowThreshold));
        assert_eq!(d.confidence, 0.93);
    }

    #[test]
    fn test_below_threshold_rule_then_hint() {
        let (cascade, _) = build(None);
        let txn = Transaction::new(date(2), "KMART 1042 BURWOOD", -30.0).with_hint("Retail");
        let d = &run(&cascade, &[txn])[0];
        assert_eq!(d.code, "EXP-031");
        assert_eq!(d.source, DecisionSource::HintMapping);
    }

    #[test]
    fn test_external_failure_falls_through() {
        let scripted = Arc::new(Scripted::new(vec![Err(ClassifierError::Transient("down".into()))]));
        let (cascade, cache) = build(Some(scripted));
        let d = &run(&cascade, &[Transaction::new(date(2), "MYSTERY MERCHANT", -19.0)])[0];
        assert!(d.is_unknown());
        assert_eq!(d.reason, Some(UnknownReason::NoMatch));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_low_confidence_external_is_candidate_only() {
        let scripted = Arc::new(Scripted::answering("EXP-031", 0.55));
        let (cascade, cache) = build(Some(scripted));
        let d = &run(&cascade, &[Transaction::new(date(2), "MYSTERY MERCHANT", -19.0)])[0];
        assert_eq!(d.reason, Some(UnknownReason::BelowThreshold));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_external_code_outside_taxonomy_is_dropped() {
        let scripted = Arc::new(Scripted::new(vec![Ok(Classification {
            code: "EXP-777".into(),
            confidence: 0.99,
        })]));
        let (cascade, cache) = build(Some(scripted));
        let d = &run(&cascade, &[Transaction::new(date(2), "MYSTERY MERCHANT", -19.0)])[0];
        assert!(d.is_unknown());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_open_breaker_stops_calls_within_batch() {
        let scripted = Arc::new(Scripted::new(vec![Err(ClassifierError::Rejected("no".into()))]));
        let (cascade, _) = build(Some(Arc::clone(&scripted)));
        let txns: Vec<Transaction> = (1..=6)
            .map(|i| Transaction::new(date(i), &format!("MERCHANT NUMBER {i}X"), -5.0))
            .collect();
        let decisions = run(&cascade, &txns);
        assert!(decisions.iter().all(|d| d.is_unknown()));
        assert_eq!(scripted.calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_keeps_nothing_after_flag() {
        let (cascade, _) = build(None);
        let cancel = CancelFlag::default();
        cancel.cancel();
        let decisions = cascade.categorize(&[Transaction::new(date(2), "WOOLWORTHS", -45.0)], &cancel);
        assert!(decisions.is_empty());
    }

    #[test]
    fn test_cached_entry_outside_taxonomy_is_a_miss() {
        let (cascade, cache) = build(None);
        cache.retrain("strange shop", "EXP-404", 1.0).unwrap();
        let d = &run(&cascade, &[Transaction::new(date(2), "STRANGE SHOP", -8.0)])[0];
        assert!(d.is_unknown());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_cached_entry_in_wrong_direction_is_not_a_hit() {
        let (cascade, cache) = build(None);
        cache.retrain("strange shop", "EXP-008", 1.0).unwrap();
        let d = &run(&cascade, &[Transaction::new(date(2), "STRANGE SHOP", 8.0)])[0];
        assert_ne!(d.source, DecisionSource::LearnedCache);
        let stats = cache.stats();
        assert_eq!(stats.lookups, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(cache.get("strange shop").unwrap().hit_count, 0);

        run(&cascade, &[Transaction::new(date(3), "STRANGE SHOP", -8.0)]);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.get("strange shop").unwrap().hit_count, 1);
    }
}
