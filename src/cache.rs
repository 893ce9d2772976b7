//! Learned pattern cache: normalized key -> (code, confidence).
//!
//! Loaded from SQLite at session start, flushed back at session end. The
//! in-memory map sits behind an `RwLock` so lookups from worker threads run
//! concurrently; writes take the lock briefly and the first write for a key
//! wins. Only `retrain` may change the code stored under a key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db;
use crate::error::{Result, TallyError};
use crate::normalizer::NormalizedKey;

pub const DEFAULT_LEARN_THRESHOLD: f64 = 0.90;
const MAX_EXAMPLES: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedPattern {
    pub key: String,
    pub code: String,
    pub confidence: f64,
    pub hit_count: u64,
    pub source: String,
    pub examples: Vec<String>,
    pub created_at: String,
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// Key already known with the same code; examples/confidence refreshed.
    Updated,
    /// Key already bound to a different code; left alone.
    Kept,
    /// Empty key or confidence under the learn threshold.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub patterns: usize,
    pub lookups: u64,
    pub hits: u64,
    pub hit_rate: f64,
    pub writes: u64,
    pub external_calls_saved: u64,
    pub by_code: BTreeMap<String, usize>,
}

pub struct LearnedPatternCache {
    patterns: RwLock<HashMap<String, LearnedPattern>>,
    dirty: Mutex<HashSet<String>>,
    learn_threshold: f64,
    lookups: AtomicU64,
    hits: AtomicU64,
    writes: AtomicU64,
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl LearnedPatternCache {
    pub fn new(learn_threshold: f64) -> Self {
        Self {
            patterns: RwLock::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            learn_threshold,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Reads every stored pattern. Rows that cannot be decoded are logged and
    /// skipped so a damaged entry only costs a miss.
    pub fn load(conn: &Connection, learn_threshold: f64) -> Result<Self> {
        let cache = Self::new(learn_threshold);
        let mut stmt = conn.prepare(
            "SELECT key, code, confidence, hit_count, source, examples, created_at, last_used \
             FROM learned_patterns",
        )?;
        let rows = stmt.query_map([], |row| {
            let examples: Option<String> = row.get(5)?;
            Ok((
                LearnedPattern {
                    key: row.get(0)?,
                    code: row.get(1)?,
                    confidence: row.get(2)?,
                    hit_count: row.get::<_, Option<i64>>(3)?.unwrap_or(0).max(0) as u64,
                    source: row.get(4)?,
                    examples: Vec::new(),
                    created_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    last_used: row.get(7)?,
                },
                examples,
            ))
        })?;

        let mut skipped = 0usize;
        {
            let mut patterns = cache.write_patterns()?;
            for row in rows {
                match row {
                    Ok((mut pattern, examples)) => {
                        if let Some(raw) = examples {
                            match serde_json::from_str::<Vec<String>>(&raw) {
                                Ok(list) => pattern.examples = list,
                                Err(e) => warn!(error = %e, "unreadable examples on learned pattern"),
                            }
                        }
                        patterns.insert(pattern.key.clone(), pattern);
                    }
                    Err(e) => {
                        skipped += 1;
                        warn!(error = %e, "skipping unreadable learned pattern row");
                    }
                }
            }
            info!(loaded = patterns.len(), skipped, "learned pattern cache loaded");
        }
        Ok(cache)
    }

    fn read_patterns(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, LearnedPattern>>> {
        self.patterns
            .read()
            .map_err(|_| TallyError::Other("learned pattern cache lock poisoned".into()))
    }

    fn write_patterns(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, LearnedPattern>>> {
        self.patterns
            .write()
            .map_err(|_| TallyError::Other("learned pattern cache lock poisoned".into()))
    }

    fn mark_dirty(&self, key: &str) {
        if let Ok(mut dirty) = self.dirty.lock() {
            dirty.insert(key.to_string());
        }
    }

    pub fn learn_threshold(&self) -> f64 {
        self.learn_threshold
    }

    /// Exact key first, then the supplied fallback variants in order.
    /// Only the lookup is counted; the caller calls [`record_hit`] once it
    /// has accepted the entry.
    ///
    /// [`record_hit`]: LearnedPatternCache::record_hit
    pub fn lookup(&self, key: &NormalizedKey, variants: &[NormalizedKey]) -> Option<LearnedPattern> {
        if key.is_empty() {
            return None;
        }
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let patterns = self.read_patterns().ok()?;
        std::iter::once(key)
            .chain(variants.iter())
            .find_map(|k| patterns.get(k.as_str()).cloned())
    }

    pub fn record_hit(&self, key: &str) {
        let Ok(mut patterns) = self.write_patterns() else {
            return;
        };
        let Some(entry) = patterns.get_mut(key) else {
            return;
        };
        entry.hit_count += 1;
        entry.last_used = Some(now());
        drop(patterns);
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty(key);
    }

    /// Exact read with no statistics side effects.
    pub fn get(&self, key: &str) -> Option<LearnedPattern> {
        self.read_patterns().ok()?.get(key).cloned()
    }

    /// Records a classifier result. Existing keys keep their code.
    pub fn store(&self, key: &NormalizedKey, code: &str, confidence: f64, source: &str, example: &str) -> StoreOutcome {
        if key.is_empty() || confidence < self.learn_threshold {
            return StoreOutcome::Skipped;
        }
        let Ok(mut patterns) = self.write_patterns() else {
            return StoreOutcome::Skipped;
        };
        let outcome = match patterns.get_mut(key.as_str()) {
            Some(existing) if existing.code != code => {
                debug!(key = %key.fingerprint(), kept = %existing.code, offered = code, "learned pattern kept");
                return StoreOutcome::Kept;
            }
            Some(existing) => {
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                }
                push_example(&mut existing.examples, example);
                StoreOutcome::Updated
            }
            None => {
                let mut examples = Vec::new();
                push_example(&mut examples, example);
                patterns.insert(
                    key.as_str().to_string(),
                    LearnedPattern {
                        key: key.as_str().to_string(),
                        code: code.to_string(),
                        confidence,
                        hit_count: 0,
                        source: source.to_string(),
                        examples,
                        created_at: now(),
                        last_used: None,
                    },
                );
                StoreOutcome::Inserted
            }
        };
        drop(patterns);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty(key.as_str());
        outcome
    }

    /// Explicitly rebinds a key, replacing whatever code it had.
    pub fn retrain(&self, key: &str, code: &str, confidence: f64) -> Result<Option<String>> {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return Err(TallyError::Other("cannot retrain an empty key".into()));
        }
        let previous = {
            let mut patterns = self.write_patterns()?;
            let previous = patterns.get(&key).map(|p| p.code.clone());
            let entry = patterns.entry(key.clone()).or_insert_with(|| LearnedPattern {
                key: key.clone(),
                code: code.to_string(),
                confidence,
                hit_count: 0,
                source: "manual".to_string(),
                examples: Vec::new(),
                created_at: now(),
                last_used: None,
            });
            entry.code = code.to_string();
            entry.confidence = confidence;
            entry.source = "manual".to_string();
            previous
        };
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.mark_dirty(&key);
        Ok(previous)
    }

    /// Writes every changed entry and the session counters.
    pub fn flush(&self, conn: &Connection) -> Result<usize> {
        let keys: Vec<String> = {
            let mut dirty = self
                .dirty
                .lock()
                .map_err(|_| TallyError::Other("learned pattern cache lock poisoned".into()))?;
            dirty.drain().collect()
        };
        let tx = conn.unchecked_transaction()?;
        let mut written = 0usize;
        {
            let patterns = self.read_patterns()?;
            let mut stmt = tx.prepare(
                "INSERT INTO learned_patterns (key, code, confidence, hit_count, source, examples, created_at, last_used) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(key) DO UPDATE SET code = excluded.code, confidence = excluded.confidence, \
                 hit_count = excluded.hit_count, source = excluded.source, examples = excluded.examples, \
                 last_used = excluded.last_used",
            )?;
            for key in &keys {
                let Some(p) = patterns.get(key) else { continue };
                stmt.execute(rusqlite::params![
                    p.key,
                    p.code,
                    p.confidence,
                    p.hit_count as i64,
                    p.source,
                    serde_json::to_string(&p.examples)?,
                    p.created_at,
                    p.last_used,
                ])?;
                written += 1;
            }
        }
        let lookups = self.lookups.swap(0, Ordering::Relaxed);
        let hits = self.hits.swap(0, Ordering::Relaxed);
        db::bump_counter(&tx, "cache_lookups", lookups)?;
        db::bump_counter(&tx, "cache_hits", hits)?;
        tx.commit()?;
        info!(written, lookups, hits, "learned pattern cache flushed");
        Ok(written)
    }

    /// Current session counters plus the stored distribution.
    pub fn stats(&self) -> CacheStats {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        let mut stats = CacheStats {
            lookups,
            hits,
            hit_rate: if lookups > 0 { hits as f64 / lookups as f64 } else { 0.0 },
            writes: self.writes.load(Ordering::Relaxed),
            external_calls_saved: hits,
            ..CacheStats::default()
        };
        if let Ok(patterns) = self.read_patterns() {
            stats.patterns = patterns.len();
            for p in patterns.values() {
                *stats.by_code.entry(p.code.clone()).or_default() += 1;
            }
        }
        stats
    }

    /// Most-hit patterns first.
    pub fn top_patterns(&self, limit: usize) -> Vec<LearnedPattern> {
        let mut all: Vec<LearnedPattern> = match self.read_patterns() {
            Ok(p) => p.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        all.sort_by(|a, b| b.hit_count.cmp(&a.hit_count).then_with(|| a.key.cmp(&b.key)));
        all.truncate(limit);
        all
    }

    pub fn len(&self) -> usize {
        self.read_patterns().map(|p| p.len()).unwrap_or(0)
    }
}

fn push_example(examples: &mut Vec<String>, example: &str) {
    let example = example.trim();
    if example.is_empty() || examples.len() >= MAX_EXAMPLES || examples.iter().any(|e| e == example) {
        return;
    }
    examples.push(example.to_string());
}
