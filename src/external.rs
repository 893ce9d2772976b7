//! External classifier collaborator and the guard around it.
//!
//! The cascade never calls a classifier directly. `GuardedClassifier` runs
//! each call on its own thread with a deadline, retries transient failures
//! with jittered backoff, and trips a circuit breaker after repeated
//! failures so one flaky service cannot stall a batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::Direction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyRequest {
    pub key: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub code: String,
    pub confidence: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("circuit open")]
    CircuitOpen,
}

impl ClassifierError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifierError::Timeout(_) | ClassifierError::Transient(_))
    }
}

pub trait ExternalClassifier: Send + Sync {
    fn name(&self) -> &str {
        "external"
    }

    fn classify(&self, request: &ClassifyRequest) -> Result<Classification, ClassifierError>;
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn allows_call(&self) -> bool {
        self.state != BreakerState::Open
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        match self.state {
            BreakerState::HalfOpen => self.state = BreakerState::Open,
            BreakerState::Closed if self.consecutive_failures >= self.failure_threshold => {
                self.state = BreakerState::Open
            }
            _ => {}
        }
    }

    /// An open breaker stays open for the rest of a batch; the next batch
    /// gets one trial call.
    pub fn begin_batch(&mut self) {
        if self.state == BreakerState::Open {
            self.state = BreakerState::HalfOpen;
        }
    }
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GuardPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub failure_threshold: u32,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            max_retries: 2,
            backoff: Duration::from_millis(250),
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GuardStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub short_circuited: u64,
}

pub struct GuardedClassifier {
    inner: Arc<dyn ExternalClassifier>,
    policy: GuardPolicy,
    breaker: Mutex<CircuitBreaker>,
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    short_circuited: AtomicU64,
}

impl GuardedClassifier {
    pub fn new(inner: Arc<dyn ExternalClassifier>, policy: GuardPolicy) -> Self {
        let breaker = CircuitBreaker::new(policy.failure_threshold);
        Self {
            inner,
            policy,
            breaker: Mutex::new(breaker),
            calls: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            short_circuited: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn begin_batch(&self) {
        if let Ok(mut breaker) = self.breaker.lock() {
            let before = breaker.state();
            breaker.begin_batch();
            if before != breaker.state() {
                info!(classifier = self.inner.name(), "circuit half-open for new batch");
            }
        }
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker
            .lock()
            .map(|b| b.state())
            .unwrap_or(BreakerState::Open)
    }

    fn allows_call(&self) -> bool {
        self.breaker.lock().map(|b| b.allows_call()).unwrap_or(false)
    }

    pub fn classify(&self, request: &ClassifyRequest) -> Result<Classification, ClassifierError> {
        if !self.allows_call() {
            self.short_circuited.fetch_add(1, Ordering::Relaxed);
            return Err(ClassifierError::CircuitOpen);
        }
        let mut attempt = 0u32;
        loop {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.call_once(request) {
                Ok(result) => {
                    self.successes.fetch_add(1, Ordering::Relaxed);
                    if let Ok(mut breaker) = self.breaker.lock() {
                        breaker.record_success();
                    }
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.policy.max_retries && self.allows_call() => {
                    debug!(classifier = self.inner.name(), attempt, error = %e, "retrying classifier call");
                    thread::sleep(self.backoff_for(attempt));
                    attempt += 1;
                }
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    if let Ok(mut breaker) = self.breaker.lock() {
                        breaker.record_failure();
                        if breaker.state() == BreakerState::Open {
                            warn!(classifier = self.inner.name(), "circuit open for the rest of the batch");
                        }
                    }
                    return Err(e);
                }
            }
        }
    }

    fn call_once(&self, request: &ClassifyRequest) -> Result<Classification, ClassifierError> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let request = request.clone();
        thread::spawn(move || {
            let _ = tx.send(inner.classify(&request));
        });
        match rx.recv_timeout(self.policy.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ClassifierError::Timeout(self.policy.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ClassifierError::Transient("classifier worker exited".into()))
            }
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff.as_millis() as u64 * (1u64 << attempt.min(6));
        let jitter = if base > 0 {
            rand::thread_rng().gen_range(0..=base / 2)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            short_circuited: self.short_circuited.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WireResponse {
    #[serde(alias = "code")]
    category: String,
    confidence: f64,
}

/// Accepts `{"category": ..., "confidence": ...}`, optionally wrapped in a
/// fenced code block.
pub fn parse_response(body: &str) -> Result<Classification, ClassifierError> {
    let mut text = body.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        text = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }
    let wire: WireResponse =
        serde_json::from_str(text).map_err(|e| ClassifierError::Malformed(e.to_string()))?;
    if !(0.0..=1.0).contains(&wire.confidence) {
        return Err(ClassifierError::Malformed(format!(
            "confidence {} outside [0, 1]",
            wire.confidence
        )));
    }
    let code = wire.category.trim().to_string();
    if code.is_empty() {
        return Err(ClassifierError::Malformed("empty category".into()));
    }
    Ok(Classification {
        code,
        confidence: wire.confidence,
    })
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[cfg(feature = "http")]
pub struct HttpClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[cfg(feature = "http")]
impl HttpClassifier {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::error::TallyError::Classifier(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
        })
    }
}

#[cfg(feature = "http")]
impl ExternalClassifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    fn classify(&self, request: &ClassifyRequest) -> Result<Classification, ClassifierError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                ClassifierError::Timeout(Duration::ZERO)
            } else {
                ClassifierError::Transient(e.to_string())
            }
        })?;
        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClassifierError::Transient(format!("status {status}")));
        }
        if !status.is_success() {
            return Err(ClassifierError::Rejected(format!("status {status}")));
        }
        let body = response
            .text()
            .map_err(|e| ClassifierError::Transient(e.to_string()))?;
        parse_response(&body)
    }
}
