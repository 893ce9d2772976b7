use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tracing::{info, warn};

use crate::cascade::{CancelFlag, Cascade};
use crate::error::Result;
use crate::importer::{CustomerFile, RecordError};
use crate::metrics::{MetricsEngine, MetricsReport};
use crate::models::{AccountData, CategorizedTransaction, CategoryDecision, Transaction};

/// One customer's parsed file plus optional account facts.
#[derive(Debug, Clone)]
pub struct CustomerInput {
    pub file: CustomerFile,
    pub account: Option<AccountData>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Decided(CategoryDecision),
    Rejected(RecordError),
    /// Not reached before the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct RecordResult {
    pub line: usize,
    pub txn: Option<Transaction>,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone)]
pub struct CustomerResult {
    pub customer_id: String,
    pub records: Vec<RecordResult>,
    /// Absent when the customer was only partly categorized.
    pub metrics: Option<MetricsReport>,
    /// Why the customer's file could not be processed at all.
    pub failure: Option<String>,
}

impl CustomerResult {
    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn decided(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Decided(_)))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Rejected(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped))
    }

    pub fn categorized(&self) -> Vec<CategorizedTransaction> {
        self.records
            .iter()
            .filter_map(|r| match (&r.txn, &r.outcome) {
                (Some(txn), RecordOutcome::Decided(decision)) => Some(CategorizedTransaction {
                    txn: txn.clone(),
                    decision: decision.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    AllProcessed,
    PartialFailure { rejected: usize, failed: usize },
    Cancelled,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::AllProcessed => 0,
            ExitStatus::PartialFailure { .. } | ExitStatus::Cancelled => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub customers: usize,
    /// Customers whose file could not be read.
    pub failed: usize,
    pub decided: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub unknown: usize,
    pub cancelled: bool,
    pub by_source: BTreeMap<&'static str, usize>,
}

impl BatchSummary {
    fn from_results(results: &[CustomerResult], cancelled: bool) -> Self {
        let mut summary = BatchSummary {
            customers: results.len(),
            cancelled,
            ..BatchSummary::default()
        };
        for result in results {
            if result.failure.is_some() {
                summary.failed += 1;
            }
            summary.decided += result.decided();
            summary.rejected += result.rejected();
            summary.skipped += result.skipped();
            for record in &result.records {
                if let RecordOutcome::Decided(decision) = &record.outcome {
                    *summary.by_source.entry(decision.source.as_str()).or_insert(0) += 1;
                    if decision.is_unknown() {
                        summary.unknown += 1;
                    }
                }
            }
        }
        summary
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.cancelled || self.skipped > 0 {
            ExitStatus::Cancelled
        } else if self.rejected > 0 || self.failed > 0 {
            ExitStatus::PartialFailure {
                rejected: self.rejected,
                failed: self.failed,
            }
        } else {
            ExitStatus::AllProcessed
        }
    }
}

pub struct BatchReport {
    pub results: Vec<CustomerResult>,
    pub summary: BatchSummary,
}

/// Runs customers through the cascade and metrics engine on a bounded pool
/// of scoped worker threads. Results come back in input order.
pub struct BatchProcessor<'a> {
    cascade: &'a Cascade,
    engine: &'a MetricsEngine,
    workers: usize,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(cascade: &'a Cascade, engine: &'a MetricsEngine, workers: usize) -> Self {
        Self {
            cascade,
            engine,
            workers: workers.max(1),
        }
    }

    pub fn run(&self, inputs: &[CustomerInput], cancel: &CancelFlag) -> BatchReport {
        self.cascade.begin_batch();
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(usize, CustomerResult)>();
        let workers = self.workers.min(inputs.len()).max(1);
        info!(customers = inputs.len(), workers, "batch started");

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let idx = next.fetch_add(1, Ordering::SeqCst);
                    let Some(input) = inputs.get(idx) else {
                        break;
                    };
                    let result = self.process_customer(input, cancel);
                    if tx.send((idx, result)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut indexed: Vec<(usize, CustomerResult)> = rx.into_iter().collect();
        indexed.sort_by_key(|(idx, _)| *idx);
        let results: Vec<CustomerResult> = indexed.into_iter().map(|(_, r)| r).collect();
        let summary = BatchSummary::from_results(&results, cancel.is_cancelled());
        info!(
            customers = summary.customers,
            failed = summary.failed,
            decided = summary.decided,
            rejected = summary.rejected,
            skipped = summary.skipped,
            unknown = summary.unknown,
            "batch finished"
        );
        BatchReport { results, summary }
    }

    pub fn process_customer(&self, input: &CustomerInput, cancel: &CancelFlag) -> CustomerResult {
        let file = &input.file;
        if let Some(reason) = &file.unreadable {
            warn!(customer = %file.customer_id, reason = %reason, "customer file unreadable");
            return CustomerResult {
                customer_id: file.customer_id.clone(),
                records: Vec::new(),
                metrics: None,
                failure: Some(reason.clone()),
            };
        }
        let txns = file.transactions();
        let decisions = if cancel.is_cancelled() {
            Vec::new()
        } else {
            self.cascade.categorize(&txns, cancel)
        };
        let complete = decisions.len() == txns.len();

        let mut decisions = decisions.into_iter();
        let records: Vec<RecordResult> = file
            .records
            .iter()
            .map(|record| match &record.result {
                Err(e) => RecordResult {
                    line: record.line,
                    txn: None,
                    outcome: RecordOutcome::Rejected(e.clone()),
                },
                Ok(txn) => RecordResult {
                    line: record.line,
                    txn: Some(txn.clone()),
                    outcome: decisions
                        .next()
                        .map_or(RecordOutcome::Skipped, RecordOutcome::Decided),
                },
            })
            .collect();

        let mut result = CustomerResult {
            customer_id: file.customer_id.clone(),
            records,
            metrics: None,
            failure: None,
        };
        if complete {
            result.metrics = Some(self.engine.calculate(
                &result.customer_id,
                &result.categorized(),
                input.account.as_ref(),
            ));
        }
        info!(
            customer = %result.customer_id,
            decided = result.decided(),
            rejected = result.rejected(),
            skipped = result.skipped(),
            "customer processed"
        );
        result
    }
}

/// Per-record decision rows. Rejected rows keep their reason and never get
/// a category.
pub fn write_decisions<W: Write>(out: W, result: &CustomerResult) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record([
        "customer_id",
        "line",
        "date",
        "description",
        "amount",
        "status",
        "category_code",
        "confidence",
        "source",
        "reason",
    ])?;
    for record in &result.records {
        let (date, description, amount) = match &record.txn {
            Some(t) => (t.date.to_string(), t.description.clone(), format!("{:.2}", t.amount)),
            None => (String::new(), String::new(), String::new()),
        };
        let (status, code, confidence, source, reason) = match &record.outcome {
            RecordOutcome::Decided(d) => (
                "decided",
                d.code.clone(),
                format!("{:.2}", d.confidence),
                d.source.as_str().to_string(),
                d.reason.map(|r| r.as_str().to_string()).unwrap_or_default(),
            ),
            RecordOutcome::Rejected(e) => ("rejected", String::new(), String::new(), String::new(), e.to_string()),
            RecordOutcome::Skipped => ("skipped", String::new(), String::new(), String::new(), String::new()),
        };
        wtr.write_record([
            result.customer_id.clone(),
            record.line.to_string(),
            date,
            description,
            amount,
            status.to_string(),
            code,
            confidence,
            source,
            reason,
        ])?;
    }
    wtr.flush()?;
    Ok(())
}
