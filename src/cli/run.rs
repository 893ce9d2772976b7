use std::collections::HashMap;
use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};
use tracing::warn;

use crate::batch::{write_decisions, BatchProcessor, CustomerInput, ExitStatus};
use crate::cascade::CancelFlag;
use crate::error::{Result, TallyError};
use crate::importer::{customer_id_for, load_account_data, read_customer_file, CustomerFile};
use crate::models::AccountData;
use crate::session::{Session, SessionOptions};

pub struct RunArgs {
    pub files: Vec<PathBuf>,
    pub out: Option<PathBuf>,
    pub offline: bool,
    pub accounts: Option<PathBuf>,
    pub as_of: Option<String>,
    pub window_days: Option<i64>,
    pub workers: Option<usize>,
}

/// Output files are named by customer id, so two inputs may not share a
/// file stem.
fn check_unique_ids(files: &[PathBuf]) -> Result<()> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for path in files {
        let id = customer_id_for(path);
        if let Some(first) = seen.get(&id) {
            return Err(TallyError::Other(format!(
                "duplicate customer id '{id}' from {} and {}",
                first.display(),
                path.display()
            )));
        }
        seen.insert(id, path);
    }
    Ok(())
}

/// Returns the process exit code.
pub fn run(args: RunArgs) -> Result<i32> {
    check_unique_ids(&args.files)?;
    let options = SessionOptions {
        offline: args.offline,
        as_of: super::parse_as_of(&args.as_of)?,
        window_days: args.window_days,
    };
    let session = Session::open(&options)?;

    let mut accounts: HashMap<String, AccountData> = match &args.accounts {
        Some(path) => load_account_data(path)?,
        None => HashMap::new(),
    };
    let mut inputs = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = match read_customer_file(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read customer file");
                CustomerFile::unreadable(&customer_id_for(path), &e.to_string())
            }
        };
        let account = accounts.remove(&file.customer_id);
        inputs.push(CustomerInput { file, account });
    }

    let cancel = CancelFlag::default();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.cancel()) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }

    let workers = args.workers.unwrap_or_else(|| session.settings.worker_count());
    let report = BatchProcessor::new(&session.cascade, &session.engine, workers).run(&inputs, &cancel);

    // Learned patterns are persisted even when the outputs cannot be written.
    let learned = session.finish();
    let written = match &args.out {
        Some(out) => write_outputs(out, &report.results),
        None => Ok(()),
    };
    let learned = learned?;
    written?;

    let mut table = Table::new();
    table.set_header(vec!["Customer", "Decided", "Unknown", "Rejected", "Skipped", "Metrics"]);
    for result in &report.results {
        if let Some(reason) = &result.failure {
            table.add_row(vec![
                Cell::new(&result.customer_id),
                Cell::new(format!("unreadable: {reason}").red().to_string()),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("no"),
            ]);
            continue;
        }
        let unknown = result
            .categorized()
            .iter()
            .filter(|c| c.decision.is_unknown())
            .count();
        let rejected = result.rejected();
        table.add_row(vec![
            Cell::new(&result.customer_id),
            Cell::new(result.decided()),
            Cell::new(unknown),
            Cell::new(if rejected > 0 {
                rejected.to_string().red().to_string()
            } else {
                "0".to_string()
            }),
            Cell::new(result.skipped()),
            Cell::new(if result.metrics.is_some() { "yes" } else { "no" }),
        ]);
    }
    println!("{table}");

    let summary = &report.summary;
    let sources: Vec<String> = summary
        .by_source
        .iter()
        .map(|(source, n)| format!("{source}={n}"))
        .collect();
    println!("Sources: {}", sources.join(", "));

    let status = summary.exit_status();
    match status {
        ExitStatus::AllProcessed => println!(
            "{}",
            format!("All {} records processed.", summary.decided).green()
        ),
        ExitStatus::PartialFailure { rejected, failed } => {
            if failed > 0 {
                println!("{}", format!("{failed} customer file(s) could not be read.").red());
            }
            println!(
                "{}",
                format!("{rejected} record(s) rejected; {} processed.", summary.decided).yellow()
            );
        }
        ExitStatus::Cancelled => println!(
            "{}",
            format!(
                "Cancelled: {} processed, {} skipped.",
                summary.decided, summary.skipped
            )
            .yellow()
        ),
    }

    if learned > 0 {
        println!("Learned {learned} pattern(s).");
    }
    Ok(status.code())
}

fn write_outputs(out: &Path, results: &[crate::batch::CustomerResult]) -> Result<()> {
    std::fs::create_dir_all(out)?;
    for result in results.iter().filter(|r| r.failure.is_none()) {
        let decisions = std::fs::File::create(out.join(format!("{}.decisions.csv", result.customer_id)))?;
        write_decisions(std::io::BufWriter::new(decisions), result)?;
        if let Some(metrics) = &result.metrics {
            let json = serde_json::to_string_pretty(metrics)?;
            std::fs::write(
                out.join(format!("{}.metrics.json", result.customer_id)),
                format!("{json}\n"),
            )?;
        }
    }
    Ok(())
}
