pub mod categorize;
pub mod init;
pub mod metrics;
pub mod patterns;
pub mod rules;
pub mod run;
pub mod schema;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::error::{Result, TallyError};
use crate::importer::parse_date;

pub(crate) fn parse_as_of(raw: &Option<String>) -> Result<Option<NaiveDate>> {
    match raw {
        None => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| TallyError::Other(format!("Invalid --as-of date '{s}'"))),
    }
}

#[derive(Parser)]
#[command(
    name = "tallyman",
    version,
    about = "Categorize bank transactions and derive affordability metrics."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory, settings file and database.
    Init {
        /// Path for tallyman data (default: ~/.local/share/tallyman)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Categorize many customers' CSV files and compute their metrics.
    Run {
        /// One CSV per customer; the file stem is the customer id
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory for decision CSVs and metrics JSON
        #[arg(long)]
        out: Option<PathBuf>,
        /// Never call the external classifier
        #[arg(long)]
        offline: bool,
        /// JSON file of account data keyed by customer id
        #[arg(long)]
        accounts: Option<PathBuf>,
        /// End the reporting window on this date instead of the latest transaction
        #[arg(long = "as-of")]
        as_of: Option<String>,
        /// Reporting window length in days
        #[arg(long = "window-days")]
        window_days: Option<i64>,
        /// Worker threads (default: settings, then available parallelism)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Show the decision for every transaction in one customer's file.
    Categorize {
        file: PathBuf,
        #[arg(long)]
        offline: bool,
    },
    /// Show the metrics for one customer's file.
    Metrics {
        file: PathBuf,
        #[arg(long)]
        offline: bool,
        /// Account data JSON for this customer
        #[arg(long)]
        accounts: Option<PathBuf>,
        #[arg(long = "as-of")]
        as_of: Option<String>,
        /// Print the JSON record instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Inspect and correct the learned pattern cache.
    Patterns {
        #[command(subcommand)]
        command: PatternsCommands,
    },
    /// Manage user categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Print the metric definitions as JSON.
    Schema,
}

#[derive(Subcommand)]
pub enum PatternsCommands {
    /// List the most used learned patterns.
    List {
        #[arg(long, default_value = "25")]
        limit: usize,
    },
    /// Show cache size, hit rate and code distribution.
    Stats,
    /// Bind a key to a different category code.
    Retrain {
        /// Normalized key, or a raw description to normalize
        key: String,
        code: String,
        #[arg(long, default_value = "1.0")]
        confidence: f64,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a rule.
    Add {
        pattern: String,
        /// Category code, e.g. EXP-016
        code: String,
        /// word, contains, starts_with or regex
        #[arg(long = "match-type", default_value = "word")]
        match_type: String,
        #[arg(long, default_value = "0")]
        priority: i64,
        #[arg(long)]
        confidence: Option<f64>,
        /// Restrict to credit or debit
        #[arg(long)]
        direction: Option<String>,
    },
    /// List active user rules.
    List,
    /// Deactivate a rule by id.
    Delete { id: i64 },
}
