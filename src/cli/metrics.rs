use std::path::{Path, PathBuf};

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::batch::{BatchProcessor, CustomerInput};
use crate::cascade::CancelFlag;
use crate::error::{Result, TallyError};
use crate::importer::{load_account_data, read_customer_file};
use crate::metrics::METRICS;
use crate::session::{Session, SessionOptions};

pub fn run(
    file: &Path,
    offline: bool,
    accounts: Option<PathBuf>,
    as_of: Option<String>,
    json: bool,
) -> Result<()> {
    let session = Session::open(&SessionOptions {
        offline,
        as_of: super::parse_as_of(&as_of)?,
        window_days: None,
    })?;
    let file = read_customer_file(file)?;
    let account = match accounts {
        Some(path) => load_account_data(&path)?.remove(&file.customer_id),
        None => None,
    };
    let input = CustomerInput { file, account };

    let processor = BatchProcessor::new(&session.cascade, &session.engine, 1);
    session.cascade.begin_batch();
    let result = processor.process_customer(&input, &CancelFlag::default());
    let report = result
        .metrics
        .as_ref()
        .ok_or_else(|| TallyError::Other("metrics unavailable for a partial run".into()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "{}  window {} to {} ({} days)",
            report.customer_id.bold(),
            report.window_start,
            report.window_end,
            report.reporting_period_days
        );
        let mut table = Table::new();
        table.set_header(vec!["ID", "Metric", "Value"]);
        let mut section = "";
        for def in METRICS {
            if def.section != section {
                section = def.section;
                table.add_row(vec![
                    Cell::new(section.to_uppercase().replace('_', " ").bold()),
                    Cell::new(""),
                    Cell::new(""),
                ]);
            }
            let value = match report.get(def.id) {
                Some(v) if v.is_null() => v.to_string().dimmed().to_string(),
                Some(v) => v.to_string(),
                None => String::new(),
            };
            table.add_row(vec![Cell::new(def.id), Cell::new(def.name), Cell::new(value)]);
        }
        println!("{table}");
        if result.rejected() > 0 {
            println!(
                "{}",
                format!("{} record(s) rejected and left out.", result.rejected()).yellow()
            );
        }
    }

    session.finish()?;
    Ok(())
}
