use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::batch::{BatchProcessor, CustomerInput, RecordOutcome};
use crate::cascade::CancelFlag;
use crate::error::Result;
use crate::fmt::{confidence, money};
use crate::importer::read_customer_file;
use crate::session::{Session, SessionOptions};

pub fn run(file: &Path, offline: bool) -> Result<()> {
    let session = Session::open(&SessionOptions {
        offline,
        ..SessionOptions::default()
    })?;
    let input = CustomerInput {
        file: read_customer_file(file)?,
        account: None,
    };
    let processor = BatchProcessor::new(&session.cascade, &session.engine, 1);
    session.cascade.begin_batch();
    let result = processor.process_customer(&input, &CancelFlag::default());

    let mut table = Table::new();
    table.set_header(vec!["Line", "Date", "Description", "Amount", "Code", "Category", "Conf", "Source"]);
    for record in &result.records {
        let (date, description, amount) = match &record.txn {
            Some(t) => (t.date.to_string(), t.description.clone(), money(t.amount)),
            None => (String::new(), String::new(), String::new()),
        };
        let row = match &record.outcome {
            RecordOutcome::Decided(d) if d.is_unknown() => vec![
                d.code.yellow().to_string(),
                d.reason.map(|r| r.as_str()).unwrap_or_default().to_string(),
                confidence(d.confidence),
                d.source.as_str().to_string(),
            ],
            RecordOutcome::Decided(d) => vec![
                d.code.clone(),
                session.taxonomy.name_of(&d.code).to_string(),
                confidence(d.confidence),
                d.source.as_str().to_string(),
            ],
            RecordOutcome::Rejected(e) => vec![
                "REJECTED".red().to_string(),
                e.to_string(),
                String::new(),
                String::new(),
            ],
            RecordOutcome::Skipped => vec!["-".to_string(), String::new(), String::new(), String::new()],
        };
        let mut cells = vec![
            Cell::new(record.line),
            Cell::new(date),
            Cell::new(description),
            Cell::new(amount),
        ];
        cells.extend(row.into_iter().map(Cell::new));
        table.add_row(cells);
    }
    println!("{}", result.customer_id.bold());
    println!("{table}");
    println!(
        "{} decided, {} rejected",
        result.decided(),
        result.rejected()
    );

    session.finish()?;
    Ok(())
}
