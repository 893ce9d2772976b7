use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::error::Result;
use crate::models::{AccountData, Transaction};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("unparseable date '{0}'")]
    InvalidDate(String),
    #[error("unparseable amount '{0}'")]
    InvalidAmount(String),
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// One CSV row before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub line: usize,
    pub date: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    pub hint: Option<String>,
    pub account_number: Option<String>,
    pub bsb: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub line: usize,
    pub result: std::result::Result<Transaction, RecordError>,
}

#[derive(Debug, Clone)]
pub struct CustomerFile {
    pub customer_id: String,
    pub records: Vec<ParsedRecord>,
    /// Set when the file itself could not be read; `records` is then empty.
    pub unreadable: Option<String>,
}

impl CustomerFile {
    pub fn unreadable(customer_id: &str, reason: &str) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            records: Vec::new(),
            unreadable: Some(reason.to_string()),
        }
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.records.iter().filter_map(|r| r.result.clone().ok()).collect()
    }

    pub fn rejected(&self) -> usize {
        self.records.iter().filter(|r| r.result.is_err()).count()
    }
}

pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.replace([',', '"', '$'], "");
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let value = if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        -inner.trim().parse::<f64>().ok()?
    } else {
        s.parse::<f64>().ok()?
    };
    value.is_finite().then_some(value)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d %b %Y"];

/// ISO dates, day-first Australian dates, and ISO timestamps.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let raw = match raw.find('T') {
        Some(pos) if pos == 10 => &raw[..10],
        _ => raw,
    };
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RawRecord {
    pub fn validate(&self) -> std::result::Result<Transaction, RecordError> {
        let date_raw = non_empty(&self.date).ok_or(RecordError::MissingField("date"))?;
        let description = non_empty(&self.description).ok_or(RecordError::MissingField("description"))?;
        let amount_raw = non_empty(&self.amount).ok_or(RecordError::MissingField("amount"))?;
        let date = parse_date(date_raw).ok_or_else(|| RecordError::InvalidDate(date_raw.to_string()))?;
        let amount = parse_amount(amount_raw).ok_or_else(|| RecordError::InvalidAmount(amount_raw.to_string()))?;
        Ok(Transaction {
            date,
            description: description.to_string(),
            amount,
            hint: non_empty(&self.hint).map(str::to_string),
            account_number: non_empty(&self.account_number).map(str::to_string),
            bsb: non_empty(&self.bsb).map(str::to_string),
        })
    }
}

#[derive(Debug, Default)]
struct Columns {
    date: Option<usize>,
    description: Option<usize>,
    amount: Option<usize>,
    hint: Option<usize>,
    account_number: Option<usize>,
    bsb: Option<usize>,
}

impl Columns {
    fn from_header(header: &csv::StringRecord) -> Self {
        let mut cols = Columns::default();
        for (idx, name) in header.iter().enumerate() {
            let name = name.trim().trim_start_matches('\u{feff}').to_lowercase().replace(' ', "_");
            let slot = match name.as_str() {
                "date" | "transaction_date" | "posted_date" => &mut cols.date,
                "description" | "narrative" | "details" => &mut cols.description,
                "amount" | "value" => &mut cols.amount,
                "hint" | "category" | "bs_category" | "provider_category" => &mut cols.hint,
                "account_number" | "account" | "account_no" => &mut cols.account_number,
                "bsb" => &mut cols.bsb,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        cols
    }

    fn read(&self, record: &csv::StringRecord, line: usize) -> RawRecord {
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::to_string);
        RawRecord {
            line,
            date: field(self.date),
            description: field(self.description),
            amount: field(self.amount),
            hint: field(self.hint),
            account_number: field(self.account_number),
            bsb: field(self.bsb),
        }
    }
}

pub fn customer_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "customer".to_string())
}

/// Reads one customer's CSV. Bad rows become rejected records; only an
/// unreadable file is an error.
pub fn read_customer_file(path: &Path) -> Result<CustomerFile> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));
    let columns = Columns::from_header(rdr.headers()?);

    let mut records = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let fallback_line = i + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(line = fallback_line, error = %e, "unreadable csv row");
                records.push(ParsedRecord {
                    line: fallback_line,
                    result: Err(RecordError::Malformed(e.to_string())),
                });
                continue;
            }
        };
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let raw = columns.read(&record, line);
        records.push(ParsedRecord {
            line,
            result: raw.validate(),
        });
    }

    Ok(CustomerFile {
        customer_id: customer_id_for(path),
        records,
        unreadable: None,
    })
}

/// JSON object keyed by customer id.
pub fn load_account_data(path: &Path) -> Result<HashMap<String, AccountData>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("$500"), Some(500.0));
        assert_eq!(parse_amount("(45.00)"), Some(-45.0));
        assert_eq!(parse_amount("-45.10"), Some(-45.10));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("NaN"), None);
    }

    #[test]
    fn test_parse_date() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 7);
        assert_eq!(parse_date("2025-03-07"), expected);
        assert_eq!(parse_date("07/03/2025"), expected);
        assert_eq!(parse_date("2025-03-07T01:16:55Z"), expected);
        assert_eq!(parse_date("7 Mar 2025"), expected);
        assert_eq!(parse_date("2025-13-01"), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let raw = RawRecord {
            date: Some("2025-03-07".into()),
            description: Some("  ".into()),
            amount: Some("-4.50".into()),
            ..RawRecord::default()
        };
        assert_eq!(raw.validate(), Err(RecordError::MissingField("description")));
        let raw = RawRecord {
            date: Some("2025-03-07".into()),
            description: Some("KFC".into()),
            ..RawRecord::default()
        };
        assert_eq!(raw.validate(), Err(RecordError::MissingField("amount")));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let raw = RawRecord {
            date: Some("someday".into()),
            description: Some("KFC".into()),
            amount: Some("-4.50".into()),
            ..RawRecord::default()
        };
        assert!(matches!(raw.validate(), Err(RecordError::InvalidDate(_))));
    }

    #[test]
    fn test_read_customer_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cust-042.csv");
        std::fs::write(
            &path,
            "Date,Description,Amount,Hint\n\
             2025-03-01,WOOLWORTHS 1234,-45.00,Groceries\n\
             2025-03-02,,-10.00,\n\
             2025-03-03,ACME PAYROLL,\"2,000.00\",\n\
             ,,,\n\
             2025-03-04,BROKEN AMOUNT,twelve,\n",
        )
        .unwrap();
        let file = read_customer_file(&path).unwrap();
        assert_eq!(file.customer_id, "cust-042");
        assert_eq!(file.unreadable, None);
        assert_eq!(file.records.len(), 4);
        assert_eq!(file.rejected(), 2);
        let txns = file.transactions();
        assert_eq!(txns.len(), 2);
        assert_eq!(txns[0].hint.as_deref(), Some("Groceries"));
        assert_eq!(txns[1].amount, 2000.0);
        assert_eq!(file.records[1].line, 3);
        assert_eq!(file.records[1].result, Err(RecordError::MissingField("description")));
    }

    #[test]
    fn test_missing_column_rejects_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.csv");
        std::fs::write(&path, "date,description\n2025-03-01,KFC\n").unwrap();
        let file = read_customer_file(&path).unwrap();
        assert_eq!(file.records[0].result, Err(RecordError::MissingField("amount")));
    }

    #[test]
    fn test_load_account_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(
            &path,
            r#"{"cust-042": {"credit_card_limits": [3000, 2000], "has_mortgage_account": true}}"#,
        )
        .unwrap();
        let data = load_account_data(&path).unwrap();
        let account = &data["cust-042"];
        assert_eq!(account.credit_card_limits, vec![3000.0, 2000.0]);
        assert_eq!(account.has_mortgage_account, Some(true));
    }
}
