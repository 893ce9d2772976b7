use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::db::{deactivate_rule, insert_rule};
use crate::error::{Result, TallyError};
use crate::fmt::confidence as fmt_confidence;
use crate::models::Direction;
use crate::rules::{MatchType, Rule, RuleMatcher, DEFAULT_RULE_CONFIDENCE};
use crate::session::{load_taxonomy, open_database};
use crate::settings::load_settings;
use crate::taxonomy::Taxonomy;

fn open() -> Result<(Connection, Taxonomy)> {
    let settings = load_settings()?;
    let conn = open_database(&settings)?;
    let taxonomy = load_taxonomy(&settings)?;
    Ok((conn, taxonomy))
}

pub fn add(
    pattern: &str,
    code: &str,
    match_type: &str,
    priority: i64,
    confidence: Option<f64>,
    direction: Option<&str>,
) -> Result<()> {
    let (conn, taxonomy) = open()?;
    let invalid = |reason: String| TallyError::InvalidRule {
        pattern: pattern.to_string(),
        reason,
    };
    let match_type = MatchType::parse(match_type)
        .ok_or_else(|| invalid(format!("unknown match type '{match_type}'")))?;
    let direction = match direction {
        Some(d) => Some(Direction::parse(d).ok_or_else(|| invalid(format!("unknown direction '{d}'")))?),
        None => None,
    };
    let rule = Rule {
        id: None,
        pattern: pattern.to_string(),
        match_type,
        code: code.to_string(),
        confidence: confidence.unwrap_or(DEFAULT_RULE_CONFIDENCE),
        priority,
        direction,
    };
    // Compiles the pattern and checks code, direction and confidence.
    RuleMatcher::new(vec![rule.clone()], &taxonomy)?;

    let id = insert_rule(&conn, &rule)?;
    println!(
        "Added rule {id}: '{pattern}' \u{2192} {code} ({})",
        taxonomy.name_of(code)
    );
    Ok(())
}

pub fn list() -> Result<()> {
    let (conn, taxonomy) = open()?;
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, code, confidence, direction, priority, hit_count \
         FROM rules WHERE is_active = 1 ORDER BY priority DESC, id",
    )?;
    let rows: Vec<(i64, String, String, String, f64, Option<String>, i64, i64)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Code", "Category", "Conf", "Dir", "Priority", "Hits"]);
    for (id, pattern, match_type, code, confidence, direction, priority, hits) in rows {
        let name = taxonomy.name_of(&code).to_string();
        table.add_row(vec![
            Cell::new(id),
            Cell::new(pattern),
            Cell::new(match_type),
            Cell::new(code),
            Cell::new(name),
            Cell::new(fmt_confidence(confidence)),
            Cell::new(direction.unwrap_or_else(|| "any".into())),
            Cell::new(priority),
            Cell::new(hits),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let (conn, _) = open()?;
    if deactivate_rule(&conn, id)? {
        println!("Deactivated rule {id}");
        Ok(())
    } else {
        Err(TallyError::Other(format!("No active rule with ID {id}")))
    }
}
