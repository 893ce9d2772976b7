use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::db::get_metadata;
use crate::error::{Result, TallyError};
use crate::fmt::confidence as fmt_confidence;
use crate::normalizer::normalize_description;
use crate::session::{Session, SessionOptions};

fn offline_session() -> Result<Session> {
    Session::open(&SessionOptions {
        offline: true,
        ..SessionOptions::default()
    })
}

pub fn list(limit: usize) -> Result<()> {
    let session = offline_session()?;
    let mut table = Table::new();
    table.set_header(vec!["Key", "Code", "Category", "Conf", "Hits", "Source", "Last used"]);
    for p in session.cache.top_patterns(limit) {
        table.add_row(vec![
            Cell::new(&p.key),
            Cell::new(&p.code),
            Cell::new(session.taxonomy.name_of(&p.code)),
            Cell::new(fmt_confidence(p.confidence)),
            Cell::new(p.hit_count),
            Cell::new(&p.source),
            Cell::new(p.last_used.as_deref().unwrap_or("-")),
        ]);
    }
    println!("Learned patterns ({} total)\n{table}", session.cache.len());
    Ok(())
}

pub fn stats() -> Result<()> {
    let session = offline_session()?;
    let stats = session.cache.stats();
    let counter = |key: &str| -> Result<u64> {
        Ok(get_metadata(session.conn(), key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    };
    let lookups = counter("cache_lookups")?;
    let hits = counter("cache_hits")?;
    let hit_rate = if lookups > 0 { hits as f64 / lookups as f64 * 100.0 } else { 0.0 };

    println!("Patterns:        {}", stats.patterns);
    println!("Lookups:         {lookups}");
    println!("Hits:            {hits}");
    println!("Hit rate:        {hit_rate:.1}%");
    println!("Calls saved:     {hits}");

    let mut table = Table::new();
    table.set_header(vec!["Code", "Category", "Patterns"]);
    for (code, count) in &stats.by_code {
        table.add_row(vec![
            Cell::new(code),
            Cell::new(session.taxonomy.name_of(code)),
            Cell::new(count),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Rebinds a key. Accepts either a stored key or a raw description.
pub fn retrain(key: &str, code: &str, confidence: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&confidence) {
        return Err(TallyError::Other(format!("confidence must be between 0 and 1, got {confidence}")));
    }
    let session = offline_session()?;
    if !session.taxonomy.contains(code) {
        return Err(TallyError::UnknownCategory(code.to_string()));
    }
    let key = if session.cache.get(key).is_some() {
        key.to_string()
    } else {
        normalize_description(key).as_str().to_string()
    };
    if key.is_empty() {
        return Err(TallyError::Other("key normalizes to nothing".into()));
    }
    let previous = session.cache.retrain(&key, code, confidence)?;
    session.finish()?;
    match previous {
        Some(old) if old != code => println!("Retrained '{key}': {old} \u{2192} {}", code.green()),
        Some(_) => println!("'{key}' already maps to {code}"),
        None => println!("Learned '{key}' \u{2192} {}", code.green()),
    }
    Ok(())
}
