use std::path::Path;

use rusqlite::Connection;

use crate::error::{Result, TallyError};
use crate::models::Direction;
use crate::rules::{MatchType, Rule};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS learned_patterns (
    key TEXT PRIMARY KEY,
    code TEXT NOT NULL,
    confidence REAL NOT NULL,
    hit_count INTEGER DEFAULT 0,
    source TEXT NOT NULL DEFAULT 'external',
    examples TEXT DEFAULT '[]',
    created_at TEXT DEFAULT (datetime('now')),
    last_used TEXT
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    pattern TEXT NOT NULL,
    match_type TEXT DEFAULT 'word',
    code TEXT NOT NULL,
    confidence REAL DEFAULT 0.97,
    direction TEXT,
    priority INTEGER DEFAULT 0,
    hit_count INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Active user rules, highest priority first.
pub fn load_rules(conn: &Connection) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, code, confidence, priority, direction FROM rules \
         WHERE is_active = 1 ORDER BY priority DESC, id",
    )?;
    let rows: Vec<(i64, String, String, String, f64, i64, Option<String>)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, pattern, match_type, code, confidence, priority, direction)| {
            let match_type = MatchType::parse(&match_type).ok_or_else(|| TallyError::InvalidRule {
                pattern: pattern.clone(),
                reason: format!("unknown match type '{match_type}'"),
            })?;
            Ok(Rule {
                id: Some(id),
                pattern,
                match_type,
                code,
                confidence,
                priority,
                direction: direction.as_deref().and_then(Direction::parse),
            })
        })
        .collect()
}

pub fn insert_rule(conn: &Connection, rule: &Rule) -> Result<i64> {
    conn.execute(
        "INSERT INTO rules (pattern, match_type, code, confidence, priority, direction) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            rule.pattern,
            rule.match_type.as_str(),
            rule.code,
            rule.confidence,
            rule.priority,
            rule.direction.map(|d| d.as_str()),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn deactivate_rule(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("UPDATE rules SET is_active = 0 WHERE id = ?1 AND is_active = 1", [id])?;
    Ok(changed > 0)
}

pub fn record_rule_hits(conn: &Connection, hits: &[(i64, u64)]) -> Result<()> {
    for (id, count) in hits {
        conn.execute(
            "UPDATE rules SET hit_count = hit_count + ?1 WHERE id = ?2",
            rusqlite::params![*count as i64, id],
        )?;
    }
    Ok(())
}

pub fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = ?1")?;
    let mut rows = stmt.query([key])?;
    match rows.next()? {
        Some(row) => Ok(row.get(0)?),
        None => Ok(None),
    }
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

/// Adds `delta` to an integer counter stored in metadata.
pub fn bump_counter(conn: &Connection, key: &str, delta: u64) -> Result<u64> {
    let current = get_metadata(conn, key)?
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let next = current + delta;
    set_metadata(conn, key, &next.to_string())?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn rule(pattern: &str, priority: i64) -> Rule {
        Rule {
            id: None,
            pattern: pattern.to_string(),
            match_type: MatchType::Contains,
            code: "EXP-031".to_string(),
            confidence: 0.97,
            priority,
            direction: None,
        }
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &["learned_patterns", "rules", "metadata"] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_rules_roundtrip_in_priority_order() {
        let (_dir, conn) = test_db();
        insert_rule(&conn, &rule("low", 0)).unwrap();
        let mut narrowed = rule("high", 5);
        narrowed.direction = Some(Direction::Debit);
        insert_rule(&conn, &narrowed).unwrap();
        let loaded = load_rules(&conn).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].pattern, "high");
        assert_eq!(loaded[0].direction, Some(Direction::Debit));
        assert_eq!(loaded[1].match_type, MatchType::Contains);
    }

    #[test]
    fn test_deactivated_rules_are_not_loaded() {
        let (_dir, conn) = test_db();
        let id = insert_rule(&conn, &rule("gone", 0)).unwrap();
        assert!(deactivate_rule(&conn, id).unwrap());
        assert!(!deactivate_rule(&conn, id).unwrap());
        assert!(load_rules(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_record_rule_hits() {
        let (_dir, conn) = test_db();
        let id = insert_rule(&conn, &rule("acme", 0)).unwrap();
        record_rule_hits(&conn, &[(id, 3)]).unwrap();
        record_rule_hits(&conn, &[(id, 2)]).unwrap();
        let hits: i64 = conn
            .query_row("SELECT hit_count FROM rules WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(hits, 5);
    }

    #[test]
    fn test_bad_match_type_is_reported() {
        let (_dir, conn) = test_db();
        conn.execute(
            "INSERT INTO rules (pattern, match_type, code) VALUES ('x', 'fuzzy', 'EXP-031')",
            [],
        )
        .unwrap();
        assert!(matches!(load_rules(&conn), Err(TallyError::InvalidRule { .. })));
    }

    #[test]
    fn test_counters() {
        let (_dir, conn) = test_db();
        assert_eq!(get_metadata(&conn, "cache_lookups").unwrap(), None);
        assert_eq!(bump_counter(&conn, "cache_lookups", 4).unwrap(), 4);
        assert_eq!(bump_counter(&conn, "cache_lookups", 1).unwrap(), 5);
        assert_eq!(get_metadata(&conn, "cache_lookups").unwrap().as_deref(), Some("5"));
    }
}
