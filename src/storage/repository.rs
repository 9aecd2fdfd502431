use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::query::builder::{build_aggregate_sql, MetricQuery, Scope};
use crate::query::period::DateRange;

/// Tables reported by `status`, in display order.
pub const DATA_TABLES: &[&str] = &[
    "leads",
    "tasks",
    "conversations",
    "content",
    "requirements",
    "generated_images",
    "videos",
    "page_visits",
    "users",
];

// ── Aggregates ─────────────────────────────────────────────────────

/// Run a metric's aggregate over one window.
pub fn aggregate(
    conn: &Connection,
    query: &MetricQuery,
    scope: &Scope,
    window: &DateRange,
) -> Result<f64, rusqlite::Error> {
    let (sql, params) = build_aggregate_sql(query, scope, window);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let value: Option<f64> = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
    Ok(value.unwrap_or(0.0))
}

// ── Users ──────────────────────────────────────────────────────────

/// Resolve a user identifier (id or email) to a user id.
/// Non-email identifiers are returned unchanged; emails are looked up
/// case-insensitively within the site.
pub fn resolve_user_identifier(
    conn: &Connection,
    site_id: &str,
    identifier: &str,
) -> Result<Option<String>, rusqlite::Error> {
    if !identifier.contains('@') {
        return Ok(Some(identifier.to_string()));
    }
    conn.query_row(
        "SELECT user_id FROM users WHERE site_id = ?1 AND lower(email) = lower(?2)",
        params![site_id, identifier],
        |row| row.get(0),
    )
    .optional()
}

#[cfg(test)]
pub(crate) fn upsert_user(
    conn: &Connection,
    site_id: &str,
    user_id: &str,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO users (user_id, site_id, name, email, created_at)
         VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
         ON CONFLICT(user_id) DO UPDATE SET
             site_id=excluded.site_id, name=excluded.name, email=excluded.email",
        params![user_id, site_id, name, email],
    )?;
    Ok(())
}

// ── Status ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TableCount {
    pub table: String,
    pub rows: i64,
}

pub fn table_row_counts(conn: &Connection) -> Result<Vec<TableCount>, rusqlite::Error> {
    let mut counts = Vec::with_capacity(DATA_TABLES.len());
    for table in DATA_TABLES {
        let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        counts.push(TableCount {
            table: table.to_string(),
            rows,
        });
    }
    Ok(counts)
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
