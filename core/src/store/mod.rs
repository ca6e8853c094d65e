//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The engine and the sync driver call store methods; they never execute
//! SQL directly. Every write that must be atomic runs inside one
//! `IMMEDIATE` transaction here.

use crate::{error::CommissionResult, event::AuditLogEntry};
mod distribution;
mod grid;
mod party;
mod policy;
mod sync;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, Row};
use std::str::FromStr;

pub use distribution::CommitOutcome;
pub use sync::{PolicySyncStatus, ResyncLockGuard};

pub struct CommissionStore {
    conn: Connection,
}

impl CommissionStore {
    pub fn open(path: &str) -> CommissionResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // Concurrent writers queue on the write lock instead of failing fast.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> CommissionResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> CommissionResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Audit log ──────────────────────────────────────────────

    pub fn append_audit(&self, entry: &AuditLogEntry) -> CommissionResult<()> {
        insert_audit(&self.conn, entry)?;
        Ok(())
    }

    pub fn audit_for_policy(&self, tenant_id: &str, policy_id: &str) -> CommissionResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, policy_id, actor, event_type, payload, created_at
             FROM audit_log WHERE tenant_id = ?1 AND policy_id = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![tenant_id, policy_id], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn audit_for_tenant(&self, tenant_id: &str) -> CommissionResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, tenant_id, policy_id, actor, event_type, payload, created_at
             FROM audit_log WHERE tenant_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![tenant_id], audit_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn insert_audit(conn: &Connection, entry: &AuditLogEntry) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO audit_log (tenant_id, policy_id, actor, event_type, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.tenant_id,
            entry.policy_id,
            entry.actor,
            entry.event_type,
            entry.payload,
            ts(&entry.created_at),
        ],
    )?;
    Ok(())
}

fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id:         Some(row.get(0)?),
        tenant_id:  row.get(1)?,
        policy_id:  row.get(2)?,
        actor:      row.get(3)?,
        event_type: row.get(4)?,
        payload:    row.get(5)?,
        created_at: parse_ts(row, 6)?,
    })
}

// ── Column codecs ─────────────────────────────────────────────────
//
// Timestamps are RFC 3339 UTC with millisecond precision so that text
// comparison orders them correctly. Dates are ISO `YYYY-MM-DD`.

pub(crate) fn ts(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn date_str(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn parse_date(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    parse_opt_date(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(idx, "date".into(), Type::Null))
}

/// Parse a text column into one of the engine's string-coded enums.
pub(crate) fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

pub(crate) fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        s.parse()
            .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    })
    .transpose()
}
