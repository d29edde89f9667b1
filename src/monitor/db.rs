//! Persistence gateway for finished sessions
//!
//! Tables written (see `/sql/`):
//! - `position_timeseries` - INSERT OR IGNORE, one transaction per session
//! - `position_peaks` - UPSERT on (wallet, token, session_open_ms)

use super::types::{PeakPoint, SessionKey, SessionReport, TimeseriesPoint};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema directory not found: {0}")]
    SchemaDirMissing(String),

    #[error("database connection lock poisoned")]
    LockPoisoned,
}

/// Sink for finished sessions
///
/// The engine calls `persist_timeseries` then `persist_summary` once per
/// session and only logs failures.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn persist_timeseries(
        &self,
        key: &SessionKey,
        points: &[TimeseriesPoint],
    ) -> Result<(), PersistenceError>;

    async fn persist_summary(&self, report: &SessionReport) -> Result<(), PersistenceError>;
}

/// Apply every `.sql` file in `schema_dir` in file-name order
///
/// Files must be idempotent (`IF NOT EXISTS`). Enables WAL mode first.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), PersistenceError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(PersistenceError::SchemaDirMissing(schema_dir.to_string()));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

pub struct SqliteSessionWriter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionWriter {
    /// Open a writer on an existing database (schema applied by `run_schema_migrations`)
    pub fn new(db_path: &str) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        Ok(Self::from_connection(conn))
    }

    /// Wrap an already migrated connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }
}

fn peak_columns(peak: &Option<PeakPoint>) -> (Option<f64>, Option<f64>, Option<f64>, Option<i64>) {
    match peak {
        Some(p) => (p.price_base, p.price_quote, p.market_cap, Some(p.timestamp_ms)),
        None => (None, None, None, None),
    }
}

#[async_trait]
impl PersistenceGateway for SqliteSessionWriter {
    async fn persist_timeseries(
        &self,
        key: &SessionKey,
        points: &[TimeseriesPoint],
    ) -> Result<(), PersistenceError> {
        if points.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                r#"
                INSERT OR IGNORE INTO position_timeseries (
                    wallet, token, session_open_ms, timestamp_ms,
                    price_base, price_quote, market_cap,
                    pool_address, signature, event_kind
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;

            for point in points {
                stmt.execute(params![
                    key.wallet,
                    key.token,
                    key.open_timestamp_ms,
                    point.timestamp_ms,
                    point.price_base,
                    point.price_quote,
                    point.market_cap,
                    point.pool_address,
                    point.signature,
                    point.kind.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    async fn persist_summary(&self, report: &SessionReport) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        let now = chrono::Utc::now().timestamp();

        let (before_base, before_quote, before_mc, before_ts) = peak_columns(&report.summary.peak_before_close);
        let (after_base, after_quote, after_mc, after_ts) = peak_columns(&report.summary.peak_after_close);

        conn.execute(
            r#"
            INSERT INTO position_peaks (
                wallet, token, session_open_ms, pool_address,
                open_signature, close_signature,
                peak_before_price_base, peak_before_price_quote,
                peak_before_market_cap, peak_before_timestamp_ms,
                peak_after_price_base, peak_after_price_quote,
                peak_after_market_cap, peak_after_timestamp_ms,
                competing_before, competing_grace, point_count,
                terminated_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            ON CONFLICT(wallet, token, session_open_ms) DO UPDATE SET
                close_signature = excluded.close_signature,
                peak_before_price_base = excluded.peak_before_price_base,
                peak_before_price_quote = excluded.peak_before_price_quote,
                peak_before_market_cap = excluded.peak_before_market_cap,
                peak_before_timestamp_ms = excluded.peak_before_timestamp_ms,
                peak_after_price_base = excluded.peak_after_price_base,
                peak_after_price_quote = excluded.peak_after_price_quote,
                peak_after_market_cap = excluded.peak_after_market_cap,
                peak_after_timestamp_ms = excluded.peak_after_timestamp_ms,
                competing_before = excluded.competing_before,
                competing_grace = excluded.competing_grace,
                point_count = excluded.point_count,
                terminated_by = excluded.terminated_by
            "#,
            params![
                report.key.wallet,
                report.key.token,
                report.key.open_timestamp_ms,
                report.pool_address,
                report.open_tx_id,
                report.close_tx_id,
                before_base,
                before_quote,
                before_mc,
                before_ts,
                after_base,
                after_quote,
                after_mc,
                after_ts,
                report.summary.competing_trades_before_close,
                report.summary.competing_trades_within_grace_window,
                report.points.len() as i64,
                report.terminated_by.as_str(),
                now,
            ],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::types::{EventKind, PeakSummary, Termination};
    use tempfile::NamedTempFile;

    const SCHEMA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql");

    /// Helper to create a migrated database and a writer on it
    fn create_test_db() -> (NamedTempFile, SqliteSessionWriter) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();

        let mut conn = Connection::open(db_path).unwrap();
        run_schema_migrations(&mut conn, SCHEMA_DIR).unwrap();
        drop(conn);

        let writer = SqliteSessionWriter::new(db_path).unwrap();
        (temp_file, writer)
    }

    fn make_point(timestamp_ms: i64, signature: &str, market_cap: Option<f64>) -> TimeseriesPoint {
        TimeseriesPoint {
            timestamp_ms,
            price_base: Some(0.001),
            price_quote: Some(0.15),
            market_cap,
            pool_address: "pool_1".to_string(),
            signature: signature.to_string(),
            kind: EventKind::Other,
        }
    }

    fn make_report(key: SessionKey, terminated_by: Termination) -> SessionReport {
        SessionReport {
            key,
            pool_address: "pool_1".to_string(),
            open_tx_id: "open_sig".to_string(),
            close_tx_id: None,
            summary: PeakSummary {
                peak_before_close: Some(PeakPoint {
                    price_base: Some(0.002),
                    price_quote: Some(0.3),
                    market_cap: None,
                    timestamp_ms: 2_000,
                }),
                peak_after_close: None,
                competing_trades_before_close: 4,
                competing_trades_within_grace_window: 0,
            },
            points: vec![make_point(2_000, "sig_1", None)],
            terminated_by,
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut conn = Connection::open(temp_file.path()).unwrap();

        run_schema_migrations(&mut conn, SCHEMA_DIR).unwrap();
        run_schema_migrations(&mut conn, SCHEMA_DIR).unwrap();
    }

    #[test]
    fn test_missing_schema_dir() {
        let mut conn = Connection::open_in_memory().unwrap();
        let result = run_schema_migrations(&mut conn, "/nonexistent/schema");
        assert!(matches!(result, Err(PersistenceError::SchemaDirMissing(_))));
    }

    #[tokio::test]
    async fn test_timeseries_batch_ignores_duplicates() {
        // Test: re-persisting the same session does not duplicate rows
        let (temp, writer) = create_test_db();
        let key = SessionKey::new("wallet_1", "mint_1", 1_000);
        let points = vec![
            make_point(2_000, "sig_1", Some(150_000.0)),
            make_point(3_000, "sig_2", None),
        ];

        writer.persist_timeseries(&key, &points).await.unwrap();
        writer.persist_timeseries(&key, &points).await.unwrap();

        let conn = Connection::open(temp.path()).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM position_timeseries", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        // Null market cap stays null
        let mc: Option<f64> = conn
            .query_row(
                "SELECT market_cap FROM position_timeseries WHERE signature = 'sig_2'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(mc.is_none());
    }

    #[tokio::test]
    async fn test_summary_upsert() {
        let (temp, writer) = create_test_db();
        let key = SessionKey::new("wallet_1", "mint_1", 1_000);

        writer
            .persist_summary(&make_report(key.clone(), Termination::MaxDuration))
            .await
            .unwrap();
        writer
            .persist_summary(&make_report(key, Termination::Shutdown))
            .await
            .unwrap();

        let conn = Connection::open(temp.path()).unwrap();
        let (count, terminated_by, before_quote, after_quote, competing): (i64, String, Option<f64>, Option<f64>, i64) = conn
            .query_row(
                "SELECT COUNT(*), terminated_by, peak_before_price_quote, peak_after_price_quote, competing_before
                 FROM position_peaks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(terminated_by, "shutdown");
        assert_eq!(before_quote, Some(0.3));
        assert!(after_quote.is_none());
        assert_eq!(competing, 4);
    }

    #[tokio::test]
    async fn test_writer_on_in_memory_connection() {
        // Test: a migrated in-memory connection takes the full session write
        let mut conn = Connection::open_in_memory().unwrap();
        run_schema_migrations(&mut conn, SCHEMA_DIR).unwrap();
        let writer = SqliteSessionWriter::from_connection(conn);

        let key = SessionKey::new("wallet_1", "mint_1", 1_000);
        let report = make_report(key.clone(), Termination::GraceExpired);
        writer.persist_timeseries(&key, &report.points).await.unwrap();
        writer.persist_summary(&report).await.unwrap();

        let conn = writer.conn.lock().unwrap();
        let points: i64 = conn
            .query_row("SELECT COUNT(*) FROM position_timeseries", [], |row| row.get(0))
            .unwrap();
        let terminated_by: String = conn
            .query_row("SELECT terminated_by FROM position_peaks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(points, 1);
        assert_eq!(terminated_by, "grace_expired");
    }

    #[tokio::test]
    async fn test_empty_timeseries_is_noop() {
        let (_temp, writer) = create_test_db();
        let key = SessionKey::new("wallet_1", "mint_1", 1_000);
        writer.persist_timeseries(&key, &[]).await.unwrap();
    }
}
