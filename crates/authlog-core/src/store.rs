//! SQLite-backed storage for authentication attempts.
//!
//! The store owns a single connection. Every insert runs in its own
//! transaction and is rolled back explicitly when it fails; there is no
//! update or delete path, records are append-only.

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{AttemptStatus, LogRecord, NewLogRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::fs;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS auth_logs (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp          TEXT NOT NULL,
        source_ip          VARCHAR(255) NOT NULL,
        username           VARCHAR(255) NOT NULL,
        encrypted_password BLOB,
        status             TEXT NOT NULL CHECK (status IN ('success', 'failed')),
        attempt_details    TEXT,
        created_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE INDEX IF NOT EXISTS idx_timestamp ON auth_logs(timestamp);
    CREATE INDEX IF NOT EXISTS idx_status ON auth_logs(status);
    CREATE INDEX IF NOT EXISTS idx_source_ip ON auth_logs(source_ip);
"#;

const SELECT_COLUMNS: &str = "SELECT id, timestamp, source_ip, username, encrypted_password, status, attempt_details, created_at
     FROM auth_logs";

pub struct LogStore {
    conn: Option<Connection>,
}

impl LogStore {
    /// Open (or create) the database file. Failures are reported, not retried.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Connection(format!("{}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(&config.path)
            .map_err(|e| StoreError::Connection(format!("{}: {e}", config.path.display())))?;

        // Opening is lazy; touch the schema so a non-database file fails here.
        let connection_err =
            |e: rusqlite::Error| StoreError::Connection(format!("{}: {e}", config.path.display()));
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(connection_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(connection_err)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(connection_err)?;

        debug!(path = %config.path.display(), "database connection opened");
        Ok(Self { conn: Some(conn) })
    }

    /// Open in-memory database (for testing)
    pub fn connect_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!(":memory:: {e}")))?;
        Ok(Self { conn: Some(conn) })
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    #[cfg(test)]
    pub(crate) fn connection_for_tests(&self) -> &Connection {
        self.conn.as_ref().expect("store is open")
    }

    /// Create `auth_logs` and its indexes. Safe to call repeatedly.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn()?
            .execute_batch(SCHEMA)
            .map_err(StoreError::Schema)?;
        info!("auth_logs schema ready");
        Ok(())
    }

    /// Insert one record and return its surrogate id.
    pub fn insert(&mut self, record: &NewLogRecord) -> Result<i64, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;
        let tx = conn.transaction().map_err(StoreError::Insert)?;

        let outcome = tx.execute(
            "INSERT INTO auth_logs (timestamp, source_ip, username, encrypted_password, status, attempt_details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                encode_timestamp(&record.timestamp),
                record.source_ip,
                record.username,
                record.encrypted_credential.as_deref(),
                record.status.as_str(),
                record.detail.as_deref(),
            ],
        );

        match outcome {
            Ok(_) => {
                let id = tx.last_insert_rowid();
                tx.commit().map_err(StoreError::Insert)?;
                debug!(id, status = %record.status, "auth log inserted");
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback after failed insert also failed");
                }
                Err(StoreError::Insert(e))
            }
        }
    }

    pub fn get_by_id(&self, id: i64) -> Result<LogRecord, StoreError> {
        self.conn()?
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))
    }

    /// Newest first by attempt time; ties fall back to insertion order.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC LIMIT ?1"
        ))?;
        let records = stmt
            .query_map(params![clamp_limit(limit)], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn list_by_username(
        &self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<LogRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE username = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;
        let records = stmt
            .query_map(params![username, clamp_limit(limit)], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn count_by_status(&self, status: AttemptStatus) -> Result<u64, StoreError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM auth_logs WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn count_all(&self) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM auth_logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Source addresses with the most attempts, busiest first.
    pub fn top_source_ips(&self, limit: usize) -> Result<Vec<(String, u64)>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_ip, COUNT(*) AS attempts FROM auth_logs
             GROUP BY source_ip ORDER BY attempts DESC, source_ip ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![clamp_limit(limit)], |row| {
                let attempts: i64 = row.get(1)?;
                Ok((row.get(0)?, attempts as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Release the connection. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                warn!(error = %e, "error while closing database connection");
            } else {
                debug!("database connection closed");
            }
        }
    }
}

impl Drop for LogStore {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_timestamp(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row) -> rusqlite::Result<LogRecord> {
    let status_text: String = row.get(5)?;
    let status = status_text
        .parse::<AttemptStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(LogRecord {
        id: row.get(0)?,
        timestamp: decode_timestamp(row, 1)?,
        source_ip: row.get(2)?,
        username: row.get(3)?,
        encrypted_credential: row.get(4)?,
        status,
        detail: row.get(6)?,
        created_at: decode_timestamp(row, 7)?,
    })
}

fn clamp_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn store() -> LogStore {
        let store = LogStore::connect_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn sample(ts: DateTime<Utc>, ip: &str, user: &str, status: AttemptStatus) -> NewLogRecord {
        NewLogRecord::new(ts, ip, user, status)
            .with_credential(Some(b"password123".to_vec()))
            .with_detail(format!("SSH login attempt from {ip}"))
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let store = store();
        store.ensure_schema().unwrap();
        store.ensure_schema().unwrap();

        let conn = store.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'auth_logs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);

        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'auth_logs'
                 AND name LIKE 'idx_%' ORDER BY name",
            )
            .unwrap();
        let indexes: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(indexes, vec!["idx_source_ip", "idx_status", "idx_timestamp"]);
    }

    #[test]
    fn inserted_record_reads_back_unchanged() {
        let mut store = store();
        let record = NewLogRecord::new(Utc::now(), "192.168.1.100", "test_user", AttemptStatus::Failed)
            .with_credential(Some(b"test_password123".to_vec()))
            .with_detail("Test authentication attempt");

        let id = store.insert(&record).unwrap();
        let fetched = store.get_by_id(id).unwrap();

        assert_eq!(fetched.id, id);
        assert_eq!(fetched.username, "test_user");
        assert_eq!(fetched.status, AttemptStatus::Failed);
        assert_eq!(fetched.source_ip, "192.168.1.100");
        assert_eq!(fetched.to_new_record(), record);
        assert!(fetched.created_at <= Utc::now() + Duration::seconds(1));
    }

    #[test]
    fn null_credential_and_detail_survive() {
        let mut store = store();
        let record = NewLogRecord::new(Utc::now(), "10.1.2.3", "ubuntu", AttemptStatus::Success);
        let id = store.insert(&record).unwrap();
        let fetched = store.get_by_id(id).unwrap();
        assert_eq!(fetched.encrypted_credential, None);
        assert_eq!(fetched.detail, None);
    }

    #[test]
    fn ids_increase_monotonically() {
        let mut store = store();
        let now = Utc::now();
        let a = store.insert(&sample(now, "1.1.1.1", "root", AttemptStatus::Success)).unwrap();
        let b = store.insert(&sample(now, "1.1.1.2", "root", AttemptStatus::Success)).unwrap();
        let c = store.insert(&sample(now, "1.1.1.3", "root", AttemptStatus::Failed)).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn missing_id_is_not_found() {
        let store = store();
        assert!(matches!(store.get_by_id(999), Err(StoreError::NotFound(999))));
    }

    #[test]
    fn list_recent_orders_by_timestamp_descending() {
        let mut store = store();
        let base = Utc::now();
        // Inserted out of order on purpose.
        for offset in [5, 1, 9, 3, 7, 2] {
            let ts = base - Duration::minutes(offset);
            store
                .insert(&sample(ts, "172.16.0.1", "admin", AttemptStatus::Success))
                .unwrap();
        }

        let recent = store.list_recent(4).unwrap();
        assert_eq!(recent.len(), 4);
        for pair in recent.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        assert_eq!(recent[0].timestamp, base - Duration::minutes(1));

        assert_eq!(store.list_recent(100).unwrap().len(), 6);
        assert!(store.list_recent(0).unwrap().is_empty());
    }

    #[test]
    fn counts_split_by_status() {
        let mut store = store();
        let now = Utc::now();
        for i in 0..7 {
            let status = if i % 3 == 0 {
                AttemptStatus::Failed
            } else {
                AttemptStatus::Success
            };
            store.insert(&sample(now, "8.8.8.8", "jenkins", status)).unwrap();
        }
        assert_eq!(store.count_by_status(AttemptStatus::Failed).unwrap(), 3);
        assert_eq!(store.count_by_status(AttemptStatus::Success).unwrap(), 4);
        assert_eq!(store.count_all().unwrap(), 7);
    }

    #[test]
    fn top_source_ips_ranks_busiest_first() {
        let mut store = store();
        let now = Utc::now();
        for ip in ["5.5.5.5", "6.6.6.6", "5.5.5.5", "7.7.7.7", "5.5.5.5", "6.6.6.6"] {
            store.insert(&sample(now, ip, "user", AttemptStatus::Failed)).unwrap();
        }
        let top = store.top_source_ips(2).unwrap();
        assert_eq!(
            top,
            vec![("5.5.5.5".to_string(), 3), ("6.6.6.6".to_string(), 2)]
        );
    }

    #[test]
    fn list_by_username_filters() {
        let mut store = store();
        let now = Utc::now();
        store.insert(&sample(now, "9.9.9.9", "root", AttemptStatus::Success)).unwrap();
        store.insert(&sample(now, "9.9.9.9", "admin", AttemptStatus::Success)).unwrap();
        store.insert(&sample(now, "9.9.9.9", "root", AttemptStatus::Failed)).unwrap();

        let roots = store.list_by_username("root", 10).unwrap();
        assert_eq!(roots.len(), 2);
        assert!(roots.iter().all(|r| r.username == "root"));
    }

    #[test]
    fn conflicting_table_fails_schema_setup() {
        let store = LogStore::connect_in_memory().unwrap();
        store
            .conn()
            .unwrap()
            .execute_batch("CREATE TABLE auth_logs (id INTEGER PRIMARY KEY);")
            .unwrap();

        let err = store.ensure_schema().unwrap_err();
        assert!(matches!(err, StoreError::Schema(_)), "{err}");
    }

    #[test]
    fn rejected_insert_is_rolled_back() {
        let mut store = store();
        store
            .conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_blocked BEFORE INSERT ON auth_logs
                 WHEN NEW.username = 'blocked'
                 BEGIN SELECT RAISE(ABORT, 'blocked user'); END;",
            )
            .unwrap();

        let now = Utc::now();
        let err = store
            .insert(&sample(now, "3.3.3.3", "blocked", AttemptStatus::Failed))
            .unwrap_err();
        assert!(matches!(err, StoreError::Insert(_)));

        // The connection is still usable and nothing was left behind.
        store.insert(&sample(now, "3.3.3.3", "admin", AttemptStatus::Failed)).unwrap();
        assert_eq!(store.count_all().unwrap(), 1);
    }

    #[test]
    fn closed_store_refuses_operations() {
        let mut store = store();
        store.close();
        store.close();
        assert!(!store.is_open());
        assert!(matches!(store.count_all(), Err(StoreError::Closed)));
        let record = sample(Utc::now(), "4.4.4.4", "root", AttemptStatus::Success);
        assert!(matches!(store.insert(&record), Err(StoreError::Closed)));
    }

    #[test]
    fn file_database_persists_across_connections() {
        let dir = tempdir().unwrap();
        let config = DatabaseConfig::new(dir.path().join("data").join("ssh_logs.db"));

        let id = {
            let mut store = LogStore::connect(&config).unwrap();
            store.ensure_schema().unwrap();
            store
                .insert(&sample(Utc::now(), "192.0.2.1", "system", AttemptStatus::Success))
                .unwrap()
        };

        let store = LogStore::connect(&config).unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(store.get_by_id(id).unwrap().username, "system");
    }

    #[test]
    fn non_database_file_fails_to_connect() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not-a.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let result = LogStore::connect(&DatabaseConfig::new(&path));
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }
}
