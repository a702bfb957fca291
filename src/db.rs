//! SQLite handle shared by the event store and the daily report store
//!
//! One connection behind a mutex. Every write the ledger performs is a
//! single-row upsert or a short transaction.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use crate::sqlite_pragma::apply_optimized_pragmas;

/// Ordered, idempotent schema migrations (all use IF NOT EXISTS).
const MIGRATIONS: &[(&str, &str)] = &[
    ("00_notifications.sql", include_str!("../sql/00_notifications.sql")),
    ("01_notification_cursors.sql", include_str!("../sql/01_notification_cursors.sql")),
    ("02_reports_daily.sql", include_str!("../sql/02_reports_daily.sql")),
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration {name} failed: {source}")]
    Migration {
        name: &'static str,
        source: rusqlite::Error,
    },

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file, apply PRAGMAs and run migrations.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn)?;
        run_schema_migrations(&mut conn)?;

        log::info!("✅ SQLite database ready: {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

/// Run the embedded schema migrations in order.
pub fn run_schema_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    log::debug!("🔧 Running {} schema migrations", MIGRATIONS.len());

    for &(name, sql) in MIGRATIONS {
        conn.execute_batch(sql)
            .map_err(|source| StoreError::Migration { name, source })?;
        log::debug!("   ├─ applied {}", name);
    }

    Ok(())
}
