//! The database connection wrapper and its transaction discipline.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use badnews_core::{Error, Result};
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Row, Rows, Value};
use tokio::time::sleep;
use tracing::{debug, error, info, trace};
use url::Url;

use crate::queries::QueryId;
use crate::schema::INIT_QUERIES;
use crate::stmt_cache::StmtCache;

/// Delay between attempts at an operation that failed with a transient
/// locked/busy error.
const RETRY_DELAY: Duration = Duration::from_millis(25);

static STORE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) async fn wait_for_retry() {
    sleep(RETRY_DELAY).await;
}

pub(crate) fn storage_err(e: libsql::Error) -> Error {
    Error::Storage(e.to_string())
}

/// One database connection plus the state that rides along with it: the
/// statement cache, the explicit-transaction flag and the savepoint name
/// table. A `Store` is owned by exactly one caller at a time (usually
/// borrowed from the [`crate::Pool`]).
pub struct Store {
    id: u64,
    _db: libsql::Database,
    conn: Connection,
    tx_active: bool,
    sp_counter: u32,
    sp_names: HashMap<String, String>,
    stmts: StmtCache,
}

impl Store {
    /// Open a database. A file that does not exist yet is created and
    /// initialized with the full schema; if initialization fails the
    /// half-created file is removed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        let existed = path.exists();

        let db = Builder::new_local(&path)
            .build()
            .await
            .map_err(|e| Error::Storage(format!("Failed to open {}: {e}", path.display())))?;
        let conn = db
            .connect()
            .map_err(|e| Error::Storage(format!("Failed to connect to {}: {e}", path.display())))?;

        let store = Store {
            id: STORE_ID.fetch_add(1, Ordering::Relaxed),
            _db: db,
            conn,
            tx_active: false,
            sp_counter: 1,
            sp_names: HashMap::new(),
            stmts: StmtCache::default(),
        };

        debug!(store = store.id, path = %path.display(), "Open database");

        for pragma in [
            "PRAGMA journal_mode = WAL",
            "PRAGMA foreign_keys = ON",
            "PRAGMA recursive_triggers = ON",
        ] {
            store.drain_query(pragma).await?;
        }

        if !existed {
            if let Err(e) = store.initialize().await {
                drop(store);
                if let Err(e2) = std::fs::remove_file(&path) {
                    error!(
                        path = %path.display(),
                        error = %e2,
                        "Failed to remove database file after botched init"
                    );
                }
                return Err(e);
            }
            info!(path = %path.display(), "Database has been initialized");
        }

        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        debug!(store = self.id, "Initialize fresh database");

        self.conn
            .execute("BEGIN", ())
            .await
            .map_err(storage_err)?;

        for q in INIT_QUERIES {
            trace!(query = q, "Execute init query");
            if let Err(e) = self.conn.execute(q, ()).await {
                error!(error = %e, query = q, "Cannot execute init query");
                if let Err(e2) = self.conn.execute("ROLLBACK", ()).await {
                    error!(error = %e2, "Cannot roll back init transaction");
                }
                return Err(storage_err(e));
            }
        }

        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Run a statement and discard whatever rows it produces. Some
    /// PRAGMAs report their setting as a result row.
    async fn drain_query(&self, sql: &str) -> Result<()> {
        let mut rows = self.conn.query(sql, ()).await.map_err(storage_err)?;
        while rows.next().await.map_err(storage_err)?.is_some() {}
        Ok(())
    }

    // ── Retrying execution ──────────────────────────────────────────

    pub(crate) async fn exec_sql(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        loop {
            match self
                .conn
                .execute(sql, libsql::params_from_iter(params.clone()))
                .await
            {
                Ok(n) => return Ok(n),
                Err(e) => {
                    let err = storage_err(e);
                    if err.is_transient() {
                        wait_for_retry().await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    pub(crate) async fn query_sql(&self, sql: &str, params: Vec<Value>) -> Result<Rows> {
        loop {
            match self
                .conn
                .query(sql, libsql::params_from_iter(params.clone()))
                .await
            {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    let err = storage_err(e);
                    if err.is_transient() {
                        wait_for_retry().await;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Execute a named query from the catalog.
    pub(crate) async fn exec(&self, qid: QueryId, params: Vec<Value>) -> Result<u64> {
        let sql = self.stmts.sql_for(qid);
        self.exec_sql(sql, params).await.map_err(|e| {
            error!(query = %qid, error = %e, "Query failed");
            e
        })
    }

    /// Run a named query from the catalog and return its rows.
    pub(crate) async fn query(&self, qid: QueryId, params: Vec<Value>) -> Result<Rows> {
        let sql = self.stmts.sql_for(qid);
        self.query_sql(sql, params).await.map_err(|e| {
            error!(query = %qid, error = %e, "Query failed");
            e
        })
    }

    /// Statement-cache statistics: (cached statements, hits, misses).
    pub fn stmt_cache_stats(&self) -> (usize, u64, u64) {
        (self.stmts.len(), self.stmts.hits(), self.stmts.misses())
    }

    // ── Transactions ────────────────────────────────────────────────

    /// True while an explicit transaction is open on this connection.
    pub fn has_transaction(&self) -> bool {
        self.tx_active
    }

    /// Begin an explicit transaction. Only one can be in progress at a
    /// time.
    pub async fn begin(&mut self) -> Result<()> {
        debug!(store = self.id, "Begin transaction");

        if self.tx_active {
            return Err(Error::TxInProgress);
        }

        self.exec_sql("BEGIN", Vec::new()).await?;
        self.tx_active = true;
        self.reset_sp_namespace();
        Ok(())
    }

    /// Commit the active transaction.
    pub async fn commit(&mut self) -> Result<()> {
        debug!(store = self.id, "Commit transaction");

        if !self.tx_active {
            return Err(Error::NoTxInProgress);
        }

        self.exec_sql("COMMIT", Vec::new()).await?;
        self.tx_active = false;
        self.reset_sp_namespace();
        Ok(())
    }

    /// Roll back the active transaction, undoing its changes.
    pub async fn rollback(&mut self) -> Result<()> {
        debug!(store = self.id, "Roll back transaction");

        if !self.tx_active {
            return Err(Error::NoTxInProgress);
        }

        self.exec_sql("ROLLBACK", Vec::new()).await?;
        self.tx_active = false;
        self.reset_sp_namespace();
        Ok(())
    }

    fn reset_sp_namespace(&mut self) {
        self.sp_counter = 1;
        self.sp_names.clear();
    }

    fn generate_sp_name(&mut self, name: &str) -> String {
        // The SAVEPOINT statement takes no placeholders, so user-chosen
        // names never reach the SQL text; they only key this table.
        let internal = format!("Savepoint{:05}", self.sp_counter);
        self.sp_counter += 1;
        self.sp_names.insert(name.to_string(), internal.clone());
        internal
    }

    /// Create a savepoint under a caller-chosen name. Savepoints exist
    /// only within a transaction; the surrounding transaction's end
    /// discards them all.
    pub async fn savepoint_create(&mut self, name: &str) -> Result<()> {
        debug!(store = self.id, name, "Create savepoint");

        if !self.tx_active {
            return Err(Error::NoTxInProgress);
        }

        let internal = self.generate_sp_name(name);
        self.exec_sql(&format!("SAVEPOINT {internal}"), Vec::new())
            .await?;
        Ok(())
    }

    /// Release the savepoint with the given name (and, per SQLite
    /// semantics, all savepoints created after it).
    pub async fn savepoint_release(&mut self, name: &str) -> Result<()> {
        debug!(store = self.id, name, "Release savepoint");

        if !self.tx_active {
            return Err(Error::NoTxInProgress);
        }

        let internal = match self.sp_names.get(name) {
            Some(internal) => internal.clone(),
            None => {
                error!(name, "Attempt to release unknown savepoint");
                return Err(Error::InvalidSavepoint(name.to_string()));
            }
        };

        self.exec_sql(&format!("RELEASE SAVEPOINT {internal}"), Vec::new())
            .await?;
        self.sp_names.remove(name);
        Ok(())
    }

    /// Roll the running transaction back to the given savepoint.
    pub async fn savepoint_rollback(&mut self, name: &str) -> Result<()> {
        debug!(store = self.id, name, "Roll back to savepoint");

        if !self.tx_active {
            return Err(Error::NoTxInProgress);
        }

        let internal = match self.sp_names.get(name) {
            Some(internal) => internal.clone(),
            None => return Err(Error::InvalidSavepoint(name.to_string())),
        };

        self.exec_sql(&format!("ROLLBACK TO SAVEPOINT {internal}"), Vec::new())
            .await?;
        self.sp_names.remove(name);
        Ok(())
    }

    // ── Ad-hoc transactions ─────────────────────────────────────────
    //
    // Every write operation either joins the caller's open transaction
    // or brackets itself in one of these.

    /// Returns true if an ad-hoc transaction was opened (i.e. no caller
    /// transaction was active).
    pub(crate) async fn adhoc_begin(&self) -> Result<bool> {
        if self.tx_active {
            return Ok(false);
        }
        self.exec_sql("BEGIN", Vec::new()).await?;
        Ok(true)
    }

    /// Finish an ad-hoc transaction opened by [`Store::adhoc_begin`].
    pub(crate) async fn adhoc_end(&self, adhoc: bool, ok: bool) {
        if !adhoc {
            return;
        }

        let sql = if ok { "COMMIT" } else { "ROLLBACK" };
        if let Err(e) = self.exec_sql(sql, Vec::new()).await {
            error!(store = self.id, error = %e, "Failed to finish ad-hoc transaction");
        }
    }

    // ── Maintenance ─────────────────────────────────────────────────

    /// Truncate the WAL, vacuum, reindex and analyze. Blocks most other
    /// access while running and cannot be called inside a transaction.
    pub async fn perform_maintenance(&self) -> Result<()> {
        if self.tx_active {
            return Err(Error::TxInProgress);
        }

        for q in [
            "PRAGMA wal_checkpoint(TRUNCATE)",
            "VACUUM",
            "REINDEX",
            "ANALYZE",
        ] {
            if let Err(e) = self.drain_query(q).await {
                error!(query = q, error = %e, "Maintenance statement failed");
            }
        }

        Ok(())
    }
}

// ── Row decoding helpers ────────────────────────────────────────────

pub(crate) fn decode_ts(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::InvalidValue(format!("timestamp {secs} out of range")))
}

pub(crate) fn decode_url(s: &str) -> Result<Url> {
    Url::parse(s).map_err(|e| Error::InvalidUrl(format!("{s}: {e}")))
}

pub(crate) fn col_i64(row: &Row, idx: i32) -> Result<i64> {
    row.get::<i64>(idx).map_err(storage_err)
}

pub(crate) fn col_text(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

pub(crate) fn col_opt_i64(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx).map_err(storage_err)? {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(i)),
        other => Err(Error::InvalidValue(format!(
            "expected integer or null in column {idx}, got {other:?}"
        ))),
    }
}

pub(crate) fn col_opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx).map_err(storage_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(Error::InvalidValue(format!(
            "expected text or null in column {idx}, got {other:?}"
        ))),
    }
}

pub(crate) fn bool_value(b: bool) -> Value {
    Value::Integer(i64::from(b))
}

pub(crate) fn ts_value(t: DateTime<Utc>) -> Value {
    Value::Integer(t.timestamp())
}

pub(crate) fn opt_i64_value(v: Option<i64>) -> Value {
    v.map_or(Value::Null, Value::Integer)
}

pub(crate) fn text_value(s: &str) -> Value {
    Value::Text(s.to_string())
}
