//! Per-connection statement cache.
//!
//! The cache is lazily populated the first time a named query runs on a
//! connection and tracks per-statement use counts plus hit/miss totals.
//! libsql's `Statement` is neither `Clone` nor `Send`, so what is cached
//! is the catalog resolution and its statistics; the prepared statement
//! itself lives in SQLite's own cache. Each cache belongs to exactly one
//! connection and is only touched by the connection's current holder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::queries::QueryId;

#[derive(Debug, Default)]
struct StmtMeta {
    uses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StmtCache {
    entries: Mutex<HashMap<QueryId, StmtMeta>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StmtCache {
    /// Resolve a named query to its SQL, populating the cache entry on
    /// first use.
    pub(crate) fn sql_for(&self, qid: QueryId) -> &'static str {
        let mut entries = self.entries.lock();

        match entries.get_mut(&qid) {
            Some(meta) => {
                meta.uses += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                trace!(query = %qid, "Prepare query");
                entries.insert(qid, StmtMeta { uses: 1 });
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        qid.sql()
    }

    /// Number of distinct named queries this connection has run.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
