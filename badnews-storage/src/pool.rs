//! A bounded pool of database connections.
//!
//! All connections are opened eagerly at creation. A connection is owned
//! exclusively by its borrower between `get` and `put`; `put` wakes one
//! waiter, and a connection handed back with a transaction still open is
//! rolled back first.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use badnews_core::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::store::Store;

pub struct Pool {
    path: PathBuf,
    queue: Mutex<VecDeque<Store>>,
    empty: Notify,
    size: usize,
}

impl Pool {
    /// Create a pool of `cnt` connections to the database at `path`.
    pub async fn new<P: AsRef<Path>>(path: P, cnt: usize) -> Result<Pool> {
        if cnt < 1 {
            return Err(Error::InvalidValue(format!(
                "pool size must be positive, got {cnt}"
            )));
        }

        let path = path.as_ref().to_path_buf();
        let mut queue = VecDeque::with_capacity(cnt);

        for _ in 0..cnt {
            queue.push_back(Store::open(&path).await?);
        }

        info!(path = %path.display(), size = cnt, "Created connection pool");

        Ok(Pool {
            path,
            queue: Mutex::new(queue),
            empty: Notify::new(),
            size: cnt,
        })
    }

    /// The configured pool size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of connections currently queued (not borrowed).
    pub fn available(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if every connection is currently borrowed.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Borrow a connection, waiting until one is returned if the pool is
    /// empty.
    pub async fn get(&self) -> Store {
        loop {
            // Register for a wakeup before checking, so a `put` racing
            // with the check is not lost.
            let notified = self.empty.notified();

            {
                let mut queue = self.queue.lock();
                debug!(available = queue.len(), "Pool get");
                if let Some(store) = queue.pop_front() {
                    return store;
                }
            }

            notified.await;
        }
    }

    /// Borrow a connection; if the pool is empty, open an extra one
    /// instead of waiting.
    pub async fn get_nowait(&self) -> Result<Store> {
        {
            let mut queue = self.queue.lock();
            debug!(available = queue.len(), "Pool get_nowait");
            if let Some(store) = queue.pop_front() {
                return Ok(store);
            }
        }

        Store::open(&self.path).await.map_err(|e| {
            error!(error = %e, "Error opening extra database connection");
            e
        })
    }

    /// Return a connection. A transaction left open on it is rolled
    /// back; one waiter is woken.
    pub async fn put(&self, mut store: Store) {
        if store.has_transaction() {
            info!("Store has a pending transaction, rolling back");
            if let Err(e) = store.rollback().await {
                error!(error = %e, "Cannot roll back transaction");
            }
        }

        {
            let mut queue = self.queue.lock();
            queue.push_back(store);
            debug!(available = queue.len(), "Pool put");
        }

        self.empty.notify_one();
    }

    /// Drop every queued connection. Borrowed connections are unaffected.
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        queue.clear();
    }
}
