//! Key-value cache with per-entry expiry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use badnews_core::{Error, Result};
use chrono::Utc;
use redb::{Database, ReadableDatabase, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// The name of the database file inside a cache directory.
const CACHE_FILE: &str = "cache.redb";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    value: String,
    /// Absolute expiry as Unix seconds.
    expires_at: i64,
}

/// An embedded cache mapping string keys to string values with a
/// time-to-live. Entries past their expiry read as absent and are removed
/// lazily on the next lookup.
pub struct ResultCache {
    db: Arc<Database>,
}

impl ResultCache {
    /// Open (or create) the cache database inside the given directory.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(CACHE_FILE);

        let db = tokio::task::spawn_blocking(move || -> Result<Database> {
            fs::create_dir_all(&dir)?;
            let db = Database::create(&path)
                .map_err(|e| Error::Cache(format!("Failed to open cache at {}: {e}", path.display())))?;

            // Make sure the table exists so reads never fail on a fresh file.
            let txn = db
                .begin_write()
                .map_err(|e| Error::Cache(format!("Failed to begin write transaction: {e}")))?;
            txn.open_table(ENTRIES_TABLE)
                .map_err(|e| Error::Cache(format!("Failed to open entries table: {e}")))?;
            txn.commit()
                .map_err(|e| Error::Cache(format!("Failed to commit transaction: {e}")))?;

            Ok(db)
        })
        .await
        .map_err(|e| Error::Cache(format!("Task join error: {e}")))??;

        info!("Result cache is open");
        Ok(Self { db: Arc::new(db) })
    }

    /// Delete the cache database file inside the given directory, if any.
    /// Used by the `--flush` startup flag before the cache is opened.
    pub fn flush<P: AsRef<Path>>(dir: P) -> io::Result<()> {
        let path: PathBuf = dir.as_ref().join(CACHE_FILE);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "Flushed result cache");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Look up a key. Returns the value and the remaining lifetime, or
    /// `None` for missing and expired entries.
    pub async fn lookup(&self, key: &str) -> Result<Option<(String, Duration)>> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<Option<(String, Duration)>> {
            let now = Utc::now().timestamp();

            let entry = {
                let txn = db
                    .begin_read()
                    .map_err(|e| Error::Cache(format!("Failed to begin read transaction: {e}")))?;
                let table = txn
                    .open_table(ENTRIES_TABLE)
                    .map_err(|e| Error::Cache(format!("Failed to open entries table: {e}")))?;

                match table
                    .get(key.as_str())
                    .map_err(|e| Error::Cache(format!("Failed to look up {key}: {e}")))?
                {
                    Some(guard) => Some(
                        postcard::from_bytes::<CacheEntry>(guard.value())
                            .map_err(|e| Error::Cache(format!("Corrupt cache entry {key}: {e}")))?,
                    ),
                    None => None,
                }
            };

            match entry {
                None => Ok(None),
                Some(entry) if entry.expires_at <= now => {
                    debug!(key, "Cache entry expired, removing");
                    remove_entry(&db, &key)?;
                    Ok(None)
                }
                Some(entry) => {
                    let remaining = Duration::from_secs((entry.expires_at - now) as u64);
                    Ok(Some((entry.value, remaining)))
                }
            }
        })
        .await
        .map_err(|e| Error::Cache(format!("Task join error: {e}")))?
    }

    /// Store a value under a key for the given lifetime, replacing any
    /// previous entry.
    pub async fn install(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        let entry = CacheEntry {
            value: value.to_string(),
            expires_at: Utc::now().timestamp() + ttl.as_secs() as i64,
        };
        let bytes = postcard::to_allocvec(&entry)
            .map_err(|e| Error::Cache(format!("Failed to serialize cache entry: {e}")))?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let txn = db
                .begin_write()
                .map_err(|e| Error::Cache(format!("Failed to begin write transaction: {e}")))?;
            {
                let mut table = txn
                    .open_table(ENTRIES_TABLE)
                    .map_err(|e| Error::Cache(format!("Failed to open entries table: {e}")))?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(|e| Error::Cache(format!("Failed to install {key}: {e}")))?;
            }
            txn.commit()
                .map_err(|e| Error::Cache(format!("Failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Cache(format!("Task join error: {e}")))?
    }

    /// Remove a key. Removing an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        tokio::task::spawn_blocking(move || remove_entry(&db, &key))
            .await
            .map_err(|e| Error::Cache(format!("Task join error: {e}")))?
    }
}

fn remove_entry(db: &Database, key: &str) -> Result<()> {
    let txn = db
        .begin_write()
        .map_err(|e| Error::Cache(format!("Failed to begin write transaction: {e}")))?;
    {
        let mut table = txn
            .open_table(ENTRIES_TABLE)
            .map_err(|e| Error::Cache(format!("Failed to open entries table: {e}")))?;
        table
            .remove(key)
            .map_err(|e| Error::Cache(format!("Failed to delete {key}: {e}")))?;
    }
    txn.commit()
        .map_err(|e| Error::Cache(format!("Failed to commit transaction: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_lookup_delete() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let cache = ResultCache::open(dir.path()).await.expect("open");

        assert!(cache.lookup("17").await.expect("lookup").is_none());

        cache
            .install("17", "interesting", Duration::from_secs(240 * 60))
            .await
            .expect("install");

        let (value, remaining) = cache
            .lookup("17")
            .await
            .expect("lookup")
            .expect("entry present");
        assert_eq!(value, "interesting");
        assert!(remaining <= Duration::from_secs(240 * 60));
        assert!(remaining > Duration::from_secs(230 * 60));

        cache.delete("17").await.expect("delete");
        assert!(cache.lookup("17").await.expect("lookup").is_none());

        // Deleting a missing key is fine.
        cache.delete("17").await.expect("delete absent");
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let cache = ResultCache::open(dir.path()).await.expect("open");

        cache
            .install("42", "boring", Duration::from_secs(0))
            .await
            .expect("install");

        assert!(cache.lookup("42").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn flush_removes_the_database_file() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        {
            let cache = ResultCache::open(dir.path()).await.expect("open");
            cache
                .install("1", "x", Duration::from_secs(60))
                .await
                .expect("install");
        }

        ResultCache::flush(dir.path()).expect("flush");
        assert!(!dir.path().join(CACHE_FILE).exists());

        // Flushing an already-empty directory is fine.
        ResultCache::flush(dir.path()).expect("flush again");

        let cache = ResultCache::open(dir.path()).await.expect("reopen");
        assert!(cache.lookup("1").await.expect("lookup").is_none());
    }
}
