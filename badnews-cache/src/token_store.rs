//! Persistent class/token frequency tables for the Bayesian models.
//!
//! One store per language, living in its own directory
//! (`judge/{de,en}/`, `advisor/{de,en}/`). The tables hold per-class
//! document counts, per-class token totals, per-(class, token) counts and
//! a global vocabulary, which is everything a multinomial scorer needs.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use badnews_core::{Error, Result};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use tokio::task::spawn_blocking;
use tracing::{debug, info};

/// class name -> number of learned documents
const CLASSES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("classes");
/// class name -> total token occurrences learned for the class
const TOTALS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("class_totals");
/// "class US token" -> occurrences of the token within the class
const TOKENS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("tokens");
/// token -> occurrences across all classes; the table size is the
/// vocabulary size used for smoothing
const VOCAB_TABLE: TableDefinition<&str, u64> = TableDefinition::new("vocabulary");

/// The name of the database file inside a store directory.
const STORE_FILE: &str = "tokens.redb";

/// ASCII unit separator, cannot occur in tokens after tokenization.
const SEP: char = '\u{1f}';

fn token_key(class: &str, token: &str) -> String {
    format!("{class}{SEP}{token}")
}

fn store_err(msg: impl std::fmt::Display) -> Error {
    Error::Model(msg.to_string())
}

/// Per-class counts relevant to one scoring request.
#[derive(Debug, Clone)]
pub struct ClassTokenStats {
    pub class: String,
    pub docs: u64,
    pub total_tokens: u64,
    /// Occurrence counts parallel to the queried token list.
    pub token_counts: Vec<u64>,
}

/// Everything a scorer needs for one document, gathered in a single read
/// transaction.
#[derive(Debug, Clone, Default)]
pub struct CorpusStats {
    pub classes: Vec<ClassTokenStats>,
    pub total_docs: u64,
    pub vocab_size: u64,
}

/// A redb-backed token frequency store.
pub struct TokenStore {
    db: Arc<Database>,
}

impl TokenStore {
    /// Open (or create) the store inside the given directory.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(STORE_FILE);

        let db = spawn_blocking(move || -> Result<Database> {
            fs::create_dir_all(&dir)?;
            let db = Database::create(&path)
                .map_err(|e| store_err(format!("Failed to open token store at {}: {e}", path.display())))?;

            let txn = db
                .begin_write()
                .map_err(|e| store_err(format!("Failed to begin write transaction: {e}")))?;
            txn.open_table(CLASSES_TABLE)
                .and(txn.open_table(TOTALS_TABLE))
                .and(txn.open_table(TOKENS_TABLE))
                .and(txn.open_table(VOCAB_TABLE))
                .map_err(|e| store_err(format!("Failed to create tables: {e}")))?;
            txn.commit()
                .map_err(|e| store_err(format!("Failed to commit transaction: {e}")))?;

            Ok(db)
        })
        .await
        .map_err(|e| store_err(format!("Task join error: {e}")))??;

        info!("Token store is open");
        Ok(Self { db: Arc::new(db) })
    }

    /// Record one document's tokens under a class.
    pub async fn learn(&self, class: &str, tokens: Vec<String>) -> Result<()> {
        let db = Arc::clone(&self.db);
        let class = class.to_string();

        spawn_blocking(move || -> Result<()> {
            let txn = db
                .begin_write()
                .map_err(|e| store_err(format!("Failed to begin write transaction: {e}")))?;
            {
                let mut classes = txn
                    .open_table(CLASSES_TABLE)
                    .map_err(|e| store_err(format!("Failed to open classes table: {e}")))?;
                bump(&mut classes, &class, 1)?;

                let mut totals = txn
                    .open_table(TOTALS_TABLE)
                    .map_err(|e| store_err(format!("Failed to open totals table: {e}")))?;
                bump(&mut totals, &class, tokens.len() as u64)?;

                let mut counts = txn
                    .open_table(TOKENS_TABLE)
                    .map_err(|e| store_err(format!("Failed to open tokens table: {e}")))?;
                let mut vocab = txn
                    .open_table(VOCAB_TABLE)
                    .map_err(|e| store_err(format!("Failed to open vocabulary table: {e}")))?;

                for token in &tokens {
                    bump(&mut counts, &token_key(&class, token), 1)?;
                    bump(&mut vocab, token, 1)?;
                }
            }
            txn.commit()
                .map_err(|e| store_err(format!("Failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| store_err(format!("Task join error: {e}")))?
    }

    /// Remove one document's tokens from a class; the exact inverse of
    /// [`TokenStore::learn`] for the same input.
    pub async fn forget(&self, class: &str, tokens: Vec<String>) -> Result<()> {
        let db = Arc::clone(&self.db);
        let class = class.to_string();

        spawn_blocking(move || -> Result<()> {
            let txn = db
                .begin_write()
                .map_err(|e| store_err(format!("Failed to begin write transaction: {e}")))?;
            {
                let mut classes = txn
                    .open_table(CLASSES_TABLE)
                    .map_err(|e| store_err(format!("Failed to open classes table: {e}")))?;
                drop_count(&mut classes, &class, 1)?;

                let mut counts = txn
                    .open_table(TOKENS_TABLE)
                    .map_err(|e| store_err(format!("Failed to open tokens table: {e}")))?;
                let mut vocab = txn
                    .open_table(VOCAB_TABLE)
                    .map_err(|e| store_err(format!("Failed to open vocabulary table: {e}")))?;

                let mut removed = 0u64;
                for token in &tokens {
                    if drop_count(&mut counts, &token_key(&class, token), 1)? {
                        removed += 1;
                        drop_count(&mut vocab, token, 1)?;
                    }
                }

                let mut totals = txn
                    .open_table(TOTALS_TABLE)
                    .map_err(|e| store_err(format!("Failed to open totals table: {e}")))?;
                drop_count(&mut totals, &class, removed)?;
            }
            txn.commit()
                .map_err(|e| store_err(format!("Failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| store_err(format!("Task join error: {e}")))?
    }

    /// Gather the counts a scorer needs for the given token list.
    pub async fn corpus_stats(&self, tokens: Vec<String>) -> Result<CorpusStats> {
        let db = Arc::clone(&self.db);

        spawn_blocking(move || -> Result<CorpusStats> {
            let txn = db
                .begin_read()
                .map_err(|e| store_err(format!("Failed to begin read transaction: {e}")))?;
            let classes = txn
                .open_table(CLASSES_TABLE)
                .map_err(|e| store_err(format!("Failed to open classes table: {e}")))?;
            let totals = txn
                .open_table(TOTALS_TABLE)
                .map_err(|e| store_err(format!("Failed to open totals table: {e}")))?;
            let counts = txn
                .open_table(TOKENS_TABLE)
                .map_err(|e| store_err(format!("Failed to open tokens table: {e}")))?;
            let vocab = txn
                .open_table(VOCAB_TABLE)
                .map_err(|e| store_err(format!("Failed to open vocabulary table: {e}")))?;

            let mut stats = CorpusStats {
                vocab_size: vocab
                    .len()
                    .map_err(|e| store_err(format!("Failed to size vocabulary: {e}")))?,
                ..CorpusStats::default()
            };

            for row in classes
                .iter()
                .map_err(|e| store_err(format!("Failed to iterate classes: {e}")))?
            {
                let (key, docs) =
                    row.map_err(|e| store_err(format!("Failed to read class row: {e}")))?;
                let class = key.value().to_string();
                let docs = docs.value();

                if docs == 0 {
                    continue;
                }

                let total_tokens = totals
                    .get(class.as_str())
                    .map_err(|e| store_err(format!("Failed to read totals: {e}")))?
                    .map_or(0, |g| g.value());

                let mut token_counts = Vec::with_capacity(tokens.len());
                for token in &tokens {
                    let cnt = counts
                        .get(token_key(&class, token).as_str())
                        .map_err(|e| store_err(format!("Failed to read token count: {e}")))?
                        .map_or(0, |g| g.value());
                    token_counts.push(cnt);
                }

                stats.total_docs += docs;
                stats.classes.push(ClassTokenStats {
                    class,
                    docs,
                    total_tokens,
                    token_counts,
                });
            }

            Ok(stats)
        })
        .await
        .map_err(|e| store_err(format!("Task join error: {e}")))?
    }

    /// Discard all learned state.
    pub async fn reset(&self) -> Result<()> {
        let db = Arc::clone(&self.db);

        spawn_blocking(move || -> Result<()> {
            let txn = db
                .begin_write()
                .map_err(|e| store_err(format!("Failed to begin write transaction: {e}")))?;

            for name in ["classes", "class_totals", "tokens", "vocabulary"] {
                debug!(table = name, "Dropping token store table");
            }
            txn.delete_table(CLASSES_TABLE)
                .and(txn.delete_table(TOTALS_TABLE))
                .and(txn.delete_table(TOKENS_TABLE))
                .and(txn.delete_table(VOCAB_TABLE))
                .map_err(|e| store_err(format!("Failed to drop tables: {e}")))?;

            txn.open_table(CLASSES_TABLE)
                .and(txn.open_table(TOTALS_TABLE))
                .and(txn.open_table(TOKENS_TABLE))
                .and(txn.open_table(VOCAB_TABLE))
                .map_err(|e| store_err(format!("Failed to recreate tables: {e}")))?;

            txn.commit()
                .map_err(|e| store_err(format!("Failed to commit transaction: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| store_err(format!("Task join error: {e}")))?
    }
}

/// Increment a counter row, creating it if absent.
fn bump(table: &mut redb::Table<'_, &str, u64>, key: &str, by: u64) -> Result<()> {
    let current = table
        .get(key)
        .map_err(|e| store_err(format!("Failed to read {key}: {e}")))?
        .map_or(0, |g| g.value());
    table
        .insert(key, current + by)
        .map_err(|e| store_err(format!("Failed to write {key}: {e}")))?;
    Ok(())
}

/// Decrement a counter row, removing it when it reaches zero. Returns
/// whether anything was decremented.
fn drop_count(table: &mut redb::Table<'_, &str, u64>, key: &str, by: u64) -> Result<bool> {
    let current = table
        .get(key)
        .map_err(|e| store_err(format!("Failed to read {key}: {e}")))?
        .map_or(0, |g| g.value());

    if current == 0 || by == 0 {
        return Ok(false);
    }

    let next = current.saturating_sub(by);
    if next == 0 {
        table
            .remove(key)
            .map_err(|e| store_err(format!("Failed to remove {key}: {e}")))?;
    } else {
        table
            .insert(key, next)
            .map_err(|e| store_err(format!("Failed to write {key}: {e}")))?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[tokio::test]
    async fn learn_accumulates_counts() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = TokenStore::open(dir.path()).await.expect("open");

        store
            .learn("interesting", toks(&["rust", "release", "rust"]))
            .await
            .expect("learn");
        store
            .learn("boring", toks(&["celebrity", "gossip"]))
            .await
            .expect("learn");

        let stats = store
            .corpus_stats(toks(&["rust", "gossip"]))
            .await
            .expect("stats");

        assert_eq!(stats.total_docs, 2);
        assert_eq!(stats.vocab_size, 4);
        assert_eq!(stats.classes.len(), 2);

        let interesting = stats
            .classes
            .iter()
            .find(|c| c.class == "interesting")
            .expect("interesting class");
        assert_eq!(interesting.docs, 1);
        assert_eq!(interesting.total_tokens, 3);
        assert_eq!(interesting.token_counts, vec![2, 0]);

        let boring = stats
            .classes
            .iter()
            .find(|c| c.class == "boring")
            .expect("boring class");
        assert_eq!(boring.token_counts, vec![0, 1]);
    }

    #[tokio::test]
    async fn forget_is_the_inverse_of_learn() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = TokenStore::open(dir.path()).await.expect("open");

        let doc = toks(&["ocean", "coral", "ocean"]);
        store.learn("interesting", doc.clone()).await.expect("learn");
        store.learn("interesting", toks(&["volcano"])).await.expect("learn");

        store.forget("interesting", doc).await.expect("forget");

        let stats = store
            .corpus_stats(toks(&["ocean", "coral", "volcano"]))
            .await
            .expect("stats");

        assert_eq!(stats.total_docs, 1);
        let c = &stats.classes[0];
        assert_eq!(c.docs, 1);
        assert_eq!(c.total_tokens, 1);
        assert_eq!(c.token_counts, vec![0, 0, 1]);
        assert_eq!(stats.vocab_size, 1);
    }

    #[tokio::test]
    async fn forgetting_below_zero_saturates() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = TokenStore::open(dir.path()).await.expect("open");

        store.learn("boring", toks(&["x"])).await.expect("learn");
        store.forget("boring", toks(&["x", "y"])).await.expect("forget");
        store.forget("boring", toks(&["x"])).await.expect("forget again");

        let stats = store.corpus_stats(toks(&["x"])).await.expect("stats");
        assert!(stats.classes.is_empty());
        assert_eq!(stats.vocab_size, 0);
    }

    #[tokio::test]
    async fn reset_discards_everything() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = TokenStore::open(dir.path()).await.expect("open");

        store
            .learn("interesting", toks(&["rust", "release"]))
            .await
            .expect("learn");
        store.reset().await.expect("reset");

        let stats = store.corpus_stats(toks(&["rust"])).await.expect("stats");
        assert_eq!(stats.total_docs, 0);
        assert!(stats.classes.is_empty());
        assert_eq!(stats.vocab_size, 0);

        // The store stays usable after a reset.
        store.learn("boring", toks(&["gossip"])).await.expect("learn");
        let stats = store.corpus_stats(toks(&["gossip"])).await.expect("stats");
        assert_eq!(stats.total_docs, 1);
    }
}
