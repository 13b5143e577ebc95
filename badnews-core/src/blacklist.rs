//! A ranked filter of regular expressions applied to items on read paths.
//!
//! Patterns count their hits; sorting moves the busiest patterns to the
//! front so `match_item` short-circuits early on typical input. The list
//! is persisted as a JSON snapshot and restored on startup.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde::de::Error as _;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::Item;

/// A single blacklist entry: the compiled expression plus a counter of how
/// many items it has matched. The counter drives the sort order.
#[derive(Debug)]
pub struct Pattern {
    pub id: i64,
    regex: Regex,
    cnt: AtomicU64,
}

impl Pattern {
    pub fn new(id: i64, pattern: &str) -> Result<Self> {
        match Regex::new(pattern) {
            Ok(regex) => Ok(Self {
                id,
                regex,
                cnt: AtomicU64::new(0),
            }),
            Err(e) => Err(Error::BadPattern(e.to_string())),
        }
    }

    /// Check the pattern against the item's plain text, bumping the hit
    /// counter on a match.
    pub fn matches(&self, item: &Item) -> bool {
        if self.regex.is_match(item.plaintext()) {
            self.cnt.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u64 {
        self.cnt.load(Ordering::Relaxed)
    }

    /// The source text of the regular expression.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Clone for Pattern {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            regex: self.regex.clone(),
            cnt: AtomicU64::new(self.count()),
        }
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Pattern", 3)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("pattern", self.regex.as_str())?;
        s.serialize_field("cnt", &self.count())?;
        s.end()
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            id: i64,
            pattern: String,
            cnt: u64,
        }

        let raw = Raw::deserialize(deserializer)?;
        let regex = Regex::new(&raw.pattern).map_err(D::Error::custom)?;

        Ok(Self {
            id: raw.id,
            regex,
            cnt: AtomicU64::new(raw.cnt),
        })
    }
}

/// The JSON shape of the on-disk snapshot.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    #[serde(rename = "List")]
    list: Vec<Pattern>,
}

/// An ordered collection of [`Pattern`]s.
#[derive(Debug, Default)]
pub struct Blacklist {
    list: RwLock<Vec<Pattern>>,
    changed: AtomicBool,
}

static INSTANCE: Mutex<Option<Arc<Blacklist>>> = Mutex::new(None);

impl Blacklist {
    /// Restore the process-wide blacklist from a JSON snapshot. The first
    /// call loads the file (an absent file yields an empty list) and
    /// caches the instance; later calls return the cached one.
    pub fn new_from_file<P: AsRef<Path>>(path: P) -> Result<Arc<Blacklist>> {
        let mut guard = INSTANCE.lock();

        if let Some(bl) = guard.as_ref() {
            debug!("Using existing blacklist instance");
            return Ok(Arc::clone(bl));
        }

        let bl = Arc::new(Self::load(path.as_ref())?);
        *guard = Some(Arc::clone(&bl));
        Ok(bl)
    }

    /// Load a snapshot without touching the process-wide instance.
    pub fn load(path: &Path) -> Result<Blacklist> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No blacklist snapshot, starting empty");
                return Ok(Blacklist::default());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        info!(
            path = %path.display(),
            patterns = snapshot.list.len(),
            "Restored blacklist"
        );

        Ok(Blacklist {
            list: RwLock::new(snapshot.list),
            changed: AtomicBool::new(false),
        })
    }

    /// True if the contents have changed since creation or the last dump.
    pub fn changed(&self) -> bool {
        self.changed.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.list.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.read().is_empty()
    }

    /// Append a pattern.
    pub fn add(&self, p: Pattern) {
        let mut list = self.list.write();
        list.push(p);
        self.changed.store(true, Ordering::Relaxed);
    }

    /// Compile the given text and append it as a new pattern.
    pub fn add_str(&self, pattern: &str) -> Result<()> {
        if pattern.is_empty() {
            return Err(Error::InvalidValue("empty blacklist pattern".into()));
        }

        let mut list = self.list.write();
        let id = list.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let p = Pattern::new(id, pattern)?;
        list.push(p);
        self.changed.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Check the item against the list, stopping at the first match.
    pub fn match_item(&self, item: &Item) -> bool {
        let list = self.list.read();

        for p in list.iter() {
            if p.matches(item) {
                debug!(
                    pattern = p.as_str(),
                    headline = item.headline,
                    "Blacklist pattern matched"
                );
                self.changed.store(true, Ordering::Relaxed);
                return true;
            }
        }

        false
    }

    /// Reorder patterns so that higher match counts come first.
    pub fn sort(&self) {
        debug!("Sorting blacklist");
        let mut list = self.list.write();
        list.sort_by(|a, b| b.count().cmp(&a.count()));
    }

    /// Sort, serialize to JSON and write the snapshot, clearing the
    /// change flag on success.
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.sort();

        let list = self.list.read();
        info!(path = %path.as_ref().display(), "Dumping blacklist");

        let snapshot = Snapshot { list: list.clone() };
        let data = serde_json::to_vec(&snapshot)?;
        fs::write(path, data)?;

        self.changed.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// A snapshot of the current patterns, in list order.
    pub fn patterns(&self) -> Vec<Pattern> {
        self.list.read().clone()
    }
}
