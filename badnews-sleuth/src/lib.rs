//! # badnews Sleuth
//!
//! Stored searches are treated like a batch queue: a feeder task hands
//! queries to a dispatcher one at a time, oldest first, and the
//! dispatcher marks them started, executes them, and persists the
//! outcome. Searches that were started but never finished (say, across a
//! restart) are re-enqueued first.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use badnews_core::{Error, Item, Paths, Result, Search};
use badnews_storage::{Pool, Store};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};

/// The tick of both the feeder and the dispatcher; bounds how quickly a
/// stop is observed and how often an idle feeder polls for work.
const PULSE: Duration = Duration::from_millis(2500);

/// Feeder and dispatcher share the pool, one connection each.
const POOL_SIZE: usize = 2;

pub struct Sleuth {
    pool: Pool,
    active: AtomicBool,
}

impl Sleuth {
    pub async fn create(paths: &Paths) -> Result<Sleuth> {
        let pool = Pool::new(paths.database(), POOL_SIZE).await.map_err(|e| {
            error!(error = %e, "Cannot open database pool");
            e
        })?;

        Ok(Sleuth {
            pool,
            active: AtomicBool::new(false),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// The dispatcher loop. Spawns the feeder, then waits for queries
    /// and executes them one at a time until stopped.
    pub async fn run(self: Arc<Self>) {
        self.active.store(true, Ordering::Relaxed);

        info!("Sleuth main loop starting up");

        let (tx, mut rx) = mpsc::channel::<Search>(1);
        {
            let sleuth = Arc::clone(&self);
            tokio::spawn(async move { sleuth.feeder(tx).await });
        }

        while self.is_active() {
            match timeout(PULSE, rx.recv()).await {
                Ok(Some(mut search)) => {
                    let db = self.pool.get().await;

                    if let Err(e) = db.search_start(&mut search).await {
                        error!(
                            search = search.title,
                            id = search.id,
                            error = %e,
                            "Failed to mark search as started"
                        );
                    } else if let Err(e) = self.execute(&db, &mut search).await {
                        error!(
                            search = search.title,
                            id = search.id,
                            error = %e,
                            "Failed to execute search"
                        );
                    }

                    self.pool.put(db).await;
                }
                Ok(None) => break,
                Err(_) => continue,
            }
        }

        self.active.store(false, Ordering::Relaxed);
        info!("Sleuth main loop finishing");
    }

    /// Enqueue every active (started, unfinished) search, then keep
    /// fetching the oldest pending one, sleeping when there is none.
    async fn feeder(self: Arc<Self>, tx: mpsc::Sender<Search>) {
        info!("Sleuth feeder loop starting up");

        let active = {
            let db = self.pool.get().await;
            let active = db.search_get_active().await;
            self.pool.put(db).await;
            active
        };

        match active {
            Ok(searches) => {
                for search in searches {
                    if tx.send(search).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to load active searches");
                return;
            }
        }

        while self.is_active() {
            let next = {
                let db = self.pool.get().await;
                let next = db.search_get_next_pending().await;
                self.pool.put(db).await;
                next
            };

            match next {
                Ok(Some(search)) => {
                    if tx.send(search).await.is_err() {
                        return;
                    }
                }
                Ok(None) => sleep(PULSE).await,
                Err(e) => {
                    error!(error = %e, "Failed to load pending searches");
                    return;
                }
            }
        }

        info!("Sleuth feeder loop quitting");
    }

    /// Run one search and persist its outcome: on success the finish
    /// timestamp, a true status and the result ids; on failure the
    /// finish timestamp, a false status and the error message.
    pub async fn execute(&self, db: &Store, s: &mut Search) -> Result<()> {
        match self.gather(db, s).await {
            Ok(mut items) => {
                items.sort_by(|a, b| {
                    b.timestamp
                        .cmp(&a.timestamp)
                        .then_with(|| a.id.cmp(&b.id))
                });

                let ids: Vec<i64> = items.iter().map(|i| i.id).collect();
                debug!(search = s.id, results = ids.len(), "Search succeeded");

                db.search_finish(s, true, "", &ids).await?;
                s.results = items;
                Ok(())
            }
            Err(e) => {
                db.search_finish(s, false, &e.to_string(), &[]).await?;
                Err(e)
            }
        }
    }

    /// Resolve the candidate set and apply the period and text filters.
    async fn gather(&self, db: &Store, s: &Search) -> Result<Vec<Item>> {
        let matcher = s.matcher()?;

        let mut candidates: Vec<Item> = if !s.tags.is_empty() {
            if s.tags_all {
                self.intersect_tags(db, s).await?
            } else {
                self.union_tags(db, s).await?
            }
        } else if let Some((begin, end)) = s.filter_period {
            db.item_get_by_period(begin, end).await?
        } else {
            // No tags, no period: stream every item through the matcher.
            let (tx, mut rx) = mpsc::channel(64);
            let scan = db.item_get_filtered(tx, |i| matcher.matches(i));
            let collect = async {
                let mut items = Vec::new();
                while let Some(item) = rx.recv().await {
                    items.push(item);
                }
                items
            };

            let (scan_res, items) = tokio::join!(scan, collect);
            scan_res?;
            return Ok(items);
        };

        if let Some((begin, end)) = s.filter_period {
            candidates.retain(|i| i.timestamp >= begin && i.timestamp <= end);
        }

        Ok(candidates
            .into_iter()
            .filter(|i| matcher.matches(i))
            .collect())
    }

    async fn load_tag(&self, db: &Store, tid: i64) -> Result<badnews_core::Tag> {
        match db.tag_get_by_id(tid).await? {
            Some(tag) => Ok(tag),
            None => Err(Error::InvalidValue(format!(
                "no tag with id {tid} was found in the database"
            ))),
        }
    }

    /// Items linked to any of the search's tags, each once.
    async fn union_tags(&self, db: &Store, s: &Search) -> Result<Vec<Item>> {
        let mut union: HashMap<i64, Item> = HashMap::new();

        for &tid in &s.tags {
            let tag = self.load_tag(db, tid).await?;
            for item in db.tag_link_get_by_tag(&tag).await? {
                union.entry(item.id).or_insert(item);
            }
        }

        Ok(union.into_values().collect())
    }

    /// Items linked to all of the search's tags. Seeded from the first
    /// tag; stops early once the intersection is empty.
    async fn intersect_tags(&self, db: &Store, s: &Search) -> Result<Vec<Item>> {
        let first = self.load_tag(db, s.tags[0]).await?;
        let mut intersect = db.tag_link_get_by_tag_map(&first).await?;

        for &tid in &s.tags[1..] {
            if intersect.is_empty() {
                break;
            }

            let tag = self.load_tag(db, tid).await?;
            let tag_map = db.tag_link_get_by_tag_map(&tag).await?;
            intersect.retain(|id, _| tag_map.contains_key(id));
        }

        Ok(intersect.into_values().collect())
    }
}
