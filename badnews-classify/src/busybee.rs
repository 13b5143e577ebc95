//! The busybee precomputes ratings and tag suggestions ahead of time so
//! the read paths are served from warm caches.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use badnews_core::{Paths, Result};
use badnews_storage::Pool;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::advisor::Advisor;
use crate::judge::Judge;

const RUN_INTERVAL: Duration = Duration::from_secs(30);
const CHECK_PERIOD: chrono::Duration = chrono::Duration::days(2);
const SUGGESTION_CNT: usize = 10;
const BACKOFF_DELAY: Duration = Duration::from_millis(25);

/// Pool size for the precompute sweeps.
const POOL_SIZE: usize = 4;

/// Periodic worker that walks the items of the last two days and fills
/// the judge and advisor caches for whatever is not in them yet. The
/// active flag is honored between items, so a stop takes effect quickly.
pub struct BusyBee {
    judge: Arc<Judge>,
    advisor: Arc<Advisor>,
    pool: Pool,
    active: AtomicBool,
}

impl BusyBee {
    pub async fn create(paths: &Paths, judge: Arc<Judge>, advisor: Arc<Advisor>) -> Result<BusyBee> {
        let pool = Pool::new(paths.database(), POOL_SIZE).await.map_err(|e| {
            error!(error = %e, "Failed to create database connection pool");
            e
        })?;

        Ok(BusyBee {
            judge,
            advisor,
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

    /// The main loop: one precompute sweep per tick until stopped.
    pub async fn run(&self) {
        info!("BusyBee main loop starting up");
        self.active.store(true, Ordering::Relaxed);

        let mut ticker = tokio::time::interval(RUN_INTERVAL);
        ticker.tick().await;

        while self.is_active() {
            ticker.tick().await;

            if !self.is_active() {
                break;
            }

            if let Err(e) = self.precompute(CHECK_PERIOD).await {
                error!(error = %e, "Failed to precompute advice and ratings");
            }
        }

        info!("BusyBee main loop finished");
    }

    /// Sweep the items newer than `period` ago, rating and suggesting
    /// for everything not cached yet.
    pub async fn precompute(&self, period: chrono::Duration) -> Result<()> {
        let db = self.pool.get().await;
        let res = self.precompute_with(&db, period).await;
        self.pool.put(db).await;
        res
    }

    async fn precompute_with(
        &self,
        db: &badnews_storage::Store,
        period: chrono::Duration,
    ) -> Result<()> {
        let begin = Utc::now() - period.abs();
        info!(%begin, "Precomputing advice for recent items");

        let mut items = db.item_get_recent(begin).await.map_err(|e| {
            error!(error = %e, "Failed to load recent items");
            e
        })?;

        debug!(items = items.len(), "Processing items");

        let mut rated = 0usize;
        let mut suggested = 0usize;

        for item in &mut items {
            if !self.is_active() {
                debug!("BusyBee has been stopped, aborting the sweep");
                break;
            }

            if !self.judge.in_cache(item).await {
                loop {
                    match self.judge.rate(item).await {
                        Ok(_) => break,
                        Err(e) if e.is_transient_model() => sleep(BACKOFF_DELAY).await,
                        Err(e) => {
                            error!(
                                item = item.id,
                                headline = item.headline,
                                error = %e,
                                "Failed to rate item"
                            );
                            return Err(e);
                        }
                    }
                }
                rated += 1;
            }

            if !self.advisor.in_cache(item).await {
                let suggestions = self.advisor.suggest(item, SUGGESTION_CNT).await;
                if suggestions.len() != SUGGESTION_CNT {
                    debug!(
                        item = item.id,
                        got = suggestions.len(),
                        expected = SUGGESTION_CNT,
                        "Unexpected number of suggestions"
                    );
                }
                suggested += 1;
            }
        }

        debug!(rated, suggested, "Precompute sweep done");
        Ok(())
    }
}
