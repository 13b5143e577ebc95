//! The ingestion pipeline: a due-feed scheduler and a worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use badnews_core::{Feed, Item, Paths, Result};
use badnews_storage::{Pool, Store};
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info};
use url::Url;

use crate::source::{FeedSource, FetchedFeed};

/// How often the scheduler looks for due feeds.
const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Idle tick of a worker, bounding how long a stop goes unnoticed.
const WORKER_TICK: Duration = Duration::from_secs(5);

/// Fetches and stores feeds on schedule. One scheduler task feeds a
/// bounded queue (capacity = worker count); each worker dequeues a feed,
/// fetches and parses it, and inserts the entries that are not stored
/// yet. One item's failure never fails its feed, and one feed's failure
/// never fails the sweep.
pub struct Reader {
    pool: Pool,
    source: Arc<dyn FeedSource>,
    active: AtomicBool,
    worker_cnt: usize,
    tx: mpsc::Sender<Feed>,
    rx: Mutex<mpsc::Receiver<Feed>>,
}

impl Reader {
    pub async fn new(paths: &Paths, source: Arc<dyn FeedSource>, workers: usize) -> Result<Reader> {
        let pool = Pool::new(paths.database(), workers).await.map_err(|e| {
            error!(error = %e, "Cannot open database pool");
            e
        })?;

        let (tx, rx) = mpsc::channel(workers);

        Ok(Reader {
            pool,
            source,
            active: AtomicBool::new(false),
            worker_cnt: workers,
            tx,
            rx: Mutex::new(rx),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Launch the scheduler and the workers.
    pub fn start(self: &Arc<Self>) {
        self.active.store(true, Ordering::Relaxed);

        {
            let reader = Arc::clone(self);
            tokio::spawn(async move { reader.feeder().await });
        }

        for n in 1..=self.worker_cnt {
            let reader = Arc::clone(self);
            tokio::spawn(async move { reader.worker(n).await });
        }
    }

    async fn feeder(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.tick().await;

        while self.is_active() {
            ticker.tick().await;
            if !self.is_active() {
                break;
            }
            self.check_feeds().await;
        }
    }

    /// Enqueue every feed that is due for a refresh.
    pub async fn check_feeds(&self) {
        let feeds = {
            let db = self.pool.get().await;
            let feeds = db.feed_get_pending().await;
            self.pool.put(db).await;
            feeds
        };

        let feeds = match feeds {
            Ok(feeds) => feeds,
            Err(e) => {
                error!(error = %e, "Failed to load feeds due for a refresh");
                return;
            }
        };

        for feed in feeds {
            if self.tx.send(feed).await.is_err() {
                break;
            }
        }
    }

    async fn worker(self: Arc<Self>, n: usize) {
        debug!(worker = n, "Reader worker starting");

        while self.is_active() {
            let feed = {
                let mut rx = self.rx.lock().await;
                match tokio::time::timeout(WORKER_TICK, rx.recv()).await {
                    Ok(Some(feed)) => feed,
                    Ok(None) => break,
                    Err(_) => continue,
                }
            };

            if let Err(e) = self.process(feed.clone()).await {
                error!(
                    feed = feed.title,
                    id = feed.id,
                    error = %e,
                    "Error processing feed"
                );
            }
        }

        info!(worker = n, "Reader worker stopping");
    }

    /// Fetch, parse and store one feed. Transient fetch/parse failures
    /// leave `last_refresh` untouched, so the feed stays due and is
    /// retried on a later tick.
    pub async fn process(&self, mut feed: Feed) -> Result<()> {
        let parsed = self.source.fetch(&feed.url).await?;

        let db = self.pool.get().await;
        let res = self.process_with(&db, &mut feed, parsed).await;
        self.pool.put(db).await;
        res
    }

    async fn process_with(&self, db: &Store, feed: &mut Feed, parsed: FetchedFeed) -> Result<()> {
        debug!(
            feed = parsed.title,
            items = parsed.items.len(),
            "Processing feed"
        );

        for entry in parsed.items {
            let url = match Url::parse(&entry.link) {
                Ok(url) => url,
                Err(e) => {
                    error!(
                        title = entry.title,
                        link = entry.link,
                        error = %e,
                        "Cannot parse URL of item"
                    );
                    continue;
                }
            };

            let timestamp = entry
                .updated
                .or(entry.published)
                .unwrap_or_else(Utc::now);

            let mut item = Item::new(feed.id, url, timestamp, entry.title, entry.description);

            match db.item_exists(&item).await {
                Ok(true) => {
                    debug!(url = %item.url, "Item already exists in database");
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    error!(url = %item.url, error = %e, "Failed to check for item");
                    continue;
                }
            }

            if let Err(e) = db.item_add(&mut item).await {
                error!(
                    url = %item.url,
                    headline = item.headline,
                    error = %e,
                    "Failed to add item to database"
                );
                continue;
            }
        }

        db.feed_update_refresh(feed, Utc::now()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use badnews_core::Error;
    use chrono::{DateTime, Duration as ChronoDuration};

    use super::*;
    use crate::source::FetchedItem;

    struct StubSource {
        items: Vec<FetchedItem>,
    }

    #[async_trait]
    impl FeedSource for StubSource {
        async fn fetch(&self, _url: &Url) -> Result<FetchedFeed> {
            Ok(FetchedFeed {
                title: "Stub Feed".into(),
                items: self.items.clone(),
            })
        }
    }

    struct FailingSource;

    #[async_trait]
    impl FeedSource for FailingSource {
        async fn fetch(&self, url: &Url) -> Result<FetchedFeed> {
            Err(Error::Fetch(format!("connection refused: {url}")))
        }
    }

    fn entry(n: usize) -> FetchedItem {
        FetchedItem {
            link: format!("https://ex.org/f1/item{n:03}.html"),
            title: format!("Item {n:03}"),
            description: String::new(),
            updated: None,
            published: Some(Utc::now() - ChronoDuration::minutes(n as i64)),
        }
    }

    async fn setup(dir: &std::path::Path) -> (Paths, Feed) {
        let paths = Paths::new(dir);
        paths.ensure().expect("ensure layout");

        let store = Store::open(paths.database()).await.expect("open store");
        let mut feed = Feed {
            id: 0,
            title: "Feed 001".into(),
            url: Url::parse("https://ex.org/f1.rss").expect("url"),
            homepage: Url::parse("https://ex.org/").expect("url"),
            interval: std::time::Duration::from_secs(3600),
            last_refresh: DateTime::UNIX_EPOCH,
            active: true,
        };
        store.feed_add(&mut feed).await.expect("add feed");
        (paths, feed)
    }

    #[tokio::test]
    async fn ingestion_is_idempotent() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (paths, feed) = setup(dir.path()).await;

        let source = Arc::new(StubSource {
            items: (1..=8).map(entry).collect(),
        });
        let reader = Reader::new(&paths, source, 2).await.expect("reader");

        for _ in 0..3 {
            reader.process(feed.clone()).await.expect("process");
        }

        let store = Store::open(paths.database()).await.expect("open store");
        let items = store
            .item_get_by_feed(feed.id, 100, 0)
            .await
            .expect("items");
        assert_eq!(items.len(), 8);
    }

    #[tokio::test]
    async fn bad_links_are_skipped_but_the_feed_succeeds() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (paths, feed) = setup(dir.path()).await;

        let mut items = vec![entry(1), entry(2)];
        items.push(FetchedItem {
            link: "not a url at all".into(),
            title: "broken".into(),
            description: String::new(),
            updated: None,
            published: None,
        });

        let source = Arc::new(StubSource { items });
        let reader = Reader::new(&paths, source, 1).await.expect("reader");

        reader.process(feed.clone()).await.expect("process");

        let store = Store::open(paths.database()).await.expect("open store");
        let items = store
            .item_get_by_feed(feed.id, 100, 0)
            .await
            .expect("items");
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn updated_is_preferred_over_published() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (paths, feed) = setup(dir.path()).await;

        let updated = DateTime::from_timestamp(1_700_000_000, 0).expect("ts");
        let published = DateTime::from_timestamp(1_600_000_000, 0).expect("ts");

        let source = Arc::new(StubSource {
            items: vec![FetchedItem {
                link: "https://ex.org/f1/item001.html".into(),
                title: "both stamps".into(),
                description: String::new(),
                updated: Some(updated),
                published: Some(published),
            }],
        });
        let reader = Reader::new(&paths, source, 1).await.expect("reader");
        reader.process(feed.clone()).await.expect("process");

        let store = Store::open(paths.database()).await.expect("open store");
        let items = store
            .item_get_by_feed(feed.id, 10, 0)
            .await
            .expect("items");
        assert_eq!(items[0].timestamp, updated);
    }

    #[tokio::test]
    async fn successful_processing_advances_last_refresh() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (paths, feed) = setup(dir.path()).await;

        let source = Arc::new(StubSource {
            items: vec![entry(1)],
        });
        let reader = Reader::new(&paths, source, 1).await.expect("reader");

        reader.process(feed.clone()).await.expect("process");

        let store = Store::open(paths.database()).await.expect("open store");
        let refreshed = store
            .feed_get_by_id(feed.id)
            .await
            .expect("get feed")
            .expect("feed exists");
        assert!(refreshed.last_refresh > feed.last_refresh);
        assert!(store.feed_get_pending().await.expect("pending").is_empty());
    }

    #[tokio::test]
    async fn fetch_failures_leave_the_feed_due() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (paths, feed) = setup(dir.path()).await;

        let reader = Reader::new(&paths, Arc::new(FailingSource), 1)
            .await
            .expect("reader");

        assert!(reader.process(feed.clone()).await.is_err());

        let store = Store::open(paths.database()).await.expect("open store");
        let pending = store.feed_get_pending().await.expect("pending");
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn check_feeds_enqueues_due_feeds_for_the_workers() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let (paths, feed) = setup(dir.path()).await;

        let source = Arc::new(StubSource {
            items: (1..=4).map(entry).collect(),
        });
        let reader = Arc::new(Reader::new(&paths, source, 2).await.expect("reader"));

        reader.start();
        reader.check_feeds().await;

        // Wait for a worker to pick the feed up and finish it.
        let store = Store::open(paths.database()).await.expect("open store");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let items = store
                .item_get_by_feed(feed.id, 100, 0)
                .await
                .expect("items");
            if items.len() == 4 {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "workers did not ingest the feed in time"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        reader.stop();
    }
}
