//! Shared test fixtures: a temporary base directory with the full
//! application layout, and seeding helpers for feeds, items and tags.

use std::time::Duration;

use badnews_core::{Feed, Item, Paths, Tag};
use badnews_storage::Store;
use chrono::{DateTime, Utc};
use url::Url;

/// A temporary base directory with the application layout created. The
/// directory is removed when the fixture is dropped.
pub struct TestBase {
    pub paths: Paths,
    _dir: tempfile::TempDir,
}

impl TestBase {
    #[allow(clippy::new_without_default)]
    pub fn new() -> TestBase {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let paths = Paths::new(dir.path());
        paths.ensure().expect("create base directory layout");
        TestBase { paths, _dir: dir }
    }

    /// Open a store on the fixture's database.
    pub async fn store(&self) -> Store {
        Store::open(self.paths.database())
            .await
            .expect("open store")
    }
}

/// Insert the n-th test feed (`Feed 00n`, hourly interval, active,
/// never refreshed).
pub async fn seed_feed(store: &Store, n: usize) -> Feed {
    let mut feed = Feed {
        id: 0,
        title: format!("Feed {n:03}"),
        url: Url::parse(&format!("https://ex.org/f{n}.rss")).expect("feed url"),
        homepage: Url::parse("https://ex.org/").expect("homepage url"),
        interval: Duration::from_secs(3600),
        last_refresh: DateTime::UNIX_EPOCH,
        active: true,
    };
    store.feed_add(&mut feed).await.expect("add feed");
    feed
}

/// Insert one item for the feed with a distinct URL derived from `n`.
pub async fn seed_item(
    store: &Store,
    feed: &Feed,
    n: usize,
    timestamp: DateTime<Utc>,
    headline: &str,
) -> Item {
    let mut item = Item::new(
        feed.id,
        Url::parse(&format!("https://ex.org/f{}/item{n:03}.html", feed.id)).expect("item url"),
        timestamp,
        headline.to_string(),
        String::new(),
    );
    store.item_add(&mut item).await.expect("add item");
    item
}

/// Insert a tag.
pub async fn seed_tag(store: &Store, name: &str, parent: Option<i64>) -> Tag {
    let mut tag = Tag {
        id: 0,
        parent,
        name: name.to_string(),
        level: 0,
        full_name: String::new(),
    };
    store.tag_add(&mut tag).await.expect("add tag");
    tag
}
