//! Integration-level tests for the storage engine, run against a
//! temporary database file.

use std::time::Duration as StdDuration;

use badnews_core::{Error, Feed, Item, Search, Tag};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use url::Url;

use crate::store::Store;

async fn open_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let store = Store::open(dir.path().join("badnews.db"))
        .await
        .expect("open store");
    (store, dir)
}

fn feed(n: usize) -> Feed {
    Feed {
        id: 0,
        title: format!("Feed {n:03}"),
        url: Url::parse(&format!("https://ex.org/f{n}.rss")).expect("feed url"),
        homepage: Url::parse("https://ex.org/").expect("homepage url"),
        interval: StdDuration::from_secs(3600),
        last_refresh: DateTime::UNIX_EPOCH,
        active: true,
    }
}

fn item(feed_id: i64, n: usize, timestamp: DateTime<Utc>, headline: &str) -> Item {
    Item::new(
        feed_id,
        Url::parse(&format!("https://ex.org/f{feed_id}/item{n:03}.html")).expect("item url"),
        timestamp,
        headline.to_string(),
        String::new(),
    )
}

fn search(title: &str, query: &str) -> Search {
    Search {
        id: 0,
        title: title.to_string(),
        time_created: Utc::now() - Duration::minutes(5),
        time_started: None,
        time_finished: None,
        status: false,
        message: String::new(),
        tags: Vec::new(),
        tags_all: false,
        filter_period: None,
        query_string: query.to_string(),
        regex: false,
        results: Vec::new(),
    }
}

// ── Feeds ───────────────────────────────────────────────────────────

#[tokio::test]
async fn feed_add_assigns_id_and_rejects_duplicate_url() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("first add");
    assert!(f.id > 0);

    let mut dup = feed(1);
    dup.title = "Feed 001 again".into();
    let err = store.feed_add(&mut dup).await.expect_err("duplicate URL");
    assert!(err.to_string().to_lowercase().contains("unique"));
}

#[tokio::test]
async fn feed_round_trip_and_pending() {
    let (store, _dir) = open_store().await;

    let mut due = feed(1);
    let mut fresh = feed(2);
    store.feed_add(&mut due).await.expect("add due");
    store.feed_add(&mut fresh).await.expect("add fresh");
    store
        .feed_update_refresh(&mut fresh, Utc::now())
        .await
        .expect("refresh");

    let loaded = store
        .feed_get_by_id(due.id)
        .await
        .expect("get")
        .expect("feed exists");
    assert_eq!(loaded.title, due.title);
    assert_eq!(loaded.url, due.url);
    assert_eq!(loaded.interval, due.interval);
    assert!(loaded.active);

    assert!(store.feed_get_by_id(9999).await.expect("get").is_none());

    let all = store.feed_get_all().await.expect("get all");
    assert_eq!(all.len(), 2);

    let pending = store.feed_get_pending().await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, due.id);

    store
        .feed_set_active(&mut due, false)
        .await
        .expect("deactivate");
    assert!(store.feed_get_pending().await.expect("pending").is_empty());
}

#[tokio::test]
async fn feed_delete_cascades_to_items_and_links() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let mut i = item(f.id, 1, Utc::now(), "doomed");
    store.item_add(&mut i).await.expect("add item");

    let mut t = Tag {
        id: 0,
        parent: None,
        name: "Doom".into(),
        level: 0,
        full_name: String::new(),
    };
    store.tag_add(&mut t).await.expect("add tag");
    store.tag_link_add(&i, &t).await.expect("link");

    store.feed_delete(&f).await.expect("delete feed");

    assert!(store.feed_get_by_id(f.id).await.expect("get").is_none());
    assert!(store.item_get_by_id(i.id).await.expect("get").is_none());
    assert!(
        store
            .tag_link_get_by_tag(&t)
            .await
            .expect("links")
            .is_empty()
    );
}

// ── Items ───────────────────────────────────────────────────────────

#[tokio::test]
async fn items_by_feed_come_back_newest_first() {
    let (mut store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let now = Utc::now();
    store.begin().await.expect("begin");
    for n in 1..=32 {
        let mut i = item(f.id, n, now - Duration::seconds(n as i64), &format!("Item {n:03}"));
        store.item_add(&mut i).await.expect("add item");
        assert!(i.id > 0);
    }
    store.commit().await.expect("commit");

    let items = store
        .item_get_by_feed(f.id, 100, 0)
        .await
        .expect("by feed");
    assert_eq!(items.len(), 32);
    assert!(
        items
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp),
        "items must be ordered by descending timestamp"
    );

    let probe = item(f.id, 17, now, "probe");
    assert!(store.item_exists(&probe).await.expect("exists"));

    let absent = item(f.id, 999, now, "absent");
    assert!(!store.item_exists(&absent).await.expect("exists"));

    let page = store.item_get_recent_paged(10, 0).await.expect("paged");
    assert_eq!(page.len(), 10);
    assert_eq!(page[0].headline, "Item 001");
}

#[tokio::test]
async fn item_rating_round_trip_and_validation() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let mut i = item(f.id, 1, Utc::now(), "rate me");
    store.item_add(&mut i).await.expect("add item");

    assert!(matches!(
        store.item_rate(&mut i, 3).await,
        Err(Error::InvalidValue(_))
    ));

    store.item_rate(&mut i, 1).await.expect("rate");
    let rated = store.item_get_rated().await.expect("rated");
    assert_eq!(rated.len(), 1);
    assert_eq!(rated[0].id, i.id);
    assert_eq!(rated[0].rating, 1);

    store.item_unrate(&mut i).await.expect("unrate");
    assert!(store.item_get_rated().await.expect("rated").is_empty());
}

#[tokio::test]
async fn item_period_queries_are_inclusive() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let base = DateTime::from_timestamp(1_700_000_000, 0).expect("base ts");
    for n in 0..5 {
        let mut i = item(f.id, n, base + Duration::hours(n as i64), &format!("i{n}"));
        store.item_add(&mut i).await.expect("add item");
    }

    let items = store
        .item_get_by_period(base + Duration::hours(1), base + Duration::hours(3))
        .await
        .expect("period");
    assert_eq!(items.len(), 3);

    let recent = store
        .item_get_recent(base + Duration::hours(3))
        .await
        .expect("recent");
    assert_eq!(recent.len(), 1);
}

#[tokio::test]
async fn item_get_filtered_streams_matches_and_closes() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let now = Utc::now();
    for n in 0..10 {
        let head = if n % 2 == 0 { "keep this" } else { "drop this" };
        let mut i = item(f.id, n, now - Duration::seconds(n as i64), head);
        store.item_add(&mut i).await.expect("add item");
    }

    let (tx, mut rx) = mpsc::channel(4);
    let scan = store.item_get_filtered(tx, |i| i.headline.starts_with("keep"));

    let collect = async {
        let mut got = Vec::new();
        while let Some(i) = rx.recv().await {
            got.push(i);
        }
        got
    };

    let (scan_res, got) = tokio::join!(scan, collect);
    scan_res.expect("scan");
    assert_eq!(got.len(), 5);
    assert!(got.iter().all(|i| i.headline == "keep this"));
}

// ── Tags ────────────────────────────────────────────────────────────

fn tag(name: &str, parent: Option<i64>) -> Tag {
    Tag {
        id: 0,
        parent,
        name: name.to_string(),
        level: 0,
        full_name: String::new(),
    }
}

#[tokio::test]
async fn tag_names_are_unique_per_scope() {
    let (store, _dir) = open_store().await;

    let mut root = tag("Software", None);
    store.tag_add(&mut root).await.expect("add root");

    let mut dup = tag("Software", None);
    assert!(store.tag_add(&mut dup).await.is_err());

    // The same name under a different parent is fine.
    let mut child = tag("Software", Some(root.id));
    store.tag_add(&mut child).await.expect("add child");

    let mut sibling = tag("Hardware", None);
    store.tag_add(&mut sibling).await.expect("add sibling");
    assert!(store.tag_rename(&mut sibling, "Software").await.is_err());
    assert!(store.tag_rename(&mut sibling, "").await.is_err());

    let mut empty = tag("", None);
    assert!(matches!(
        store.tag_add(&mut empty).await,
        Err(Error::InvalidValue(_))
    ));
}

#[tokio::test]
async fn tag_cycles_are_rejected() {
    let (store, _dir) = open_store().await;

    let mut a = tag("A", None);
    store.tag_add(&mut a).await.expect("add a");
    let mut b = tag("B", Some(a.id));
    store.tag_add(&mut b).await.expect("add b");
    let mut c = tag("C", Some(b.id));
    store.tag_add(&mut c).await.expect("add c");

    // Direct self-parenting.
    let a_id = a.id;
    assert!(store.tag_set_parent(&mut a, Some(a_id)).await.is_err());

    // Transitive cycle: A -> B -> C -> A.
    let c_id = c.id;
    assert!(store.tag_set_parent(&mut a, Some(c_id)).await.is_err());
    assert!(store.tag_update(&mut a, "A2", Some(c_id)).await.is_err());

    // Re-parenting to a non-descendant works.
    store.tag_set_parent(&mut c, None).await.expect("reparent");
    assert!(c.parent.is_none());
}

#[tokio::test]
async fn tag_hierarchy_levels_and_full_names() {
    let (store, _dir) = open_store().await;

    let mut software = tag("Software", None);
    store.tag_add(&mut software).await.expect("add");
    let mut linux = tag("Linux", Some(software.id));
    store.tag_add(&mut linux).await.expect("add");
    let mut kde = tag("KDE", Some(linux.id));
    store.tag_add(&mut kde).await.expect("add");
    let mut politics = tag("Politics", None);
    store.tag_add(&mut politics).await.expect("add");

    let sorted = store.tag_get_sorted().await.expect("sorted");
    let names: Vec<_> = sorted.iter().map(|t| t.full_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Politics", "Software", "Software/Linux", "Software/Linux/KDE"]
    );

    let kde_row = sorted.iter().find(|t| t.id == kde.id).expect("kde");
    assert_eq!(kde_row.level, 2);
    assert_eq!(kde_row.parent, Some(linux.id));

    let children = store.tag_get_children(&software).await.expect("children");
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].id, linux.id);
}

#[tokio::test]
async fn hierarchy_links_are_the_distinct_union_of_descendants() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let mut software = tag("Software", None);
    store.tag_add(&mut software).await.expect("add");
    let mut linux = tag("Linux", Some(software.id));
    store.tag_add(&mut linux).await.expect("add");
    let mut kde = tag("KDE", Some(linux.id));
    store.tag_add(&mut kde).await.expect("add");
    let mut politics = tag("Politics", None);
    store.tag_add(&mut politics).await.expect("add");

    let now = Utc::now();
    let mut items = Vec::new();
    for n in 0..6 {
        let mut i = item(f.id, n, now - Duration::seconds(n as i64), &format!("i{n}"));
        store.item_add(&mut i).await.expect("add item");
        items.push(i);
    }

    store.tag_link_add(&items[0], &software).await.expect("link");
    store.tag_link_add(&items[1], &linux).await.expect("link");
    store.tag_link_add(&items[2], &kde).await.expect("link");
    // An item linked to two descendants must appear once.
    store.tag_link_add(&items[3], &linux).await.expect("link");
    store.tag_link_add(&items[3], &kde).await.expect("link");
    // Unrelated tag, must not appear.
    store.tag_link_add(&items[4], &politics).await.expect("link");

    // Duplicate links are rejected.
    assert!(store.tag_link_add(&items[0], &software).await.is_err());

    let linked = store
        .tag_link_get_by_tag_hierarchy(software.id)
        .await
        .expect("hierarchy");

    let mut got: Vec<i64> = linked.iter().map(|i| i.id).collect();
    let mut want: Vec<i64> = items[..4].iter().map(|i| i.id).collect();
    got.sort_unstable();
    want.sort_unstable();
    assert_eq!(got, want);

    // Items arrive ordered by timestamp.
    assert!(
        linked
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    );

    let by_item = store.tag_link_get_by_item(&items[3]).await.expect("by item");
    assert_eq!(by_item.len(), 2);

    store.tag_link_delete(&items[3], &kde).await.expect("unlink");
    let by_item = store.tag_link_get_by_item(&items[3]).await.expect("by item");
    assert_eq!(by_item.len(), 1);
}

#[tokio::test]
async fn tag_item_counts_cover_every_tag() {
    let (mut store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    let now = Utc::now();

    store.begin().await.expect("begin");

    let mut items = Vec::new();
    for n in 0..128 {
        let mut i = item(f.id, n, now - Duration::seconds(n as i64), &format!("i{n}"));
        store.item_add(&mut i).await.expect("add item");
        items.push(i);
    }

    let mut tags = Vec::new();
    for n in 1..=16 {
        let mut t = tag(&format!("Tag{n:03}"), None);
        store.tag_add(&mut t).await.expect("add tag");
        tags.push(t);
    }

    for t in &tags {
        for i in &items {
            store.tag_link_add(i, t).await.expect("link");
        }
    }

    store.commit().await.expect("commit");

    let counts = store.tag_get_item_cnt().await.expect("counts");
    assert_eq!(counts.len(), 16);
    for t in &tags {
        assert_eq!(counts.get(&t.id), Some(&128));
    }
}

#[tokio::test]
async fn tag_delete_cascades_to_children_and_links() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");
    let mut i = item(f.id, 1, Utc::now(), "x");
    store.item_add(&mut i).await.expect("add item");

    let mut parent = tag("Parent", None);
    store.tag_add(&mut parent).await.expect("add");
    let mut child = tag("Child", Some(parent.id));
    store.tag_add(&mut child).await.expect("add");
    store.tag_link_add(&i, &child).await.expect("link");

    store.tag_delete(&parent).await.expect("delete");

    assert!(store.tag_get_by_id(parent.id).await.expect("get").is_none());
    assert!(store.tag_get_by_id(child.id).await.expect("get").is_none());
    assert!(store.tag_link_get_by_item(&i).await.expect("links").is_empty());
}

// ── Searches ────────────────────────────────────────────────────────

#[tokio::test]
async fn search_lifecycle_and_round_trip() {
    let (store, _dir) = open_store().await;

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");
    let mut i1 = item(f.id, 1, Utc::now(), "result one");
    let mut i2 = item(f.id, 2, Utc::now() - Duration::seconds(1), "result two");
    store.item_add(&mut i1).await.expect("add item");
    store.item_add(&mut i2).await.expect("add item");

    let begin = DateTime::from_timestamp(1_727_740_800, 0).expect("begin");
    let end = DateTime::from_timestamp(1_728_255_599, 0).expect("end");

    let mut s = search("BSD", "BSD");
    s.tags = vec![1, 2];
    s.filter_period = Some((begin, end));
    store.search_add(&mut s).await.expect("add");
    assert!(s.id > 0);

    // Nothing has been started yet.
    assert!(store.search_get_active().await.expect("active").is_empty());

    let pending = store
        .search_get_next_pending()
        .await
        .expect("pending")
        .expect("one pending");
    assert_eq!(pending.id, s.id);
    assert_eq!(pending.tags, vec![1, 2]);
    assert_eq!(pending.filter_period, Some((begin, end)));
    assert_eq!(pending.query_string, "BSD");
    assert!(!pending.regex);

    store.search_start(&mut s).await.expect("start");

    let active = store.search_get_active().await.expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, s.id);
    assert!(
        store
            .search_get_next_pending()
            .await
            .expect("pending")
            .is_none()
    );

    store
        .search_finish(&mut s, true, "", &[i1.id, i2.id])
        .await
        .expect("finish");

    let loaded = store
        .search_get_by_id(s.id)
        .await
        .expect("get")
        .expect("search exists");
    assert!(loaded.status);
    assert!(loaded.is_finished());
    assert_eq!(loaded.message, "");

    let started = loaded.time_started.expect("started");
    let finished = loaded.time_finished.expect("finished");
    assert!(started >= loaded.time_created);
    assert!(finished >= started);

    let ids: Vec<i64> = loaded.results.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![i1.id, i2.id]);
    assert_eq!(loaded.results[0].headline, "result one");

    assert!(store.search_get_by_id(9999).await.expect("get").is_none());
}

#[tokio::test]
async fn pending_searches_come_oldest_first() {
    let (store, _dir) = open_store().await;

    let base = Utc::now() - Duration::hours(4);
    for (n, term) in ["ocean", "volcano", "coral", "bird"].iter().enumerate() {
        let mut s = search(&format!("Search #{:02}", n + 1), term);
        s.time_created = base + Duration::hours(n as i64);
        store.search_add(&mut s).await.expect("add");
    }

    let all = store.search_get_all().await.expect("all");
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].query_string, "ocean");

    let mut first = store
        .search_get_next_pending()
        .await
        .expect("pending")
        .expect("some pending");
    assert_eq!(first.query_string, "ocean");

    store.search_start(&mut first).await.expect("start");

    let second = store
        .search_get_next_pending()
        .await
        .expect("pending")
        .expect("some pending");
    assert_eq!(second.query_string, "volcano");

    store.search_delete(&second).await.expect("delete");
    let third = store
        .search_get_next_pending()
        .await
        .expect("pending")
        .expect("some pending");
    assert_eq!(third.query_string, "coral");
}

// ── Transactions and savepoints ─────────────────────────────────────

#[tokio::test]
async fn explicit_transactions_nest_and_roll_back() {
    let (mut store, _dir) = open_store().await;

    assert!(matches!(store.commit().await, Err(Error::NoTxInProgress)));
    assert!(matches!(store.rollback().await, Err(Error::NoTxInProgress)));

    store.begin().await.expect("begin");
    assert!(matches!(store.begin().await, Err(Error::TxInProgress)));

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");
    store.rollback().await.expect("rollback");

    assert!(store.feed_get_by_id(f.id).await.expect("get").is_none());

    store.begin().await.expect("begin");
    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");
    store.commit().await.expect("commit");

    assert!(store.feed_get_by_id(f.id).await.expect("get").is_some());
}

#[tokio::test]
async fn savepoints_require_a_transaction_and_known_names() {
    let (mut store, _dir) = open_store().await;

    assert!(matches!(
        store.savepoint_create("one").await,
        Err(Error::NoTxInProgress)
    ));
    assert!(matches!(
        store.savepoint_release("one").await,
        Err(Error::NoTxInProgress)
    ));
    assert!(matches!(
        store.savepoint_rollback("one").await,
        Err(Error::NoTxInProgress)
    ));

    store.begin().await.expect("begin");

    let mut f1 = feed(1);
    store.feed_add(&mut f1).await.expect("add feed");

    store.savepoint_create("one").await.expect("savepoint");

    let mut f2 = feed(2);
    store.feed_add(&mut f2).await.expect("add feed");

    assert!(matches!(
        store.savepoint_rollback("nope").await,
        Err(Error::InvalidSavepoint(_))
    ));

    store.savepoint_rollback("one").await.expect("rollback to sp");

    // The name is consumed by the rollback.
    assert!(matches!(
        store.savepoint_release("one").await,
        Err(Error::InvalidSavepoint(_))
    ));

    store.commit().await.expect("commit");

    assert!(store.feed_get_by_id(f1.id).await.expect("get").is_some());
    assert!(store.feed_get_by_id(f2.id).await.expect("get").is_none());
}

#[tokio::test]
async fn savepoint_release_keeps_changes() {
    let (mut store, _dir) = open_store().await;

    store.begin().await.expect("begin");
    store.savepoint_create("sp").await.expect("savepoint");

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");

    store.savepoint_release("sp").await.expect("release");
    store.commit().await.expect("commit");

    assert!(store.feed_get_by_id(f.id).await.expect("get").is_some());
}

#[tokio::test]
async fn maintenance_refuses_to_run_inside_a_transaction() {
    let (mut store, _dir) = open_store().await;

    store.begin().await.expect("begin");
    assert!(matches!(
        store.perform_maintenance().await,
        Err(Error::TxInProgress)
    ));
    store.rollback().await.expect("rollback");

    store.perform_maintenance().await.expect("maintenance");
}

#[tokio::test]
async fn statement_cache_fills_lazily() {
    let (store, _dir) = open_store().await;

    let (len0, _, _) = store.stmt_cache_stats();
    assert_eq!(len0, 0);

    let mut f = feed(1);
    store.feed_add(&mut f).await.expect("add feed");
    store.feed_get_by_id(f.id).await.expect("get");
    store.feed_get_by_id(f.id).await.expect("get");

    let (len, hits, misses) = store.stmt_cache_stats();
    assert_eq!(len, 2);
    assert_eq!(misses, 2);
    assert!(hits >= 1);
}
