//! Feed operations.

use std::time::Duration;

use badnews_core::{Error, Feed, Result};
use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use tracing::debug;

use crate::queries::QueryId;
use crate::store::{
    Store, col_i64, col_text, decode_ts, decode_url, storage_err, text_value, ts_value,
};

fn decode_feed(row: &Row, id: i64, offset: i32) -> Result<Feed> {
    Ok(Feed {
        id,
        title: col_text(row, offset)?,
        url: decode_url(&col_text(row, offset + 1)?)?,
        homepage: decode_url(&col_text(row, offset + 2)?)?,
        interval: Duration::from_secs(col_i64(row, offset + 3)?.max(0) as u64),
        last_refresh: decode_ts(col_i64(row, offset + 4)?)?,
        active: col_i64(row, offset + 5)? != 0,
    })
}

fn decode_feed_with_id(row: &Row) -> Result<Feed> {
    let id = col_i64(row, 0)?;
    decode_feed(row, id, 1)
}

impl Store {
    /// Enter a feed into the database, assigning its id. Title and URL
    /// must be unique, the refresh interval positive.
    pub async fn feed_add(&self, f: &mut Feed) -> Result<()> {
        if f.title.is_empty() {
            return Err(Error::InvalidValue("feed title must not be empty".into()));
        }
        if f.interval.as_secs() < 1 {
            return Err(Error::InvalidValue(
                "feed refresh interval must be positive".into(),
            ));
        }

        let adhoc = self.adhoc_begin().await?;
        let res = self.feed_add_inner(f).await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res
    }

    async fn feed_add_inner(&self, f: &mut Feed) -> Result<()> {
        let mut rows = self
            .query(
                QueryId::FeedAdd,
                vec![
                    text_value(&f.title),
                    text_value(f.url.as_str()),
                    text_value(f.homepage.as_str()),
                    Value::Integer(f.interval.as_secs() as i64),
                ],
            )
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                f.id = col_i64(&row, 0)?;
                Ok(())
            }
            None => Err(Error::Storage("FeedAdd did not return an id".into())),
        }
    }

    /// Load a feed by its id.
    pub async fn feed_get_by_id(&self, id: i64) -> Result<Option<Feed>> {
        let mut rows = self
            .query(QueryId::FeedGetById, vec![Value::Integer(id)])
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(decode_feed(&row, id, 0)?)),
            None => Ok(None),
        }
    }

    /// Load all feeds, ordered by title.
    pub async fn feed_get_all(&self) -> Result<Vec<Feed>> {
        let mut rows = self.query(QueryId::FeedGetAll, Vec::new()).await?;
        let mut feeds = Vec::new();

        while let Some(row) = rows.next().await.map_err(storage_err)? {
            feeds.push(decode_feed_with_id(&row)?);
        }

        Ok(feeds)
    }

    /// Load the active feeds whose refresh interval has elapsed.
    pub async fn feed_get_pending(&self) -> Result<Vec<Feed>> {
        let mut rows = self.query(QueryId::FeedGetPending, Vec::new()).await?;
        let mut feeds = Vec::new();

        while let Some(row) = rows.next().await.map_err(storage_err)? {
            feeds.push(decode_feed_with_id(&row)?);
        }

        debug!(pending = feeds.len(), "Loaded pending feeds");
        Ok(feeds)
    }

    /// Update the feed's last-refresh timestamp.
    pub async fn feed_update_refresh(&self, f: &mut Feed, stamp: DateTime<Utc>) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::FeedUpdateRefresh,
                vec![ts_value(stamp), Value::Integer(f.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        f.last_refresh = stamp;
        Ok(())
    }

    /// Switch the feed's active flag.
    pub async fn feed_set_active(&self, f: &mut Feed, active: bool) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::FeedSetActive,
                vec![Value::Integer(i64::from(active)), Value::Integer(f.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        f.active = active;
        Ok(())
    }

    /// Delete a feed along with its items and their tag links.
    pub async fn feed_delete(&self, f: &Feed) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self.feed_delete_inner(f).await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res
    }

    async fn feed_delete_inner(&self, f: &Feed) -> Result<()> {
        self.exec(QueryId::TagLinkDeleteByFeed, vec![Value::Integer(f.id)])
            .await?;
        self.exec(QueryId::ItemDeleteByFeed, vec![Value::Integer(f.id)])
            .await?;
        self.exec(QueryId::FeedDelete, vec![Value::Integer(f.id)])
            .await?;
        Ok(())
    }
}
