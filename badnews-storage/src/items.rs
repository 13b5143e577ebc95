//! Item operations.

use badnews_core::{Error, Item, Result};
use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use tokio::sync::mpsc;
use tracing::debug;

use crate::queries::QueryId;
use crate::store::{Store, col_i64, col_text, decode_ts, decode_url, storage_err, text_value, ts_value};

pub(crate) fn decode_rating(raw: i64) -> Result<i8> {
    match raw {
        -1 | 0 | 1 => Ok(raw as i8),
        other => Err(Error::InvalidValue(format!("rating {other} out of range"))),
    }
}

/// Decode an item row laid out as (id, feed_id, url, timestamp, headline,
/// description, rating).
fn decode_item(row: &Row) -> Result<Item> {
    let mut item = Item::new(
        col_i64(row, 1)?,
        decode_url(&col_text(row, 2)?)?,
        decode_ts(col_i64(row, 3)?)?,
        col_text(row, 4)?,
        col_text(row, 5)?,
    );
    item.id = col_i64(row, 0)?;
    item.rating = decode_rating(col_i64(row, 6)?)?;
    Ok(item)
}

impl Store {
    /// Enter an item into the database, assigning its id.
    pub async fn item_add(&self, i: &mut Item) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self.item_add_inner(i).await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res
    }

    async fn item_add_inner(&self, i: &mut Item) -> Result<()> {
        let mut rows = self
            .query(
                QueryId::ItemAdd,
                vec![
                    Value::Integer(i.feed_id),
                    text_value(i.url.as_str()),
                    ts_value(i.timestamp),
                    text_value(&i.headline),
                    text_value(&i.description),
                ],
            )
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                i.id = col_i64(&row, 0)?;
                Ok(())
            }
            None => Err(Error::Storage("ItemAdd did not return an id".into())),
        }
    }

    /// True if an item with the same URL is already stored.
    pub async fn item_exists(&self, i: &Item) -> Result<bool> {
        let mut rows = self
            .query(QueryId::ItemExists, vec![text_value(i.url.as_str())])
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(col_i64(&row, 0)? > 0),
            None => Ok(false),
        }
    }

    /// Load an item by its id.
    pub async fn item_get_by_id(&self, id: i64) -> Result<Option<Item>> {
        let mut rows = self
            .query(QueryId::ItemGetById, vec![Value::Integer(id)])
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let mut item = Item::new(
                    col_i64(&row, 0)?,
                    decode_url(&col_text(&row, 1)?)?,
                    decode_ts(col_i64(&row, 2)?)?,
                    col_text(&row, 3)?,
                    col_text(&row, 4)?,
                );
                item.id = id;
                item.rating = decode_rating(col_i64(&row, 5)?)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Load a feed's items, newest first.
    pub async fn item_get_by_feed(&self, feed_id: i64, limit: i64, offset: i64) -> Result<Vec<Item>> {
        let mut rows = self
            .query(
                QueryId::ItemGetByFeed,
                vec![
                    Value::Integer(feed_id),
                    Value::Integer(limit),
                    Value::Integer(offset),
                ],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let mut item = Item::new(
                feed_id,
                decode_url(&col_text(&row, 1)?)?,
                decode_ts(col_i64(&row, 2)?)?,
                col_text(&row, 3)?,
                col_text(&row, 4)?,
            );
            item.id = col_i64(&row, 0)?;
            item.rating = decode_rating(col_i64(&row, 5)?)?;
            items.push(item);
        }

        Ok(items)
    }

    /// Load all items newer than the given time, newest first.
    pub async fn item_get_recent(&self, begin: DateTime<Utc>) -> Result<Vec<Item>> {
        let mut rows = self
            .query(QueryId::ItemGetRecent, vec![ts_value(begin)])
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(decode_item(&row)?);
        }

        Ok(items)
    }

    /// Load a page of items across all feeds, newest first.
    pub async fn item_get_recent_paged(&self, cnt: i64, offset: i64) -> Result<Vec<Item>> {
        let mut rows = self
            .query(
                QueryId::ItemGetRecentPaged,
                vec![Value::Integer(cnt), Value::Integer(offset)],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(decode_item(&row)?);
        }

        Ok(items)
    }

    /// Load the items within a closed timestamp range.
    pub async fn item_get_by_period(
        &self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Item>> {
        let mut rows = self
            .query(
                QueryId::ItemGetByPeriod,
                vec![ts_value(begin), ts_value(end)],
            )
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(decode_item(&row)?);
        }

        Ok(items)
    }

    /// Load all items with a nonzero rating, newest first.
    pub async fn item_get_rated(&self) -> Result<Vec<Item>> {
        let mut rows = self.query(QueryId::ItemGetRated, Vec::new()).await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(decode_item(&row)?);
        }

        Ok(items)
    }

    /// Scan every item, applying a predicate and sending matches down the
    /// channel. The channel closes when the scan finishes. A URL that
    /// fails to parse aborts the scan with an error.
    pub async fn item_get_filtered<F>(&self, q: mpsc::Sender<Item>, filter: F) -> Result<()>
    where
        F: Fn(&Item) -> bool + Send,
    {
        let mut rows = self.query(QueryId::ItemGetAll, Vec::new()).await?;

        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let item = decode_item(&row)?;

            if filter(&item) && q.send(item).await.is_err() {
                // The consumer is gone; no point scanning further.
                debug!("ItemGetFiltered consumer hung up, stopping scan");
                break;
            }
        }

        Ok(())
    }

    /// Set an item's rating. Only -1, 0 and 1 are legal.
    pub async fn item_rate(&self, i: &mut Item, rating: i8) -> Result<()> {
        if !(-1..=1).contains(&rating) {
            return Err(Error::InvalidValue(format!(
                "rating {rating} out of range"
            )));
        }

        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::ItemRate,
                vec![Value::Integer(i64::from(rating)), Value::Integer(i.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        i.rating = rating;
        Ok(())
    }

    /// Clear an item's rating.
    pub async fn item_unrate(&self, i: &mut Item) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(QueryId::ItemUnrate, vec![Value::Integer(i.id)])
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        i.rating = 0;
        Ok(())
    }

    /// Remove all of a feed's items.
    pub async fn item_delete_by_feed(&self, feed_id: i64) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(QueryId::ItemDeleteByFeed, vec![Value::Integer(feed_id)])
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res.map(|_| ())
    }
}
