//! Tag and tag-link operations.

use std::collections::HashMap;

use badnews_core::{Error, Item, Result, Tag};
use libsql::Value;
use tracing::debug;

use crate::items::decode_rating;
use crate::queries::QueryId;
use crate::store::{
    Store, col_i64, col_opt_i64, col_text, decode_ts, decode_url, opt_i64_value, storage_err,
    text_value,
};

impl Store {
    /// Enter a tag into the database, assigning its id. The (name,
    /// parent) pair must be unique within its scope.
    pub async fn tag_add(&self, t: &mut Tag) -> Result<()> {
        if t.name.is_empty() {
            return Err(Error::InvalidValue("tag name must not be empty".into()));
        }

        let adhoc = self.adhoc_begin().await?;
        let res = self.tag_add_inner(t).await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res
    }

    async fn tag_add_inner(&self, t: &mut Tag) -> Result<()> {
        let mut rows = self
            .query(
                QueryId::TagAdd,
                vec![text_value(&t.name), opt_i64_value(t.parent)],
            )
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                t.id = col_i64(&row, 0)?;
                Ok(())
            }
            None => Err(Error::Storage("TagAdd did not return an id".into())),
        }
    }

    /// Load a tag by its id.
    pub async fn tag_get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let mut rows = self
            .query(QueryId::TagGetById, vec![Value::Integer(id)])
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(Tag {
                id,
                name: col_text(&row, 0)?,
                parent: col_opt_i64(&row, 1)?,
                level: 0,
                full_name: String::new(),
            })),
            None => Ok(None),
        }
    }

    /// Load a tag's direct children.
    pub async fn tag_get_children(&self, t: &Tag) -> Result<Vec<Tag>> {
        let mut rows = self
            .query(QueryId::TagGetChildren, vec![Value::Integer(t.id)])
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            tags.push(Tag {
                id: col_i64(&row, 0)?,
                name: col_text(&row, 1)?,
                parent: Some(t.id),
                level: 0,
                full_name: String::new(),
            });
        }

        Ok(tags)
    }

    /// Load all tags, parents before children.
    pub async fn tag_get_all(&self) -> Result<Vec<Tag>> {
        let mut rows = self.query(QueryId::TagGetAll, Vec::new()).await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            tags.push(Tag {
                id: col_i64(&row, 0)?,
                parent: col_opt_i64(&row, 1)?,
                name: col_text(&row, 2)?,
                level: 0,
                full_name: String::new(),
            });
        }

        Ok(tags)
    }

    /// Load the whole tag tree with levels and `/`-joined full names,
    /// ordered by full name.
    pub async fn tag_get_sorted(&self) -> Result<Vec<Tag>> {
        let mut rows = self.query(QueryId::TagGetSorted, Vec::new()).await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            // The CTE reports 0 for root tags' parent.
            let parent = match col_i64(&row, 2)? {
                0 => None,
                p => Some(p),
            };

            tags.push(Tag {
                id: col_i64(&row, 0)?,
                name: col_text(&row, 1)?,
                parent,
                level: col_i64(&row, 3)?,
                full_name: col_text(&row, 4)?,
            });
        }

        Ok(tags)
    }

    /// The number of items linked to each tag, including zero counts.
    pub async fn tag_get_item_cnt(&self) -> Result<HashMap<i64, i64>> {
        let mut rows = self.query(QueryId::TagGetItemCnt, Vec::new()).await?;

        let mut counts = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            counts.insert(col_i64(&row, 0)?, col_i64(&row, 1)?);
        }

        Ok(counts)
    }

    /// Rename a tag. The new name must be unique among its siblings.
    pub async fn tag_rename(&self, t: &mut Tag, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidValue("tag name must not be empty".into()));
        }

        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::TagRename,
                vec![text_value(name), Value::Integer(t.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        t.name = name.to_string();
        Ok(())
    }

    /// Walk from `start` up to the roots, failing if `needle` appears on
    /// the path. Guards re-parenting against transitive cycles.
    async fn tag_check_cycle(&self, needle: i64, start: Option<i64>) -> Result<()> {
        let mut current = start;

        while let Some(id) = current {
            if id == needle {
                return Err(Error::InvalidValue(format!(
                    "tag {needle} would become its own ancestor"
                )));
            }

            current = match self.tag_get_by_id(id).await? {
                Some(tag) => tag.parent,
                None => None,
            };
        }

        Ok(())
    }

    /// Move a tag under a new parent (or to the root). Cycles, direct or
    /// transitive, are rejected.
    pub async fn tag_set_parent(&self, t: &mut Tag, parent: Option<i64>) -> Result<()> {
        self.tag_check_cycle(t.id, parent).await?;

        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::TagSetParent,
                vec![opt_i64_value(parent), Value::Integer(t.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        t.parent = parent;
        Ok(())
    }

    /// Rename and re-parent a tag in one step.
    pub async fn tag_update(&self, t: &mut Tag, name: &str, parent: Option<i64>) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidValue("tag name must not be empty".into()));
        }
        self.tag_check_cycle(t.id, parent).await?;

        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::TagUpdate,
                vec![text_value(name), opt_i64_value(parent), Value::Integer(t.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        t.name = name.to_string();
        t.parent = parent;
        Ok(())
    }

    /// Delete a tag; children and links go with it.
    pub async fn tag_delete(&self, t: &Tag) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(QueryId::TagDelete, vec![Value::Integer(t.id)])
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res.map(|_| ())
    }

    // ── Tag links ───────────────────────────────────────────────────

    /// Attach a tag to an item. At most one link may exist per pair.
    pub async fn tag_link_add(&self, item: &Item, tag: &Tag) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::TagLinkAdd,
                vec![Value::Integer(tag.id), Value::Integer(item.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res.map(|_| ())
    }

    /// Detach a tag from an item.
    pub async fn tag_link_delete(&self, item: &Item, tag: &Tag) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::TagLinkDelete,
                vec![Value::Integer(tag.id), Value::Integer(item.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res.map(|_| ())
    }

    /// Remove every link that points at one of the feed's items.
    pub async fn tag_link_delete_by_feed(&self, feed_id: i64) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(QueryId::TagLinkDeleteByFeed, vec![Value::Integer(feed_id)])
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res.map(|_| ())
    }

    /// The tags attached to an item.
    pub async fn tag_link_get_by_item(&self, item: &Item) -> Result<Vec<Tag>> {
        let mut rows = self
            .query(QueryId::TagLinkGetByItem, vec![Value::Integer(item.id)])
            .await?;

        let mut tags = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            tags.push(Tag {
                id: col_i64(&row, 0)?,
                parent: col_opt_i64(&row, 1)?,
                name: col_text(&row, 2)?,
                level: 0,
                full_name: String::new(),
            });
        }

        Ok(tags)
    }

    /// The items a tag is attached to.
    pub async fn tag_link_get_by_tag(&self, tag: &Tag) -> Result<Vec<Item>> {
        let mut rows = self
            .query(QueryId::TagLinkGetByTag, vec![Value::Integer(tag.id)])
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(decode_linked_item(&row)?);
        }

        Ok(items)
    }

    /// The items a tag is attached to, keyed by item id. Used by the
    /// search executor's set operations.
    pub async fn tag_link_get_by_tag_map(&self, tag: &Tag) -> Result<HashMap<i64, Item>> {
        let mut rows = self
            .query(QueryId::TagLinkGetByTag, vec![Value::Integer(tag.id)])
            .await?;

        let mut items = HashMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let item = decode_linked_item(&row)?;
            items.insert(item.id, item);
        }

        Ok(items)
    }

    /// The distinct items linked to the given tag or any of its
    /// descendants, ordered by item timestamp.
    pub async fn tag_link_get_by_tag_hierarchy(&self, root: i64) -> Result<Vec<Item>> {
        let mut rows = self
            .query(QueryId::TagLinkGetByTagHierarchy, vec![Value::Integer(root)])
            .await?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            items.push(decode_linked_item(&row)?);
        }

        debug!(root, items = items.len(), "Loaded items for tag hierarchy");
        Ok(items)
    }
}

fn decode_linked_item(row: &libsql::Row) -> Result<Item> {
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
