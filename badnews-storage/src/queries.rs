//! The named query catalog. Every database operation refers to one of
//! these by id; the per-connection statement cache tracks their use.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryId {
    FeedAdd,
    FeedGetById,
    FeedGetAll,
    FeedGetPending,
    FeedUpdateRefresh,
    FeedSetActive,
    FeedDelete,
    ItemAdd,
    ItemDeleteByFeed,
    ItemExists,
    ItemGetRecent,
    ItemGetRecentPaged,
    ItemGetById,
    ItemGetByFeed,
    ItemGetByPeriod,
    ItemGetRated,
    ItemGetAll,
    ItemRate,
    ItemUnrate,
    TagAdd,
    TagGetById,
    TagGetChildren,
    TagGetAll,
    TagGetSorted,
    TagGetItemCnt,
    TagRename,
    TagSetParent,
    TagUpdate,
    TagDelete,
    TagLinkAdd,
    TagLinkDelete,
    TagLinkDeleteByFeed,
    TagLinkGetByItem,
    TagLinkGetByTag,
    TagLinkGetByTagHierarchy,
    SearchAdd,
    SearchDelete,
    SearchGetById,
    SearchGetActive,
    SearchGetNextPending,
    SearchGetAll,
    SearchStart,
    SearchFinish,
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl QueryId {
    pub const fn sql(self) -> &'static str {
        match self {
            QueryId::FeedAdd => {
                r#"
INSERT INTO feed (title, url, homepage, interval)
          VALUES (    ?,   ?,        ?,        ?)
RETURNING id
"#
            }
            QueryId::FeedGetById => {
                r#"
SELECT
    title,
    url,
    homepage,
    interval,
    last_refresh,
    active
FROM feed
WHERE id = ?
"#
            }
            QueryId::FeedGetAll => {
                r#"
SELECT
    id,
    title,
    url,
    homepage,
    interval,
    last_refresh,
    active
FROM feed
ORDER BY title
"#
            }
            QueryId::FeedGetPending => {
                r#"
SELECT
    id,
    title,
    url,
    homepage,
    interval,
    last_refresh,
    active
FROM feed
WHERE (active <> 0) AND (last_refresh + interval < unixepoch())
"#
            }
            QueryId::FeedUpdateRefresh => {
                r#"
UPDATE feed
SET last_refresh = ?
WHERE id = ?
"#
            }
            QueryId::FeedSetActive => {
                r#"
UPDATE feed
SET active = ?
WHERE id = ?
"#
            }
            QueryId::FeedDelete => "DELETE FROM feed WHERE id = ?",
            QueryId::ItemAdd => {
                r#"
INSERT INTO item (feed_id, url, timestamp, headline, description)
          VALUES (      ?,   ?,         ?,        ?,           ?)
RETURNING id
"#
            }
            QueryId::ItemDeleteByFeed => "DELETE FROM item WHERE feed_id = ?",
            QueryId::ItemExists => "SELECT COUNT(id) FROM item WHERE url = ?",
            QueryId::ItemGetRecent => {
                r#"
SELECT
    id,
    feed_id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
WHERE timestamp > ?
ORDER BY timestamp DESC
"#
            }
            QueryId::ItemGetRecentPaged => {
                r#"
SELECT
    id,
    feed_id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
ORDER BY timestamp DESC
LIMIT ?
OFFSET ?
"#
            }
            QueryId::ItemGetById => {
                r#"
SELECT
    feed_id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
WHERE id = ?
"#
            }
            QueryId::ItemGetByFeed => {
                r#"
SELECT
    id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
WHERE feed_id = ?
ORDER BY timestamp DESC
LIMIT ?
OFFSET ?
"#
            }
            QueryId::ItemGetByPeriod => {
                r#"
SELECT
    id,
    feed_id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
WHERE timestamp BETWEEN ? AND ?
"#
            }
            QueryId::ItemGetRated => {
                r#"
SELECT
    id,
    feed_id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
WHERE rating <> 0
ORDER BY timestamp DESC
"#
            }
            QueryId::ItemGetAll => {
                r#"
SELECT
    id,
    feed_id,
    url,
    timestamp,
    headline,
    description,
    rating
FROM item
ORDER BY timestamp DESC
"#
            }
            QueryId::ItemRate => "UPDATE item SET rating = ? WHERE id = ?",
            QueryId::ItemUnrate => "UPDATE item SET rating = 0 WHERE id = ?",
            QueryId::TagAdd => {
                r#"
INSERT INTO tag (name, parent)
         VALUES (   ?,      ?)
RETURNING id
"#
            }
            QueryId::TagGetById => "SELECT name, parent FROM tag WHERE id = ?",
            QueryId::TagGetChildren => {
                r#"
SELECT
    id,
    name
FROM tag
WHERE parent = ?
"#
            }
            QueryId::TagGetAll => {
                r#"
SELECT
    id,
    parent,
    name
FROM tag
ORDER BY COALESCE(parent, 0), id
"#
            }
            QueryId::TagGetSorted => {
                r#"
WITH RECURSIVE children(id, name, lvl, root, parent, full_name) AS (
    SELECT
        id,
        name,
        0 AS lvl,
        id AS root,
        COALESCE(parent, 0) AS parent,
        name AS full_name
    FROM tag WHERE parent IS NULL
    UNION ALL
    SELECT
        tag.id,
        tag.name,
        lvl + 1 AS lvl,
        children.root,
        tag.parent,
        full_name || '/' || tag.name AS full_name
    FROM tag, children
    WHERE tag.parent = children.id
)

SELECT
        id,
        name,
        parent,
        lvl,
        full_name
FROM children
ORDER BY full_name
"#
            }
            QueryId::TagGetItemCnt => {
                r#"
WITH cnt_list (tag_id, cnt) AS (
    SELECT
        tag_id,
        COUNT(tag_id)
    FROM tag_link
    GROUP BY tag_id
)

SELECT
  t.id,
  COALESCE(c.cnt, 0)
FROM tag t
LEFT OUTER JOIN cnt_list c ON t.id = c.tag_id
"#
            }
            QueryId::TagRename => "UPDATE tag SET name = ? WHERE id = ?",
            QueryId::TagSetParent => "UPDATE tag SET parent = ? WHERE id = ?",
            QueryId::TagUpdate => "UPDATE tag SET name = ?, parent = ? WHERE id = ?",
            QueryId::TagDelete => "DELETE FROM tag WHERE id = ?",
            QueryId::TagLinkAdd => {
                r#"
INSERT INTO tag_link (tag_id, item_id)
              VALUES (     ?,       ?)
"#
            }
            QueryId::TagLinkDelete => "DELETE FROM tag_link WHERE tag_id = ? AND item_id = ?",
            QueryId::TagLinkDeleteByFeed => {
                r#"
WITH links (link_id, item_id, feed_id) AS (
     SELECT l.id,
            l.item_id,
            i.feed_id
     FROM tag_link l
     INNER JOIN item i ON l.item_id = i.id
)

DELETE FROM tag_link
WHERE item_id IN (SELECT item_id FROM links WHERE feed_id = ?)
"#
            }
            QueryId::TagLinkGetByItem => {
                r#"
SELECT
    t.id,
    t.parent,
    t.name
FROM tag_link l
INNER JOIN tag t ON l.tag_id = t.id
WHERE l.item_id = ?
"#
            }
            QueryId::TagLinkGetByTag => {
                r#"
SELECT
    i.id,
    i.feed_id,
    i.url,
    i.timestamp,
    i.headline,
    i.description,
    i.rating
FROM tag_link l
INNER JOIN item i ON l.item_id = i.id
WHERE tag_id = ?
"#
            }
            QueryId::TagLinkGetByTagHierarchy => {
                r#"
WITH RECURSIVE children(id, name, lvl, root, parent, full_name) AS (
    SELECT
        id,
        name,
        0 AS lvl,
        id AS root,
        COALESCE(parent, 0) AS parent,
        name AS full_name
    FROM tag WHERE parent IS NULL
    UNION ALL
    SELECT
        tag.id,
        tag.name,
        lvl + 1 AS lvl,
        children.root,
        tag.parent,
        full_name || '/' || tag.name AS full_name
    FROM tag, children
    WHERE tag.parent = children.id
)

SELECT DISTINCT
    i.id,
    i.feed_id,
    i.url,
    i.timestamp,
    i.headline,
    i.description,
    i.rating
FROM tag_link l
INNER JOIN item i ON l.item_id = i.id
WHERE l.tag_id IN (SELECT id FROM children WHERE root = ?)
ORDER BY i.timestamp
"#
            }
            QueryId::SearchAdd => {
                r#"
INSERT INTO search (title, time_created, tags, tags_all, filter_by_period, filter_period_begin, filter_period_end, query_string, regex)
            VALUES (    ?,            ?,    ?,        ?,                ?,                   ?,                 ?,            ?,     ?)
RETURNING id
"#
            }
            QueryId::SearchDelete => "DELETE FROM search WHERE id = ?",
            QueryId::SearchGetById => {
                r#"
SELECT
    title,
    time_created,
    time_started,
    time_finished,
    status,
    msg,
    tags,
    tags_all,
    filter_by_period,
    filter_period_begin,
    filter_period_end,
    query_string,
    regex,
    results
FROM search
WHERE id = ?
"#
            }
            QueryId::SearchGetActive => {
                r#"
SELECT
    id,
    title,
    time_created,
    time_started,
    status,
    msg,
    tags,
    tags_all,
    filter_by_period,
    filter_period_begin,
    filter_period_end,
    query_string,
    regex
FROM search
WHERE time_started IS NOT NULL AND time_finished IS NULL
ORDER BY time_started
"#
            }
            QueryId::SearchGetNextPending => {
                r#"
SELECT
    id,
    title,
    time_created,
    tags,
    tags_all,
    filter_by_period,
    filter_period_begin,
    filter_period_end,
    query_string,
    regex
FROM search
WHERE time_started IS NULL
ORDER BY time_created
LIMIT 1
"#
            }
            QueryId::SearchGetAll => {
                r#"
SELECT
    id,
    title,
    time_created,
    time_started,
    time_finished,
    status,
    msg,
    tags,
    tags_all,
    filter_by_period,
    filter_period_begin,
    filter_period_end,
    query_string,
    regex,
    results
FROM search
ORDER BY time_created
"#
            }
            QueryId::SearchStart => "UPDATE search SET time_started = ?, time_finished = NULL WHERE id = ?",
            QueryId::SearchFinish => {
                r#"
UPDATE search
SET time_finished = ?,
    status = ?,
    msg = ?,
    results = ?
WHERE id = ?
"#
            }
        }
    }
}
