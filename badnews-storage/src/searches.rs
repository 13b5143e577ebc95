//! Stored-search operations.
//!
//! The tag set and the result list are legacy-encoded as comma-joined
//! decimal id lists in their columns; the API works with typed lists and
//! resolves result ids to full items on read.

use badnews_core::{Error, Result, Search};
use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use tracing::warn;

use crate::queries::QueryId;
use crate::store::{
    Store, bool_value, col_i64, col_opt_i64, col_opt_text, col_text, decode_ts, storage_err,
    text_value, ts_value,
};

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_ids(s: &str) -> Result<Vec<i64>> {
    if s.is_empty() {
        return Ok(Vec::new());
    }

    s.split(',')
        .map(|part| {
            part.parse::<i64>()
                .map_err(|e| Error::InvalidValue(format!("bad id {part:?} in id list: {e}")))
        })
        .collect()
}

fn decode_period(
    flag: i64,
    begin: Option<i64>,
    end: Option<i64>,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    if flag == 0 {
        return Ok(None);
    }

    match (begin, end) {
        (Some(b), Some(e)) => Ok(Some((decode_ts(b)?, decode_ts(e)?))),
        _ => Err(Error::InvalidValue(
            "period filter set but begin/end missing".into(),
        )),
    }
}

fn opt_ts(row: &Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    match col_opt_i64(row, idx)? {
        Some(secs) => Ok(Some(decode_ts(secs)?)),
        None => Ok(None),
    }
}

impl Store {
    /// Enter a search into the database, assigning its id.
    pub async fn search_add(&self, s: &mut Search) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self.search_add_inner(s).await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res
    }

    async fn search_add_inner(&self, s: &mut Search) -> Result<()> {
        let (begin, end) = match s.filter_period {
            Some((b, e)) => (ts_value(b), ts_value(e)),
            None => (Value::Null, Value::Null),
        };

        let mut rows = self
            .query(
                QueryId::SearchAdd,
                vec![
                    text_value(&s.title),
                    ts_value(s.time_created),
                    text_value(&join_ids(&s.tags)),
                    bool_value(s.tags_all),
                    bool_value(s.filter_period.is_some()),
                    begin,
                    end,
                    text_value(&s.query_string),
                    bool_value(s.regex),
                ],
            )
            .await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                s.id = col_i64(&row, 0)?;
                Ok(())
            }
            None => Err(Error::Storage("SearchAdd did not return an id".into())),
        }
    }

    /// Remove a search.
    pub async fn search_delete(&self, s: &Search) -> Result<()> {
        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(QueryId::SearchDelete, vec![Value::Integer(s.id)])
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;
        res.map(|_| ())
    }

    /// Look up a search by id. Result ids are resolved to full items;
    /// ids whose item has since been deleted are skipped with a warning.
    pub async fn search_get_by_id(&self, id: i64) -> Result<Option<Search>> {
        let raw = {
            let mut rows = self
                .query(QueryId::SearchGetById, vec![Value::Integer(id)])
                .await?;

            match rows.next().await.map_err(storage_err)? {
                None => return Ok(None),
                Some(row) => {
                    let tags = parse_ids(&col_text(&row, 6)?)?;
                    let result_ids = parse_ids(&col_opt_text(&row, 13)?.unwrap_or_default())?;

                    (
                        Search {
                            id,
                            title: col_text(&row, 0)?,
                            time_created: decode_ts(col_i64(&row, 1)?)?,
                            time_started: opt_ts(&row, 2)?,
                            time_finished: opt_ts(&row, 3)?,
                            status: col_i64(&row, 4)? != 0,
                            message: col_text(&row, 5)?,
                            tags,
                            tags_all: col_i64(&row, 7)? != 0,
                            filter_period: decode_period(
                                col_i64(&row, 8)?,
                                col_opt_i64(&row, 9)?,
                                col_opt_i64(&row, 10)?,
                            )?,
                            query_string: col_text(&row, 11)?,
                            regex: col_i64(&row, 12)? != 0,
                            results: Vec::new(),
                        },
                        result_ids,
                    )
                }
            }
        };

        let (mut search, result_ids) = raw;
        search.results = self.resolve_results(search.id, &result_ids).await?;
        Ok(Some(search))
    }

    async fn resolve_results(
        &self,
        search_id: i64,
        ids: &[i64],
    ) -> Result<Vec<badnews_core::Item>> {
        let mut items = Vec::with_capacity(ids.len());

        for &rid in ids {
            match self.item_get_by_id(rid).await? {
                Some(item) => items.push(item),
                None => warn!(
                    search = search_id,
                    item = rid,
                    "Search references an item that no longer exists"
                ),
            }
        }

        Ok(items)
    }

    /// The oldest search that has not been started yet.
    pub async fn search_get_next_pending(&self) -> Result<Option<Search>> {
        let mut rows = self.query(QueryId::SearchGetNextPending, Vec::new()).await?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(Search {
                id: col_i64(&row, 0)?,
                title: col_text(&row, 1)?,
                time_created: decode_ts(col_i64(&row, 2)?)?,
                time_started: None,
                time_finished: None,
                status: false,
                message: String::new(),
                tags: parse_ids(&col_text(&row, 3)?)?,
                tags_all: col_i64(&row, 4)? != 0,
                filter_period: decode_period(
                    col_i64(&row, 5)?,
                    col_opt_i64(&row, 6)?,
                    col_opt_i64(&row, 7)?,
                )?,
                query_string: col_text(&row, 8)?,
                regex: col_i64(&row, 9)? != 0,
                results: Vec::new(),
            })),
            None => Ok(None),
        }
    }

    /// All searches that have been started but not finished, oldest
    /// start first.
    pub async fn search_get_active(&self) -> Result<Vec<Search>> {
        let mut rows = self.query(QueryId::SearchGetActive, Vec::new()).await?;

        let mut searches = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            searches.push(Search {
                id: col_i64(&row, 0)?,
                title: col_text(&row, 1)?,
                time_created: decode_ts(col_i64(&row, 2)?)?,
                time_started: opt_ts(&row, 3)?,
                time_finished: None,
                status: col_i64(&row, 4)? != 0,
                message: col_text(&row, 5)?,
                tags: parse_ids(&col_text(&row, 6)?)?,
                tags_all: col_i64(&row, 7)? != 0,
                filter_period: decode_period(
                    col_i64(&row, 8)?,
                    col_opt_i64(&row, 9)?,
                    col_opt_i64(&row, 10)?,
                )?,
                query_string: col_text(&row, 11)?,
                regex: col_i64(&row, 12)? != 0,
                results: Vec::new(),
            });
        }

        Ok(searches)
    }

    /// All searches, oldest first, with results resolved.
    pub async fn search_get_all(&self) -> Result<Vec<Search>> {
        let mut raw = Vec::new();

        {
            let mut rows = self.query(QueryId::SearchGetAll, Vec::new()).await?;

            while let Some(row) = rows.next().await.map_err(storage_err)? {
                let result_ids = parse_ids(&col_opt_text(&row, 14)?.unwrap_or_default())?;

                raw.push((
                    Search {
                        id: col_i64(&row, 0)?,
                        title: col_text(&row, 1)?,
                        time_created: decode_ts(col_i64(&row, 2)?)?,
                        time_started: opt_ts(&row, 3)?,
                        time_finished: opt_ts(&row, 4)?,
                        status: col_i64(&row, 5)? != 0,
                        message: col_text(&row, 6)?,
                        tags: parse_ids(&col_text(&row, 7)?)?,
                        tags_all: col_i64(&row, 8)? != 0,
                        filter_period: decode_period(
                            col_i64(&row, 9)?,
                            col_opt_i64(&row, 10)?,
                            col_opt_i64(&row, 11)?,
                        )?,
                        query_string: col_text(&row, 12)?,
                        regex: col_i64(&row, 13)? != 0,
                        results: Vec::new(),
                    },
                    result_ids,
                ));
            }
        }

        let mut searches = Vec::with_capacity(raw.len());
        for (mut search, result_ids) in raw {
            search.results = self.resolve_results(search.id, &result_ids).await?;
            searches.push(search);
        }

        Ok(searches)
    }

    /// Persist a start timestamp, clearing any previous finish so the
    /// search counts as active again.
    pub async fn search_start(&self, s: &mut Search) -> Result<()> {
        let now = Utc::now();

        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::SearchStart,
                vec![ts_value(now), Value::Integer(s.id)],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        s.time_started = Some(now);
        s.time_finished = None;
        Ok(())
    }

    /// Persist the outcome of an execution: finish timestamp, status,
    /// message and the result id list.
    pub async fn search_finish(
        &self,
        s: &mut Search,
        status: bool,
        message: &str,
        results: &[i64],
    ) -> Result<()> {
        let now = Utc::now();

        let adhoc = self.adhoc_begin().await?;
        let res = self
            .exec(
                QueryId::SearchFinish,
                vec![
                    ts_value(now),
                    bool_value(status),
                    text_value(message),
                    text_value(&join_ids(results)),
                    Value::Integer(s.id),
                ],
            )
            .await;
        self.adhoc_end(adhoc, res.is_ok()).await;

        res?;
        s.time_finished = Some(now);
        s.status = status;
        s.message = message.to_string();
        Ok(())
    }
}
