//! # badnews Storage
//!
//! The aggregator's persistence layer: a libsql (SQLite) database file
//! behind a small, named operation set.
//!
//! - [`Store`] wraps one connection together with its per-connection
//!   state: the statement cache, the active-transaction flag and the
//!   savepoint name table. Operations either join the caller's open
//!   transaction or run in an ad-hoc one that commits on success.
//! - [`Pool`] holds N eagerly opened stores; `get` blocks until one is
//!   free, `get_nowait` opens an extra connection instead, and `put`
//!   rolls back anything left open before waking a waiter.
//!
//! Transient `database is locked/busy` errors are retried locally every
//! 25 ms and never surfaced to callers.

mod feeds;
mod items;
mod pool;
mod queries;
mod schema;
mod searches;
mod stmt_cache;
mod store;
mod tags;

#[cfg(test)]
mod tests;

pub use pool::Pool;
pub use queries::QueryId;
pub use store::Store;
