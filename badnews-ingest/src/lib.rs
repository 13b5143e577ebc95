//! # badnews Ingest
//!
//! Fetching and parsing of RSS/Atom feeds, and the scheduled worker pool
//! that keeps the item table current.
//!
//! The wire side is isolated behind the [`FeedSource`] trait, a pure
//! `url -> (title, items)` function; the production implementation
//! fetches with reqwest and parses with feed-rs. The [`Reader`] runs one
//! scheduler task plus a configurable number of workers over a bounded
//! queue, deduplicating items by URL.

mod reader;
mod source;

pub use reader::Reader;
pub use source::{FeedSource, FetchedFeed, FetchedItem, HttpFeedSource};
