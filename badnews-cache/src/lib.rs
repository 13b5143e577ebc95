//! # badnews Cache
//!
//! redb-backed embedded key-value storage for the aggregator's derived
//! data. Two kinds of store live here:
//!
//! - [`ResultCache`]: a string cache with per-entry expiry, shared shape
//!   for the judge's ratings and the advisor's suggestion lists. Each
//!   consumer opens its own database file, so their key spaces cannot
//!   collide.
//! - [`TokenStore`]: per-language class/token frequency tables, the
//!   persistent substrate of the Bayesian models. Strictly derived data;
//!   it can be discarded and retrained.
//!
//! redb is synchronous, so all I/O runs under `spawn_blocking`.

mod result_cache;
mod token_store;

pub use result_cache::ResultCache;
pub use token_store::{ClassTokenStats, CorpusStats, TokenStore};
