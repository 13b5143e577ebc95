//! # badnews Core
//!
//! Core data structures and types for the badnews feed aggregator.
//!
//! This crate provides the building blocks shared by every subsystem:
//!
//! - **Entities**: [`Feed`], [`Item`], [`Tag`], [`Search`] and the advisor's
//!   [`SuggestedTag`]
//! - **Errors**: the common [`Error`] enum with its transient-error
//!   predicates
//! - **Blacklist**: the ranked regex filter applied on read paths
//! - **Paths**: the application's base-directory layout
//!
//! Persistence lives in `badnews-storage`, the embedded caches in
//! `badnews-cache`; this crate deliberately has no database dependency.

pub mod blacklist;
pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use paths::Paths;
pub use types::{Feed, Item, Matcher, Search, SuggestedTag, Tag};
