//! # badnews Classify
//!
//! The learned side of the aggregator:
//!
//! - [`language`]: heuristic German/English detection with a panic-safe
//!   English fallback
//! - [`BayesModel`]: multinomial naive Bayes over the per-language token
//!   stores
//! - [`Judge`]: the binary interesting/boring rater
//! - [`Advisor`]: the multi-label tag suggester
//! - [`BusyBee`]: the background worker that keeps both caches warm
//!
//! Judge and Advisor each keep one model per language and a result cache
//! keyed by item id; user ratings and tag links feed back into the models
//! through `learn`/`unlearn`.

pub mod advisor;
pub mod busybee;
pub mod judge;
pub mod language;
mod model;
mod tokenize;

pub use advisor::Advisor;
pub use busybee::BusyBee;
pub use judge::Judge;
pub use language::Language;
pub use model::BayesModel;
