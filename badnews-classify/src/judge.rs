//! The judge rates news items as boring or interesting.

use std::sync::Arc;
use std::time::Duration;

use badnews_cache::ResultCache;
use badnews_core::{Error, Item, Paths, Result};
use badnews_storage::Store;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::language::{self, Language};
use crate::model::{BayesModel, CLASS_UNKNOWN};

pub const RATING_INTERESTING: &str = "interesting";
pub const RATING_BORING: &str = "boring";

const CACHE_TIMEOUT: Duration = Duration::from_secs(240 * 60);
const BACKOFF_DELAY: Duration = Duration::from_millis(25);

pub(crate) struct Models {
    de: BayesModel,
    en: BayesModel,
}

impl Models {
    pub(crate) fn new(de: BayesModel, en: BayesModel) -> Self {
        Self { de, en }
    }

    pub(crate) fn get(&self, lang: Language) -> &BayesModel {
        match lang {
            Language::De => &self.de,
            Language::En => &self.en,
        }
    }
}

/// The binary classifier guessing ratings for items nobody has rated by
/// hand. Ratings are served from the shared result cache when warm;
/// learning takes the writer side of the lock.
pub struct Judge {
    db: Store,
    models: RwLock<Models>,
    cache: Arc<ResultCache>,
}

impl Judge {
    pub async fn create(paths: &Paths, cache: Arc<ResultCache>) -> Result<Judge> {
        let db = Store::open(paths.database()).await?;
        let de = BayesModel::open(Language::De, paths.judge_store(Language::De.code())).await?;
        let en = BayesModel::open(Language::En, paths.judge_store(Language::En.code())).await?;

        Ok(Judge {
            db,
            models: RwLock::new(Models::new(de, en)),
            cache,
        })
    }

    /// True if a rating for the item is already cached.
    pub async fn in_cache(&self, item: &Item) -> bool {
        match self.cache.lookup(&item.id_string()).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                error!(item = item.id, error = %e, "Error looking up item in judge cache");
                false
            }
        }
    }

    /// Compute (or fetch from cache) the model's rating for the item.
    /// On a cache miss the guessed rating is set from the fresh label.
    pub async fn rate(&self, item: &mut Item) -> Result<String> {
        let models = self.models.read().await;
        let idstr = item.id_string();

        match self.cache.lookup(&idstr).await {
            Ok(Some((rating, _))) if !rating.is_empty() => return Ok(rating),
            Ok(_) => {}
            Err(e) => {
                error!(
                    item = item.id,
                    headline = item.headline,
                    error = %e,
                    "Failed to look up item in judge cache"
                );
            }
        }

        let (lang, body) = language::guess(item);
        let rating = models.get(lang).classify(&body).await?;

        match rating.as_str() {
            RATING_INTERESTING => item.guessed = 1,
            RATING_BORING => item.guessed = -1,
            CLASS_UNKNOWN => {}
            other => error!(rating = other, "Unexpected rating from model"),
        }

        if let Err(e) = self.cache.install(&idstr, &rating, CACHE_TIMEOUT).await {
            error!(
                item = item.id,
                headline = item.headline,
                error = %e,
                "Failed to save rating in judge cache"
            );
        }

        Ok(rating)
    }

    fn bucket(item: &Item) -> Result<&'static str> {
        match item.rating {
            -1 => Ok(RATING_BORING),
            1 => Ok(RATING_INTERESTING),
            other => Err(Error::InvalidValue(format!(
                "invalid rating for item {} ({:?}): {other}",
                item.id, item.headline
            ))),
        }
    }

    /// Add a rated item to the training corpus. Requires a nonzero
    /// rating; the transient store error is backed off and retried.
    pub async fn learn(&self, item: &Item) -> Result<()> {
        let models = self.models.write().await;
        let bucket = Self::bucket(item)?;
        let (lang, body) = language::guess(item);

        loop {
            match models.get(lang).learn(bucket, &body).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient_model() => sleep(BACKOFF_DELAY).await,
                Err(e) => {
                    error!(
                        item = item.id,
                        headline = item.headline,
                        error = %e,
                        "Failed to learn item"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Remove a rated item from the training corpus again.
    pub async fn unlearn(&self, item: &Item) -> Result<()> {
        let models = self.models.write().await;
        let bucket = Self::bucket(item)?;
        let (lang, body) = language::guess(item);

        models.get(lang).forget(bucket, &body).await.map_err(|e| {
            error!(
                item = item.id,
                headline = item.headline,
                error = %e,
                "Failed to unlearn item"
            );
            e
        })
    }

    /// Learn every rated item in the database.
    pub async fn train(&self) -> Result<()> {
        let items = self.db.item_get_rated().await.map_err(|e| {
            error!(error = %e, "Cannot load rated items");
            e
        })?;

        debug!(items = items.len(), "Training classifier");

        for item in &items {
            self.learn(item).await?;
        }

        Ok(())
    }

    /// Discard the training data of both languages.
    pub async fn reset(&self) -> Result<()> {
        let models = self.models.write().await;
        models.de.reset().await?;
        models.en.reset().await?;
        Ok(())
    }
}
