//! The advisor suggests tags for news items.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use badnews_cache::ResultCache;
use badnews_core::{Item, Paths, Result, SuggestedTag, Tag};
use badnews_storage::Store;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error};

use crate::judge::Models;
use crate::language::{self, Language};
use crate::model::{BayesModel, CLASS_UNKNOWN};

const CACHE_TIMEOUT: Duration = Duration::from_secs(240 * 60);
const BACKOFF_DELAY: Duration = Duration::from_millis(25);

/// The multi-class counterpart to the judge: classes are tag names, and
/// a suggestion pairs a tag with the model's confidence. Suggestion
/// lists are cached JSON-serialized under the item's id; learning and
/// unlearning invalidate the entry so the next request recomputes.
pub struct Advisor {
    db: Store,
    models: RwLock<Models>,
    tags: parking_lot::RwLock<HashMap<String, Tag>>,
    cache: Arc<ResultCache>,
}

impl Advisor {
    pub async fn create(paths: &Paths, cache: Arc<ResultCache>) -> Result<Advisor> {
        let db = Store::open(paths.database()).await?;
        let de = BayesModel::open(Language::De, paths.advisor_store(Language::De.code())).await?;
        let en = BayesModel::open(Language::En, paths.advisor_store(Language::En.code())).await?;

        let adv = Advisor {
            db,
            models: RwLock::new(Models::new(de, en)),
            tags: parking_lot::RwLock::new(HashMap::new()),
            cache,
        };

        adv.load_tags().await?;
        Ok(adv)
    }

    /// Refresh the name -> tag table the suggestions are matched
    /// against.
    async fn load_tags(&self) -> Result<()> {
        let tags = self.db.tag_get_all().await.map_err(|e| {
            error!(error = %e, "Cannot load tags from database");
            e
        })?;

        let mut map = HashMap::with_capacity(tags.len());
        for t in tags {
            map.insert(t.name.clone(), t);
        }

        *self.tags.write() = map;
        Ok(())
    }

    /// True if a suggestion list for the item is already cached.
    pub async fn in_cache(&self, item: &Item) -> bool {
        match self.cache.lookup(&item.id_string()).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                error!(item = item.id, error = %e, "Error looking up item in advice cache");
                false
            }
        }
    }

    /// Up to `n` tag suggestions for the item, best first. Tags already
    /// attached to the item are left out. Failures are logged and yield
    /// an empty list.
    pub async fn suggest(&self, item: &Item, n: usize) -> Vec<SuggestedTag> {
        let idstr = item.id_string();

        match self.cache.lookup(&idstr).await {
            Ok(Some((serialized, _))) if !serialized.is_empty() => {
                match serde_json::from_str::<Vec<SuggestedTag>>(&serialized) {
                    Ok(list) => {
                        let cnt = list.len().min(n);
                        return list[..cnt].to_vec();
                    }
                    Err(e) => {
                        error!(error = %e, cached = serialized, "Failed to parse cached suggestions");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(item = item.id, error = %e, "Error looking up item in advice cache");
            }
        }

        let scores = {
            let models = self.models.read().await;
            let (lang, body) = language::guess(item);

            match models.get(lang).score(&body).await {
                Ok(scores) => scores,
                Err(e) => {
                    error!(
                        item = item.id,
                        headline = item.headline,
                        error = %e,
                        "Failed to score item"
                    );
                    return Vec::new();
                }
            }
        };

        let mut list = Vec::with_capacity(scores.len());
        {
            let tags = self.tags.read();

            for (class, score) in scores {
                if class == CLASS_UNKNOWN {
                    continue;
                }

                match tags.get(&class) {
                    Some(tag) => {
                        if !item.has_tag(tag.id) {
                            list.push(SuggestedTag {
                                tag: tag.clone(),
                                score: score * 100.0,
                            });
                        }
                    }
                    None => {
                        error!(
                            item = item.id,
                            headline = item.headline,
                            class,
                            "Model suggested a class that matches no tag"
                        );
                    }
                }
            }
        }

        list.sort_by(|a, b| b.score.total_cmp(&a.score));

        match serde_json::to_string(&list) {
            Ok(buf) => {
                if let Err(e) = self.cache.install(&idstr, &buf, CACHE_TIMEOUT).await {
                    error!(item = item.id, error = %e, "Failed to cache tag advice");
                }
            }
            Err(e) => error!(error = %e, "Failed to serialize suggestion list"),
        }

        list.truncate(list.len().min(n));
        list
    }

    /// Record that the tag applies to the item, and drop the item's
    /// cached advice so the next request sees the change.
    pub async fn learn(&self, tag: &Tag, item: &Item) -> Result<()> {
        {
            let models = self.models.write().await;
            let (lang, body) = language::guess(item);

            loop {
                match models.get(lang).learn(&tag.name, &body).await {
                    Ok(()) => break,
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

        if let Err(e) = self.cache.delete(&item.id_string()).await {
            error!(item = item.id, error = %e, "Failed to delete cached advice");
        }

        Ok(())
    }

    /// Remove the tag/item association from the corpus, dropping the
    /// cached advice as well.
    pub async fn unlearn(&self, tag: &Tag, item: &Item) -> Result<()> {
        {
            let models = self.models.write().await;
            let (lang, body) = language::guess(item);

            loop {
                match models.get(lang).forget(&tag.name, &body).await {
                    Ok(()) => break,
                    Err(e) if e.is_transient_model() => sleep(BACKOFF_DELAY).await,
                    Err(e) => {
                        error!(
                            item = item.id,
                            headline = item.headline,
                            error = %e,
                            "Failed to unlearn item"
                        );
                        return Err(e);
                    }
                }
            }
        }

        if let Err(e) = self.cache.delete(&item.id_string()).await {
            error!(item = item.id, error = %e, "Failed to delete cached advice");
        }

        Ok(())
    }

    /// Rebuild the corpus from scratch: reset both language models, then
    /// learn every tag over the items it is linked to.
    pub async fn train(&self) -> Result<()> {
        {
            let models = self.models.write().await;
            debug!("Resetting advisor models");
            models.get(Language::De).reset().await?;
            models.get(Language::En).reset().await?;
        }

        self.load_tags().await?;

        let tags = self.db.tag_get_all().await?;
        for tag in &tags {
            let items = self.db.tag_link_get_by_tag(tag).await.map_err(|e| {
                error!(tag = tag.name, error = %e, "Failed to load items for tag");
                e
            })?;

            for item in &items {
                self.learn(tag, item).await?;
            }
        }

        Ok(())
    }
}
