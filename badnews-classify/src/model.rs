//! Multinomial naive Bayes over a persistent token store.

use std::path::Path;

use badnews_cache::TokenStore;
use badnews_core::Result;
use tracing::debug;

use crate::language::Language;
use crate::tokenize::tokenize;

/// The label returned when the model has no evidence to offer.
pub const CLASS_UNKNOWN: &str = "unknown";

/// A Bayesian text classifier for one language. Classes are free-form
/// strings; learning and forgetting are exact inverses, so a document
/// learned and then forgotten leaves the counts untouched.
pub struct BayesModel {
    lang: Language,
    store: TokenStore,
}

impl BayesModel {
    /// Open the model over the token store in the given directory.
    pub async fn open<P: AsRef<Path>>(lang: Language, dir: P) -> Result<Self> {
        let store = TokenStore::open(dir).await?;
        Ok(Self { lang, store })
    }

    /// Add a document to a class's corpus.
    pub async fn learn(&self, class: &str, text: &str) -> Result<()> {
        let tokens = tokenize(self.lang, text);
        debug!(class, tokens = tokens.len(), "Learning document");
        self.store.learn(class, tokens).await
    }

    /// Remove a document from a class's corpus.
    pub async fn forget(&self, class: &str, text: &str) -> Result<()> {
        let tokens = tokenize(self.lang, text);
        debug!(class, tokens = tokens.len(), "Forgetting document");
        self.store.forget(class, tokens).await
    }

    /// Discard all learned state.
    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await
    }

    /// Score the text against every known class. Returns normalized
    /// posterior probabilities; an empty list means the model has no
    /// evidence (untrained, or the text shares no vocabulary with the
    /// corpus).
    pub async fn score(&self, text: &str) -> Result<Vec<(String, f64)>> {
        let tokens = tokenize(self.lang, text);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let stats = self.store.corpus_stats(tokens).await?;
        if stats.classes.is_empty() || stats.total_docs == 0 {
            return Ok(Vec::new());
        }

        // No class has seen any of the document's tokens.
        if stats
            .classes
            .iter()
            .all(|c| c.token_counts.iter().all(|&n| n == 0))
        {
            return Ok(Vec::new());
        }

        let mut logs = Vec::with_capacity(stats.classes.len());
        for c in &stats.classes {
            let denom = (c.total_tokens + stats.vocab_size) as f64;
            if denom == 0.0 {
                continue;
            }

            // Log prior plus add-one-smoothed log likelihoods.
            let mut lp = (c.docs as f64 / stats.total_docs as f64).ln();
            for &cnt in &c.token_counts {
                lp += ((cnt + 1) as f64 / denom).ln();
            }
            logs.push((c.class.clone(), lp));
        }

        if logs.is_empty() {
            return Ok(Vec::new());
        }

        let max = logs
            .iter()
            .map(|(_, lp)| *lp)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut sum = 0.0;
        let mut probs: Vec<(String, f64)> = logs
            .into_iter()
            .map(|(class, lp)| {
                let p = (lp - max).exp();
                sum += p;
                (class, p)
            })
            .collect();

        for (_, p) in &mut probs {
            *p /= sum;
        }

        Ok(probs)
    }

    /// Assign the text to its most probable class, or
    /// [`CLASS_UNKNOWN`] when there is nothing to go on.
    pub async fn classify(&self, text: &str) -> Result<String> {
        let scores = self.score(text).await?;

        match scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        {
            Some((class, _)) => Ok(class.clone()),
            None => Ok(CLASS_UNKNOWN.to_string()),
        }
    }

    /// The posterior probability of the text under one class; zero when
    /// the model has no evidence at all.
    pub async fn probability(&self, class: &str, text: &str) -> Result<f64> {
        let scores = self.score(text).await?;
        Ok(scores
            .into_iter()
            .find(|(c, _)| c == class)
            .map_or(0.0, |(_, p)| p))
    }
}
