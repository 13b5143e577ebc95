//! The entities used across the application: feeds, items, tags, and
//! stored searches.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+").unwrap()
});

/// Serialize a `Duration` as whole seconds, the way it is persisted.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A subscribed RSS/Atom feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub url: Url,
    pub homepage: Url,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    pub last_refresh: DateTime<Utc>,
    pub active: bool,
}

impl Feed {
    /// True if the feed is active and its next refresh time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && now.timestamp() >= self.last_refresh.timestamp() + self.interval.as_secs() as i64
    }
}

/// A single news item belonging to a feed.
///
/// `rating` is the user's verdict, `guessed` the classifier's; both are
/// restricted to {-1, 0, 1}. The plain-text view is computed lazily and
/// cached for the item's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub feed_id: i64,
    pub url: Url,
    pub timestamp: DateTime<Utc>,
    pub headline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rating: i8,
    #[serde(default)]
    pub guessed: i8,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(skip)]
    plain: OnceLock<String>,
}

impl Item {
    pub fn new(feed_id: i64, url: Url, timestamp: DateTime<Utc>, headline: String, description: String) -> Self {
        Self {
            id: 0,
            feed_id,
            url,
            timestamp,
            headline,
            description,
            rating: 0,
            guessed: 0,
            tags: Vec::new(),
            plain: OnceLock::new(),
        }
    }

    /// The user's rating if one is set, else the guessed one, else zero.
    pub fn effective_rating(&self) -> i8 {
        if self.rating != 0 {
            self.rating
        } else if self.guessed != 0 {
            self.guessed
        } else {
            0
        }
    }

    /// The complete text of the item, cleansed of any HTML.
    ///
    /// Headline and description are each stripped and
    /// whitespace-collapsed, then joined by a single space. A description
    /// of exactly "Comments" (Hacker News) counts as empty.
    pub fn plaintext(&self) -> &str {
        self.plain.get_or_init(|| {
            let head = strip_html(&self.headline);
            let mut desc = strip_html(&self.description);

            if desc == "Comments" {
                desc.clear();
            }

            let head = WHITESPACE.replace_all(&head, " ");
            let desc = WHITESPACE.replace_all(&desc, " ");

            format!("{head} {desc}")
        })
    }

    /// True if the tag with the given id is attached to this item.
    pub fn has_tag(&self, id: i64) -> bool {
        self.tags.iter().any(|t| t.id == id)
    }

    /// The item's id in decimal form, used as cache key.
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }
}

fn strip_html(s: &str) -> String {
    let fragment = scraper::Html::parse_fragment(s);
    fragment.root_element().text().collect()
}

/// A label that can be attached to items. Tags may have a parent tag,
/// forming a hierarchy; `level` and `full_name` are derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    #[serde(default)]
    pub parent: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub full_name: String,
}

/// A suggestion to attach a specific tag to an item, with the advisor's
/// confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedTag {
    #[serde(flatten)]
    pub tag: Tag,
    pub score: f64,
}

/// The parameters and, once executed, results of a stored search query.
///
/// `regex` marks the query string as a regular expression; `tags_all`
/// asks for items linked to ALL of the given tags rather than any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Search {
    #[serde(default)]
    pub id: i64,
    pub title: String,
    pub time_created: DateTime<Utc>,
    #[serde(default)]
    pub time_started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tags: Vec<i64>,
    #[serde(default)]
    pub tags_all: bool,
    #[serde(default)]
    pub filter_period: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub query_string: String,
    #[serde(default)]
    pub regex: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Item>,
}

impl Search {
    /// True once the query has run to completion.
    pub fn is_finished(&self) -> bool {
        match (self.time_started, self.time_finished) {
            (Some(started), Some(finished)) => finished > started,
            _ => false,
        }
    }

    /// Compile the search's text filter.
    pub fn matcher(&self) -> Result<Matcher> {
        if self.query_string.is_empty() {
            Ok(Matcher::Any)
        } else if self.regex {
            match Regex::new(&self.query_string) {
                Ok(re) => Ok(Matcher::Pattern(re)),
                Err(e) => Err(Error::BadPattern(e.to_string())),
            }
        } else {
            Ok(Matcher::Substring(self.query_string.clone()))
        }
    }
}

/// The compiled text filter of a [`Search`], applied to an item's plain
/// text. An empty query matches everything.
#[derive(Debug, Clone)]
pub enum Matcher {
    Any,
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Substring(s) => item.plaintext().contains(s.as_str()),
            Matcher::Pattern(re) => re.is_match(item.plaintext()),
        }
    }
}
