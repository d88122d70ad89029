//! Query orchestration over a [`BibStore`].
//!
//! Turns user text and hex key lists into the JSON payloads served by the CLI
//! and the HTTP server. Keys leave the crate as 32-digit hex strings.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::coauthor::{CoauthorExpander, ExpansionLimits, GraphExpansion};
use crate::config::BibConfig;
use crate::error::{BibResult, QueryError, QueryResult};
use crate::key::{ContentKey, PrimaryKey};
use crate::store::{BibStore, DurableStore};

/// Full-title matches are only reported when there are at most this many.
pub const FULL_TITLE_LIMIT: usize = 10;

/// Depth used for interactive coauthor graphs, whatever the configuration says.
pub const COLAB_DEPTH: u32 = 2;

/// Works of an author matched by exact name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub name: String,
    pub workcount: usize,
    pub work: Vec<String>,
}

/// Response to a free-text query.
///
/// Either `author` is set (and `keyword` is empty), or `keyword` and
/// `fullmatch` carry the title matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub keyword: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullmatch: Option<Vec<String>>,
}

/// Short form of a record for result lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySummary {
    pub pkey: String,
    pub title: Vec<String>,
    pub author: Vec<String>,
    pub year: Vec<String>,
}

/// Complete record as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullEntry {
    pub attrs: BTreeMap<String, String>,
    pub props: BTreeMap<String, Vec<String>>,
}

/// Corpus-wide aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub topauthors: Vec<String>,
    pub topkeywords: Vec<String>,
    /// Flat `[year, "kw1, kw2, ...", year, ...]` list.
    pub topyearkeywords: Vec<serde_json::Value>,
    #[serde(rename = "MaxCli")]
    pub max_cli: Vec<f64>,
}

/// Read-side entry point.
pub struct QueryService<S: BibStore> {
    store: S,
    limits: ExpansionLimits,
}

impl<S: BibStore> QueryService<S> {
    pub fn new(store: S, limits: ExpansionLimits) -> Self {
        Self { store, limits }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Answer a free-text query.
    ///
    /// An exact author name wins outright. Otherwise the text is matched
    /// against title keywords and, as a whole, against full titles.
    pub fn query(&self, text: &str) -> QueryResult<QueryResponse> {
        let works = self.store.lookup_by_author(ContentKey::of(text))?;
        if !works.is_empty() {
            tracing::debug!(query = text, works = works.len(), "author match");
            return Ok(QueryResponse {
                keyword: Vec::new(),
                author: Some(AuthorSummary {
                    name: text.to_string(),
                    workcount: works.len(),
                    work: hex_list(&works),
                }),
                fullmatch: None,
            });
        }

        let keyword = self.store.lookup_by_keyword_raw(text)?;
        let full = self.store.lookup_by_full_title_raw(text)?;
        let fullmatch = if full.len() <= FULL_TITLE_LIMIT {
            hex_list(&full)
        } else {
            Vec::new()
        };
        tracing::debug!(
            query = text,
            keyword = keyword.len(),
            fullmatch = full.len(),
            "title match"
        );
        Ok(QueryResponse {
            keyword: hex_list(&keyword),
            author: None,
            fullmatch: Some(fullmatch),
        })
    }

    /// Summaries for hex keys. Keys with no record are skipped.
    pub fn entry_summaries<K: AsRef<str>>(&self, keys: &[K]) -> QueryResult<Vec<EntrySummary>> {
        let mut out = Vec::with_capacity(keys.len());
        for hex in keys {
            let key = parse_key(hex.as_ref())?;
            let Some(record) = self.store.full_record(key)? else {
                continue;
            };
            out.push(EntrySummary {
                pkey: key.to_hex(),
                title: record.property("title").to_vec(),
                author: record.property("author").to_vec(),
                year: record.property("year").to_vec(),
            });
        }
        Ok(out)
    }

    /// The complete record behind a hex key, if any.
    pub fn full_entry(&self, hex: &str) -> QueryResult<Option<FullEntry>> {
        let key = parse_key(hex)?;
        Ok(self.store.full_record(key)?.map(|record| FullEntry {
            attrs: record.attributes().clone(),
            props: record.properties().clone(),
        }))
    }

    pub fn features(&self) -> QueryResult<FeatureSummary> {
        let mut topyearkeywords = Vec::new();
        for entry in self.store.top_keywords_by_year()? {
            topyearkeywords.push(serde_json::Value::from(entry.year));
            topyearkeywords.push(serde_json::Value::from(entry.keywords.join(", ")));
        }
        Ok(FeatureSummary {
            topauthors: self.store.top_authors()?,
            topkeywords: self.store.top_keywords()?,
            topyearkeywords,
            max_cli: self.store.max_clique()?,
        })
    }

    /// Coauthor graph around the author named `name`.
    pub fn coauthor_graph(&self, name: &str) -> QueryResult<GraphExpansion> {
        self.coauthor_graph_with_rng(name, &mut rand::thread_rng())
    }

    /// Like [`coauthor_graph`](Self::coauthor_graph) with a caller-supplied RNG.
    pub fn coauthor_graph_with_rng<R: Rng + ?Sized>(
        &self,
        name: &str,
        rng: &mut R,
    ) -> QueryResult<GraphExpansion> {
        let limits = ExpansionLimits {
            max_depth: COLAB_DEPTH,
            ..self.limits
        };
        let expander = CoauthorExpander::new(&self.store, limits);
        Ok(expander.expand(ContentKey::of(name), rng)?)
    }
}

impl QueryService<DurableStore> {
    /// Open the durable store named by `config` with its graph limits.
    pub fn open(config: &BibConfig) -> BibResult<Self> {
        let store = DurableStore::open(&config.data_dir)?;
        Ok(Self::new(store, config.graph))
    }
}

fn hex_list(keys: &[PrimaryKey]) -> Vec<String> {
    keys.iter().map(|k| k.to_hex()).collect()
}

fn parse_key(hex: &str) -> QueryResult<PrimaryKey> {
    PrimaryKey::from_hex(hex).ok_or_else(|| QueryError::InvalidKey {
        key: hex.to_string(),
    })
}
