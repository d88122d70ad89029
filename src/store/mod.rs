//! Storage collaborator for bibgraph.
//!
//! Ingestion and queries reach storage only through the [`BibStore`] trait.
//! Two reference backends ship with the crate:
//!
//! - [`MemStore`]: concurrent hashmaps (DashMap), lost on process exit
//! - [`DurableStore`]: ACID tables and multimap tables (redb)
//!
//! Writes arrive as one [`WriteBatch`] per ingested record and must be applied
//! atomically: either every operation in the batch becomes visible or none
//! does. After the last batch of a document, [`BibStore::commit`] consolidates
//! the derived tables and computes the aggregate [`Features`].

pub mod durable;
pub mod mem;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use durable::DurableStore;
pub use mem::MemStore;

pub use crate::error::StoreResult;
use crate::key::{ContentKey, PrimaryKey};
use crate::record::Record;

/// Number of authors reported in [`Features::top_authors`].
pub const TOP_AUTHORS: usize = 100;
/// Number of keywords reported in [`Features::top_keywords`].
pub const TOP_KEYWORDS: usize = 100;
/// Number of keywords reported per year in [`Features::top_keywords_by_year`].
pub const TOP_YEAR_KEYWORDS: usize = 10;

/// One derived write produced by ingesting a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store the complete record under its primary key.
    InsertFullRecord(PrimaryKey, Record),
    /// Link a title content key to a record.
    AssociateTitle(ContentKey, PrimaryKey),
    /// Link an author content key to a record.
    AssociateAuthor(ContentKey, PrimaryKey),
    /// Remember the display string behind an author content key.
    RecordAuthorName(ContentKey, String),
    /// Add every listed author (possibly including the author itself) to the
    /// author's coauthor adjacency.
    AssociateCoauthors(ContentKey, Vec<ContentKey>),
    /// Index the keywords of `text` for `key`, counting them under `year`
    /// unless it is 0.
    IndexKeyword {
        text: String,
        key: PrimaryKey,
        year: u32,
    },
}

/// All writes derived from one record, applied atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    key: PrimaryKey,
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new(key: PrimaryKey) -> Self {
        Self {
            key,
            ops: Vec::new(),
        }
    }

    /// The primary key of the record this batch was derived from.
    pub fn key(&self) -> PrimaryKey {
        self.key
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The ten most frequent keywords of one publication year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearKeywords {
    pub year: u32,
    pub keywords: Vec<String>,
}

/// Aggregates computed at commit time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Display names of the most prolific authors, most works first.
    pub top_authors: Vec<String>,
    /// Keywords with the longest posting lists, longest first.
    pub top_keywords: Vec<String>,
    /// Per year (ascending, year 0 excluded), the most frequent keywords.
    pub top_keywords_by_year: Vec<YearKeywords>,
    /// Clique-count statistic. Produced by an external clique finder, if any.
    pub max_clique: Vec<f64>,
}

impl Features {
    /// Rank raw counts into the reported aggregates.
    ///
    /// `authors` yields (display name, work count), `keywords` yields
    /// (keyword, posting count) and `year_keywords` yields
    /// ((year, keyword), occurrence count). Ties are broken alphabetically so
    /// the result does not depend on iteration order.
    pub fn compute<A, K, Y>(authors: A, keywords: K, year_keywords: Y) -> Self
    where
        A: IntoIterator<Item = (String, u64)>,
        K: IntoIterator<Item = (String, u64)>,
        Y: IntoIterator<Item = ((u32, String), u64)>,
    {
        let mut by_year: BTreeMap<u32, Vec<(String, u64)>> = BTreeMap::new();
        for ((year, keyword), count) in year_keywords {
            if year != 0 {
                by_year.entry(year).or_default().push((keyword, count));
            }
        }

        Self {
            top_authors: top_n(authors, TOP_AUTHORS),
            top_keywords: top_n(keywords, TOP_KEYWORDS),
            top_keywords_by_year: by_year
                .into_iter()
                .map(|(year, counts)| YearKeywords {
                    year,
                    keywords: top_n(counts, TOP_YEAR_KEYWORDS),
                })
                .collect(),
            max_clique: Vec::new(),
        }
    }
}

fn top_n(counts: impl IntoIterator<Item = (String, u64)>, n: usize) -> Vec<String> {
    // Merge duplicates first: authors with the same display name share a key.
    let mut merged: HashMap<String, u64> = HashMap::new();
    for (name, count) in counts {
        *merged.entry(name).or_default() += count;
    }
    let mut ranked: Vec<(String, u64)> = merged.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(n).map(|(name, _)| name).collect()
}

/// Sort, deduplicate and drop `author` itself from an adjacency list.
pub fn consolidate_adjacency(author: ContentKey, mut neighbors: Vec<ContentKey>) -> Vec<ContentKey> {
    neighbors.sort_unstable();
    neighbors.dedup();
    neighbors.retain(|n| *n != author);
    neighbors
}

/// Storage and index collaborator.
///
/// Implementations must be usable from several threads at once: queries run
/// concurrently with each other, and with an ingestion run on backends that
/// offer snapshot isolation.
pub trait BibStore: Send + Sync {
    // ── Write path ──

    /// Apply every operation of `batch` atomically.
    fn apply(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Consolidate derived tables and recompute [`Features`]. Called once
    /// after the last record of a document.
    fn commit(&self) -> StoreResult<()>;

    // ── Read path ──

    fn full_record(&self, key: PrimaryKey) -> StoreResult<Option<Record>>;

    /// Records listing `author`, in ingestion order.
    fn lookup_by_author(&self, author: ContentKey) -> StoreResult<Vec<PrimaryKey>>;

    /// Records whose title digests to `title`, in ingestion order.
    fn lookup_by_title(&self, title: ContentKey) -> StoreResult<Vec<PrimaryKey>>;

    /// Records whose titles contain every keyword of `sentence`.
    fn lookup_by_keyword_raw(&self, sentence: &str) -> StoreResult<Vec<PrimaryKey>>;

    /// Records whose title is exactly `title`.
    fn lookup_by_full_title_raw(&self, title: &str) -> StoreResult<Vec<PrimaryKey>> {
        self.lookup_by_title(ContentKey::of(title))
    }

    /// Coauthors of `author`: sorted, deduplicated, without `author` itself.
    fn adjacency(&self, author: ContentKey) -> StoreResult<Vec<ContentKey>>;

    fn display_name(&self, author: ContentKey) -> StoreResult<Option<String>>;

    fn top_authors(&self) -> StoreResult<Vec<String>>;

    fn top_keywords(&self) -> StoreResult<Vec<String>>;

    fn top_keywords_by_year(&self) -> StoreResult<Vec<YearKeywords>>;

    fn max_clique(&self) -> StoreResult<Vec<f64>> {
        Ok(Vec::new())
    }
}

macro_rules! forward_bib_store {
    ($($ty:ty),*) => {$(
        impl<T: BibStore + ?Sized> BibStore for $ty {
            fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
                (**self).apply(batch)
            }
            fn commit(&self) -> StoreResult<()> {
                (**self).commit()
            }
            fn full_record(&self, key: PrimaryKey) -> StoreResult<Option<Record>> {
                (**self).full_record(key)
            }
            fn lookup_by_author(&self, author: ContentKey) -> StoreResult<Vec<PrimaryKey>> {
                (**self).lookup_by_author(author)
            }
            fn lookup_by_title(&self, title: ContentKey) -> StoreResult<Vec<PrimaryKey>> {
                (**self).lookup_by_title(title)
            }
            fn lookup_by_keyword_raw(&self, sentence: &str) -> StoreResult<Vec<PrimaryKey>> {
                (**self).lookup_by_keyword_raw(sentence)
            }
            fn lookup_by_full_title_raw(&self, title: &str) -> StoreResult<Vec<PrimaryKey>> {
                (**self).lookup_by_full_title_raw(title)
            }
            fn adjacency(&self, author: ContentKey) -> StoreResult<Vec<ContentKey>> {
                (**self).adjacency(author)
            }
            fn display_name(&self, author: ContentKey) -> StoreResult<Option<String>> {
                (**self).display_name(author)
            }
            fn top_authors(&self) -> StoreResult<Vec<String>> {
                (**self).top_authors()
            }
            fn top_keywords(&self) -> StoreResult<Vec<String>> {
                (**self).top_keywords()
            }
            fn top_keywords_by_year(&self) -> StoreResult<Vec<YearKeywords>> {
                (**self).top_keywords_by_year()
            }
            fn max_clique(&self) -> StoreResult<Vec<f64>> {
                (**self).max_clique()
            }
        }
    )*};
}

forward_bib_store!(&T, Arc<T>, Box<T>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_keeps_operation_order() {
        let key = PrimaryKey::new(3);
        let mut batch = WriteBatch::new(key);
        assert!(batch.is_empty());
        batch.push(WriteOp::AssociateTitle(ContentKey::of("T"), key));
        batch.push(WriteOp::RecordAuthorName(ContentKey::of("A"), "A".into()));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.key(), key);
        assert!(matches!(batch.ops()[0], WriteOp::AssociateTitle(..)));
    }

    #[test]
    fn adjacency_consolidation() {
        let a = ContentKey::from_raw(5);
        let list = vec![
            ContentKey::from_raw(9),
            a,
            ContentKey::from_raw(2),
            ContentKey::from_raw(9),
        ];
        assert_eq!(
            consolidate_adjacency(a, list),
            vec![ContentKey::from_raw(2), ContentKey::from_raw(9)]
        );
    }

    #[test]
    fn features_rank_by_count_then_name() {
        let features = Features::compute(
            vec![("Bob".into(), 3), ("Alice".into(), 3), ("Carol".into(), 7)],
            vec![("graph".into(), 2), ("learning".into(), 5)],
            vec![
                ((2001, "graph".into()), 1),
                ((2001, "logic".into()), 4),
                ((0, "ignored".into()), 99),
                ((1999, "graph".into()), 2),
            ],
        );
        assert_eq!(features.top_authors, ["Carol", "Alice", "Bob"]);
        assert_eq!(features.top_keywords, ["learning", "graph"]);
        assert_eq!(
            features.top_keywords_by_year,
            vec![
                YearKeywords {
                    year: 1999,
                    keywords: vec!["graph".into()]
                },
                YearKeywords {
                    year: 2001,
                    keywords: vec!["logic".into(), "graph".into()]
                },
            ]
        );
        assert!(features.max_clique.is_empty());
    }

    #[test]
    fn top_n_truncates() {
        let counts = (0..150u64).map(|i| (format!("a{i:03}"), i));
        let top = top_n(counts, TOP_AUTHORS);
        assert_eq!(top.len(), TOP_AUTHORS);
        assert_eq!(top[0], "a149");
    }
}
