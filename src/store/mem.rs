//! In-memory store backed by DashMap.
//!
//! The fastest backend, used by tests, benchmarks and small corpora. All data
//! is lost on process exit.

use std::collections::BTreeSet;
use std::sync::RwLock;

use dashmap::DashMap;

use super::{BibStore, Features, WriteBatch, WriteOp, YearKeywords};
use crate::error::StoreError;
use crate::key::{ContentKey, PrimaryKey};
use crate::keyword::{intersect_sorted, keywords};
use crate::record::Record;
use crate::store::StoreResult;

/// Concurrent in-memory store using sharded hashmaps.
///
/// Batches are applied under a write lock so readers never observe half of
/// a record's writes.
#[derive(Debug, Default)]
pub struct MemStore {
    records: DashMap<PrimaryKey, Record>,
    titles: DashMap<ContentKey, Vec<PrimaryKey>>,
    authors: DashMap<ContentKey, Vec<PrimaryKey>>,
    names: DashMap<ContentKey, String>,
    coauthors: DashMap<ContentKey, BTreeSet<ContentKey>>,
    keywords: DashMap<String, Vec<PrimaryKey>>,
    year_keywords: DashMap<(u32, String), u64>,
    batch_lock: RwLock<()>,
    features: RwLock<Features>,
}

impl MemStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record has been stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn apply_op(&self, op: WriteOp) {
        match op {
            WriteOp::InsertFullRecord(key, record) => {
                self.records.insert(key, record);
            }
            WriteOp::AssociateTitle(title, key) => {
                push_posting(&mut self.titles.entry(title).or_default(), key);
            }
            WriteOp::AssociateAuthor(author, key) => {
                push_posting(&mut self.authors.entry(author).or_default(), key);
            }
            WriteOp::RecordAuthorName(author, name) => {
                self.names.insert(author, name);
            }
            WriteOp::AssociateCoauthors(author, list) => {
                let mut adjacency = self.coauthors.entry(author).or_default();
                adjacency.extend(list.into_iter().filter(|c| *c != author));
            }
            WriteOp::IndexKeyword { text, key, year } => {
                let mut seen = BTreeSet::new();
                for word in keywords(&text) {
                    if !seen.insert(word.clone()) {
                        continue;
                    }
                    if year != 0 {
                        *self.year_keywords.entry((year, word.clone())).or_default() += 1;
                    }
                    push_posting(&mut self.keywords.entry(word).or_default(), key);
                }
            }
        }
    }

    fn postings(map: &DashMap<ContentKey, Vec<PrimaryKey>>, key: ContentKey) -> Vec<PrimaryKey> {
        map.get(&key).map(|v| v.value().clone()).unwrap_or_default()
    }

    fn read_features<T>(&self, f: impl FnOnce(&Features) -> T) -> StoreResult<T> {
        let features = self.features.read().map_err(|_| poisoned("features"))?;
        Ok(f(&features))
    }
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable {
        path: "memory".into(),
        message: format!("{what} lock poisoned by a panicking writer"),
    }
}

/// Append `key` unless it is already the last entry.
///
/// Keys arrive in ascending order from a single pipeline, so this keeps each
/// posting list sorted and duplicate-free.
fn push_posting(list: &mut Vec<PrimaryKey>, key: PrimaryKey) {
    if list.last() != Some(&key) {
        list.push(key);
    }
}

impl BibStore for MemStore {
    fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let _guard = self.batch_lock.write().map_err(|_| poisoned("batch"))?;
        for op in batch.into_ops() {
            self.apply_op(op);
        }
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let _guard = self.batch_lock.write().map_err(|_| poisoned("batch"))?;
        // Concurrent writers may have interleaved their keys.
        for mut posting in self.keywords.iter_mut() {
            posting.sort_unstable();
            posting.dedup();
        }
        for map in [&self.titles, &self.authors] {
            for mut posting in map.iter_mut() {
                posting.sort_unstable();
                posting.dedup();
            }
        }

        let authors = self.authors.iter().map(|entry| {
            let name = self
                .names
                .get(entry.key())
                .map(|n| n.value().clone())
                .unwrap_or_default();
            (name, entry.value().len() as u64)
        });
        let keywords = self
            .keywords
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len() as u64));
        let year_keywords = self
            .year_keywords
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()));

        let computed = Features::compute(authors, keywords, year_keywords);
        let mut features = self.features.write().map_err(|_| poisoned("features"))?;
        let max_clique = std::mem::take(&mut features.max_clique);
        *features = Features {
            max_clique,
            ..computed
        };
        tracing::debug!(
            authors = features.top_authors.len(),
            keywords = features.top_keywords.len(),
            years = features.top_keywords_by_year.len(),
            "in-memory features computed"
        );
        Ok(())
    }

    fn full_record(&self, key: PrimaryKey) -> StoreResult<Option<Record>> {
        let _guard = self.batch_lock.read().map_err(|_| poisoned("batch"))?;
        Ok(self.records.get(&key).map(|r| r.value().clone()))
    }

    fn lookup_by_author(&self, author: ContentKey) -> StoreResult<Vec<PrimaryKey>> {
        let _guard = self.batch_lock.read().map_err(|_| poisoned("batch"))?;
        Ok(Self::postings(&self.authors, author))
    }

    fn lookup_by_title(&self, title: ContentKey) -> StoreResult<Vec<PrimaryKey>> {
        let _guard = self.batch_lock.read().map_err(|_| poisoned("batch"))?;
        Ok(Self::postings(&self.titles, title))
    }

    fn lookup_by_keyword_raw(&self, sentence: &str) -> StoreResult<Vec<PrimaryKey>> {
        let _guard = self.batch_lock.read().map_err(|_| poisoned("batch"))?;
        let words: BTreeSet<String> = keywords(sentence).into_iter().collect();
        let mut result: Option<Vec<PrimaryKey>> = None;
        for word in &words {
            let Some(posting) = self.keywords.get(word) else {
                return Ok(Vec::new());
            };
            result = Some(match result {
                None => posting.value().clone(),
                Some(acc) => intersect_sorted(&acc, posting.value()),
            });
        }
        Ok(result.unwrap_or_default())
    }

    fn adjacency(&self, author: ContentKey) -> StoreResult<Vec<ContentKey>> {
        let _guard = self.batch_lock.read().map_err(|_| poisoned("batch"))?;
        Ok(self
            .coauthors
            .get(&author)
            .map(|set| set.value().iter().copied().collect())
            .unwrap_or_default())
    }

    fn display_name(&self, author: ContentKey) -> StoreResult<Option<String>> {
        Ok(self.names.get(&author).map(|n| n.value().clone()))
    }

    fn top_authors(&self) -> StoreResult<Vec<String>> {
        self.read_features(|f| f.top_authors.clone())
    }

    fn top_keywords(&self) -> StoreResult<Vec<String>> {
        self.read_features(|f| f.top_keywords.clone())
    }

    fn top_keywords_by_year(&self) -> StoreResult<Vec<YearKeywords>> {
        self.read_features(|f| f.top_keywords_by_year.clone())
    }

    fn max_clique(&self) -> StoreResult<Vec<f64>> {
        self.read_features(|f| f.max_clique.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntryType;

    fn record_batch(key: u128, title: &str, authors: &[&str], year: u32) -> WriteBatch {
        let pk = PrimaryKey::new(key);
        let mut record = Record::new(EntryType::Article);
        record.push_property("title", title);
        let mut batch = WriteBatch::new(pk);
        let author_keys: Vec<ContentKey> = authors.iter().map(|a| ContentKey::of(a)).collect();
        for (name, ck) in authors.iter().zip(&author_keys) {
            record.push_property("author", *name);
            batch.push(WriteOp::RecordAuthorName(*ck, name.to_string()));
            batch.push(WriteOp::AssociateAuthor(*ck, pk));
        }
        for ck in &author_keys {
            batch.push(WriteOp::AssociateCoauthors(*ck, author_keys.clone()));
        }
        batch.push(WriteOp::AssociateTitle(ContentKey::of(title), pk));
        batch.push(WriteOp::IndexKeyword {
            text: title.into(),
            key: pk,
            year,
        });
        batch.push(WriteOp::InsertFullRecord(pk, record));
        batch
    }

    #[test]
    fn apply_and_read_back() {
        let store = MemStore::new();
        store
            .apply(record_batch(0, "Graph Mining", &["Ann", "Ben"], 2020))
            .unwrap();

        let record = store.full_record(PrimaryKey::new(0)).unwrap().unwrap();
        assert_eq!(record.authors(), ["Ann", "Ben"]);
        assert_eq!(
            store.lookup_by_author(ContentKey::of("Ann")).unwrap(),
            vec![PrimaryKey::new(0)]
        );
        assert_eq!(
            store.lookup_by_full_title_raw("Graph Mining").unwrap(),
            vec![PrimaryKey::new(0)]
        );
        assert_eq!(
            store.display_name(ContentKey::of("Ben")).unwrap().as_deref(),
            Some("Ben")
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn adjacency_excludes_self() {
        let store = MemStore::new();
        store
            .apply(record_batch(0, "T1", &["Ann", "Ben", "Cy"], 0))
            .unwrap();
        store.apply(record_batch(1, "T2", &["Ann", "Ben"], 0)).unwrap();

        let mut expected = vec![ContentKey::of("Ben"), ContentKey::of("Cy")];
        expected.sort();
        assert_eq!(store.adjacency(ContentKey::of("Ann")).unwrap(), expected);
        assert!(store.adjacency(ContentKey::of("Nobody")).unwrap().is_empty());
    }

    #[test]
    fn keyword_query_intersects() {
        let store = MemStore::new();
        store.apply(record_batch(0, "Graph Mining", &["A"], 2020)).unwrap();
        store.apply(record_batch(1, "Graph Theory", &["B"], 2020)).unwrap();
        store.apply(record_batch(2, "Text Mining", &["C"], 2021)).unwrap();
        store.commit().unwrap();

        let keys = |s: &str| store.lookup_by_keyword_raw(s).unwrap();
        assert_eq!(keys("graph"), vec![PrimaryKey::new(0), PrimaryKey::new(1)]);
        assert_eq!(keys("Graph mining"), vec![PrimaryKey::new(0)]);
        assert!(keys("graph unknown").is_empty());
        assert!(keys("the of").is_empty());
    }

    #[test]
    fn commit_computes_features() {
        let store = MemStore::new();
        store.apply(record_batch(0, "Graph Mining", &["Ann"], 2020)).unwrap();
        store.apply(record_batch(1, "Graph Theory", &["Ann", "Ben"], 2020)).unwrap();
        store.apply(record_batch(2, "Old Graph", &["Ben"], 0)).unwrap();
        assert!(store.top_authors().unwrap().is_empty());

        store.commit().unwrap();
        assert_eq!(store.top_authors().unwrap(), ["Ann", "Ben"]);
        assert_eq!(store.top_keywords().unwrap()[0], "graph");
        let by_year = store.top_keywords_by_year().unwrap();
        assert_eq!(by_year.len(), 1);
        assert_eq!(by_year[0].year, 2020);
        assert_eq!(by_year[0].keywords[0], "graph");
        assert!(store.max_clique().unwrap().is_empty());
    }

    #[test]
    fn concurrent_batches() {
        use std::sync::Arc;
        let store = Arc::new(MemStore::new());
        let handles: Vec<_> = (0..16u128)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .apply(record_batch(i, &format!("Title {i}"), &["Shared"], 0))
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 16);
        assert_eq!(store.lookup_by_author(ContentKey::of("Shared")).unwrap().len(), 16);
    }
}
