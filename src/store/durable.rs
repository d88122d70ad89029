//! ACID-durable store backed by redb.
//!
//! Every record's write batch is one redb write transaction, so a crash never
//! leaves half of a record's associations on disk. Readers run on MVCC
//! snapshots and may query while an ingestion run is in progress.
//!
//! Posting lists and coauthor adjacency live in multimap tables, which keep
//! the values of each key sorted and unique; no separate consolidation pass is
//! needed for them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::{
    Database, MultimapTableDefinition, ReadableMultimapTable, ReadableTable,
    ReadableTableMetadata, TableDefinition,
};

use super::{BibStore, Features, WriteBatch, WriteOp, YearKeywords};
use crate::error::StoreError;
use crate::key::{ContentKey, PrimaryKey};
use crate::keyword::{intersect_sorted, keywords};
use crate::record::Record;
use crate::store::StoreResult;

/// Primary key → bincode-encoded record.
const RECORDS: TableDefinition<u128, &[u8]> = TableDefinition::new("records");
/// Author content key → display name.
const AUTHOR_NAMES: TableDefinition<u128, &str> = TableDefinition::new("author_names");
/// Singleton blobs (JSON), currently only `features`.
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
/// (year, keyword) → number of records using the keyword that year.
const YEAR_KEYWORDS: TableDefinition<(u32, &str), u64> = TableDefinition::new("year_keywords");

const TITLES: MultimapTableDefinition<u128, u128> = MultimapTableDefinition::new("titles");
const AUTHORS: MultimapTableDefinition<u128, u128> = MultimapTableDefinition::new("authors");
const COAUTHORS: MultimapTableDefinition<u128, u128> = MultimapTableDefinition::new("coauthors");
const KEYWORDS: MultimapTableDefinition<&str, u128> = MultimapTableDefinition::new("keywords");

const FEATURES_KEY: &str = "features";

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "bibgraph.redb";

fn redb_err<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> StoreError {
    move |e| StoreError::Redb {
        message: format!("{context} failed: {e}"),
    }
}

/// ACID-durable store using redb.
pub struct DurableStore {
    db: Arc<Database>,
    path: PathBuf,
}

impl DurableStore {
    /// Open or create a durable store in the given directory.
    ///
    /// All tables are created up front so that reads on a fresh database see
    /// empty tables instead of failing.
    pub fn open(data_dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| StoreError::Io { source: e })?;
        let path = data_dir.join(DB_FILE);
        let db = Database::create(&path).map_err(|e| StoreError::Unavailable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let txn = db.begin_write().map_err(redb_err("begin_write"))?;
        {
            txn.open_table(RECORDS).map_err(redb_err("open_table"))?;
            txn.open_table(AUTHOR_NAMES).map_err(redb_err("open_table"))?;
            txn.open_table(META).map_err(redb_err("open_table"))?;
            txn.open_table(YEAR_KEYWORDS).map_err(redb_err("open_table"))?;
            for def in [TITLES, AUTHORS, COAUTHORS] {
                txn.open_multimap_table(def).map_err(redb_err("open_multimap_table"))?;
            }
            txn.open_multimap_table(KEYWORDS)
                .map_err(redb_err("open_multimap_table"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;

        tracing::debug!(path = %path.display(), "opened durable store");
        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored records.
    pub fn len(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(RECORDS).map_err(redb_err("open_table"))?;
        table.len().map_err(redb_err("len"))
    }

    /// Whether no record has been stored yet.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Persist a clique-count statistic produced by an external clique finder.
    pub fn set_max_clique(&self, values: Vec<f64>) -> StoreResult<()> {
        let mut features = self.features()?;
        features.max_clique = values;
        self.write_features(&features)
    }

    fn features(&self) -> StoreResult<Features> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(META).map_err(redb_err("open_table"))?;
        let Some(guard) = table.get(FEATURES_KEY).map_err(redb_err("get"))? else {
            return Ok(Features::default());
        };
        serde_json::from_slice(guard.value()).map_err(|e| StoreError::Serialization {
            message: format!("features: {e}"),
        })
    }

    fn write_features(&self, features: &Features) -> StoreResult<()> {
        let bytes = serde_json::to_vec(features).map_err(|e| StoreError::Serialization {
            message: format!("features: {e}"),
        })?;
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut table = txn.open_table(META).map_err(redb_err("open_table"))?;
            table
                .insert(FEATURES_KEY, bytes.as_slice())
                .map_err(redb_err("insert"))?;
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    fn postings(
        &self,
        def: MultimapTableDefinition<u128, u128>,
        key: u128,
    ) -> StoreResult<Vec<u128>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_multimap_table(def)
            .map_err(redb_err("open_multimap_table"))?;
        let values = table.get(key).map_err(redb_err("get"))?;
        values
            .map(|v| v.map(|guard| guard.value()).map_err(redb_err("read")))
            .collect()
    }

    /// Count stored values per key and compute the aggregates.
    fn compute_features(&self) -> StoreResult<Features> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let names = txn.open_table(AUTHOR_NAMES).map_err(redb_err("open_table"))?;
        let authors = txn
            .open_multimap_table(AUTHORS)
            .map_err(redb_err("open_multimap_table"))?;
        let keyword_table = txn
            .open_multimap_table(KEYWORDS)
            .map_err(redb_err("open_multimap_table"))?;
        let year_table = txn.open_table(YEAR_KEYWORDS).map_err(redb_err("open_table"))?;

        let mut author_counts = Vec::new();
        for entry in authors.iter().map_err(redb_err("iter"))? {
            let (author, works) = entry.map_err(redb_err("iter"))?;
            let name = names
                .get(author.value())
                .map_err(redb_err("get"))?
                .map(|g| g.value().to_string())
                .unwrap_or_default();
            author_counts.push((name, works.count() as u64));
        }

        let mut keyword_counts = Vec::new();
        for entry in keyword_table.iter().map_err(redb_err("iter"))? {
            let (word, keys) = entry.map_err(redb_err("iter"))?;
            keyword_counts.push((word.value().to_string(), keys.count() as u64));
        }

        let mut year_counts = Vec::new();
        for entry in year_table.iter().map_err(redb_err("iter"))? {
            let (key, count) = entry.map_err(redb_err("iter"))?;
            let (year, word) = key.value();
            year_counts.push(((year, word.to_string()), count.value()));
        }

        Ok(Features::compute(author_counts, keyword_counts, year_counts))
    }
}

impl BibStore for DurableStore {
    fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(redb_err("begin_write"))?;
        {
            let mut records = txn.open_table(RECORDS).map_err(redb_err("open_table"))?;
            let mut names = txn.open_table(AUTHOR_NAMES).map_err(redb_err("open_table"))?;
            let mut year_keywords = txn.open_table(YEAR_KEYWORDS).map_err(redb_err("open_table"))?;
            let mut titles = txn
                .open_multimap_table(TITLES)
                .map_err(redb_err("open_multimap_table"))?;
            let mut authors = txn
                .open_multimap_table(AUTHORS)
                .map_err(redb_err("open_multimap_table"))?;
            let mut coauthors = txn
                .open_multimap_table(COAUTHORS)
                .map_err(redb_err("open_multimap_table"))?;
            let mut keyword_table = txn
                .open_multimap_table(KEYWORDS)
                .map_err(redb_err("open_multimap_table"))?;

            for op in batch.into_ops() {
                match op {
                    WriteOp::InsertFullRecord(key, record) => {
                        let bytes =
                            bincode::serialize(&record).map_err(|e| StoreError::Serialization {
                                message: format!("record {key}: {e}"),
                            })?;
                        records
                            .insert(key.get(), bytes.as_slice())
                            .map_err(redb_err("insert record"))?;
                    }
                    WriteOp::AssociateTitle(title, key) => {
                        titles
                            .insert(title.get(), key.get())
                            .map_err(redb_err("insert title"))?;
                    }
                    WriteOp::AssociateAuthor(author, key) => {
                        authors
                            .insert(author.get(), key.get())
                            .map_err(redb_err("insert author"))?;
                    }
                    WriteOp::RecordAuthorName(author, name) => {
                        names
                            .insert(author.get(), name.as_str())
                            .map_err(redb_err("insert author name"))?;
                    }
                    WriteOp::AssociateCoauthors(author, list) => {
                        for coauthor in list.into_iter().filter(|c| *c != author) {
                            coauthors
                                .insert(author.get(), coauthor.get())
                                .map_err(redb_err("insert coauthor"))?;
                        }
                    }
                    WriteOp::IndexKeyword { text, key, year } => {
                        let mut seen = BTreeSet::new();
                        for word in keywords(&text) {
                            if !seen.insert(word.clone()) {
                                continue;
                            }
                            keyword_table
                                .insert(word.as_str(), key.get())
                                .map_err(redb_err("insert keyword"))?;
                            if year != 0 {
                                let current = year_keywords
                                    .get((year, word.as_str()))
                                    .map_err(redb_err("get year keyword"))?
                                    .map(|g| g.value())
                                    .unwrap_or(0);
                                year_keywords
                                    .insert((year, word.as_str()), current + 1)
                                    .map_err(redb_err("insert year keyword"))?;
                            }
                        }
                    }
                }
            }
        }
        txn.commit().map_err(redb_err("commit"))?;
        Ok(())
    }

    fn commit(&self) -> StoreResult<()> {
        let mut features = self.compute_features()?;
        features.max_clique = self.features()?.max_clique;
        self.write_features(&features)?;
        tracing::info!(
            authors = features.top_authors.len(),
            keywords = features.top_keywords.len(),
            years = features.top_keywords_by_year.len(),
            "durable store features committed"
        );
        Ok(())
    }

    fn full_record(&self, key: PrimaryKey) -> StoreResult<Option<Record>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(RECORDS).map_err(redb_err("open_table"))?;
        let Some(guard) = table.get(key.get()).map_err(redb_err("get"))? else {
            return Ok(None);
        };
        let record = bincode::deserialize(guard.value()).map_err(|e| StoreError::Serialization {
            message: format!("record {key}: {e}"),
        })?;
        Ok(Some(record))
    }

    fn lookup_by_author(&self, author: ContentKey) -> StoreResult<Vec<PrimaryKey>> {
        let keys = self.postings(AUTHORS, author.get())?;
        Ok(keys.into_iter().map(PrimaryKey::new).collect())
    }

    fn lookup_by_title(&self, title: ContentKey) -> StoreResult<Vec<PrimaryKey>> {
        let keys = self.postings(TITLES, title.get())?;
        Ok(keys.into_iter().map(PrimaryKey::new).collect())
    }

    fn lookup_by_keyword_raw(&self, sentence: &str) -> StoreResult<Vec<PrimaryKey>> {
        let words: BTreeSet<String> = keywords(sentence).into_iter().collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn
            .open_multimap_table(KEYWORDS)
            .map_err(redb_err("open_multimap_table"))?;

        let mut result: Option<Vec<u128>> = None;
        for word in &words {
            let posting = table
                .get(word.as_str())
                .map_err(redb_err("get"))?
                .map(|v| v.map(|guard| guard.value()).map_err(redb_err("read")))
                .collect::<StoreResult<Vec<u128>>>()?;
            let next = match result {
                None => posting,
                Some(acc) => intersect_sorted(&acc, &posting),
            };
            if next.is_empty() {
                return Ok(Vec::new());
            }
            result = Some(next);
        }
        Ok(result
            .unwrap_or_default()
            .into_iter()
            .map(PrimaryKey::new)
            .collect())
    }

    fn adjacency(&self, author: ContentKey) -> StoreResult<Vec<ContentKey>> {
        let keys = self.postings(COAUTHORS, author.get())?;
        Ok(keys.into_iter().map(ContentKey::from_raw).collect())
    }

    fn display_name(&self, author: ContentKey) -> StoreResult<Option<String>> {
        let txn = self.db.begin_read().map_err(redb_err("begin_read"))?;
        let table = txn.open_table(AUTHOR_NAMES).map_err(redb_err("open_table"))?;
        let result = table.get(author.get()).map_err(redb_err("get"))?;
        Ok(result.map(|guard| guard.value().to_string()))
    }

    fn top_authors(&self) -> StoreResult<Vec<String>> {
        Ok(self.features()?.top_authors)
    }

    fn top_keywords(&self) -> StoreResult<Vec<String>> {
        Ok(self.features()?.top_keywords)
    }

    fn top_keywords_by_year(&self) -> StoreResult<Vec<YearKeywords>> {
        Ok(self.features()?.top_keywords_by_year)
    }

    fn max_clique(&self) -> StoreResult<Vec<f64>> {
        Ok(self.features()?.max_clique)
    }
}

impl std::fmt::Debug for DurableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableStore")
            .field("path", &self.path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntryType;
    use tempfile::TempDir;

    fn batch(key: u128, title: &str, authors: &[&str], year: u32) -> WriteBatch {
        let pk = PrimaryKey::new(key);
        let mut record = Record::new(EntryType::InProceedings);
        record.push_property("title", title);
        let keys: Vec<ContentKey> = authors.iter().map(|a| ContentKey::of(a)).collect();
        let mut batch = WriteBatch::new(pk);
        for (name, ck) in authors.iter().zip(&keys) {
            record.push_property("author", *name);
            batch.push(WriteOp::RecordAuthorName(*ck, name.to_string()));
            batch.push(WriteOp::AssociateAuthor(*ck, pk));
            batch.push(WriteOp::AssociateCoauthors(*ck, keys.clone()));
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
    fn fresh_store_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.full_record(PrimaryKey::new(0)).unwrap(), None);
        assert!(store.lookup_by_author(ContentKey::of("x")).unwrap().is_empty());
        assert!(store.lookup_by_keyword_raw("graph").unwrap().is_empty());
        assert!(store.top_authors().unwrap().is_empty());
        assert!(store.max_clique().unwrap().is_empty());
    }

    #[test]
    fn batch_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = DurableStore::open(dir.path()).unwrap();
        store
            .apply(batch(0, "Streaming XML", &["Ann", "Ben", "Ann"], 2019))
            .unwrap();
        store.apply(batch(1, "Streaming Graphs", &["Ben"], 2019)).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        let record = store.full_record(PrimaryKey::new(0)).unwrap().unwrap();
        assert_eq!(record.authors(), ["Ann", "Ben", "Ann"]);
        assert_eq!(
            store.lookup_by_author(ContentKey::of("Ben")).unwrap(),
            vec![PrimaryKey::new(0), PrimaryKey::new(1)]
        );
        assert_eq!(
            store.adjacency(ContentKey::of("Ann")).unwrap(),
            vec![ContentKey::of("Ben")]
        );
        assert_eq!(
            store.lookup_by_keyword_raw("streaming xml").unwrap(),
            vec![PrimaryKey::new(0)]
        );
        assert_eq!(
            store.lookup_by_full_title_raw("Streaming Graphs").unwrap(),
            vec![PrimaryKey::new(1)]
        );
    }

    #[test]
    fn commit_persists_features() {
        let dir = TempDir::new().unwrap();
        {
            let store = DurableStore::open(dir.path()).unwrap();
            store.apply(batch(0, "Graph Mining", &["Ann"], 2020)).unwrap();
            store.apply(batch(1, "Graph Theory", &["Ann", "Ben"], 2020)).unwrap();
            store.commit().unwrap();
            store.set_max_clique(vec![1.0, 3.0]).unwrap();
        }

        let store = DurableStore::open(dir.path()).unwrap();
        assert_eq!(store.top_authors().unwrap(), ["Ann", "Ben"]);
        assert_eq!(store.top_keywords().unwrap()[0], "graph");
        assert_eq!(store.top_keywords_by_year().unwrap()[0].year, 2020);
        assert_eq!(store.max_clique().unwrap(), vec![1.0, 3.0]);

        // Recommitting keeps the externally supplied statistic.
        store.commit().unwrap();
        assert_eq!(store.max_clique().unwrap(), vec![1.0, 3.0]);
    }

    #[test]
    fn second_open_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let _first = DurableStore::open(dir.path()).unwrap();
        let second = DurableStore::open(dir.path());
        assert!(matches!(second, Err(StoreError::Unavailable { .. })));
    }
}
