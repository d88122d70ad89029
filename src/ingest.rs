//! Record ingestion pipeline.
//!
//! Orchestrates, per record: primary key → full record → title key → author
//! keys and names → coauthor lists → keyword indexing. All writes for one
//! record go to the store as a single [`WriteBatch`].
//!
//! The pipeline owns its [`KeyAllocator`] and counters; `ingest` takes
//! `&mut self`, so there is exactly one writer per pipeline and key assignment
//! is linearized without locks.

use std::io::BufRead;
use std::str::FromStr;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::config::BibConfig;
use crate::error::{BibResult, IngestError, IngestResult, ParseResult};
use crate::key::{ContentKey, KeyAllocator, PrimaryKey};
use crate::parser::{ParseEvent, XmlRecordReader, parse_document};
use crate::record::Record;
use crate::store::{BibStore, DurableStore, WriteBatch, WriteOp};

/// How the year submitted to keyword indexing is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum YearMode {
    /// First `year` value parsed as an integer, 0 when absent or malformed.
    #[default]
    FromRecord,
    /// Always 0, which keeps every record out of the per-year statistics.
    ForceZero,
}

impl YearMode {
    /// Resolve the indexing year of `record`.
    pub fn resolve(self, record: &Record) -> u32 {
        match self {
            YearMode::FromRecord => record.year().unwrap_or(0),
            YearMode::ForceZero => 0,
        }
    }
}

impl FromStr for YearMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "from-record" => Ok(YearMode::FromRecord),
            "force-zero" => Ok(YearMode::ForceZero),
            other => Err(format!(
                "unknown year mode \"{other}\" (expected from-record or force-zero)"
            )),
        }
    }
}

impl std::fmt::Display for YearMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YearMode::FromRecord => f.write_str("from-record"),
            YearMode::ForceZero => f.write_str("force-zero"),
        }
    }
}

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    #[serde(default)]
    pub year_mode: YearMode,
    /// Log a progress line every this many records (0 disables it).
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Records buffered between parser and writer in pipelined runs.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            year_mode: YearMode::default(),
            progress_interval: default_progress_interval(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Outcome of a document run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Records written during the run.
    pub records: u64,
    pub first_key: Option<PrimaryKey>,
    pub last_key: Option<PrimaryKey>,
    /// Whether the root element closed and the store was committed.
    pub committed: bool,
}

impl IngestSummary {
    fn observe(&mut self, key: PrimaryKey) {
        self.records += 1;
        self.first_key.get_or_insert(key);
        self.last_key = Some(key);
    }
}

/// Derive every write for one record.
///
/// The coauthor list handed to each author is the full author list of the
/// record, the author itself included and duplicates kept; the store decides
/// how to consolidate it.
pub fn derive_writes(key: PrimaryKey, record: Record, year_mode: YearMode) -> WriteBatch {
    let title = record.title_or_placeholder().to_string();
    let authors: Vec<(ContentKey, String)> = record
        .authors()
        .iter()
        .map(|name| (ContentKey::of(name), name.clone()))
        .collect();
    let year = year_mode.resolve(&record);

    let mut batch = WriteBatch::new(key);

    // 1. Full record.
    batch.push(WriteOp::InsertFullRecord(key, record));

    // 2. Title association.
    batch.push(WriteOp::AssociateTitle(ContentKey::of(&title), key));

    // 3. Author names and author → work associations.
    for (author, name) in &authors {
        batch.push(WriteOp::RecordAuthorName(*author, name.clone()));
        batch.push(WriteOp::AssociateAuthor(*author, key));
    }

    // 4. Coauthor lists.
    let coauthors: Vec<ContentKey> = authors.iter().map(|(ck, _)| *ck).collect();
    for author in &coauthors {
        batch.push(WriteOp::AssociateCoauthors(*author, coauthors.clone()));
    }

    // 5. Keyword indexing.
    batch.push(WriteOp::IndexKeyword {
        text: title,
        key,
        year,
    });

    batch
}

/// Single-writer ingestion pipeline over a [`BibStore`].
pub struct IngestPipeline<S: BibStore> {
    store: S,
    keys: KeyAllocator,
    ingested: u64,
    config: IngestConfig,
}

impl<S: BibStore> IngestPipeline<S> {
    /// Create a pipeline whose first record gets key 0.
    pub fn new(store: S, config: IngestConfig) -> Self {
        Self {
            store,
            keys: KeyAllocator::new(),
            ingested: 0,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Records successfully written so far.
    pub fn ingested(&self) -> u64 {
        self.ingested
    }

    /// Ingest one record and return its primary key.
    ///
    /// The key is allocated before the write; if the store rejects the batch
    /// the key is lost and the next record gets the following one.
    pub fn ingest(&mut self, record: Record) -> IngestResult<PrimaryKey> {
        let key = self.keys.next_key();
        let batch = derive_writes(key, record, self.config.year_mode);
        self.store.apply(batch).map_err(|source| IngestError::Write {
            key: key.to_hex(),
            source,
        })?;

        self.ingested += 1;
        let interval = self.config.progress_interval;
        if interval > 0 && self.ingested % interval == 0 {
            tracing::info!(records = self.ingested, "ingestion progress");
        }
        Ok(key)
    }

    /// Consolidate the store once the document is complete.
    pub fn commit(&mut self) -> IngestResult<()> {
        self.store.commit().map_err(|source| IngestError::Commit {
            records: self.ingested,
            source,
        })?;
        tracing::info!(records = self.ingested, "ingestion complete");
        Ok(())
    }

    /// Parse and ingest a whole document on the calling thread.
    ///
    /// The store is committed when the root element closes. Parse and write
    /// errors abort the run; records written before the error stay written.
    pub fn ingest_document<R: BufRead>(&mut self, input: R) -> IngestResult<IngestSummary> {
        let mut summary = IngestSummary::default();
        let mut ended = false;
        parse_document(
            input,
            |record| {
                let key = self.ingest(record)?;
                summary.observe(key);
                Ok::<_, IngestError>(())
            },
            || {
                ended = true;
                Ok(())
            },
        )?;
        if ended {
            self.commit()?;
            summary.committed = true;
        }
        Ok(summary)
    }

    /// Like [`ingest_document`](Self::ingest_document), but parses on a
    /// separate thread feeding a bounded queue of `queue_capacity` events.
    ///
    /// Writes stay on the calling thread, so ordering and key assignment are
    /// identical to the sequential run.
    pub fn ingest_document_pipelined<R: BufRead + Send>(
        &mut self,
        input: R,
    ) -> IngestResult<IngestSummary> {
        let capacity = self.config.queue_capacity.max(1);
        std::thread::scope(|scope| -> IngestResult<IngestSummary> {
            let (tx, rx) = mpsc::sync_channel::<ParseEvent>(capacity);

            let producer = scope.spawn(move || -> ParseResult<()> {
                let mut reader = XmlRecordReader::new(input);
                while let Some(event) = reader.next_event()? {
                    if tx.send(event).is_err() {
                        // Writer gave up.
                        break;
                    }
                }
                Ok(())
            });

            let mut summary = IngestSummary::default();
            let mut ended = false;
            let mut written: IngestResult<()> = Ok(());
            for event in &rx {
                match event {
                    ParseEvent::Record(record) => match self.ingest(record) {
                        Ok(key) => summary.observe(key),
                        Err(err) => {
                            written = Err(err);
                            break;
                        }
                    },
                    ParseEvent::DocumentEnd => ended = true,
                }
            }
            drop(rx);

            let parsed = match producer.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            };
            written?;
            parsed?;

            if ended {
                self.commit()?;
                summary.committed = true;
            }
            Ok(summary)
        })
    }
}

impl<S: BibStore> std::fmt::Debug for IngestPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("ingested", &self.ingested)
            .field("next_key", &self.keys.issued())
            .field("config", &self.config)
            .finish()
    }
}

/// Ingest `input` into the durable store under `config.data_dir`.
///
/// Returns `None` without reading `input` when the store already holds
/// records; a data directory is ingested once.
pub fn ingest_into_data_dir<R: BufRead + Send>(
    config: &BibConfig,
    input: R,
    pipelined: bool,
) -> BibResult<Option<IngestSummary>> {
    let store = DurableStore::open(&config.data_dir)?;
    if !store.is_empty()? {
        tracing::info!(
            path = %store.path().display(),
            records = store.len()?,
            "store already populated, skipping ingestion"
        );
        return Ok(None);
    }

    let mut pipeline = IngestPipeline::new(store, config.ingest.clone());
    let summary = if pipelined {
        pipeline.ingest_document_pipelined(input)?
    } else {
        pipeline.ingest_document(input)?
    };
    Ok(Some(summary))
}
