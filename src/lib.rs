// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # bibgraph
//!
//! Streaming ingestion of DBLP-style bibliographic XML and co-authorship graph
//! queries over the result.
//!
//! ## Architecture
//!
//! - **Record parser** (`parser`): tag-stack state machine over a `quick-xml`
//!   pull reader, emitting one [`record::Record`] at a time in constant memory
//! - **Keys** (`key`): sequential primary keys and SHA-256 content keys that
//!   link records sharing an author or a title
//! - **Ingestion** (`ingest`): single-writer pipeline deriving one atomic write
//!   batch per record
//! - **Storage** (`store`): the [`store::BibStore`] collaborator trait with
//!   in-memory (DashMap) and durable (redb) backends
//! - **Coauthor graphs** (`coauthor`): bounded, sampled depth-first expansion
//! - **Queries** (`query`): author, keyword and full-title lookups, entry
//!   summaries and corpus features as serde payloads
//!
//! ## Library usage
//!
//! ```no_run
//! use bibgraph::ingest::{IngestConfig, IngestPipeline};
//! use bibgraph::coauthor::ExpansionLimits;
//! use bibgraph::query::QueryService;
//! use bibgraph::store::MemStore;
//!
//! let xml = std::fs::File::open("dblp.xml").unwrap();
//! let mut pipeline = IngestPipeline::new(MemStore::new(), IngestConfig::default());
//! pipeline
//!     .ingest_document(std::io::BufReader::new(xml))
//!     .unwrap();
//!
//! let service = QueryService::new(pipeline.into_store(), ExpansionLimits::default());
//! let response = service.query("Donald E. Knuth").unwrap();
//! println!("{}", serde_json::to_string_pretty(&response).unwrap());
//! ```

pub mod coauthor;
pub mod config;
pub mod error;
pub mod ingest;
pub mod key;
pub mod keyword;
pub mod parser;
pub mod query;
pub mod record;
pub mod store;
