//! Rich diagnostic error types for bibgraph.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so the operator knows what
//! went wrong during a multi-hour ingestion run and whether a restart is needed.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for bibgraph.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the CLI report.
#[derive(Debug, Error, Diagnostic)]
pub enum BibError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience alias for crate-level results.
pub type BibResult<T> = std::result::Result<T, BibError>;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("structural error at byte {position}: {message}")]
    #[diagnostic(
        code(bib::parse::structural),
        help(
            "The document nests tags in a way the record parser cannot attribute \
             to a single entry (e.g. a field such as <author> outside any entry, \
             or an entry opened inside another entry). Validate the XML against \
             the DTD before ingesting."
        )
    )]
    Structural { position: u64, message: String },

    #[error("incomplete document: stream ended with {open_tags} open tag(s)")]
    #[diagnostic(
        code(bib::parse::incomplete),
        help(
            "The input was truncated before the root element closed. \
             {pending} Re-download or re-extract the dump and restart the \
             ingestion from scratch."
        )
    )]
    IncompleteDocument { open_tags: usize, pending: String },

    #[error("XML syntax error at byte {position}: {message}")]
    #[diagnostic(
        code(bib::parse::xml),
        help(
            "The tokenizer rejected the input. Check the encoding (UTF-8 expected) \
             and look for unescaped '&' or '<' characters near the reported offset."
        )
    )]
    Xml { position: u64, message: String },

    #[error("I/O error while reading the document: {source}")]
    #[diagnostic(
        code(bib::parse::io),
        help("The input stream could not be read. Check the file path and permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for parser results.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("storage backend unavailable at {path}: {message}")]
    #[diagnostic(
        code(bib::store::unavailable),
        help(
            "The storage backend could not be opened. Another process may hold \
             the database lock, or the data directory is missing or read-only."
        )
    )]
    Unavailable { path: String, message: String },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(bib::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption. Try running with a fresh data directory \
             and re-ingesting the dump."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(bib::store::serde),
        help(
            "Failed to serialize or deserialize stored data. \
             This usually means the on-disk format changed between versions. \
             Re-ingest the dump into a fresh data directory."
        )
    )]
    Serialization { message: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(bib::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Ingestion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("write failed for record {key}: {source}")]
    #[diagnostic(
        code(bib::ingest::write),
        help(
            "The storage backend rejected the writes for this record and the run \
             was aborted. Primary keys cannot resume mid-stream: fix the backend \
             problem and restart the ingestion from scratch."
        )
    )]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("commit failed after {records} record(s): {source}")]
    #[diagnostic(
        code(bib::ingest::commit),
        help(
            "All records were written but consolidating the derived tables failed. \
             Re-run the ingestion into a fresh data directory."
        )
    )]
    Commit {
        records: u64,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),
}

/// Convenience alias for ingestion results.
pub type IngestResult<T> = std::result::Result<T, IngestError>;

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("invalid record key: \"{key}\"")]
    #[diagnostic(
        code(bib::query::invalid_key),
        help(
            "Record keys are 1 to 32 hexadecimal digits, as returned in the \
             `work`, `keyword` and `fullmatch` lists of a query response."
        )
    )]
    InvalidKey { key: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for query results.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(bib::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(bib::config::parse),
        help("Check the TOML syntax. Unknown keys are rejected.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(bib::config::write),
        help("Ensure you have write permissions to the config directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias for config results.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
