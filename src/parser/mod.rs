//! Streaming record parser.
//!
//! [`RecordParser`] is a tag-stack state machine: it is fed open tags, character
//! data and close tags in document order and emits a [`ParseEvent`] for every
//! completed record and for the close of the root element. Memory use is
//! bounded by the depth of the currently open tags plus the text of the field
//! being read, so multi-gigabyte dumps stream through in constant space.
//!
//! [`XmlRecordReader`] drives the state machine from any `BufRead` using a
//! `quick-xml` pull tokenizer; [`parse_document`] wraps it in the two-callback
//! interface used by the ingestion pipeline.

mod reader;

use std::collections::VecDeque;
use std::io::BufRead;

use crate::error::{ParseError, ParseResult};
use crate::record::{EntryType, Record, is_known_field};

pub use reader::{Records, XmlRecordReader};

/// Something the parser hands to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A record whose closing tag has just been seen.
    Record(Record),
    /// The root element closed.
    DocumentEnd,
}

/// Tag-stack state machine turning XML events into records.
#[derive(Debug, Default)]
pub struct RecordParser {
    stack: Vec<String>,
    buffer: String,
    /// Stack depth of the open field, if any. Field tags nested inside it are
    /// read as part of its text.
    field_depth: Option<usize>,
    current: Option<Record>,
    root_closed: bool,
    pending: VecDeque<ParseEvent>,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle an opening tag. `position` is only used for error reports.
    pub fn open_tag<I, K, V>(&mut self, name: &str, attributes: I, position: u64) -> ParseResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        if self.root_closed {
            return Err(structural(
                position,
                format!("<{name}> appears after the root element closed"),
            ));
        }

        if let Some(entry_type) = EntryType::from_tag(name) {
            if let Some(open) = &self.current {
                return Err(structural(
                    position,
                    format!("<{name}> opened inside an unfinished <{}>", open.entry_type()),
                ));
            }
            let mut record = Record::new(entry_type);
            for (key, value) in attributes {
                record.set_attribute(key.as_ref(), value);
            }
            self.current = Some(record);
        } else if is_known_field(name) {
            if self.current.is_none() {
                return Err(structural(
                    position,
                    format!("field <{name}> outside of any entry"),
                ));
            }
            if self.field_depth.is_none() {
                self.buffer.clear();
                self.field_depth = Some(self.stack.len());
            }
        }

        self.stack.push(name.to_string());
        Ok(())
    }

    /// Whether character data would be kept right now.
    pub fn wants_text(&self) -> bool {
        self.field_depth.is_some()
    }

    /// Handle character data. Ignored outside of a field.
    pub fn text(&mut self, text: &str) {
        if self.field_depth.is_some() {
            self.buffer.push_str(text);
        }
    }

    /// Handle a closing tag, queueing any event it completes.
    pub fn close_tag(&mut self, name: &str, position: u64) -> ParseResult<()> {
        match self.stack.last() {
            Some(top) if top == name => {}
            Some(top) => {
                return Err(structural(
                    position,
                    format!("</{name}> closes <{top}>"),
                ));
            }
            None => {
                return Err(structural(
                    position,
                    format!("</{name}> without a matching open tag"),
                ));
            }
        }
        self.stack.pop();

        if EntryType::from_tag(name).is_some() {
            let record = self.current.take().ok_or_else(|| {
                structural(position, format!("</{name}> closes an entry that never opened"))
            })?;
            self.field_depth = None;
            self.pending.push_back(ParseEvent::Record(record));
        } else if self.field_depth == Some(self.stack.len()) {
            let value = std::mem::take(&mut self.buffer);
            self.field_depth = None;
            if let Some(record) = self.current.as_mut() {
                record.push_property(name, value);
            }
        }

        if self.stack.is_empty() {
            self.root_closed = true;
            self.pending.push_back(ParseEvent::DocumentEnd);
        }
        Ok(())
    }

    /// Pop the next completed event, if any.
    pub fn next_event(&mut self) -> Option<ParseEvent> {
        self.pending.pop_front()
    }

    /// Check the end of the stream. Fails if anything is still open.
    pub fn finish(&self) -> ParseResult<()> {
        if self.root_closed && self.stack.is_empty() && self.current.is_none() {
            return Ok(());
        }
        let pending = match &self.current {
            Some(record) => format!(
                "A <{}> record{} was still being built and was not delivered.",
                record.entry_type(),
                record
                    .attribute("key")
                    .map(|k| format!(" ({k})"))
                    .unwrap_or_default()
            ),
            None if self.stack.is_empty() => "No root element was found.".to_string(),
            None => format!("Innermost open tag: <{}>.", self.stack.join("> <")),
        };
        Err(ParseError::IncompleteDocument {
            open_tags: self.stack.len(),
            pending,
        })
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

fn structural(position: u64, message: String) -> ParseError {
    ParseError::Structural { position, message }
}

/// Parse a whole document, calling `on_record` once per record and `on_end`
/// once when the root element closes.
///
/// Callback errors stop the parse and are returned unchanged.
pub fn parse_document<R, E, F, G>(input: R, mut on_record: F, mut on_end: G) -> Result<(), E>
where
    R: BufRead,
    E: From<ParseError>,
    F: FnMut(Record) -> Result<(), E>,
    G: FnMut() -> Result<(), E>,
{
    let mut reader = XmlRecordReader::new(input);
    while let Some(event) = reader.next_event()? {
        match event {
            ParseEvent::Record(record) => on_record(record)?,
            ParseEvent::DocumentEnd => on_end()?,
        }
    }
    Ok(())
}
