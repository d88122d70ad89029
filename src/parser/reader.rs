//! quick-xml driver for [`RecordParser`].

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::errors::{Error as XmlError, SyntaxError};
use quick_xml::escape::{resolve_html5_entity, resolve_predefined_entity};
use quick_xml::events::{BytesStart, Event};

use super::{ParseEvent, RecordParser};
use crate::error::{ParseError, ParseResult};
use crate::record::{Record, is_known_attribute};

/// Pull-based record reader over any buffered byte stream.
///
/// Named character entities are resolved against the XML predefined set
/// first and the HTML5 table second, which covers the Latin-1 names
/// (`&ouml;`, `&eacute;`, ...) bibliographic dumps declare in their DTD.
pub struct XmlRecordReader<R: BufRead> {
    reader: Reader<R>,
    parser: RecordParser,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> XmlRecordReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().expand_empty_elements = true;
        Self {
            reader,
            parser: RecordParser::new(),
            buf: Vec::with_capacity(4096),
            done: false,
        }
    }

    /// Byte offset of the tokenizer in the input.
    pub fn position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Advance until the next record or document end.
    ///
    /// Returns `Ok(None)` once the stream is exhausted and the document was
    /// complete. After an error the reader is done and yields `Ok(None)`.
    pub fn next_event(&mut self) -> ParseResult<Option<ParseEvent>> {
        loop {
            if let Some(event) = self.parser.next_event() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }
            if let Err(err) = self.step() {
                self.done = true;
                return Err(err);
            }
        }
    }

    fn step(&mut self) -> ParseResult<()> {
        self.buf.clear();
        let position = self.reader.buffer_position() as u64;
        let decoder = self.reader.decoder();

        match self.reader.read_event_into(&mut self.buf) {
            Ok(Event::Start(start)) => {
                let name = tag_name(start.name().as_ref(), position)?;
                let attributes = known_attributes(&start, decoder, position)?;
                self.parser.open_tag(&name, attributes, position)?;
            }
            Ok(Event::End(end)) => {
                let name = tag_name(end.name().as_ref(), position)?;
                self.parser.close_tag(&name, position)?;
            }
            Ok(Event::Text(text)) => {
                if self.parser.wants_text() {
                    let text = text.unescape_with(resolve_entity).map_err(|e| ParseError::Xml {
                        position,
                        message: e.to_string(),
                    })?;
                    self.parser.text(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if self.parser.wants_text() {
                    self.parser.text(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => {
                self.done = true;
                self.parser.finish()?;
            }
            Ok(_) => {}
            Err(err) => return Err(self.tokenizer_error(err)),
        }
        Ok(())
    }

    fn tokenizer_error(&self, err: XmlError) -> ParseError {
        let position = self.reader.error_position() as u64;
        match err {
            XmlError::Io(io) => ParseError::Io {
                source: std::io::Error::new(io.kind(), io.to_string()),
            },
            // Every syntax error other than bad `<!` markup means the stream
            // ended inside a construct.
            XmlError::Syntax(SyntaxError::InvalidBangMarkup) => ParseError::Xml {
                position,
                message: err.to_string(),
            },
            XmlError::Syntax(_) => match self.parser.finish() {
                Err(incomplete) => incomplete,
                Ok(()) => ParseError::Xml {
                    position,
                    message: err.to_string(),
                },
            },
            XmlError::IllFormed(ill) => ParseError::Structural {
                position,
                message: ill.to_string(),
            },
            other => ParseError::Xml {
                position,
                message: other.to_string(),
            },
        }
    }

    /// Iterate over records only, dropping the document-end marker.
    pub fn records(self) -> Records<R> {
        Records { inner: self }
    }
}

/// Iterator returned by [`XmlRecordReader::records`].
pub struct Records<R: BufRead> {
    inner: XmlRecordReader<R>,
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = ParseResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next_event() {
                Ok(Some(ParseEvent::Record(record))) => return Some(Ok(record)),
                Ok(Some(ParseEvent::DocumentEnd)) => continue,
                Ok(None) => return None,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    resolve_predefined_entity(name).or_else(|| resolve_html5_entity(name))
}

fn tag_name(raw: &[u8], position: u64) -> ParseResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| ParseError::Xml {
            position,
            message: format!("tag name is not UTF-8: {e}"),
        })
}

fn known_attributes(
    start: &BytesStart<'_>,
    decoder: Decoder,
    position: u64,
) -> ParseResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(|e| ParseError::Xml {
            position,
            message: e.to_string(),
        })?;
        let Ok(key) = std::str::from_utf8(attr.key.as_ref()) else {
            continue;
        };
        if !is_known_attribute(key) {
            continue;
        }
        let value = attr
            .decode_and_unescape_value_with(decoder, resolve_entity)
            .map_err(|e| ParseError::Xml {
                position,
                message: e.to_string(),
            })?;
        out.push((key.to_string(), value.into_owned()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_iterator_skips_document_end() {
        let doc = "<dblp><article key=\"a\"/><book key=\"b\"/></dblp>";
        let keys: Vec<String> = XmlRecordReader::new(doc.as_bytes())
            .records()
            .map(|r| r.unwrap().attribute("key").unwrap().to_string())
            .collect();
        assert_eq!(keys, ["a", "b"]);
    }

    #[test]
    fn attribute_entities_are_resolved() {
        let doc = "<dblp><www key=\"homepages/m/M&uuml;ller\"/></dblp>";
        let record = XmlRecordReader::new(doc.as_bytes())
            .records()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(record.attribute("key"), Some("homepages/m/Müller"));
    }

    #[test]
    fn cdata_inside_a_field_is_kept() {
        let doc = "<dblp><article><title><![CDATA[a < b]]></title></article></dblp>";
        let record = XmlRecordReader::new(doc.as_bytes())
            .records()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(record.first("title"), Some("a < b"));
    }

    #[test]
    fn reader_stops_after_error() {
        let doc = "<dblp><author>x</author></dblp>";
        let mut reader = XmlRecordReader::new(doc.as_bytes());
        assert!(reader.next_event().is_err());
        assert!(matches!(reader.next_event(), Ok(None)));
    }
}
