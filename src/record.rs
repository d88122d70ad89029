//! In-memory model of one bibliographic record.
//!
//! A [`Record`] is built incrementally by the streaming parser: its
//! [`EntryType`] is fixed when the entry tag opens, whitelisted attributes are
//! copied from that tag, and each closing field tag appends one more value to
//! the field's ordered sequence.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Attribute names copied from an entry's opening tag. Others are dropped.
pub const ATTRIBUTE_WHITELIST: &[&str] = &[
    "key", "mdate", "publtype", "reviewid", "rating", "cdate", "aux", "bibtex", "orcid", "label",
    "type", "href", "uri", "sort",
];

/// Field names whose character content is collected. Others are dropped.
pub const FIELD_WHITELIST: &[&str] = &[
    "author",
    "editor",
    "title",
    "booktitle",
    "pages",
    "year",
    "address",
    "volume",
    "number",
    "month",
    "url",
    "ee",
    "cdrom",
    "cite",
    "publisher",
    "note",
    "crossref",
    "isbn",
    "series",
    "school",
    "chapter",
    "publnr",
    "stream",
    "rel",
];

/// Placeholder title for records without a usable `title` field.
pub const UNTITLED: &str = "Untitled";

/// Whether `name` is a recognized attribute.
pub fn is_known_attribute(name: &str) -> bool {
    ATTRIBUTE_WHITELIST.contains(&name)
}

/// Whether `name` is a recognized field.
pub fn is_known_field(name: &str) -> bool {
    FIELD_WHITELIST.contains(&name)
}

/// Kind of bibliographic entry, one per recognized top-level tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Article,
    InProceedings,
    Proceedings,
    Book,
    InCollection,
    PhdThesis,
    MastersThesis,
    Www,
    Person,
    Data,
}

impl EntryType {
    /// All entry types, in tag-table order.
    pub const ALL: [EntryType; 10] = [
        EntryType::Article,
        EntryType::InProceedings,
        EntryType::Proceedings,
        EntryType::Book,
        EntryType::InCollection,
        EntryType::PhdThesis,
        EntryType::MastersThesis,
        EntryType::Www,
        EntryType::Person,
        EntryType::Data,
    ];

    /// Resolve an XML tag name. Returns `None` for anything that is not an entry.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// The XML tag name for this entry type.
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Article => "article",
            EntryType::InProceedings => "inproceedings",
            EntryType::Proceedings => "proceedings",
            EntryType::Book => "book",
            EntryType::InCollection => "incollection",
            EntryType::PhdThesis => "phdthesis",
            EntryType::MastersThesis => "mastersthesis",
            EntryType::Www => "www",
            EntryType::Person => "person",
            EntryType::Data => "data",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed bibliographic entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    entry_type: EntryType,
    attributes: BTreeMap<String, String>,
    properties: BTreeMap<String, Vec<String>>,
}

impl Record {
    /// Start an empty record of the given type.
    pub fn new(entry_type: EntryType) -> Self {
        Self {
            entry_type,
            attributes: BTreeMap::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    /// Set an attribute if its name is whitelisted. Returns whether it was kept.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) -> bool {
        if !is_known_attribute(name) {
            return false;
        }
        self.attributes.insert(name.to_string(), value.into());
        true
    }

    /// Append one value to a whitelisted field. Returns whether it was kept.
    pub fn push_property(&mut self, name: &str, value: impl Into<String>) -> bool {
        if !is_known_field(name) {
            return false;
        }
        self.properties
            .entry(name.to_string())
            .or_default()
            .push(value.into());
        true
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All values of a field in document order (empty if absent).
    pub fn property(&self, name: &str) -> &[String] {
        self.properties.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of a field, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.property(name).first().map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn properties(&self) -> &BTreeMap<String, Vec<String>> {
        &self.properties
    }

    pub fn authors(&self) -> &[String] {
        self.property("author")
    }

    /// The title used for content addressing: the first non-empty `title`
    /// value, else [`UNTITLED`].
    pub fn title_or_placeholder(&self) -> &str {
        match self.first("title") {
            Some(t) if !t.is_empty() => t,
            _ => UNTITLED,
        }
    }

    /// Publication year from the first `year` value, if it parses.
    pub fn year(&self) -> Option<u32> {
        self.first("year").and_then(|y| y.trim().parse().ok())
    }
}
