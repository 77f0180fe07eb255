//! Section Tree for .pb files
//!
//! Plain data produced by the tokenizer. Field contents are kept as raw
//! strings; interpretation happens in the document builder and validators.

use std::fmt;

use serde::Serialize;

/// The three section kinds of the format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SectionKind {
    Meta,
    Projects,
    Votes,
}

impl SectionKind {
    pub const ALL: [SectionKind; 3] = [SectionKind::Meta, SectionKind::Projects, SectionKind::Votes];

    /// Recognize a section marker name, ignoring case and surrounding blanks
    pub fn from_marker(text: &str) -> Option<Self> {
        let name = text.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Meta => "META",
            SectionKind::Projects => "PROJECTS",
            SectionKind::Votes => "VOTES",
        }
    }

    /// Position in the canonical META, PROJECTS, VOTES order
    pub fn ordinal(self) -> usize {
        match self {
            SectionKind::Meta => 0,
            SectionKind::Projects => 1,
            SectionKind::Votes => 2,
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One delimited data row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 0-based data row index inside its section
    pub index: usize,
    /// 1-based source line
    pub line: usize,
    pub fields: Vec<String>,
}

impl Row {
    pub fn get(&self, column: usize) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// A named block with its header-defined schema
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    /// 1-based line of the section marker
    pub line: usize,
    pub header: Vec<String>,
    /// Rows whose field count matches the header
    pub rows: Vec<Row>,
    /// Rows rejected for a field count mismatch
    pub unusable: Vec<Row>,
}

impl Section {
    pub fn new(kind: SectionKind, line: usize) -> Self {
        Self {
            kind,
            line,
            header: Vec::new(),
            rows: Vec::new(),
            unusable: Vec::new(),
        }
    }

    /// Column index of a header field
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Number of data rows seen, usable or not
    pub fn row_count(&self) -> usize {
        self.rows.len() + self.unusable.len()
    }
}
