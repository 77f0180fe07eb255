//! Document Model
//!
//! Typed view of a parsed file. Built once from the section tree and never
//! mutated by the validators.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::diagnostics::{IssueCode, IssueCollector, IssueDetails, Location};
use crate::parser::{ParsedSections, Row, Section, SectionKind};
use crate::schema::{split_list, FieldRole, Schema};

/// One META key/value pair
#[derive(Debug, Clone, PartialEq)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
    pub row: usize,
    pub line: usize,
}

/// Ordered META entries, keys unique
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaRecord {
    entries: Vec<MetaEntry>,
    /// Row where each key first appeared, parallel to `entries`
    first_rows: Vec<usize>,
}

impl MetaRecord {
    /// Insert an entry; a repeated key (case-insensitive) replaces the
    /// earlier value in place and the row of its first occurrence is returned
    pub fn insert(&mut self, entry: MetaEntry) -> Option<usize> {
        match self
            .entries
            .iter()
            .position(|e| e.key.eq_ignore_ascii_case(&entry.key))
        {
            Some(pos) => {
                self.entries[pos] = entry;
                Some(self.first_rows[pos])
            }
            None => {
                self.first_rows.push(entry.row);
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn entry(&self, key: &str) -> Option<&MetaEntry> {
        self.entries.iter().find(|e| e.key.eq_ignore_ascii_case(key))
    }

    /// Raw value of a key, `None` when absent or empty
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entry(key)
            .map(|e| e.value.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn entries(&self) -> &[MetaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fields of one data row, addressed by header name
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    columns: Arc<[String]>,
    values: Vec<String>,
}

impl Attributes {
    fn new(columns: Arc<[String]>, values: Vec<String>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx).map(String::as_str)
    }

    /// Column/value pairs in header order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub id: String,
    pub row: usize,
    pub line: usize,
    pub attributes: Attributes,
}

impl ProjectRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.attributes.get(column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoteRecord {
    pub id: String,
    pub row: usize,
    pub line: usize,
    /// Selected project ids in ballot order, empty entries kept
    pub selection: Vec<String>,
    pub attributes: Attributes,
}

impl VoteRecord {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.attributes.get(column)
    }
}

/// A parsed and typed .pb file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub meta: MetaRecord,
    pub projects: Vec<ProjectRecord>,
    pub votes: Vec<VoteRecord>,
    /// Sections found in the input, in input order
    pub sections: Vec<SectionKind>,
    pub project_header: Vec<String>,
    pub vote_header: Vec<String>,
    project_index: HashMap<String, usize>,
}

impl Document {
    pub fn has_section(&self, kind: SectionKind) -> bool {
        self.sections.contains(&kind)
    }

    pub fn project(&self, id: &str) -> Option<&ProjectRecord> {
        self.project_index.get(id).map(|&idx| &self.projects[idx])
    }

    /// Column names of a section header
    pub fn header(&self, kind: SectionKind) -> &[String] {
        match kind {
            SectionKind::Meta => &[],
            SectionKind::Projects => &self.project_header,
            SectionKind::Votes => &self.vote_header,
        }
    }
}

/// Build a document from parsed sections
pub fn build_document(
    parsed: &ParsedSections,
    schema: &Schema,
    issues: &mut IssueCollector<'_>,
) -> Document {
    let mut document = Document {
        sections: parsed.sections.iter().map(|s| s.kind).collect(),
        ..Document::default()
    };

    if let Some(section) = parsed.section(SectionKind::Meta) {
        build_meta(section, &mut document.meta, issues);
    }

    if let Some(section) = parsed.section(SectionKind::Projects) {
        document.project_header = section.header.clone();
        let columns = shared_columns(section);
        let mut index = HashMap::new();
        for row in &section.rows {
            let record = ProjectRecord {
                id: row_id(row),
                row: row.index,
                line: row.line,
                attributes: Attributes::new(Arc::clone(&columns), row.fields.clone()),
            };
            insert_unique(&mut document.projects, &mut index, record, section.kind, issues);
        }
        check_id_column(section, schema, issues);
        document.project_index = index.into_iter().map(|(id, (idx, _))| (id, idx)).collect();
    }

    if let Some(section) = parsed.section(SectionKind::Votes) {
        document.vote_header = section.header.clone();
        let columns = shared_columns(section);
        let selection_column = schema
            .column(SectionKind::Votes, FieldRole::Selection)
            .and_then(|name| section.column(name));
        let mut index = HashMap::new();
        for row in &section.rows {
            let selection = selection_column
                .and_then(|col| row.get(col))
                .map(|cell| split_list(cell).into_iter().map(str::to_string).collect())
                .unwrap_or_default();
            let record = VoteRecord {
                id: row_id(row),
                row: row.index,
                line: row.line,
                selection,
                attributes: Attributes::new(Arc::clone(&columns), row.fields.clone()),
            };
            insert_unique(&mut document.votes, &mut index, record, section.kind, issues);
        }
        check_id_column(section, schema, issues);
    }

    log::debug!(
        "built document: {} meta entries, {} projects, {} votes",
        document.meta.len(),
        document.projects.len(),
        document.votes.len()
    );

    document
}

fn build_meta(section: &Section, meta: &mut MetaRecord, issues: &mut IssueCollector<'_>) {
    for row in &section.rows {
        let key = row.get(0).unwrap_or_default().to_string();
        let location = Location::row(SectionKind::Meta, row.index, row.line);
        if key.is_empty() {
            issues.report(IssueCode::MalformedSyntax, location, "META row has no key");
            continue;
        }

        let entry = MetaEntry {
            key: key.clone(),
            value: row.get(1).unwrap_or_default().to_string(),
            row: row.index,
            line: row.line,
        };
        if let Some(first_row) = meta.insert(entry) {
            issues.report_with(
                IssueCode::DuplicateIdentifier,
                location.with_field(key.clone()),
                format!(
                    "META key '{}' repeats the key at row {}; last value wins",
                    key, first_row
                ),
                IssueDetails::Duplicate { id: key, first_row },
            );
        }
    }
}

fn shared_columns(section: &Section) -> Arc<[String]> {
    Arc::from(section.header.as_slice())
}

fn row_id(row: &Row) -> String {
    row.get(0).unwrap_or_default().to_string()
}

/// The id must sit in the first header column
fn check_id_column(section: &Section, schema: &Schema, issues: &mut IssueCollector<'_>) {
    let (Some(expected), Some(first)) = (
        schema.column(section.kind, FieldRole::Id),
        section.header.first(),
    ) else {
        return;
    };

    if first != expected {
        issues.report(
            IssueCode::MalformedSyntax,
            Location::section(section.kind).with_line(section.line + 1),
            format!(
                "first column of {} should be '{}', found '{}'; used as id anyway",
                section.kind, expected, first
            ),
        );
    }
}

/// Records addressed by an id column
trait Identified {
    fn id(&self) -> &str;
    fn row(&self) -> usize;
    fn line(&self) -> usize;
}

impl Identified for ProjectRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn row(&self) -> usize {
        self.row
    }
    fn line(&self) -> usize {
        self.line
    }
}

impl Identified for VoteRecord {
    fn id(&self) -> &str {
        &self.id
    }
    fn row(&self) -> usize {
        self.row
    }
    fn line(&self) -> usize {
        self.line
    }
}

/// Append a record, replacing an earlier one with the same id in place
///
/// `seen` maps each id to its position and the row of its first occurrence.
fn insert_unique<T: Identified>(
    records: &mut Vec<T>,
    seen: &mut HashMap<String, (usize, usize)>,
    record: T,
    kind: SectionKind,
    issues: &mut IssueCollector<'_>,
) {
    let id = record.id().to_string();
    if id.is_empty() {
        // empty ids are reported by the structural validator
        records.push(record);
        return;
    }

    match seen.get(&id) {
        Some(&(idx, first_row)) => {
            issues.report_with(
                IssueCode::DuplicateIdentifier,
                Location::row(kind, record.row(), record.line()),
                format!(
                    "{} id '{}' repeats the id at row {}; last record wins",
                    kind, id, first_row
                ),
                IssueDetails::Duplicate { id, first_row },
            );
            records[idx] = record;
        }
        None => {
            seen.insert(id, (records.len(), record.row()));
            records.push(record);
        }
    }
}
