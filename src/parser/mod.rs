//! .pb Parser
//!
//! Turns raw text into ordered sections with best-effort recovery.
//! Purely syntactic: headers and rows are split, never interpreted.

pub mod ast;
pub mod lexer;

pub use ast::{Row, Section, SectionKind};
pub use lexer::{blank_lines, tokenize, Token, TokenKind, DEFAULT_SEPARATOR};

use std::collections::HashSet;

use crate::core::diagnostics::{IssueCode, Location, ValidationIssue};

/// Sections of one file plus the recoverable issues met while reading them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSections {
    pub sections: Vec<Section>,
    pub issues: Vec<ValidationIssue>,
}

impl ParsedSections {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    Start,
    ExpectHeader(usize),
    InRows(usize),
    ErrorSkip,
}

/// Parse a whole document into sections
///
/// This is the main entry point for parsing. Unknown sections and bad rows
/// are reported and skipped; the only failure is input without any
/// recognized section, returned as a fatal `EmptyOrUnrecognized` issue.
pub fn parse_sections(text: &str, separator: u8) -> Result<ParsedSections, ValidationIssue> {
    if text.trim().is_empty() {
        return Err(ValidationIssue::new(
            IssueCode::EmptyOrUnrecognized,
            Location::file(),
            "input is empty",
        ));
    }

    let lexed = lexer::tokenize(text, separator);
    let mut parsed = ParsedSections::default();
    let mut seen: HashSet<SectionKind> = HashSet::new();
    let mut last_ordinal = 0;
    let mut state = State::Start;

    for token in lexed.tokens {
        match token.kind {
            TokenKind::Marker(kind) => {
                if !seen.insert(kind) {
                    parsed.issues.push(ValidationIssue::new(
                        IssueCode::DuplicateSection,
                        Location::section(kind).with_line(token.line),
                        format!("section {} appears more than once; repeated block skipped", kind),
                    ));
                    state = State::ErrorSkip;
                    continue;
                }
                if kind.ordinal() < last_ordinal {
                    parsed.issues.push(ValidationIssue::new(
                        IssueCode::SectionOutOfOrder,
                        Location::section(kind).with_line(token.line),
                        format!("section {} should come before the sections above it", kind),
                    ));
                }
                last_ordinal = last_ordinal.max(kind.ordinal());

                let mut section = Section::new(kind, token.line);
                if kind == SectionKind::Meta {
                    section.header = vec!["key".to_string(), "value".to_string()];
                }
                parsed.sections.push(section);
                state = State::ExpectHeader(parsed.sections.len() - 1);
            }
            TokenKind::UnknownMarker(name) => {
                parsed.issues.push(ValidationIssue::new(
                    IssueCode::UnknownSection,
                    Location::line(token.line),
                    format!(
                        "unknown section '{}', expected META, PROJECTS or VOTES; block skipped",
                        name
                    ),
                ));
                state = State::ErrorSkip;
            }
            TokenKind::Record => match state {
                State::Start => {
                    parsed.issues.push(ValidationIssue::new(
                        IssueCode::MalformedSyntax,
                        Location::line(token.line),
                        "content before the first section marker",
                    ));
                }
                State::ErrorSkip => {
                    log::debug!("skipping line {} inside ignored block", token.line);
                }
                State::ExpectHeader(idx) => {
                    let section = &mut parsed.sections[idx];
                    if section.kind == SectionKind::Meta && !is_meta_header(&token.fields) {
                        // META header is optional
                        push_row(section, token.line, token.fields, &mut parsed.issues);
                    } else {
                        check_header(section.kind, token.line, &token.fields, &mut parsed.issues);
                        section.header = token.fields;
                    }
                    state = State::InRows(idx);
                }
                State::InRows(idx) => {
                    let section = &mut parsed.sections[idx];
                    push_row(section, token.line, token.fields, &mut parsed.issues);
                }
            },
        }
    }

    if let Some((line, message)) = lexed.error {
        parsed.issues.push(ValidationIssue::new(
            IssueCode::MalformedSyntax,
            Location::line(line),
            format!("unreadable record, rest of input ignored: {}", message),
        ));
    }

    if parsed.sections.is_empty() {
        return Err(ValidationIssue::new(
            IssueCode::EmptyOrUnrecognized,
            Location::file(),
            "no recognized section found (expected META, PROJECTS or VOTES)",
        ));
    }

    for section in &parsed.sections {
        if section.header.is_empty() {
            parsed.issues.push(ValidationIssue::new(
                IssueCode::MalformedSyntax,
                Location::section(section.kind).with_line(section.line),
                format!("section {} has no header row", section.kind),
            ));
        }
    }

    let blanks = lexer::blank_lines(text);
    if !blanks.is_empty() {
        parsed.issues.push(ValidationIssue::new(
            IssueCode::EmptyLines,
            Location::file(),
            format!("contains {} empty line(s) at: {:?}", blanks.len(), blanks),
        ));
    }

    Ok(parsed)
}

fn is_meta_header(fields: &[String]) -> bool {
    fields.len() == 2
        && fields[0].eq_ignore_ascii_case("key")
        && fields[1].eq_ignore_ascii_case("value")
}

/// Header names must be non-empty and distinct
fn check_header(kind: SectionKind, line: usize, header: &[String], issues: &mut Vec<ValidationIssue>) {
    let mut names = HashSet::new();
    for (column, name) in header.iter().enumerate() {
        if name.is_empty() {
            issues.push(ValidationIssue::new(
                IssueCode::MalformedSyntax,
                Location::section(kind).with_line(line),
                format!("header column {} of {} has no name", column + 1, kind),
            ));
        } else if !names.insert(name.as_str()) {
            issues.push(ValidationIssue::new(
                IssueCode::MalformedSyntax,
                Location::section(kind).with_line(line).with_field(name.clone()),
                format!("header of {} repeats column '{}'", kind, name),
            ));
        }
    }
}

fn push_row(section: &mut Section, line: usize, fields: Vec<String>, issues: &mut Vec<ValidationIssue>) {
    let row = Row {
        index: section.row_count(),
        line,
        fields,
    };

    if row.fields.len() != section.header.len() {
        issues.push(ValidationIssue::new(
            IssueCode::FieldCountMismatch,
            Location::row(section.kind, row.index, line),
            format!(
                "row has {} field(s) but the {} header declares {}",
                row.fields.len(),
                section.kind,
                section.header.len()
            ),
        ));
        section.unusable.push(row);
    } else {
        section.rows.push(row);
    }
}
