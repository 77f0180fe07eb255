//! .pb Lexer
//!
//! Splits raw text into delimited records and classifies each one as a
//! section marker or a plain record. Quoting and line tracking come from
//! the `csv` reader; no field is interpreted here.

use std::sync::LazyLock;

use csv::{ReaderBuilder, Trim};
use regex::Regex;

use crate::parser::ast::SectionKind;

/// Default field separator of the format
pub const DEFAULT_SEPARATOR: u8 = b';';

/// Anything shaped like a section name: upper-case identifier on its own line
static MARKER_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]+$").expect("valid marker regex"));

/// Token types in a .pb file
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// "META", "PROJECTS" or "VOTES"
    Marker(SectionKind),
    /// A line shaped like a section marker with an unrecognized name
    UnknownMarker(String),
    /// Header or data record
    Record,
}

/// A record with its fields and starting line
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// 1-based line where the record starts
    pub line: usize,
    pub fields: Vec<String>,
}

/// Output of [`tokenize`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    /// Reader failure that stopped tokenizing: line and message
    pub error: Option<(usize, String)>,
}

/// Tokenize a whole document
///
/// Whitespace-only lines produce no token; [`blank_lines`] reports them.
pub fn tokenize(text: &str, separator: u8) -> Lexed {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(separator)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut lexed = Lexed::default();
    let mut last_line = 1;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(last_line);
                lexed.error = Some((line, e.to_string()));
                break;
            }
        };

        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(last_line);
        last_line = line;

        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if fields.iter().all(String::is_empty) && fields.len() <= 1 {
            continue;
        }

        let kind = classify(&fields);
        lexed.tokens.push(Token { kind, line, fields });
    }

    lexed
}

/// Decide whether a record is a section marker
fn classify(fields: &[String]) -> TokenKind {
    let Some(first) = fields.first() else {
        return TokenKind::Record;
    };
    let rest_empty = fields[1..].iter().all(String::is_empty);

    if rest_empty {
        if let Some(kind) = SectionKind::from_marker(first) {
            return TokenKind::Marker(kind);
        }
        if MARKER_SHAPE.is_match(first) {
            return TokenKind::UnknownMarker(first.clone());
        }
    }

    TokenKind::Record
}

/// 1-based numbers of whitespace-only lines
pub fn blank_lines(text: &str) -> Vec<usize> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| line.trim().is_empty())
        .map(|(idx, _)| idx + 1)
        .collect()
}
