//! Participatory Budgeting File Checker
//!
//! Parses `.pb` election files and validates them against a schema.
//!
//! This library provides:
//! - A section parser for the `META` / `PROJECTS` / `VOTES` layout
//! - Structural, semantic and selection-rule validation
//! - Configurable issue severities
//! - Concurrent batch checking with aggregated summaries

pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod parser;
pub mod schema;
pub mod validation;

pub use batch::{BatchResult, Checker, FileResult, InputSource};
pub use config::Config;
pub use core::{Document, IssueCode, Severity, ValidationIssue};
pub use parser::{parse_sections, ParsedSections};
pub use schema::{Schema, SchemaRegistry};
pub use validation::{validate_document, CodeTable, ReferenceLookup};
