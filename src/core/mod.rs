//! Core Data Types
//!
//! Issue reporting and the typed document shared by every validation stage.

pub mod diagnostics;
pub mod document;

pub use diagnostics::{
    IssueClass, IssueCode, IssueCollector, IssueDetails, Location, Severity, SeverityLevel,
    SeverityPolicy, ValidationIssue,
};
pub use document::{build_document, Document, MetaEntry, MetaRecord, ProjectRecord, VoteRecord};
