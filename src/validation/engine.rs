//! Validation Engine
//!
//! Runs the structural, semantic and outcome checks over a built document.
//! Validators only read the document; every finding goes to the collector.

use crate::core::diagnostics::{IssueCode, IssueCollector, Location};
use crate::core::document::{Document, ProjectRecord, VoteRecord};
use crate::parser::SectionKind;
use crate::schema::{parse_number, FieldProblem, FieldRole, Schema};
use crate::validation::lookup::ReferenceLookup;
use crate::validation::{rules, semantic, structural};

/// Everything a validator may look at
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub document: &'a Document,
    pub schema: &'a Schema,
    pub lookup: Option<&'a dyn ReferenceLookup>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(document: &'a Document, schema: &'a Schema) -> Self {
        Self {
            document,
            schema,
            lookup: None,
        }
    }

    pub fn with_lookup(mut self, lookup: &'a dyn ReferenceLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Non-empty raw META value of a role
    pub fn meta_raw(&self, role: FieldRole) -> Option<&'a str> {
        let key = self.schema.meta_key(role)?;
        self.document.meta.get(key)
    }

    /// META value of a role parsed as a number, decimal comma accepted
    pub fn meta_number(&self, role: FieldRole) -> Option<f64> {
        self.meta_raw(role).and_then(parse_number)
    }

    /// META value of a role, trimmed and lower-cased
    pub fn meta_keyword(&self, role: FieldRole) -> Option<String> {
        self.meta_raw(role).map(|v| v.trim().to_ascii_lowercase())
    }

    /// Name of the PROJECTS column of a role, when the header has it
    pub fn project_column(&self, role: FieldRole) -> Option<&'a str> {
        self.present_column(SectionKind::Projects, role)
    }

    /// Name of the VOTES column of a role, when the header has it
    pub fn vote_column(&self, role: FieldRole) -> Option<&'a str> {
        self.present_column(SectionKind::Votes, role)
    }

    fn present_column(&self, kind: SectionKind, role: FieldRole) -> Option<&'a str> {
        let name = self.schema.column(kind, role)?;
        self.document
            .header(kind)
            .iter()
            .any(|h| h == name)
            .then_some(name)
    }

    /// Parsed cost of a project
    pub fn project_cost(&self, project: &ProjectRecord) -> Option<f64> {
        let column = self.project_column(FieldRole::Cost)?;
        project.get(column).and_then(parse_number)
    }

    /// Parsed number in a project column
    pub fn project_number(&self, project: &ProjectRecord, column: &str) -> Option<f64> {
        project.get(column).and_then(parse_number)
    }

    /// Raw points cell of a ballot
    pub fn vote_points<'v>(&self, vote: &'v VoteRecord) -> Option<&'v str> {
        let column = self.vote_column(FieldRole::Points)?;
        vote.get(column)
    }
}

/// Validate a document with every check
///
/// This is the main validation entry point. Checks are independent: each one
/// skips itself when its input is unusable, so a structural failure never
/// hides an unrelated semantic finding.
pub fn validate_document(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    structural::check(ctx, issues);
    semantic::check(ctx, issues);
    rules::check(ctx, issues);
}

/// Report the problems of one field value
pub(crate) fn report_field_problems(
    problems: Vec<FieldProblem>,
    value: &str,
    location: &Location,
    issues: &mut IssueCollector<'_>,
) {
    for problem in problems {
        let (code, message) = match problem {
            FieldProblem::CommaDecimal(repaired) => (
                IssueCode::CommaInNumber,
                format!("'{}' uses a decimal comma; read as {}", value, repaired),
            ),
            FieldProblem::WrongType(message) => (IssueCode::InvalidFieldType, message),
            FieldProblem::Constraint(message) => (IssueCode::InvalidFieldValue, message),
        };
        issues.report(code, location.clone(), message);
    }
}
