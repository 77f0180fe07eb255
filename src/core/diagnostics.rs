//! Issue Reporting
//!
//! Issue codes, severities, locations and the collector every pipeline
//! stage writes into. Issues are plain data; nothing here ever fails.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::SectionKind;

/// Severity of a reported issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Broad family an issue code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IssueClass {
    /// No document could be produced for the input
    FatalParse,
    /// The document is internally inconsistent
    Structural,
    /// Cross-section or domain rule violation
    Semantic,
}

/// Stable identifier of every check the checker performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueCode {
    // Fatal
    EmptyOrUnrecognized,
    UnreadableInput,
    CheckAborted,

    // Structural
    MalformedSyntax,
    UnknownSection,
    DuplicateSection,
    SectionOutOfOrder,
    FieldCountMismatch,
    EmptyLines,
    DuplicateIdentifier,
    MissingRequiredField,
    InvalidFieldType,
    InvalidFieldValue,
    CommaInNumber,
    UnknownField,
    FieldOrder,
    DateRangeMismatch,
    CountMismatch,
    InvalidCost,

    // Semantic
    UnknownProjectReference,
    BallotSizeViolated,
    MaxLengthUnused,
    BallotPointsViolated,
    BudgetConstraintViolated,
    ProjectTallyMismatch,
    UnknownReferenceCode,
    ZeroCostProject,
    ProjectExceedsBudget,
    WrongFullyFundedFlag,
    AllProjectsFunded,
    SelectionRuleViolated,
    SelectionMismatch,
    MissingRuleComment,
    ThresholdViolation,
    RuleNotVerified,
    UnusedBudget,
}

impl IssueCode {
    pub const ALL: [IssueCode; 36] = {
        use IssueCode::*;
        [
            EmptyOrUnrecognized,
            UnreadableInput,
            CheckAborted,
            MalformedSyntax,
            UnknownSection,
            DuplicateSection,
            SectionOutOfOrder,
            FieldCountMismatch,
            EmptyLines,
            DuplicateIdentifier,
            MissingRequiredField,
            InvalidFieldType,
            InvalidFieldValue,
            CommaInNumber,
            UnknownField,
            FieldOrder,
            DateRangeMismatch,
            CountMismatch,
            InvalidCost,
            UnknownProjectReference,
            BallotSizeViolated,
            MaxLengthUnused,
            BallotPointsViolated,
            BudgetConstraintViolated,
            ProjectTallyMismatch,
            UnknownReferenceCode,
            ZeroCostProject,
            ProjectExceedsBudget,
            WrongFullyFundedFlag,
            AllProjectsFunded,
            SelectionRuleViolated,
            SelectionMismatch,
            MissingRuleComment,
            ThresholdViolation,
            RuleNotVerified,
            UnusedBudget,
        ]
    };

    /// Look up a code by its name, e.g. `CountMismatch`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|code| format!("{:?}", code) == name.trim())
    }

    /// Severity used when the policy does not override it
    pub fn default_severity(self) -> Severity {
        use IssueCode::*;
        match self {
            SectionOutOfOrder | EmptyLines | UnknownField | FieldOrder | CountMismatch
            | MaxLengthUnused | UnknownReferenceCode | SelectionMismatch | MissingRuleComment
            | RuleNotVerified => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn class(self) -> IssueClass {
        use IssueCode::*;
        match self {
            EmptyOrUnrecognized | UnreadableInput | CheckAborted => IssueClass::FatalParse,
            MalformedSyntax | UnknownSection | DuplicateSection | SectionOutOfOrder
            | FieldCountMismatch | EmptyLines | DuplicateIdentifier | MissingRequiredField
            | InvalidFieldType | InvalidFieldValue | CommaInNumber | UnknownField | FieldOrder
            | DateRangeMismatch | CountMismatch | InvalidCost => IssueClass::Structural,
            _ => IssueClass::Semantic,
        }
    }

    pub fn is_fatal(self) -> bool {
        self.class() == IssueClass::FatalParse
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where in the input an issue was found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionKind>,
    /// 0-based data row index inside the section
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// 1-based source line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Location {
    /// Whole-file location
    pub fn file() -> Self {
        Self::default()
    }

    pub fn line(line: usize) -> Self {
        Self {
            line: Some(line),
            ..Self::default()
        }
    }

    pub fn section(section: SectionKind) -> Self {
        Self {
            section: Some(section),
            ..Self::default()
        }
    }

    pub fn row(section: SectionKind, row: usize, line: usize) -> Self {
        Self {
            section: Some(section),
            row: Some(row),
            line: Some(line),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(section) = self.section {
            parts.push(section.to_string());
        }
        if let Some(row) = self.row {
            parts.push(format!("row {}", row));
        }
        if let Some(field) = &self.field {
            parts.push(format!("field '{}'", field));
        }
        if let Some(line) = self.line {
            parts.push(format!("line {}", line));
        }
        if parts.is_empty() {
            write!(f, "file")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Structured payload attached to some issues
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueDetails {
    ProjectReference { vote_id: String, project_id: String },
    Duplicate { id: String, first_row: usize },
    Count { declared: f64, actual: usize },
}

/// A single reported defect
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<IssueDetails>,
}

impl ValidationIssue {
    /// Build an issue with the code's default severity
    pub fn new(code: IssueCode, location: Location, message: impl Into<String>) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            message: message.into(),
            location,
            details: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}[{}] {}: {}", level, self.code, self.location, self.message)
    }
}

/// Configured severity for one issue code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Error,
    Warning,
    /// Suppress the issue entirely
    Off,
}

/// Per-code severity overrides
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeverityPolicy {
    overrides: HashMap<IssueCode, SeverityLevel>,
}

impl SeverityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, code: IssueCode, level: SeverityLevel) -> Self {
        self.overrides.insert(code, level);
        self
    }

    pub fn from_overrides(overrides: HashMap<IssueCode, SeverityLevel>) -> Self {
        Self { overrides }
    }

    /// Effective severity, `None` when the code is switched off
    pub fn resolve(&self, code: IssueCode) -> Option<Severity> {
        match self.overrides.get(&code) {
            Some(SeverityLevel::Error) => Some(Severity::Error),
            Some(SeverityLevel::Warning) => Some(Severity::Warning),
            Some(SeverityLevel::Off) => None,
            None => Some(code.default_severity()),
        }
    }
}

/// Ordered issue sink shared by the pipeline stages of one file
#[derive(Debug)]
pub struct IssueCollector<'p> {
    policy: &'p SeverityPolicy,
    issues: Vec<ValidationIssue>,
}

impl<'p> IssueCollector<'p> {
    pub fn new(policy: &'p SeverityPolicy) -> Self {
        Self {
            policy,
            issues: Vec::new(),
        }
    }

    pub fn report(&mut self, code: IssueCode, location: Location, message: impl Into<String>) {
        self.push(code, location, message.into(), None);
    }

    pub fn report_with(
        &mut self,
        code: IssueCode,
        location: Location,
        message: impl Into<String>,
        details: IssueDetails,
    ) {
        self.push(code, location, message.into(), Some(details));
    }

    /// Append issues produced elsewhere, re-applying the policy
    pub fn extend(&mut self, issues: impl IntoIterator<Item = ValidationIssue>) {
        for issue in issues {
            self.push(issue.code, issue.location, issue.message, issue.details);
        }
    }

    fn push(
        &mut self,
        code: IssueCode,
        location: Location,
        message: String,
        details: Option<IssueDetails>,
    ) {
        let Some(severity) = self.policy.resolve(code) else {
            log::trace!("suppressed {} at {}", code, location);
            return;
        };
        self.issues.push(ValidationIssue {
            severity,
            code,
            message,
            location,
            details,
        });
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severities() {
        assert_eq!(IssueCode::CountMismatch.default_severity(), Severity::Warning);
        assert_eq!(IssueCode::UnknownReferenceCode.default_severity(), Severity::Warning);
        assert_eq!(IssueCode::FieldCountMismatch.default_severity(), Severity::Error);
        assert_eq!(IssueCode::BudgetConstraintViolated.default_severity(), Severity::Error);
    }

    #[test]
    fn test_code_names() {
        assert_eq!(IssueCode::from_name("CountMismatch"), Some(IssueCode::CountMismatch));
        assert_eq!(IssueCode::from_name("UnusedBudget"), Some(IssueCode::UnusedBudget));
        assert_eq!(IssueCode::from_name("count_mismatch"), None);
        assert!(IssueCode::ALL
            .iter()
            .all(|code| IssueCode::from_name(&code.to_string()) == Some(*code)));
    }

    #[test]
    fn test_issue_classes() {
        assert!(IssueCode::EmptyOrUnrecognized.is_fatal());
        assert_eq!(IssueCode::InvalidCost.class(), IssueClass::Structural);
        assert_eq!(IssueCode::UnknownProjectReference.class(), IssueClass::Semantic);
    }

    #[test]
    fn test_collector_applies_policy() {
        let policy = SeverityPolicy::new()
            .with_override(IssueCode::CountMismatch, SeverityLevel::Error)
            .with_override(IssueCode::EmptyLines, SeverityLevel::Off);
        let mut collector = IssueCollector::new(&policy);

        collector.report(IssueCode::CountMismatch, Location::file(), "count");
        collector.report(IssueCode::EmptyLines, Location::file(), "blank");
        collector.report(IssueCode::UnknownField, Location::file(), "unknown");

        let issues = collector.into_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[1].code, IssueCode::UnknownField);
        assert_eq!(issues[1].severity, Severity::Warning);
    }

    #[test]
    fn test_collector_has_errors() {
        let policy = SeverityPolicy::default();
        let mut collector = IssueCollector::new(&policy);
        collector.report(IssueCode::FieldOrder, Location::file(), "order");
        assert!(!collector.has_errors());

        collector.report(IssueCode::InvalidCost, Location::file(), "cost");
        assert!(collector.has_errors());
    }

    #[test]
    fn test_location_display() {
        let location = Location::row(SectionKind::Projects, 2, 17).with_field("cost");
        assert_eq!(location.to_string(), "PROJECTS, row 2, field 'cost', line 17");
        assert_eq!(Location::file().to_string(), "file");
    }

    #[test]
    fn test_issue_serializes_code_name() {
        let issue = ValidationIssue::new(
            IssueCode::UnknownSection,
            Location::line(4),
            "unknown section 'SCORES'",
        );
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["code"], "UnknownSection");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["location"]["line"], 4);
        assert!(json.get("details").is_none());
    }
}
