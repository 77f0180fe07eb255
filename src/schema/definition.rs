//! Field Schema Types
//!
//! Typed description of the META keys and PROJECTS/VOTES columns a file
//! may carry: value types, required status, semantic roles and constraints.

use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;

use crate::parser::SectionKind;

static YEAR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}$").expect("valid year regex"));

/// Root schema file structure (matches TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    pub schema: SchemaMeta,
    #[serde(default)]
    pub meta: Vec<FieldDef>,
    #[serde(default)]
    pub projects: Vec<FieldDef>,
    #[serde(default)]
    pub votes: Vec<FieldDef>,
}

/// Schema metadata
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaMeta {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Runtime schema; field order is the canonical order of the format
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub meta: Vec<FieldDef>,
    pub projects: Vec<FieldDef>,
    pub votes: Vec<FieldDef>,
}

/// One META key or section column
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Element type of `list` fields
    pub item_type: Option<FieldType>,
    #[serde(default)]
    pub required: bool,
    pub required_when: Option<Condition>,
    pub role: Option<FieldRole>,
    /// Reference-data category checked through the injected lookup
    pub reference: Option<String>,
    pub description: Option<String>,
    pub constraints: Option<FieldConstraints>,
    pub aliases: Option<Vec<String>>,
}

/// Value types
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Int,
    Float,
    Date,
    /// Comma-separated values
    List,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Date => "date",
            FieldType::List => "list",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }
}

/// What a field means to the validators, so no key name is hard-coded
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    ProjectCount,
    VoteCount,
    Budget,
    VoteType,
    Rule,
    MinLength,
    MaxLength,
    MinSumCost,
    MaxSumCost,
    MinPoints,
    MaxPoints,
    MaxSumPoints,
    FullyFunded,
    Threshold,
    DateBegin,
    DateEnd,
    Comment,
    Id,
    Cost,
    Selected,
    Votes,
    Score,
    Selection,
    Points,
}

/// Requirement that only applies when another META key has one of some values
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub field: String,
    pub equals: Vec<String>,
}

impl Condition {
    pub fn matches(&self, value: &str) -> bool {
        self.equals.iter().any(|v| v.eq_ignore_ascii_case(value.trim()))
    }
}

/// Value constraints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldConstraints {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub enum_values: Option<Vec<String>>,
    pub pattern: Option<String>,
    #[serde(skip)]
    compiled: Option<Regex>,
}

/// Why a raw value does not satisfy its field definition
#[derive(Debug, Clone, PartialEq)]
pub enum FieldProblem {
    /// Number written with a decimal comma; carries the repaired value
    CommaDecimal(f64),
    WrongType(String),
    Constraint(String),
}

impl TryFrom<SchemaFile> for Schema {
    type Error = anyhow::Error;

    fn try_from(file: SchemaFile) -> Result<Self> {
        let mut schema = Self {
            name: file.schema.name,
            version: file.schema.version,
            description: file.schema.description,
            meta: file.meta,
            projects: file.projects,
            votes: file.votes,
        };

        for field in schema
            .meta
            .iter_mut()
            .chain(schema.projects.iter_mut())
            .chain(schema.votes.iter_mut())
        {
            field.compile()?;
        }

        if schema.column(SectionKind::Projects, FieldRole::Id).is_none() {
            bail!("schema '{}' declares no project id column", schema.name);
        }
        if schema.column(SectionKind::Votes, FieldRole::Id).is_none() {
            bail!("schema '{}' declares no voter id column", schema.name);
        }

        Ok(schema)
    }
}

impl Schema {
    /// Parse a schema TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(content).context("parse schema TOML")?;
        Self::try_from(file)
    }

    /// Field definitions of a section in canonical order
    pub fn fields(&self, kind: SectionKind) -> &[FieldDef] {
        match kind {
            SectionKind::Meta => &self.meta,
            SectionKind::Projects => &self.projects,
            SectionKind::Votes => &self.votes,
        }
    }

    /// Find a field by name (including aliases)
    pub fn find(&self, kind: SectionKind, name: &str) -> Option<&FieldDef> {
        self.fields(kind).iter().find(|f| f.matches_name(name))
    }

    /// Field carrying a role in a section
    pub fn by_role(&self, kind: SectionKind, role: FieldRole) -> Option<&FieldDef> {
        self.fields(kind).iter().find(|f| f.role == Some(role))
    }

    /// Name of the field carrying a role
    pub fn column(&self, kind: SectionKind, role: FieldRole) -> Option<&str> {
        self.by_role(kind, role).map(|f| f.name.as_str())
    }

    /// Name of the META key carrying a role
    pub fn meta_key(&self, role: FieldRole) -> Option<&str> {
        self.column(SectionKind::Meta, role)
    }
}

impl FieldDef {
    /// Plain optional string field
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            item_type: None,
            required: false,
            required_when: None,
            role: None,
            reference: None,
            description: None,
            constraints: None,
            aliases: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_role(mut self, role: FieldRole) -> Self {
        self.role = Some(role);
        self
    }

    fn compile(&mut self) -> Result<()> {
        if let Some(constraints) = &mut self.constraints {
            if let Some(pattern) = &constraints.pattern {
                let regex = Regex::new(pattern)
                    .with_context(|| format!("invalid pattern for field '{}'", self.name))?;
                constraints.compiled = Some(regex);
            }
        }
        Ok(())
    }

    /// Check if field matches name (including aliases)
    pub fn matches_name(&self, name: &str) -> bool {
        if self.name.eq_ignore_ascii_case(name) {
            return true;
        }

        self.aliases
            .as_ref()
            .map(|aliases| aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name)))
            .unwrap_or(false)
    }

    /// Validate a non-empty raw value
    ///
    /// Returns every problem found; a decimal comma is reported and the
    /// repaired number is still checked against the constraints.
    pub fn check(&self, value: &str) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        match self.field_type {
            FieldType::List => {
                let item_type = self.item_type.unwrap_or(FieldType::String);
                for item in split_list(value) {
                    if item.is_empty() {
                        continue;
                    }
                    if let Err(problem) = check_scalar(&self.name, item_type, item) {
                        problems.push(problem);
                    }
                }
            }
            field_type => match check_scalar(&self.name, field_type, value) {
                Ok(number) => self.check_constraints(value, number, &mut problems),
                Err(FieldProblem::CommaDecimal(repaired)) => {
                    problems.push(FieldProblem::CommaDecimal(repaired));
                    self.check_constraints(value, Some(repaired), &mut problems);
                }
                Err(problem) => problems.push(problem),
            },
        }
        problems
    }

    fn check_constraints(&self, value: &str, number: Option<f64>, problems: &mut Vec<FieldProblem>) {
        let Some(constraints) = &self.constraints else {
            return;
        };

        if let Some(number) = number {
            if let Some(min) = constraints.min_value {
                if number < min {
                    problems.push(FieldProblem::Constraint(format!(
                        "field '{}' value {} below minimum {}",
                        self.name, number, min
                    )));
                }
            }
            if let Some(max) = constraints.max_value {
                if number > max {
                    problems.push(FieldProblem::Constraint(format!(
                        "field '{}' value {} exceeds maximum {}",
                        self.name, number, max
                    )));
                }
            }
        }

        if let Some(enum_values) = &constraints.enum_values {
            if !enum_values.iter().any(|v| v.eq_ignore_ascii_case(value.trim())) {
                problems.push(FieldProblem::Constraint(format!(
                    "field '{}' value '{}' not in allowed values: {}",
                    self.name,
                    value,
                    enum_values.join(", ")
                )));
            }
        }

        if let Some(regex) = &constraints.compiled {
            if !regex.is_match(value) {
                let pattern = constraints.pattern.as_deref().unwrap_or_default();
                problems.push(FieldProblem::Constraint(format!(
                    "field '{}' value '{}' should follow the '{}' format",
                    self.name, value, pattern
                )));
            }
        }
    }
}

/// Type-check one scalar; numeric types return the parsed number
fn check_scalar(name: &str, field_type: FieldType, value: &str) -> Result<Option<f64>, FieldProblem> {
    match field_type {
        FieldType::Int => match value.trim().parse::<i64>() {
            Ok(v) => Ok(Some(v as f64)),
            Err(_) => Err(numeric_problem(name, field_type, value)),
        },
        FieldType::Float => match value.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(numeric_problem(name, field_type, value)),
        },
        FieldType::Date => match parse_date(value) {
            Some(_) => Ok(None),
            None => Err(FieldProblem::WrongType(format!(
                "field '{}' expects a date (YYYY, DD.MM.YYYY or YYYY-MM-DD), got '{}'",
                name, value
            ))),
        },
        FieldType::String | FieldType::List => Ok(None),
    }
}

fn numeric_problem(name: &str, field_type: FieldType, value: &str) -> FieldProblem {
    debug_assert!(field_type.is_numeric());
    if value.contains(',') {
        if let Some(repaired) = parse_number(value) {
            let integral = field_type != FieldType::Int || repaired.fract() == 0.0;
            if integral {
                return FieldProblem::CommaDecimal(repaired);
            }
        }
    }
    FieldProblem::WrongType(format!(
        "field '{}' expects {}, got '{}'",
        name,
        field_type.name(),
        value
    ))
}

/// Best-effort number parsing, accepting a decimal comma
pub fn parse_number(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = raw
        .parse::<f64>()
        .ok()
        .or_else(|| raw.replacen(',', ".", 1).parse::<f64>().ok())?;
    parsed.is_finite().then_some(parsed)
}

/// Parse the date formats used by the format: `YYYY`, `DD.MM.YYYY`, `YYYY-MM-DD`
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if YEAR_ONLY.is_match(raw) {
        let year = raw.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    ["%d.%m.%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Split a comma-separated cell into trimmed items; an empty cell has none
pub fn split_list(raw: &str) -> Vec<&str> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constrained(field_type: FieldType, constraints: FieldConstraints) -> FieldDef {
        let mut field = FieldDef::new("f", field_type);
        field.constraints = Some(constraints);
        field.compile().unwrap();
        field
    }

    #[test]
    fn test_int_field() {
        let field = FieldDef::new("num_votes", FieldType::Int);
        assert!(field.check("12").is_empty());
        assert!(matches!(field.check("twelve")[0], FieldProblem::WrongType(_)));
        assert!(matches!(field.check("3.5")[0], FieldProblem::WrongType(_)));
    }

    #[test]
    fn test_comma_decimal() {
        let field = FieldDef::new("budget", FieldType::Float);
        assert_eq!(field.check("1000,50"), vec![FieldProblem::CommaDecimal(1000.5)]);
    }

    #[test]
    fn test_comma_decimal_still_constrained() {
        let field = constrained(
            FieldType::Float,
            FieldConstraints {
                min_value: Some(0.0),
                ..Default::default()
            },
        );
        let problems = field.check("-1,5");
        assert_eq!(problems.len(), 2);
        assert!(matches!(problems[1], FieldProblem::Constraint(_)));
    }

    #[test]
    fn test_enum_constraint_ignores_case() {
        let field = constrained(
            FieldType::String,
            FieldConstraints {
                enum_values: Some(vec!["approval".to_string(), "ordinal".to_string()]),
                ..Default::default()
            },
        );
        assert!(field.check("Approval").is_empty());
        assert!(matches!(field.check("plurality")[0], FieldProblem::Constraint(_)));
    }

    #[test]
    fn test_pattern_constraint() {
        let field = constrained(
            FieldType::String,
            FieldConstraints {
                pattern: Some("^#1: ".to_string()),
                ..Default::default()
            },
        );
        assert!(field.check("#1: Valid comment").is_empty());
        assert!(field.check("#1: ").is_empty());
        assert!(field.check("#1: Multiple #1: parts").is_empty());
        for bad in ["#1:", "# 1: space", "#2: wrong", "1: no hash", "#1 no colon"] {
            assert_eq!(field.check(bad).len(), 1, "{bad} should be rejected");
        }
    }

    #[test]
    fn test_range_constraint() {
        let field = constrained(
            FieldType::Int,
            FieldConstraints {
                min_value: Some(0.0),
                max_value: Some(130.0),
                ..Default::default()
            },
        );
        assert!(field.check("42").is_empty());
        assert_eq!(field.check("131").len(), 1);
        assert_eq!(field.check("-1").len(), 1);
    }

    #[test]
    fn test_list_items_typed() {
        let mut field = FieldDef::new("points", FieldType::List);
        field.item_type = Some(FieldType::Int);
        assert!(field.check("3, 2,1").is_empty());
        assert_eq!(field.check("3,x").len(), 1);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024"), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(parse_date("02.01.2024"), NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(parse_date("2024-12-31"), NaiveDate::from_ymd_opt(2024, 12, 31));
        assert_eq!(parse_date("321213"), None);
        assert_eq!(parse_date("31.02.2024"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 500 "), Some(500.0));
        assert_eq!(parse_number("12,5"), Some(12.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("1, 2,3"), vec!["1", "2", "3"]);
        assert_eq!(split_list("1,,2"), vec!["1", "", "2"]);
        assert!(split_list("  ").is_empty());
    }

    #[test]
    fn test_matches_name_with_alias() {
        let mut field = FieldDef::new("min_project_score_threshold", FieldType::Float);
        field.aliases = Some(vec!["threshold".to_string()]);
        assert!(field.matches_name("MIN_PROJECT_SCORE_THRESHOLD"));
        assert!(field.matches_name("threshold"));
        assert!(!field.matches_name("budget"));
    }

    #[test]
    fn test_schema_requires_id_columns() {
        let toml = r#"
            [schema]
            name = "broken"

            [[projects]]
            name = "cost"
            type = "float"
        "#;
        assert!(Schema::from_toml(toml).is_err());
    }
}
