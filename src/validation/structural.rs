//! Structural checks
//!
//! Required sections and fields, value types and constraints, declared
//! counts, costs and identifiers. Each check stands on its own.

use std::collections::HashMap;

use crate::core::diagnostics::{IssueCode, IssueCollector, IssueDetails, Location};
use crate::parser::SectionKind;
use crate::schema::{parse_date, parse_number, FieldDef, FieldRole};
use crate::validation::engine::{report_field_problems, ValidationContext};

pub fn check(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    check_sections_present(ctx, issues);

    if ctx.document.has_section(SectionKind::Meta) {
        check_required_meta(ctx, issues);
        check_meta_values(ctx, issues);
        check_meta_order(ctx, issues);
        check_date_range(ctx, issues);
    }

    check_counts(ctx, issues);
    check_costs(ctx, issues);

    for kind in [SectionKind::Projects, SectionKind::Votes] {
        if ctx.document.has_section(kind) {
            check_columns(ctx, kind, issues);
            check_identifiers(ctx, kind, issues);
        }
    }
}

fn check_sections_present(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    for kind in SectionKind::ALL {
        if !ctx.document.has_section(kind) {
            issues.report(
                IssueCode::MissingRequiredField,
                Location::section(kind),
                format!("missing section {}", kind),
            );
        }
    }
}

fn check_required_meta(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let meta = &ctx.document.meta;
    for field in &ctx.schema.meta {
        if meta.get(&field.name).is_some() {
            continue;
        }

        let reason = if field.required {
            Some(String::new())
        } else {
            field.required_when.as_ref().and_then(|condition| {
                meta.get(&condition.field)
                    .filter(|value| condition.matches(value))
                    .map(|value| format!(" when {} is '{}'", condition.field, value))
            })
        };

        if let Some(reason) = reason {
            let location = match meta.entry(&field.name) {
                Some(entry) => Location::row(SectionKind::Meta, entry.row, entry.line),
                None => Location::section(SectionKind::Meta),
            };
            issues.report(
                IssueCode::MissingRequiredField,
                location.with_field(field.name.clone()),
                format!("META key '{}' is required{}", field.name, reason),
            );
        }
    }
}

fn check_meta_values(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    for entry in ctx.document.meta.entries() {
        let location = Location::row(SectionKind::Meta, entry.row, entry.line)
            .with_field(entry.key.clone());

        let Some(field) = ctx.schema.find(SectionKind::Meta, &entry.key) else {
            issues.report(
                IssueCode::UnknownField,
                location,
                format!("unknown META key '{}'", entry.key),
            );
            continue;
        };

        if entry.value.is_empty() {
            continue;
        }
        report_field_problems(field.check(&entry.value), &entry.value, &location, issues);
    }
}

/// Known keys must follow the schema order; reported once
fn check_meta_order(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let positions: Vec<(usize, &str)> = ctx
        .document
        .meta
        .entries()
        .iter()
        .filter_map(|entry| {
            ctx.schema
                .meta
                .iter()
                .position(|f| f.matches_name(&entry.key))
                .map(|pos| (pos, entry.key.as_str()))
        })
        .collect();

    if positions.windows(2).all(|w| w[0].0 <= w[1].0) {
        return;
    }

    let mut expected = positions.clone();
    expected.sort_by_key(|(pos, _)| *pos);
    let expected: Vec<&str> = expected.into_iter().map(|(_, key)| key).collect();
    issues.report(
        IssueCode::FieldOrder,
        Location::section(SectionKind::Meta),
        format!(
            "META keys are out of order; expected: {}",
            expected.join(", ")
        ),
    );
}

fn check_date_range(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let begin = ctx.meta_raw(FieldRole::DateBegin).and_then(parse_date);
    let end = ctx.meta_raw(FieldRole::DateEnd).and_then(parse_date);

    if let (Some(begin), Some(end)) = (begin, end) {
        if end < begin {
            let field = ctx.schema.meta_key(FieldRole::DateEnd).unwrap_or_default();
            issues.report(
                IssueCode::DateRangeMismatch,
                Location::section(SectionKind::Meta).with_field(field),
                format!("end date {} is before begin date {}", end, begin),
            );
        }
    }
}

fn check_counts(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let counted = [
        (FieldRole::ProjectCount, SectionKind::Projects, ctx.document.projects.len()),
        (FieldRole::VoteCount, SectionKind::Votes, ctx.document.votes.len()),
    ];

    for (role, kind, actual) in counted {
        if !ctx.document.has_section(kind) {
            continue;
        }
        let (Some(key), Some(declared)) = (ctx.schema.meta_key(role), ctx.meta_number(role)) else {
            continue;
        };
        if declared != actual as f64 {
            issues.report_with(
                IssueCode::CountMismatch,
                Location::section(SectionKind::Meta).with_field(key),
                format!(
                    "META declares {} = {} but {} has {} record(s)",
                    key, declared, kind, actual
                ),
                IssueDetails::Count { declared, actual },
            );
        }
    }
}

fn check_costs(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let Some(column) = ctx.project_column(FieldRole::Cost) else {
        return;
    };

    for project in &ctx.document.projects {
        let location =
            Location::row(SectionKind::Projects, project.row, project.line).with_field(column);
        let raw = project.get(column).unwrap_or_default();

        if raw.is_empty() {
            issues.report(
                IssueCode::MissingRequiredField,
                location,
                format!("project '{}' has no cost", project.id),
            );
            continue;
        }

        match parse_number(raw) {
            Some(cost) if cost < 0.0 => issues.report(
                IssueCode::InvalidCost,
                location,
                format!("project '{}' has negative cost {}", project.id, raw),
            ),
            Some(cost) => {
                if raw.contains(',') {
                    issues.report(
                        IssueCode::CommaInNumber,
                        location,
                        format!("'{}' uses a decimal comma; read as {}", raw, cost),
                    );
                }
            }
            None => issues.report(
                IssueCode::InvalidCost,
                location,
                format!("project '{}' has non-numeric cost '{}'", project.id, raw),
            ),
        }
    }
}

/// Header coverage and per-cell type checks for PROJECTS or VOTES
fn check_columns(ctx: &ValidationContext<'_>, kind: SectionKind, issues: &mut IssueCollector<'_>) {
    let header = ctx.document.header(kind);
    if header.is_empty() {
        return;
    }

    for field in ctx.schema.fields(kind) {
        if field.required && !header.iter().any(|h| field.matches_name(h)) {
            issues.report(
                IssueCode::MissingRequiredField,
                Location::section(kind).with_field(field.name.clone()),
                format!("{} header lacks required column '{}'", kind, field.name),
            );
        }
    }

    // definitions per header column; id, cost and selection have dedicated checks
    let columns: Vec<Option<&FieldDef>> = header
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let field = ctx.schema.find(kind, name);
            if field.is_none() && idx > 0 {
                issues.report(
                    IssueCode::UnknownField,
                    Location::section(kind).with_field(name.clone()),
                    format!("unknown {} column '{}'", kind, name),
                );
            }
            field.filter(|f| {
                idx > 0
                    && !matches!(
                        f.role,
                        Some(FieldRole::Id | FieldRole::Cost | FieldRole::Selection)
                    )
            })
        })
        .collect();

    let mut check_row = |row: usize, line: usize, values: Vec<(&str, &str)>| {
        for ((name, value), field) in values.into_iter().zip(&columns) {
            let Some(field) = field else {
                continue;
            };
            let location = Location::row(kind, row, line).with_field(name);
            if value.is_empty() {
                if field.required {
                    issues.report(
                        IssueCode::MissingRequiredField,
                        location,
                        format!("required column '{}' is empty", name),
                    );
                }
                continue;
            }
            report_field_problems(field.check(value), value, &location, issues);
        }
    };

    match kind {
        SectionKind::Projects => {
            for project in &ctx.document.projects {
                check_row(project.row, project.line, project.attributes.iter().collect());
            }
        }
        SectionKind::Votes => {
            for vote in &ctx.document.votes {
                check_row(vote.row, vote.line, vote.attributes.iter().collect());
            }
        }
        SectionKind::Meta => {}
    }
}

/// Ids must be present and unique after numeric normalization
fn check_identifiers(
    ctx: &ValidationContext<'_>,
    kind: SectionKind,
    issues: &mut IssueCollector<'_>,
) {
    let records: Vec<(&str, usize, usize)> = match kind {
        SectionKind::Projects => ctx
            .document
            .projects
            .iter()
            .map(|p| (p.id.as_str(), p.row, p.line))
            .collect(),
        SectionKind::Votes => ctx
            .document
            .votes
            .iter()
            .map(|v| (v.id.as_str(), v.row, v.line))
            .collect(),
        SectionKind::Meta => return,
    };
    let column = ctx
        .schema
        .column(kind, FieldRole::Id)
        .unwrap_or_default()
        .to_string();

    let mut seen: HashMap<String, (&str, usize)> = HashMap::new();
    for (id, row, line) in records {
        let location = Location::row(kind, row, line).with_field(column.clone());
        if id.is_empty() {
            issues.report(
                IssueCode::MissingRequiredField,
                location,
                format!("{} row has an empty id", kind),
            );
            continue;
        }

        match seen.get(&normalize_id(id)) {
            Some(&(first_id, first_row)) => issues.report_with(
                IssueCode::DuplicateIdentifier,
                location,
                format!(
                    "{} id '{}' duplicates '{}' at row {}",
                    kind, id, first_id, first_row
                ),
                IssueDetails::Duplicate {
                    id: id.to_string(),
                    first_row,
                },
            ),
            None => {
                seen.insert(normalize_id(id), (id, row));
            }
        }
    }
}

/// Numeric ids compare by value: "01" and "1" are the same id
fn normalize_id(id: &str) -> String {
    if id.bytes().all(|b| b.is_ascii_digit()) {
        let trimmed = id.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::{SeverityPolicy, ValidationIssue};
    use crate::core::document::build_document;
    use crate::parser::parse_sections;
    use crate::schema::default_schema;

    const META: &str = "META\nkey;value\ndescription;Test\ncountry;Poland\nunit;Warsaw\ninstance;2024\nnum_projects;2\nnum_votes;1\nbudget;1000\nvote_type;approval\nrule;greedy\ndate_begin;2024-01-01\ndate_end;2024-02-01\n";
    const BODY: &str = "PROJECTS\nproject_id;cost;votes;name\n1;600;1;Park\n2;700;0;Road\nVOTES\nvoter_id;vote;age;sex\nv1;1;30;F\n";

    fn run(text: &str) -> Vec<ValidationIssue> {
        let parsed = parse_sections(text, b';').unwrap();
        let schema = default_schema();
        let policy = SeverityPolicy::default();
        let mut issues = IssueCollector::new(&policy);
        let document = build_document(&parsed, &schema, &mut issues);
        let mut issues = IssueCollector::new(&policy);
        check(&ValidationContext::new(&document, &schema), &mut issues);
        issues.into_issues()
    }

    fn codes(issues: &[ValidationIssue]) -> Vec<IssueCode> {
        issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_clean_file() {
        let issues = run(&format!("{}{}", META, BODY));
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_missing_section() {
        let issues = run(META);
        let missing: Vec<_> = issues
            .iter()
            .filter(|i| i.code == IssueCode::MissingRequiredField)
            .map(|i| i.location.section)
            .collect();
        assert_eq!(
            missing,
            vec![Some(SectionKind::Projects), Some(SectionKind::Votes)]
        );
    }

    #[test]
    fn test_missing_required_meta_key() {
        let text = format!("{}{}", META.replace("unit;Warsaw\n", ""), BODY);
        let issues = run(&text);
        assert_eq!(codes(&issues), vec![IssueCode::MissingRequiredField]);
        assert_eq!(issues[0].location.field.as_deref(), Some("unit"));
    }

    #[test]
    fn test_conditional_requirement() {
        let text = format!("{}{}", META.replace("rule;greedy", "rule;greedy-threshold"), BODY);
        let issues = run(&text);
        assert_eq!(codes(&issues), vec![IssueCode::MissingRequiredField]);
        assert_eq!(
            issues[0].location.field.as_deref(),
            Some("min_project_score_threshold")
        );
    }

    #[test]
    fn test_meta_value_problems() {
        let text = format!(
            "{}{}",
            META.replace("budget;1000", "budget;1000,5")
                .replace("vote_type;approval", "vote_type;plurality")
                .replace("num_votes;1", "num_votes;one"),
            BODY
        );
        let issues = run(&text);
        assert_eq!(
            codes(&issues),
            vec![
                IssueCode::InvalidFieldType,
                IssueCode::CommaInNumber,
                IssueCode::InvalidFieldValue
            ]
        );
    }

    #[test]
    fn test_unknown_meta_key_and_order() {
        let text = format!(
            "{}favourite_colour;blue\n{}",
            META.replace("description;Test\ncountry;Poland\n", "country;Poland\ndescription;Test\n"),
            BODY
        );
        let issues = run(&text);
        assert_eq!(codes(&issues), vec![IssueCode::UnknownField, IssueCode::FieldOrder]);
        assert!(issues[1].message.starts_with("META keys are out of order; expected: description, country"));
    }

    #[test]
    fn test_date_range() {
        let text = format!("{}{}", META.replace("date_end;2024-02-01", "date_end;01.12.2023"), BODY);
        assert_eq!(codes(&run(&text)), vec![IssueCode::DateRangeMismatch]);
    }

    #[test]
    fn test_count_mismatch() {
        let text = format!("{}{}", META.replace("num_projects;2", "num_projects;3"), BODY);
        let issues = run(&text);
        assert_eq!(codes(&issues), vec![IssueCode::CountMismatch]);
        assert_eq!(
            issues[0].details,
            Some(IssueDetails::Count {
                declared: 3.0,
                actual: 2
            })
        );
    }

    #[test]
    fn test_invalid_costs() {
        let body = BODY.replace("1;600;1;Park", "1;-5;1;Park").replace("2;700;0;Road", "2;abc;0;Road");
        let issues = run(&format!("{}{}", META, body));
        assert_eq!(codes(&issues), vec![IssueCode::InvalidCost, IssueCode::InvalidCost]);
        assert_eq!(issues[0].location.row, Some(0));
        assert_eq!(issues[1].location.row, Some(1));
    }

    #[test]
    fn test_cell_constraints() {
        let body = BODY.replace("v1;1;30;F", "v1;1;old;X");
        let issues = run(&format!("{}{}", META, body));
        assert_eq!(
            codes(&issues),
            vec![IssueCode::InvalidFieldType, IssueCode::InvalidFieldValue]
        );
        assert_eq!(issues[0].location.field.as_deref(), Some("age"));
    }

    #[test]
    fn test_unknown_and_missing_columns() {
        let body = BODY.replace("voter_id;vote;age;sex\nv1;1;30;F", "voter_id;ballot\nv1;1");
        let issues = run(&format!("{}{}", META, body));
        assert_eq!(
            codes(&issues),
            vec![IssueCode::MissingRequiredField, IssueCode::UnknownField]
        );
    }

    #[test]
    fn test_normalized_duplicate_ids() {
        let body = BODY.replace("2;700;0;Road", "01;700;0;Road");
        let issues = run(&format!("{}{}", META, body));
        assert_eq!(codes(&issues), vec![IssueCode::DuplicateIdentifier]);
        assert_eq!(issues[0].location.row, Some(1));
    }

    #[test]
    fn test_empty_id() {
        let body = BODY.replace("v1;1;30;F", ";1;30;F");
        let issues = run(&format!("{}{}", META, body));
        assert_eq!(codes(&issues), vec![IssueCode::MissingRequiredField]);
    }

    #[test]
    fn test_normalize_id() {
        assert_eq!(normalize_id("007"), "7");
        assert_eq!(normalize_id("000"), "0");
        assert_eq!(normalize_id("A01"), "A01");
    }
}
