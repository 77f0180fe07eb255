//! Semantic checks
//!
//! Cross-section rules: ballots against projects, ballot shape and cost
//! limits, cumulative points, declared tallies and reference codes.

use std::collections::{HashMap, HashSet};

use crate::core::diagnostics::{IssueCode, IssueCollector, IssueDetails, Location};
use crate::core::document::VoteRecord;
use crate::parser::SectionKind;
use crate::schema::{split_list, FieldRole};
use crate::validation::engine::ValidationContext;

pub fn check(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let limits = BallotLimits::from_meta(ctx);

    if ctx.document.has_section(SectionKind::Projects) {
        check_references(ctx, issues);
    }
    check_ballot_shape(ctx, &limits, issues);
    check_ballot_costs(ctx, &limits, issues);
    check_points(ctx, &limits, issues);
    check_tallies(ctx, issues);
    check_reference_codes(ctx, issues);
}

/// Ballot limits declared in META
#[derive(Debug, Default)]
struct BallotLimits {
    vote_type: Option<String>,
    min_length: Option<f64>,
    max_length: Option<f64>,
    min_sum_cost: Option<f64>,
    max_sum_cost: Option<f64>,
    min_points: Option<f64>,
    max_points: Option<f64>,
    max_sum_points: Option<f64>,
}

impl BallotLimits {
    fn from_meta(ctx: &ValidationContext<'_>) -> Self {
        Self {
            vote_type: ctx.meta_keyword(FieldRole::VoteType),
            min_length: ctx.meta_number(FieldRole::MinLength),
            max_length: ctx.meta_number(FieldRole::MaxLength),
            min_sum_cost: ctx.meta_number(FieldRole::MinSumCost),
            max_sum_cost: ctx.meta_number(FieldRole::MaxSumCost),
            min_points: ctx.meta_number(FieldRole::MinPoints),
            max_points: ctx.meta_number(FieldRole::MaxPoints),
            max_sum_points: ctx.meta_number(FieldRole::MaxSumPoints),
        }
    }

    fn is_cumulative(&self) -> bool {
        self.vote_type.as_deref() == Some("cumulative")
    }

    fn is_choose_one(&self) -> bool {
        self.vote_type.as_deref() == Some("choose-1")
    }
}

fn vote_location(ctx: &ValidationContext<'_>, vote: &VoteRecord, role: FieldRole) -> Location {
    let location = Location::row(SectionKind::Votes, vote.row, vote.line);
    match ctx.schema.column(SectionKind::Votes, role) {
        Some(column) => location.with_field(column),
        None => location,
    }
}

fn filled(selection: &[String]) -> impl Iterator<Item = &str> {
    selection.iter().map(String::as_str).filter(|s| !s.is_empty())
}

fn check_references(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    for vote in &ctx.document.votes {
        for project_id in filled(&vote.selection) {
            if ctx.document.project(project_id).is_none() {
                issues.report_with(
                    IssueCode::UnknownProjectReference,
                    vote_location(ctx, vote, FieldRole::Selection),
                    format!(
                        "vote '{}' selects project '{}' which is not in PROJECTS",
                        vote.id, project_id
                    ),
                    IssueDetails::ProjectReference {
                        vote_id: vote.id.clone(),
                        project_id: project_id.to_string(),
                    },
                );
            }
        }
    }
}

fn check_ballot_shape(
    ctx: &ValidationContext<'_>,
    limits: &BallotLimits,
    issues: &mut IssueCollector<'_>,
) {
    let mut longest = 0;

    for vote in &ctx.document.votes {
        let location = vote_location(ctx, vote, FieldRole::Selection);

        if vote.selection.iter().any(String::is_empty) {
            issues.report(
                IssueCode::InvalidFieldValue,
                location.clone(),
                format!("vote '{}' has an empty entry in its selection", vote.id),
            );
        }

        let mut unique = HashSet::new();
        let repeated: Vec<&str> = filled(&vote.selection)
            .filter(|id| !unique.insert(*id))
            .collect();
        if !repeated.is_empty() {
            issues.report(
                IssueCode::InvalidFieldValue,
                location.clone(),
                format!(
                    "vote '{}' selects the same project more than once: {}",
                    vote.id,
                    repeated.join(", ")
                ),
            );
        }

        let length = filled(&vote.selection).count();
        longest = longest.max(length);

        if limits.is_choose_one() && length != 1 {
            issues.report(
                IssueCode::BallotSizeViolated,
                location.clone(),
                format!(
                    "vote '{}' selects {} project(s) but a choose-1 ballot selects exactly one",
                    vote.id, length
                ),
            );
            continue;
        }
        if let Some(max) = limits.max_length {
            if length as f64 > max {
                issues.report(
                    IssueCode::BallotSizeViolated,
                    location.clone(),
                    format!(
                        "vote '{}' selects {} project(s), more than max_length {}",
                        vote.id, length, max
                    ),
                );
            }
        }
        if let Some(min) = limits.min_length {
            if (length as f64) < min {
                issues.report(
                    IssueCode::BallotSizeViolated,
                    location,
                    format!(
                        "vote '{}' selects {} project(s), fewer than min_length {}",
                        vote.id, length, min
                    ),
                );
            }
        }
    }

    if let Some(max) = limits.max_length {
        if !ctx.document.votes.is_empty() && (longest as f64) < max {
            let key = ctx.schema.meta_key(FieldRole::MaxLength).unwrap_or_default();
            issues.report(
                IssueCode::MaxLengthUnused,
                Location::section(SectionKind::Meta).with_field(key),
                format!(
                    "max_length is {} but the longest ballot selects {} project(s)",
                    max, longest
                ),
            );
        }
    }
}

fn check_ballot_costs(
    ctx: &ValidationContext<'_>,
    limits: &BallotLimits,
    issues: &mut IssueCollector<'_>,
) {
    if limits.min_sum_cost.is_none() && limits.max_sum_cost.is_none() {
        return;
    }

    for vote in &ctx.document.votes {
        let total: f64 = filled(&vote.selection)
            .filter_map(|id| ctx.document.project(id))
            .filter_map(|project| ctx.project_cost(project))
            .sum();

        if let Some(max) = limits.max_sum_cost {
            if total > max {
                issues.report(
                    IssueCode::BudgetConstraintViolated,
                    vote_location(ctx, vote, FieldRole::Selection),
                    format!(
                        "vote '{}' selects projects costing {} in total, above max_sum_cost {}",
                        vote.id, total, max
                    ),
                );
            }
        }
        if let Some(min) = limits.min_sum_cost {
            if total < min {
                issues.report(
                    IssueCode::BudgetConstraintViolated,
                    vote_location(ctx, vote, FieldRole::Selection),
                    format!(
                        "vote '{}' selects projects costing {} in total, below min_sum_cost {}",
                        vote.id, total, min
                    ),
                );
            }
        }
    }
}

/// Points of a ballot; unparsable entries are left to the type checks
fn parse_points(raw: &str) -> Vec<Option<i64>> {
    split_list(raw)
        .into_iter()
        .map(|p| p.parse::<i64>().ok())
        .collect()
}

fn check_points(ctx: &ValidationContext<'_>, limits: &BallotLimits, issues: &mut IssueCollector<'_>) {
    let has_points = ctx.vote_column(FieldRole::Points).is_some();

    if limits.is_cumulative() && !has_points && ctx.document.has_section(SectionKind::Votes) {
        let column = ctx.schema.column(SectionKind::Votes, FieldRole::Points).unwrap_or_default();
        issues.report(
            IssueCode::MissingRequiredField,
            Location::section(SectionKind::Votes).with_field(column),
            format!("cumulative ballots need a '{}' column", column),
        );
        return;
    }
    if !has_points {
        return;
    }

    for vote in &ctx.document.votes {
        let location = vote_location(ctx, vote, FieldRole::Points);
        let points = parse_points(ctx.vote_points(vote).unwrap_or_default());
        let selected = vote.selection.len();

        if points.len() != selected {
            issues.report(
                IssueCode::BallotPointsViolated,
                location.clone(),
                format!(
                    "vote '{}' gives {} point value(s) for {} selected project(s)",
                    vote.id,
                    points.len(),
                    selected
                ),
            );
        }

        for value in points.iter().flatten() {
            let value = *value as f64;
            let below = limits.min_points.is_some_and(|min| value < min);
            let above = limits.max_points.is_some_and(|max| value > max);
            if below || above {
                issues.report(
                    IssueCode::BallotPointsViolated,
                    location.clone(),
                    format!(
                        "vote '{}' gives {} point(s), outside the allowed range {}..{}",
                        vote.id,
                        value,
                        limits.min_points.map(|v| v.to_string()).unwrap_or_default(),
                        limits.max_points.map(|v| v.to_string()).unwrap_or_default()
                    ),
                );
            }
        }

        let total = points
            .iter()
            .flatten()
            .try_fold(0i64, |acc, value| acc.checked_add(*value));
        match (total, limits.max_sum_points) {
            (None, _) => issues.report(
                IssueCode::BallotPointsViolated,
                location,
                format!("vote '{}' gives a points total too large to count", vote.id),
            ),
            (Some(total), Some(max_sum)) if total as f64 > max_sum => issues.report(
                IssueCode::BallotPointsViolated,
                location,
                format!(
                    "vote '{}' gives {} points in total, above max_sum_points {}",
                    vote.id, total, max_sum
                ),
            ),
            _ => {}
        }
    }
}

/// Declared `votes` and `score` columns against the ballots
fn check_tallies(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    if !ctx.document.has_section(SectionKind::Votes) {
        return;
    }

    let mut counts: HashMap<&str, u64> = HashMap::new();
    // None once a project's score no longer fits in i64
    let mut scores: HashMap<&str, Option<i64>> = HashMap::new();
    let with_points = ctx.vote_column(FieldRole::Points).is_some();

    for vote in &ctx.document.votes {
        let mut unique = HashSet::new();
        for id in filled(&vote.selection) {
            if unique.insert(id) {
                *counts.entry(id).or_default() += 1;
            }
        }
        if with_points {
            let points = parse_points(ctx.vote_points(vote).unwrap_or_default());
            for (id, value) in vote.selection.iter().zip(points) {
                if let Some(value) = value {
                    let score = scores.entry(id.as_str()).or_insert(Some(0));
                    *score = score.and_then(|total| total.checked_add(value));
                }
            }
        }
    }

    let votes_column = ctx.project_column(FieldRole::Votes);
    let score_column = ctx.project_column(FieldRole::Score).filter(|_| with_points);

    for project in &ctx.document.projects {
        if let Some(column) = votes_column {
            if let Some(declared) = ctx.project_number(project, column) {
                let actual = counts.get(project.id.as_str()).copied().unwrap_or(0);
                if declared != actual as f64 {
                    issues.report(
                        IssueCode::ProjectTallyMismatch,
                        Location::row(SectionKind::Projects, project.row, project.line)
                            .with_field(column),
                        format!(
                            "project '{}' declares {} vote(s) but {} ballot(s) select it",
                            project.id, declared, actual
                        ),
                    );
                }
            }
        }

        if let Some(column) = score_column {
            if let Some(declared) = ctx.project_number(project, column) {
                let Some(actual) = scores.get(project.id.as_str()).copied().unwrap_or(Some(0))
                else {
                    issues.report(
                        IssueCode::ProjectTallyMismatch,
                        Location::row(SectionKind::Projects, project.row, project.line)
                            .with_field(column),
                        format!(
                            "project '{}' receives more points than can be counted",
                            project.id
                        ),
                    );
                    continue;
                };
                if declared != actual as f64 {
                    issues.report(
                        IssueCode::ProjectTallyMismatch,
                        Location::row(SectionKind::Projects, project.row, project.line)
                            .with_field(column),
                        format!(
                            "project '{}' declares a score of {} but ballots give it {} point(s)",
                            project.id, declared, actual
                        ),
                    );
                }
            }
        }
    }
}

fn check_reference_codes(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let Some(lookup) = ctx.lookup else {
        log::debug!("no reference lookup configured, skipping reference code checks");
        return;
    };

    for field in &ctx.schema.meta {
        let Some(category) = &field.reference else {
            continue;
        };
        let Some(entry) = ctx.document.meta.entry(&field.name) else {
            continue;
        };
        if !entry.value.is_empty() && !lookup.is_known(category, &entry.value) {
            issues.report(
                IssueCode::UnknownReferenceCode,
                Location::row(SectionKind::Meta, entry.row, entry.line).with_field(entry.key.clone()),
                format!("unknown {} code '{}'", category, entry.value),
            );
        }
    }

    for kind in [SectionKind::Projects, SectionKind::Votes] {
        for field in ctx.schema.fields(kind) {
            let Some(category) = &field.reference else {
                continue;
            };
            if !ctx.document.header(kind).contains(&field.name) {
                continue;
            }
            let cells: Vec<(usize, usize, &str)> = match kind {
                SectionKind::Projects => ctx
                    .document
                    .projects
                    .iter()
                    .map(|p| (p.row, p.line, p.get(&field.name).unwrap_or_default()))
                    .collect(),
                _ => ctx
                    .document
                    .votes
                    .iter()
                    .map(|v| (v.row, v.line, v.get(&field.name).unwrap_or_default()))
                    .collect(),
            };
            for (row, line, value) in cells {
                if !value.is_empty() && !lookup.is_known(category, value) {
                    issues.report(
                        IssueCode::UnknownReferenceCode,
                        Location::row(kind, row, line).with_field(field.name.clone()),
                        format!("unknown {} code '{}'", category, value),
                    );
                }
            }
        }
    }
}
