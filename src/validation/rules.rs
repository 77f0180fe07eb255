//! Budget and outcome checks
//!
//! Compares the declared `selected` column with the budget and, for the
//! greedy family of rules, with the selection the rule would produce.

use crate::core::diagnostics::{IssueCode, IssueCollector, Location};
use crate::core::document::ProjectRecord;
use crate::parser::SectionKind;
use crate::schema::FieldRole;
use crate::validation::engine::ValidationContext;

/// Selection rules with a dedicated checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreedyRule {
    /// Highest score first, skipping projects that no longer fit
    Greedy,
    /// Greedy over projects reaching the score threshold
    Threshold,
    /// Greedy that stops at the first project that does not fit
    NoSkip,
    /// Greedy with mutually exclusive project groups
    Exclusive,
    /// Greedy with local adjustments described in the `comment` key
    Custom,
}

impl GreedyRule {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "greedy" => Some(GreedyRule::Greedy),
            "greedy-threshold" => Some(GreedyRule::Threshold),
            "greedy-no-skip" => Some(GreedyRule::NoSkip),
            "greedy-exclusive" => Some(GreedyRule::Exclusive),
            "greedy-custom" => Some(GreedyRule::Custom),
            _ => None,
        }
    }

    /// Plain greedy is only an approximation; a different outcome is a warning
    pub fn is_approximate(self) -> bool {
        matches!(self, GreedyRule::Exclusive | GreedyRule::Custom)
    }
}

/// A project as seen by the outcome checks
#[derive(Debug, Clone)]
struct Candidate<'a> {
    project: &'a ProjectRecord,
    cost: f64,
    score: f64,
    selected: bool,
}

pub fn check(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    check_rule_comment(ctx, issues);

    let Some(budget) = ctx.meta_number(FieldRole::Budget) else {
        return;
    };
    if ctx.document.projects.is_empty() {
        return;
    }

    let candidates = candidates(ctx);
    check_project_costs(ctx, &candidates, budget, issues);
    check_fully_funded(ctx, &candidates, budget, issues);

    let Some(selected_column) = ctx.project_column(FieldRole::Selected) else {
        log::debug!("no selected column, skipping outcome checks");
        return;
    };

    let spent: f64 = candidates.iter().filter(|c| c.selected).map(|c| c.cost).sum();
    if spent > budget {
        issues.report(
            IssueCode::BudgetConstraintViolated,
            Location::section(SectionKind::Projects).with_field(selected_column),
            format!(
                "selected projects cost {} in total, above the budget of {}",
                spent, budget
            ),
        );
    }

    let threshold = ctx.meta_number(FieldRole::Threshold);
    if let Some(threshold) = threshold {
        for candidate in candidates.iter().filter(|c| c.selected && c.score < threshold) {
            issues.report(
                IssueCode::ThresholdViolation,
                project_location(candidate.project, selected_column),
                format!(
                    "project '{}' is selected with score {}, below the threshold of {}",
                    candidate.project.id, candidate.score, threshold
                ),
            );
        }
    }

    let Some(rule) = ctx.meta_keyword(FieldRole::Rule) else {
        return;
    };
    match GreedyRule::from_name(&rule) {
        Some(greedy) => {
            let threshold = match greedy {
                GreedyRule::Threshold => threshold.unwrap_or(0.0),
                _ => f64::NEG_INFINITY,
            };
            let expected = greedy_selection(&candidates, budget, threshold, greedy);
            check_selection(&candidates, &expected, &rule, greedy, selected_column, issues);
        }
        None => {
            issues.report(
                IssueCode::RuleNotVerified,
                Location::section(SectionKind::Meta)
                    .with_field(ctx.schema.meta_key(FieldRole::Rule).unwrap_or_default()),
                format!("selection rule '{}' cannot be verified; checking unused budget only", rule),
            );
            check_unused_budget(&candidates, budget, threshold.unwrap_or(0.0), selected_column, issues);
        }
    }
}

/// `greedy-custom` files must explain their adjustments in `comment`
fn check_rule_comment(ctx: &ValidationContext<'_>, issues: &mut IssueCollector<'_>) {
    let is_custom = ctx
        .meta_keyword(FieldRole::Rule)
        .is_some_and(|rule| GreedyRule::from_name(&rule) == Some(GreedyRule::Custom));
    if !is_custom || ctx.meta_raw(FieldRole::Comment).is_some() {
        return;
    }

    let key = ctx.schema.meta_key(FieldRole::Comment).unwrap_or_default();
    issues.report(
        IssueCode::MissingRuleComment,
        Location::section(SectionKind::Meta).with_field(key),
        format!("rule 'greedy-custom' needs a '{}' describing the custom logic", key),
    );
}

fn project_location(project: &ProjectRecord, column: &str) -> Location {
    Location::row(SectionKind::Projects, project.row, project.line).with_field(column)
}

/// Projects with a usable cost, in input order
fn candidates<'a>(ctx: &ValidationContext<'a>) -> Vec<Candidate<'a>> {
    let score_column = score_column(ctx);
    let selected_column = ctx.project_column(FieldRole::Selected);

    ctx.document
        .projects
        .iter()
        .filter_map(|project| {
            let cost = ctx.project_cost(project)?;
            let score = score_column
                .and_then(|column| ctx.project_number(project, column))
                .unwrap_or(0.0);
            let selected = selected_column
                .and_then(|column| project.get(column))
                .is_some_and(|v| v.trim() == "1");
            Some(Candidate {
                project,
                cost,
                score,
                selected,
            })
        })
        .collect()
}

/// Cumulative elections rank by score, the others by vote count
fn score_column<'a>(ctx: &ValidationContext<'a>) -> Option<&'a str> {
    let votes = ctx.project_column(FieldRole::Votes);
    let score = ctx.project_column(FieldRole::Score);
    if ctx.meta_keyword(FieldRole::VoteType).as_deref() == Some("cumulative") {
        score.or(votes)
    } else {
        votes.or(score)
    }
}

fn check_project_costs(
    ctx: &ValidationContext<'_>,
    candidates: &[Candidate<'_>],
    budget: f64,
    issues: &mut IssueCollector<'_>,
) {
    let column = ctx.project_column(FieldRole::Cost).unwrap_or_default();
    for candidate in candidates {
        if candidate.cost == 0.0 {
            issues.report(
                IssueCode::ZeroCostProject,
                project_location(candidate.project, column),
                format!("project '{}' costs nothing", candidate.project.id),
            );
        } else if candidate.cost > budget {
            issues.report(
                IssueCode::ProjectExceedsBudget,
                project_location(candidate.project, column),
                format!(
                    "project '{}' costs {}, more than the whole budget of {}",
                    candidate.project.id, candidate.cost, budget
                ),
            );
        }
    }
}

fn check_fully_funded(
    ctx: &ValidationContext<'_>,
    candidates: &[Candidate<'_>],
    budget: f64,
    issues: &mut IssueCollector<'_>,
) {
    let total: f64 = candidates.iter().map(|c| c.cost).sum();
    let flagged = ctx
        .meta_raw(FieldRole::FullyFunded)
        .is_some_and(|v| v.trim() == "1");
    let key = ctx.schema.meta_key(FieldRole::FullyFunded).unwrap_or_default();

    if flagged && budget < total {
        issues.report(
            IssueCode::WrongFullyFundedFlag,
            Location::section(SectionKind::Meta).with_field(key),
            format!(
                "{} is set but the budget of {} is below the total project cost of {}",
                key, budget, total
            ),
        );
    } else if !flagged && budget >= total {
        issues.report(
            IssueCode::AllProjectsFunded,
            Location::section(SectionKind::Meta).with_field(key),
            format!(
                "the budget of {} covers every project (total cost {}) but {} is not set",
                budget, total, key
            ),
        );
    }
}

/// Ids of the projects the rule selects, ties broken by input order
fn greedy_selection<'a>(
    candidates: &[Candidate<'a>],
    budget: f64,
    threshold: f64,
    rule: GreedyRule,
) -> Vec<&'a str> {
    let mut order: Vec<&Candidate<'a>> = candidates.iter().collect();
    order.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut remaining = budget;
    let mut chosen = Vec::new();
    for candidate in order {
        if candidate.score < threshold {
            continue;
        }
        if candidate.cost <= remaining {
            remaining -= candidate.cost;
            chosen.push(candidate.project.id.as_str());
        } else if rule == GreedyRule::NoSkip {
            break;
        }
    }
    chosen
}

fn check_selection(
    candidates: &[Candidate<'_>],
    expected: &[&str],
    rule: &str,
    greedy: GreedyRule,
    selected_column: &str,
    issues: &mut IssueCollector<'_>,
) {
    let missing: Vec<&str> = candidates
        .iter()
        .filter(|c| !c.selected && expected.contains(&c.project.id.as_str()))
        .map(|c| c.project.id.as_str())
        .collect();
    let extra: Vec<&str> = candidates
        .iter()
        .filter(|c| c.selected && !expected.contains(&c.project.id.as_str()))
        .map(|c| c.project.id.as_str())
        .collect();

    if missing.is_empty() && extra.is_empty() {
        return;
    }

    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("not selected but should be: {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        parts.push(format!("selected but should not be: {}", extra.join(", ")));
    }
    let location = Location::section(SectionKind::Projects).with_field(selected_column);
    if greedy.is_approximate() {
        issues.report(
            IssueCode::SelectionMismatch,
            location,
            format!(
                "selection differs from plain greedy; rule '{}' adds its own logic and cannot be verified; {}",
                rule,
                parts.join("; ")
            ),
        );
    } else {
        issues.report(
            IssueCode::SelectionRuleViolated,
            location,
            format!("selection does not follow rule '{}'; {}", rule, parts.join("; ")),
        );
    }
}

fn check_unused_budget(
    candidates: &[Candidate<'_>],
    budget: f64,
    threshold: f64,
    selected_column: &str,
    issues: &mut IssueCollector<'_>,
) {
    let spent: f64 = candidates.iter().filter(|c| c.selected).map(|c| c.cost).sum();
    let unused = budget - spent;
    if unused <= 0.0 {
        return;
    }

    let mut order: Vec<&Candidate<'_>> = candidates.iter().filter(|c| !c.selected).collect();
    order.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut remaining = unused;
    let mut fitting = Vec::new();
    for candidate in order {
        if candidate.score >= threshold && candidate.cost <= remaining {
            remaining -= candidate.cost;
            fitting.push(candidate.project.id.as_str());
        }
    }

    if !fitting.is_empty() {
        issues.report(
            IssueCode::UnusedBudget,
            Location::section(SectionKind::Projects).with_field(selected_column),
            format!(
                "{} of the budget is unused; still fundable: {}",
                unused,
                fitting.join(", ")
            ),
        );
    }
}
