use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pabulib_checker::core::{build_document, IssueCollector, SeverityPolicy};
use pabulib_checker::schema::default_schema;
use pabulib_checker::validation::ValidationContext;
use pabulib_checker::{parse_sections, validate_document, Checker, InputSource};

/// Generate a .pb document for a validation scenario
fn generate_validation_content(projects: usize, voters: usize, scenario: &str) -> String {
    let ballots: Vec<Vec<usize>> = (0..voters)
        .map(|v| {
            let first = v % projects + 1;
            let second = (v * 7 + 3) % projects + 1;
            if first == second { vec![first] } else { vec![first, second] }
        })
        .collect();

    let mut tally = vec![0usize; projects + 1];
    for ballot in &ballots {
        for &p in ballot {
            tally[p] += 1;
        }
    }

    let mut content = String::from("META\nkey;value\n");
    content.push_str("description;Benchmark election\ncountry;Poland\nunit;Bench\ninstance;2024\n");
    content.push_str(&format!("num_projects;{}\nnum_votes;{}\n", projects, voters));
    content.push_str("budget;50000\nvote_type;approval\nrule;greedy\n");
    content.push_str("date_begin;01.01.2024\ndate_end;31.01.2024\n");

    content.push_str("PROJECTS\nproject_id;cost;votes;selected\n");
    for p in 1..=projects {
        let cost = match scenario {
            "mixed_errors" if p % 10 == 0 => "12,5".to_string(),
            "mixed_errors" if p % 15 == 0 => "-3".to_string(),
            _ => (500 + (p * 37) % 4500).to_string(),
        };
        content.push_str(&format!("{};{};{};0\n", p, cost, tally[p]));
    }

    content.push_str("VOTES\nvoter_id;vote\n");
    for (v, ballot) in ballots.iter().enumerate() {
        let mut items: Vec<String> = ballot.iter().map(|p| p.to_string()).collect();
        if scenario == "mixed_errors" && v % 20 == 0 {
            items.push((projects + 1).to_string());
        }
        content.push_str(&format!("v{};{}\n", v + 1, items.join(",")));
    }

    content
}

/// Benchmark the full single-file pipeline per scenario
fn bench_validation_error_density(c: &mut Criterion) {
    let checker = Checker::default();
    let scenarios = vec![
        ("all_valid", "Consistent file"),
        ("mixed_errors", "Bad costs and unknown references"),
    ];

    let mut group = c.benchmark_group("validation_error_density");

    for (scenario, _description) in scenarios {
        let content = generate_validation_content(100, 5_000, scenario);

        group.throughput(Throughput::Elements(5_100));
        group.bench_with_input(
            BenchmarkId::new("scenario", scenario),
            &content,
            |b, content| {
                b.iter(|| black_box(checker.check_text("bench.pb", black_box(content))))
            },
        );
    }

    group.finish();
}

/// Benchmark validation alone, with parsing done up front
fn bench_validation_stages(c: &mut Criterion) {
    let schema = default_schema();
    let policy = SeverityPolicy::new();

    let mut group = c.benchmark_group("validation_stages");

    for &voters in &[1_000, 10_000, 50_000] {
        let content = generate_validation_content(200, voters, "all_valid");
        let Ok(parsed) = parse_sections(&content, b';') else {
            continue;
        };

        group.throughput(Throughput::Elements(voters as u64));
        group.bench_with_input(BenchmarkId::new("validate", voters), &parsed, |b, parsed| {
            b.iter(|| {
                let mut issues = IssueCollector::new(&policy);
                let document = build_document(parsed, &schema, &mut issues);
                let ctx = ValidationContext::new(&document, &schema);
                validate_document(&ctx, &mut issues);
                black_box(issues.into_issues())
            })
        });
    }

    group.finish();
}

/// Benchmark batch throughput, sequential against concurrent
fn bench_batch(c: &mut Criterion) {
    let checker = Checker::default();
    let inputs: Vec<InputSource> = (0..32)
        .map(|i| {
            let scenario = if i % 4 == 0 { "mixed_errors" } else { "all_valid" };
            InputSource::Text(generate_validation_content(50, 2_000, scenario))
        })
        .collect();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(inputs.len() as u64));

    group.bench_function("sequential", |b| {
        b.iter(|| black_box(checker.process(inputs.clone())))
    });

    for &jobs in &[2, 8] {
        group.bench_with_input(BenchmarkId::new("parallel", jobs), &jobs, |b, &jobs| {
            b.iter(|| {
                let cancel = tokio_util::sync::CancellationToken::new();
                black_box(runtime.block_on(checker.process_parallel(inputs.clone(), jobs, cancel)))
            })
        });
    }

    group.finish();
}

criterion_group!(
    validation_benches,
    bench_validation_error_density,
    bench_validation_stages,
    bench_batch
);

criterion_main!(validation_benches);
