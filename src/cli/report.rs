//! Report rendering
//!
//! JSON for machines, a compact text listing for people.

use std::fmt::Write;

use anyhow::{Context, Result};

use crate::batch::{BatchResult, FileResult};
use crate::config::OutputFormat;

/// Render a batch result in the requested format
pub fn render(
    result: &BatchResult,
    format: OutputFormat,
    summary_only: bool,
    verbose: bool,
) -> Result<String> {
    match format {
        OutputFormat::Json => render_json(result, summary_only),
        OutputFormat::Text => Ok(render_text(result, summary_only, verbose)),
    }
}

pub fn render_json(result: &BatchResult, summary_only: bool) -> Result<String> {
    let rendered = if summary_only {
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": result.summary,
            "metadata": result.metadata,
        }))
    } else {
        serde_json::to_string_pretty(result)
    };
    rendered.context("serialize report")
}

/// Text listing; warnings are listed only when `verbose`
pub fn render_text(result: &BatchResult, summary_only: bool, verbose: bool) -> String {
    let mut out = String::new();

    if !summary_only {
        for file in &result.files {
            write_file(&mut out, file, verbose);
        }
        out.push('\n');
    }

    let meta = &result.metadata;
    let _ = writeln!(
        out,
        "{} file(s) checked: {} valid, {} invalid, {} not parsed, {} skipped ({} ms)",
        meta.attempted,
        meta.valid,
        meta.invalid,
        meta.attempted - meta.succeeded,
        meta.skipped,
        meta.elapsed_ms
    );

    let summary = &result.summary;
    for (code, count) in &summary.errors {
        let _ = writeln!(out, "  error   {:<26} {}", code.to_string(), count);
    }
    for (code, count) in &summary.warnings {
        let _ = writeln!(out, "  warning {:<26} {}", code.to_string(), count);
    }
    out
}

fn write_file(out: &mut String, file: &FileResult, verbose: bool) {
    let status = if file.skipped {
        "skipped".to_string()
    } else if file.is_valid() {
        format!("ok ({} warning(s))", file.warning_count())
    } else {
        format!(
            "invalid ({} error(s), {} warning(s))",
            file.error_count(),
            file.warning_count()
        )
    };
    let _ = writeln!(out, "{}: {}", file.source_id, status);

    for issue in file.issues.iter().filter(|i| verbose || i.is_error()) {
        let _ = writeln!(out, "  {}", issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Checker, InputSource};

    fn batch() -> BatchResult {
        Checker::default().process(vec![
            InputSource::Text("META\n\nbudget;1\n".to_string()),
            InputSource::Text(String::new()),
        ])
    }

    #[test]
    fn test_text_report() {
        let text = render_text(&batch(), false, false);
        assert!(text.contains("input-2: invalid (1 error(s), 0 warning(s))"));
        assert!(text.contains("error[EmptyOrUnrecognized] file: input is empty"));
        assert!(text.contains("2 file(s) checked: 0 valid, 2 invalid, 1 not parsed, 0 skipped"));
        assert!(!text.contains("warning[EmptyLines]"));
    }

    #[test]
    fn test_verbose_text_lists_warnings() {
        let text = render_text(&batch(), false, true);
        assert!(text.contains("warning[EmptyLines]"));
    }

    #[test]
    fn test_summary_only_json() {
        let json = render_json(&batch(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("files").is_none());
        assert_eq!(value["metadata"]["attempted"], 2);
    }
}
