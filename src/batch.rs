//! Batch Processing
//!
//! Runs the per-file pipeline (parse, build, validate) over many inputs
//! and folds the results into one summary. Per-file work is pure, so the
//! parallel driver only adds scheduling and cancellation around it.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::core::diagnostics::{
    IssueCode, IssueCollector, Location, Severity, SeverityPolicy, ValidationIssue,
};
use crate::core::document::build_document;
use crate::parser::{parse_sections, DEFAULT_SEPARATOR};
use crate::schema::{default_schema, Schema};
use crate::validation::{validate_document, ReferenceLookup, ValidationContext};

/// One input of a batch
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Path(PathBuf),
    Text(String),
}

/// Text of one input with its source id
#[derive(Debug, Clone, PartialEq)]
pub struct RawInput {
    pub source_id: String,
    pub text: String,
    /// Line where undecodable bytes started; the text stops there
    pub decode_error: Option<usize>,
}

impl RawInput {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            text: text.into(),
            decode_error: None,
        }
    }

    /// Decode bytes as UTF-8, keeping the valid prefix on failure
    pub fn from_bytes(source_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::new(source_id, text),
            Err(e) => {
                let valid = e.utf8_error().valid_up_to();
                let mut bytes = e.into_bytes();
                bytes.truncate(valid);
                let text = String::from_utf8(bytes).unwrap_or_default();
                let line = text.matches('\n').count() + 1;
                Self {
                    source_id: source_id.into(),
                    text,
                    decode_error: Some(line),
                }
            }
        }
    }
}

/// Outcome of checking one input
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileResult {
    pub source_id: String,
    pub issues: Vec<ValidationIssue>,
    /// A document was produced
    pub well_formed: bool,
    /// The batch was cancelled before this input started
    pub skipped: bool,
}

impl FileResult {
    /// Result holding a single fatal issue
    pub fn fatal(source_id: impl Into<String>, issue: ValidationIssue) -> Self {
        Self {
            source_id: source_id.into(),
            issues: vec![issue],
            well_formed: false,
            skipped: false,
        }
    }

    pub fn skipped(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            issues: Vec::new(),
            well_formed: false,
            skipped: true,
        }
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.len() - self.error_count()
    }

    /// Checked, well formed and free of errors
    pub fn is_valid(&self) -> bool {
        !self.skipped && self.well_formed && self.error_count() == 0
    }
}

/// Issue counts per code, split by severity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub errors: BTreeMap<IssueCode, usize>,
    pub warnings: BTreeMap<IssueCode, usize>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl Summary {
    pub fn add(&mut self, issue: &ValidationIssue) {
        match issue.severity {
            Severity::Error => {
                *self.errors.entry(issue.code).or_default() += 1;
                self.total_errors += 1;
            }
            Severity::Warning => {
                *self.warnings.entry(issue.code).or_default() += 1;
                self.total_warnings += 1;
            }
        }
    }

    /// Occurrences of a code at any severity
    pub fn count(&self, code: IssueCode) -> usize {
        self.errors.get(&code).copied().unwrap_or(0)
            + self.warnings.get(&code).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub attempted: usize,
    /// Inputs that produced a document
    pub succeeded: usize,
    pub valid: usize,
    pub invalid: usize,
    pub skipped: usize,
    pub elapsed_ms: u64,
}

/// Results of a whole batch, files in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub files: Vec<FileResult>,
    pub summary: Summary,
    pub metadata: Metadata,
}

impl BatchResult {
    /// Fold per-file results into summary and metadata
    pub fn from_files(files: Vec<FileResult>, started: Instant) -> Self {
        let mut summary = Summary::default();
        let mut metadata = Metadata::default();

        for file in &files {
            if file.skipped {
                metadata.skipped += 1;
                continue;
            }
            metadata.attempted += 1;
            if file.well_formed {
                metadata.succeeded += 1;
            }
            if file.is_valid() {
                metadata.valid += 1;
            } else {
                metadata.invalid += 1;
            }
            file.issues.iter().for_each(|issue| summary.add(issue));
        }
        metadata.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        Self {
            files,
            summary,
            metadata,
        }
    }

    pub fn file(&self, source_id: &str) -> Option<&FileResult> {
        self.files.iter().find(|f| f.source_id == source_id)
    }

    /// Every attempted file is valid
    pub fn is_valid(&self) -> bool {
        self.metadata.invalid == 0
    }
}

/// Files serialize as an object keyed by source id, in input order
struct FilesMap<'a>(&'a [FileResult]);

impl Serialize for FilesMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for file in self.0 {
            map.serialize_entry(&file.source_id, file)?;
        }
        map.end()
    }
}

impl Serialize for BatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("summary", &self.summary)?;
        map.serialize_entry("metadata", &self.metadata)?;
        map.serialize_entry("files", &FilesMap(&self.files))?;
        map.end()
    }
}

/// Source ids for a batch: the path, or `input-N` for text; repeats get `#N`
pub fn source_ids(inputs: &[InputSource]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    inputs
        .iter()
        .enumerate()
        .map(|(idx, input)| {
            let base = match input {
                InputSource::Path(path) => path.display().to_string(),
                InputSource::Text(_) => format!("input-{}", idx + 1),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                base
            } else {
                format!("{}#{}", base, count)
            }
        })
        .collect()
}

fn unreadable(source_id: &str, reason: impl std::fmt::Display) -> FileResult {
    FileResult::fatal(
        source_id,
        ValidationIssue::new(
            IssueCode::UnreadableInput,
            Location::file(),
            format!("cannot read input: {}", reason),
        ),
    )
}

fn aborted(source_id: &str, reason: impl std::fmt::Display) -> FileResult {
    FileResult::fatal(
        source_id,
        ValidationIssue::new(
            IssueCode::CheckAborted,
            Location::file(),
            format!("check stopped unexpectedly: {}", reason),
        ),
    )
}

/// Validation service; cheap to clone and safe to share between tasks
#[derive(Clone)]
pub struct Checker {
    schema: Arc<Schema>,
    policy: Arc<SeverityPolicy>,
    lookup: Option<Arc<dyn ReferenceLookup>>,
    separator: u8,
}

impl Default for Checker {
    fn default() -> Self {
        Self::new(default_schema())
    }
}

impl std::fmt::Debug for Checker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("schema", &self.schema.name)
            .field("policy", &self.policy)
            .field("lookup", &self.lookup.is_some())
            .field("separator", &(self.separator as char))
            .finish()
    }
}

impl Checker {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Arc::new(schema),
            policy: Arc::new(SeverityPolicy::default()),
            lookup: None,
            separator: DEFAULT_SEPARATOR,
        }
    }

    pub fn with_policy(mut self, policy: SeverityPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn ReferenceLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Check literal text
    pub fn check_text(&self, source_id: &str, text: &str) -> FileResult {
        self.check_raw(RawInput::new(source_id, text))
    }

    /// Run the whole pipeline over one decoded input
    pub fn check_raw(&self, raw: RawInput) -> FileResult {
        let parsed = match parse_sections(&raw.text, self.separator) {
            Ok(parsed) => parsed,
            Err(fatal) => {
                log::debug!("{}: {}", raw.source_id, fatal.message);
                return FileResult::fatal(raw.source_id, fatal);
            }
        };

        let mut issues = IssueCollector::new(&self.policy);
        issues.extend(parsed.issues.iter().cloned());
        if let Some(line) = raw.decode_error {
            issues.report(
                IssueCode::MalformedSyntax,
                Location::line(line),
                "input is not valid UTF-8; rest of input ignored",
            );
        }

        let document = build_document(&parsed, &self.schema, &mut issues);
        let mut ctx = ValidationContext::new(&document, &self.schema);
        if let Some(lookup) = &self.lookup {
            ctx = ctx.with_lookup(lookup.as_ref());
        }
        validate_document(&ctx, &mut issues);

        let issues = issues.into_issues();
        log::debug!("{}: {} issue(s)", raw.source_id, issues.len());
        FileResult {
            source_id: raw.source_id,
            issues,
            well_formed: true,
            skipped: false,
        }
    }

    fn read_path(source_id: &str, path: &std::path::Path) -> Result<RawInput, FileResult> {
        std::fs::read(path)
            .map(|bytes| RawInput::from_bytes(source_id, bytes))
            .map_err(|e| unreadable(source_id, e))
    }

    /// Check every input in order on the current thread
    pub fn process(&self, inputs: Vec<InputSource>) -> BatchResult {
        let started = Instant::now();
        let ids = source_ids(&inputs);

        let files = inputs
            .into_iter()
            .zip(ids)
            .map(|(input, id)| match input {
                InputSource::Text(text) => self.check_raw(RawInput::new(id, text)),
                InputSource::Path(path) => match Self::read_path(&id, &path) {
                    Ok(raw) => self.check_raw(raw),
                    Err(result) => result,
                },
            })
            .collect();

        let result = BatchResult::from_files(files, started);
        log::info!(
            "checked {} input(s): {} valid, {} invalid",
            result.metadata.attempted,
            result.metadata.valid,
            result.metadata.invalid
        );
        result
    }

    /// Check inputs concurrently, at most `jobs` at a time
    ///
    /// Once `cancel` fires no further input is started; those inputs come
    /// back with `skipped = true`. Files already running finish normally.
    pub async fn process_parallel(
        &self,
        inputs: Vec<InputSource>,
        jobs: usize,
        cancel: CancellationToken,
    ) -> BatchResult {
        let started = Instant::now();
        let ids = source_ids(&inputs);
        let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
        let mut results: Vec<Option<FileResult>> = vec![None; inputs.len()];
        let mut handles = Vec::new();

        for (idx, (input, id)) in inputs.into_iter().zip(ids.iter().cloned()).enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                log::debug!("{}: batch cancelled, not started", id);
                results[idx] = Some(FileResult::skipped(id));
                continue;
            };

            let checker = self.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let raw = match input {
                    InputSource::Text(text) => RawInput::new(id.clone(), text),
                    InputSource::Path(path) => match tokio::fs::read(&path).await {
                        Ok(bytes) => RawInput::from_bytes(id.clone(), bytes),
                        Err(e) => return unreadable(&id, e),
                    },
                };
                tokio::task::spawn_blocking(move || checker.check_raw(raw))
                    .await
                    .unwrap_or_else(|e| {
                        log::error!("check task for {} failed: {}", id, e);
                        aborted(&id, e)
                    })
            });
            handles.push((idx, handle));
        }

        for (idx, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| {
                log::error!("check task for {} failed: {}", ids[idx], e);
                aborted(&ids[idx], e)
            });
            results[idx] = Some(result);
        }

        let files = results
            .into_iter()
            .zip(ids)
            .map(|(result, id)| result.unwrap_or_else(|| FileResult::skipped(id)))
            .collect();
        BatchResult::from_files(files, started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ids() {
        let inputs = vec![
            InputSource::Path(PathBuf::from("a.pb")),
            InputSource::Text("x".to_string()),
            InputSource::Path(PathBuf::from("a.pb")),
            InputSource::Path(PathBuf::from("a.pb")),
        ];
        assert_eq!(source_ids(&inputs), vec!["a.pb", "input-2", "a.pb#2", "a.pb#3"]);
    }

    #[test]
    fn test_from_bytes_keeps_valid_prefix() {
        let mut bytes = b"META\nbudget;1\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let raw = RawInput::from_bytes("f", bytes);
        assert_eq!(raw.text, "META\nbudget;1\n");
        assert_eq!(raw.decode_error, Some(3));
    }

    #[test]
    fn test_fatal_input() {
        let result = Checker::default().check_text("f", "");
        assert!(!result.well_formed);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].code, IssueCode::EmptyOrUnrecognized);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = Summary::default();
        let issue = ValidationIssue::new(IssueCode::CountMismatch, Location::file(), "count");
        summary.add(&issue);
        summary.add(&issue);
        assert_eq!(summary.count(IssueCode::CountMismatch), 2);
        assert_eq!(summary.total_warnings, 2);
        assert_eq!(summary.total_errors, 0);
    }

    #[test]
    fn test_files_serialize_as_ordered_object() {
        let checker = Checker::default();
        let result = checker.process(vec![
            InputSource::Text("zzz".to_string()),
            InputSource::Text(String::new()),
        ]);
        let json = serde_json::to_string(&result).unwrap();
        let first = json.find("\"input-1\"").unwrap();
        let second = json.find("\"input-2\"").unwrap();
        assert!(first < second);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metadata"]["attempted"], 2);
        assert_eq!(value["summary"]["errors"]["EmptyOrUnrecognized"], 2);
    }

    #[test]
    fn test_unreadable_path() {
        let result = Checker::default().process(vec![InputSource::Path(PathBuf::from(
            "/nonexistent/file.pb",
        ))]);
        assert_eq!(result.files[0].issues[0].code, IssueCode::UnreadableInput);
        assert_eq!(result.metadata.succeeded, 0);
        assert_eq!(result.metadata.invalid, 1);
    }
}
