//! Configuration management for pb-check.
//!
//! Handles:
//! - Command-line argument parsing
//! - Config files: user (`<config_dir>/pb-check/config.toml`), project
//!   (`./pb-check.toml`) and an explicit `--config` file
//! - Layering: CLI flags > explicit file > project file > user file > defaults

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::diagnostics::{IssueCode, SeverityLevel, SeverityPolicy};
use crate::parser::DEFAULT_SEPARATOR;

/// Project config file looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "pb-check.toml";

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

/// Command-line arguments for pb-check
#[derive(Debug, Default, Parser)]
#[command(name = "pb-check")]
#[command(about = "Validate participatory budgeting (.pb) files")]
#[command(version)]
pub struct Args {
    /// Files to check
    #[arg(value_name = "FILES")]
    pub files: Vec<PathBuf>,

    /// Also read one document from standard input
    #[arg(long)]
    pub stdin: bool,

    /// Explicit config file, applied above the project and user files
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Field schema TOML replacing the built-in one
    #[arg(long, value_name = "PATH")]
    pub schema: Option<PathBuf>,

    /// Field separator, a single character (default ';')
    #[arg(long, value_name = "C")]
    pub separator: Option<String>,

    /// Number of files checked concurrently
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Print only the summary and metadata
    #[arg(long)]
    pub summary_only: bool,

    /// List warnings in text reports and log progress
    #[arg(long, short)]
    pub verbose: bool,

    /// Log level
    #[arg(long, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,
}

/// One config file as written on disk
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub schema: Option<PathBuf>,
    pub separator: Option<String>,
    pub jobs: Option<usize>,
    /// Issue code name → `error`, `warning` or `off`
    #[serde(default)]
    pub severity: HashMap<String, SeverityLevel>,
    /// Reference category → known codes
    #[serde(default)]
    pub reference_codes: HashMap<String, Vec<String>>,
}

impl ConfigFile {
    /// Load a config file; a relative schema path is resolved against the file's directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let mut file: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("parse config file {}", path.display()))?;

        if let (Some(schema), Some(dir)) = (&file.schema, path.parent()) {
            if schema.is_relative() {
                file.schema = Some(dir.join(schema));
            }
        }
        Ok(file)
    }
}

/// Combined configuration from all sources
#[derive(Debug, Clone)]
pub struct Config {
    pub files: Vec<PathBuf>,
    pub read_stdin: bool,
    pub schema_path: Option<PathBuf>,
    pub separator: u8,
    pub jobs: usize,
    pub format: OutputFormat,
    pub summary_only: bool,
    pub verbose: bool,
    pub log_level: String,
    pub severity: SeverityPolicy,
    pub reference_codes: HashMap<String, Vec<String>>,
    /// Config files that were applied, lowest precedence first
    pub loaded_files: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            read_stdin: false,
            schema_path: None,
            separator: DEFAULT_SEPARATOR,
            jobs: default_jobs(),
            format: OutputFormat::Json,
            summary_only: false,
            verbose: false,
            log_level: "warn".to_string(),
            severity: SeverityPolicy::default(),
            reference_codes: HashMap::new(),
            loaded_files: Vec::new(),
        }
    }
}

impl Config {
    /// Create configuration from command-line arguments and discovered files
    pub fn from_args_and_env() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Create configuration from explicit arguments, discovering config files
    pub fn from_args(args: Args) -> Result<Self> {
        let mut layers = Vec::new();

        if let Some(path) = user_config_path().filter(|p| p.is_file()) {
            layers.push((ConfigFile::load(&path)?, path));
        }

        let project = PathBuf::from(PROJECT_CONFIG_FILE);
        if project.is_file() {
            layers.push((ConfigFile::load(&project)?, project));
        }

        if let Some(path) = &args.config {
            layers.push((ConfigFile::load(path)?, path.clone()));
        }

        Self::from_layers(args, layers)
    }

    /// Merge config files (lowest precedence first) and then the CLI flags
    pub fn from_layers(args: Args, layers: Vec<(ConfigFile, PathBuf)>) -> Result<Self> {
        let mut config = Config::default();
        let mut overrides = HashMap::new();

        for (file, path) in layers {
            log::debug!("applying config file {}", path.display());
            if let Some(schema) = file.schema {
                config.schema_path = Some(schema);
            }
            if let Some(separator) = &file.separator {
                config.separator = parse_separator(separator)
                    .with_context(|| format!("invalid separator in {}", path.display()))?;
            }
            if let Some(jobs) = file.jobs {
                config.jobs = check_jobs(jobs)
                    .with_context(|| format!("invalid jobs in {}", path.display()))?;
            }
            for (name, level) in file.severity {
                let code = IssueCode::from_name(&name).with_context(|| {
                    format!("unknown issue code '{}' in {}", name, path.display())
                })?;
                overrides.insert(code, level);
            }
            config.reference_codes.extend(file.reference_codes);
            config.loaded_files.push(path);
        }
        config.severity = SeverityPolicy::from_overrides(overrides);

        config.files = args.files;
        config.read_stdin = args.stdin;
        if let Some(schema) = args.schema {
            config.schema_path = Some(schema);
        }
        if let Some(separator) = &args.separator {
            config.separator = parse_separator(separator).context("invalid --separator")?;
        }
        if let Some(jobs) = args.jobs {
            config.jobs = check_jobs(jobs).context("invalid --jobs")?;
        }
        if let Some(format) = args.format {
            config.format = format;
        }
        config.summary_only = args.summary_only;
        config.verbose = args.verbose;
        config.log_level = effective_log_level(args.log_level.as_deref(), args.verbose);

        Ok(config)
    }
}

/// User-level config file location
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pb-check").join("config.toml"))
}

/// Log level from `--log-level`, raised to `info` by `--verbose`
pub fn effective_log_level(explicit: Option<&str>, verbose: bool) -> String {
    match explicit {
        Some(level) => level.to_string(),
        None if verbose => "info".to_string(),
        None => "warn".to_string(),
    }
}

/// Separator must be one ASCII character other than a quote or line break
pub fn parse_separator(raw: &str) -> Result<u8> {
    let raw = match raw {
        "\\t" | "tab" => "\t",
        other => other,
    };
    let bytes = raw.as_bytes();
    if bytes.len() != 1 || !bytes[0].is_ascii() {
        bail!("separator must be a single ASCII character, got '{}'", raw);
    }
    if matches!(bytes[0], b'"' | b'\n' | b'\r') {
        bail!("'{}' cannot be used as a separator", raw.escape_default());
    }
    Ok(bytes[0])
}

fn check_jobs(jobs: usize) -> Result<usize> {
    if jobs == 0 {
        bail!("jobs must be at least 1");
    }
    Ok(jobs)
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diagnostics::Severity;

    fn layer(toml: &str) -> (ConfigFile, PathBuf) {
        (toml::from_str(toml).unwrap(), PathBuf::from("test.toml"))
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_layers(Args::default(), Vec::new()).unwrap();
        assert_eq!(config.separator, b';');
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.log_level, "warn");
        assert!(config.jobs >= 1);
        assert!(config.loaded_files.is_empty());
    }

    #[test]
    fn test_cli_overrides_files() {
        let args = Args {
            separator: Some(",".to_string()),
            jobs: Some(2),
            ..Args::default()
        };
        let layers = vec![
            layer("separator = \"|\"\njobs = 8\n"),
            layer("jobs = 4\n"),
        ];
        let config = Config::from_layers(args, layers).unwrap();
        assert_eq!(config.separator, b',');
        assert_eq!(config.jobs, 2);
    }

    #[test]
    fn test_later_file_wins() {
        let layers = vec![
            layer("separator = \"|\"\njobs = 8\n[severity]\nCountMismatch = \"error\"\n"),
            layer("jobs = 4\n[severity]\nCountMismatch = \"off\"\nEmptyLines = \"error\"\n"),
        ];
        let config = Config::from_layers(Args::default(), layers).unwrap();
        assert_eq!(config.separator, b'|');
        assert_eq!(config.jobs, 4);
        assert_eq!(config.severity.resolve(IssueCode::CountMismatch), None);
        assert_eq!(
            config.severity.resolve(IssueCode::EmptyLines),
            Some(Severity::Error)
        );
        assert_eq!(config.loaded_files.len(), 2);
    }

    #[test]
    fn test_unknown_issue_code_rejected() {
        let err = Config::from_layers(Args::default(), vec![layer("[severity]\nNoSuchCode = \"off\"\n")])
            .unwrap_err();
        assert!(format!("{:#}", err).contains("unknown issue code 'NoSuchCode'"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<ConfigFile>("colour = \"blue\"\n").is_err());
    }

    #[test]
    fn test_reference_codes() {
        let layers = vec![layer("[reference_codes]\ncountry = [\"Poland\", \"France\"]\n")];
        let config = Config::from_layers(Args::default(), layers).unwrap();
        assert_eq!(config.reference_codes["country"], vec!["Poland", "France"]);
    }

    #[test]
    fn test_parse_separator() {
        assert_eq!(parse_separator(";").unwrap(), b';');
        assert_eq!(parse_separator("tab").unwrap(), b'\t');
        assert_eq!(parse_separator("\\t").unwrap(), b'\t');
        assert!(parse_separator("").is_err());
        assert!(parse_separator(";;").is_err());
        assert!(parse_separator("\"").is_err());
        assert!(parse_separator("é").is_err());
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let args = Args {
            jobs: Some(0),
            ..Args::default()
        };
        assert!(Config::from_layers(args, Vec::new()).is_err());
    }

    #[test]
    fn test_verbose_log_level() {
        assert_eq!(effective_log_level(None, false), "warn");
        assert_eq!(effective_log_level(None, true), "info");
        assert_eq!(effective_log_level(Some("trace"), true), "trace");
    }

    #[test]
    fn test_load_resolves_schema_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pb-check.toml");
        std::fs::write(&path, "schema = \"schemas/custom.toml\"\n").unwrap();

        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.schema, Some(dir.path().join("schemas/custom.toml")));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "pb-check",
            "a.pb",
            "b.pb",
            "--format",
            "text",
            "--jobs",
            "3",
            "--summary-only",
        ]);
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.format, Some(OutputFormat::Text));
        assert_eq!(args.jobs, Some(3));
        assert!(args.summary_only);
    }
}
