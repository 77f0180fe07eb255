//! Config files layered under command-line flags
use std::fs;

use clap::Parser;

use pabulib_checker::cli::build_checker;
use pabulib_checker::config::{Args, ConfigFile, OutputFormat};
use pabulib_checker::core::Severity;
use pabulib_checker::{Config, IssueCode};

const VALID: &str = include_str!("fixtures/valid.pb");

#[test]
fn test_config_file_and_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pb-check.toml");
    fs::write(
        &path,
        "separator = \"tab\"\njobs = 2\n\n[severity]\nCountMismatch = \"error\"\n",
    )
    .unwrap();

    let args = Args::parse_from([
        "pb-check",
        "--config",
        path.to_str().unwrap(),
        "--jobs",
        "5",
        "--format",
        "text",
        "a.pb",
    ]);
    let config = Config::from_args(args).unwrap();

    assert_eq!(config.separator, b'\t');
    assert_eq!(config.jobs, 5);
    assert_eq!(config.format, OutputFormat::Text);
    assert_eq!(config.files.len(), 1);
    assert_eq!(
        config.severity.resolve(IssueCode::CountMismatch),
        Some(Severity::Error)
    );
    assert!(config.loaded_files.contains(&path));
}

#[test]
fn test_relative_schema_path_and_reference_codes() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("schemas")).unwrap();
    let schema = pabulib_checker::schema::default_schema();
    assert_eq!(schema.name, "pabulib");

    let custom = include_str!("../resources/schema/pabulib.toml")
        .replacen("name = \"pabulib\"", "name = \"pabulib-local\"", 1);
    fs::write(dir.path().join("schemas/local.toml"), custom).unwrap();

    let path = dir.path().join("pb-check.toml");
    fs::write(
        &path,
        "schema = \"schemas/local.toml\"\n\n[reference_codes]\ncountry = [\"Germany\"]\n",
    )
    .unwrap();

    let file = ConfigFile::load(&path).unwrap();
    assert_eq!(file.schema, Some(dir.path().join("schemas/local.toml")));

    let config = Config::from_layers(Args::default(), vec![(file, path)]).unwrap();
    let checker = build_checker(&config).unwrap();
    assert_eq!(checker.schema().name, "pabulib-local");

    let result = checker.check_text("f", VALID);
    let codes: Vec<IssueCode> = result.issues.iter().map(|i| i.code).collect();
    assert_eq!(codes, vec![IssueCode::UnknownReferenceCode]);
}

#[test]
fn test_invalid_separator_flag() {
    let args = Args::parse_from(["pb-check", "--separator", "\"", "a.pb"]);
    let err = Config::from_layers(args, Vec::new()).unwrap_err();
    assert!(format!("{:#}", err).contains("invalid --separator"));
}

#[test]
fn test_config_file_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "flavour = \"x\"\n").unwrap();
    assert!(ConfigFile::load(&path).is_err());
}
