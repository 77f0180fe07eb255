//! Command-line front end
//!
//! Wires configuration into a [`Checker`], runs the batch and prints the report.

pub mod report;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use crate::batch::{Checker, InputSource};
use crate::config::Config;
use crate::schema::SchemaRegistry;
use crate::validation::CodeTable;

/// Process exit codes
pub mod exit_code {
    /// Every file is valid
    pub const VALID: u8 = 0;
    /// At least one file has errors
    pub const INVALID: u8 = 1;
    /// Usage or configuration failure
    pub const FAILURE: u8 = 2;
}

/// Build the checker described by a configuration
pub fn build_checker(config: &Config) -> Result<Checker> {
    let mut registry = SchemaRegistry::with_default();
    if let Some(path) = &config.schema_path {
        registry.load_file(path)?;
    }
    let schema = registry
        .get_active_schema()
        .cloned()
        .context("no active schema")?;
    log::info!("using schema '{}'", schema.name);

    let mut checker = Checker::new(schema)
        .with_policy(config.severity.clone())
        .with_separator(config.separator);

    if config.reference_codes.is_empty() {
        log::debug!("no reference codes configured");
    } else {
        let table = CodeTable::from_lists(&config.reference_codes);
        checker = checker.with_lookup(Arc::new(table));
    }

    Ok(checker)
}

/// Inputs named by the configuration, stdin last
pub async fn collect_inputs(config: &Config) -> Result<Vec<InputSource>> {
    let mut inputs: Vec<InputSource> = config
        .files
        .iter()
        .cloned()
        .map(InputSource::Path)
        .collect();

    if config.read_stdin {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("read standard input")?;
        inputs.push(InputSource::Text(text));
    }

    if inputs.is_empty() {
        bail!("no input given; pass FILES or --stdin");
    }
    Ok(inputs)
}

/// Run a whole check and print the report; returns the exit code
pub async fn run(config: &Config) -> Result<u8> {
    for path in &config.loaded_files {
        log::info!("loaded config file {}", path.display());
    }

    let checker = build_checker(config)?;
    let inputs = collect_inputs(config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted; finishing files in progress");
            on_interrupt.cancel();
        }
    });

    let result = checker
        .process_parallel(inputs, config.jobs, cancel)
        .await;
    let output = report::render(&result, config.format, config.summary_only, config.verbose)?;
    println!("{}", output);

    Ok(if result.is_valid() {
        exit_code::VALID
    } else {
        exit_code::INVALID
    })
}
