use std::process::ExitCode;

use clap::Parser;

use pabulib_checker::cli::{self, exit_code};
use pabulib_checker::config::{effective_log_level, Args, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = effective_log_level(args.log_level.as_deref(), args.verbose);
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let config = match Config::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(exit_code::FAILURE);
        }
    };

    match cli::run(&config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(exit_code::FAILURE)
        }
    }
}
