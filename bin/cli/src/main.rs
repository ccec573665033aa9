//! `chainflow` command-line tool.
//!
//! Validates, compiles and dry-runs workflow JSON documents. Results are
//! printed to stdout as pretty JSON; logs go to stderr.

mod commands;
mod config;
mod error;

use chainflow_core::WorkflowId;
use chainflow_workflow::{CollectedValues, Compiler};
use clap::{Parser, Subcommand};
use crate::config::CliConfig;
use crate::error::CliError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::process::ExitCode;

/// chainflow - compile and check visual automation workflows
#[derive(Parser)]
#[command(name = "chainflow")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a workflow's graph, parameters and activation settings
    Validate {
        /// Path to the workflow JSON file
        file: PathBuf,
    },

    /// Compile a workflow and print the compiled form
    Compile {
        /// Path to the workflow JSON file
        file: PathBuf,

        /// Compile under this workflow id instead of the document's
        #[arg(long)]
        workflow_id: Option<String>,
    },

    /// List required inputs that still need a value
    Missing {
        /// Path to the workflow JSON file
        file: PathBuf,
    },

    /// Resolve inputs and print what a runner would receive
    Run {
        /// Path to the workflow JSON file
        file: PathBuf,

        /// A missing input value, as nodeId.inputId=value (repeatable)
        #[arg(long = "input", value_parser = commands::parse_input_arg)]
        inputs: Vec<(String, JsonValue)>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(report) => {
            tracing::error!(error = %report, "command failed");
            eprintln!("error: {report}");
            ExitCode::FAILURE
        }
    }
}

/// Runs a command. Returns whether it succeeded.
async fn run(cli: Cli) -> chainflow_core::Result<bool, CliError> {
    let config = CliConfig::from_env().map_err(|e| CliError::Config {
        details: e.to_string(),
    })?;
    tracing::info!(
        strict_parameters = config.compiler.strict_parameters,
        reject_cycles = config.compiler.reject_cycles,
        "loaded configuration"
    );
    let compiler = Compiler::new(config.compiler);

    match cli.command {
        Command::Validate { file } => {
            let workflow = commands::load_workflow_file(&file)?;
            let report = commands::validate(&workflow, &compiler);
            print_json(&report)?;
            Ok(report.valid)
        }
        Command::Compile { file, workflow_id } => {
            let workflow = commands::load_workflow_file(&file)?;
            let compiled =
                commands::compile(&workflow, &compiler, workflow_id.map(WorkflowId::from))?;
            print_json(&compiled)?;
            Ok(true)
        }
        Command::Missing { file } => {
            let workflow = commands::load_workflow_file(&file)?;
            let missing = commands::missing(&workflow, &compiler)?;
            print_json(&missing)?;
            Ok(true)
        }
        Command::Run { file, inputs } => {
            let workflow = commands::load_workflow_file(&file)?;
            let inputs: CollectedValues = inputs.into_iter().collect();
            let report = commands::dry_run(&workflow, &compiler, inputs).await?;
            print_json(&report)?;
            Ok(report.completed())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> chainflow_core::Result<(), CliError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| CliError::Output {
        details: e.to_string(),
    })?;
    println!("{json}");
    Ok(())
}
