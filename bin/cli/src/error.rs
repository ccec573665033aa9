//! Error types for CLI commands.

use chainflow_core::WorkflowId;
use std::fmt;
use std::path::PathBuf;

/// Errors from CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The workflow file could not be read.
    ReadFile { path: PathBuf, details: String },
    /// The workflow file is not a valid workflow document.
    ParseWorkflow { path: PathBuf, details: String },
    /// An `--input` argument is not `nodeId.inputId=value`.
    InvalidInputArg { arg: String },
    /// The workflow does not compile.
    Compile { workflow_id: WorkflowId },
    /// The execution session failed.
    Execution { workflow_id: WorkflowId },
    /// Output could not be written.
    Output { details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::ReadFile { path, details } => {
                write!(f, "failed to read {}: {details}", path.display())
            }
            Self::ParseWorkflow { path, details } => {
                write!(f, "failed to parse workflow {}: {details}", path.display())
            }
            Self::InvalidInputArg { arg } => {
                write!(f, "invalid input '{arg}', expected nodeId.inputId=value")
            }
            Self::Compile { workflow_id } => write!(f, "workflow {workflow_id} does not compile"),
            Self::Execution { workflow_id } => {
                write!(f, "execution of workflow {workflow_id} failed")
            }
            Self::Output { details } => write!(f, "failed to write output: {details}"),
        }
    }
}

impl std::error::Error for CliError {}
