//! CLI-specific error types and exit code mapping

use trawler_core::error::TrawlerError;
use trawler_executor::{ExecutorError, ValidationError};
use trawler_inventory::ReconcileError;
use trawler_parser::ParserError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The command was rejected before anything was spawned.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// One or more supervised jobs did not complete successfully.
    #[error("execution failed: {0}")]
    Execution(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from trawler-core.
    #[error("{0}")]
    Core(#[from] TrawlerError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                   |
    /// |------|---------------------------|
    /// | 0    | Success                   |
    /// | 1    | General / command error   |
    /// | 2    | Configuration error       |
    /// | 3    | Command validation error  |
    /// | 4    | Execution failure         |
    /// | 10   | IO error                  |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Core(TrawlerError::Config(_)) => 2,
            Self::Validation(_) => 3,
            Self::Execution(_) => 4,
            Self::Io(_) | Self::Core(TrawlerError::Io(_)) => 10,
            Self::Command(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}

impl From<ExecutorError> for CliError {
    fn from(e: ExecutorError) -> Self {
        match e {
            ExecutorError::Validation(v) => Self::Validation(v),
            ExecutorError::Config { field, reason } => Self::Config(format!("{field}: {reason}")),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<ParserError> for CliError {
    fn from(e: ParserError) -> Self {
        Self::Core(e.into())
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        Self::Core(e.into())
    }
}
