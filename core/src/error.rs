//! Error types for the devenv-core crate

use crate::CreateStep;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend command failed: {cmd} - {stderr}")]
    Backend { cmd: String, stderr: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("No terminal emulator found (tried: {0})")]
    NoTerminalFound(String),

    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Environment creation failed while {step}: {source}")]
    StepFailed {
        step: CreateStep,
        #[source]
        source: Box<Error>,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn backend(cmd: impl Into<String>, stderr: impl Into<String>) -> Self {
        Error::Backend {
            cmd: cmd.into(),
            stderr: stderr.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Error::BackendUnavailable(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionFailed(msg.into())
    }

    pub fn at_step(step: CreateStep, source: Error) -> Self {
        Error::StepFailed {
            step,
            source: Box::new(source),
        }
    }

    /// The creation step this error was raised at, if any
    pub fn failed_step(&self) -> Option<CreateStep> {
        match self {
            Error::StepFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}
