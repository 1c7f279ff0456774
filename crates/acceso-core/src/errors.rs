use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use thiserror::Error;

use crate::payload::PayloadError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("no capture image was received")]
    MissingCapture,

    #[error("capture image could not be decoded: {0}")]
    MalformedCapture(#[from] PayloadError),

    #[error("invalid {field} '{value}': {message}")]
    InvalidKey {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("gallery store unavailable at {path}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("gallery store at {path} is inconsistent: {message}")]
    StoreInconsistent { path: PathBuf, message: String },

    #[error("verification timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },

    #[error("no identity '{identity}' enrolled under {category}/{subcategory}")]
    IdentityNotFound {
        category: String,
        subcategory: String,
        identity: String,
    },

    #[error("failed to start comparison worker pool: {0}")]
    ThreadPool(String),

    #[error("face comparison oracle unavailable: {0}")]
    OracleInit(String),

    #[error("missing {kind} model; provide {flag} or set ${env}")]
    MissingModel {
        kind: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("failed to read capture file {path}: {source}")]
    CaptureRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },
}

impl AppError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::MissingCapture => ExitCode::from(2),
            AppError::MalformedCapture(_) => ExitCode::from(2),
            AppError::InvalidKey { .. } => ExitCode::from(2),
            AppError::CaptureRead { .. } => ExitCode::from(2),
            AppError::StoreUnavailable { .. } => ExitCode::from(3),
            AppError::StoreInconsistent { .. } => ExitCode::from(3),
            AppError::Timeout { .. } => ExitCode::from(4),
            AppError::IdentityNotFound { .. } => ExitCode::from(5),
            AppError::OracleInit(_) => ExitCode::from(2),
            AppError::MissingModel { .. } => ExitCode::from(2),
            AppError::ModelLoad { .. } => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::ThreadPool(_) => ExitCode::from(6),
            AppError::Io(_) => ExitCode::from(6),
            AppError::Serialization(_) => ExitCode::from(6),
        }
    }

    /// Errors caused by the caller's payload rather than by the service.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            AppError::MissingCapture
                | AppError::MalformedCapture(_)
                | AppError::InvalidKey { .. }
                | AppError::CaptureRead { .. }
        )
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
