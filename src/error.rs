use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ClarityError {
    #[error(
        "Clarity connection config not found (pass --clarity-config or create ~/.genologicsrc)"
    )]
    MissingConnectionConfig,

    #[error("invalid Clarity connection config at {path}: {message}")]
    ConnectionConfig { path: PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse schema config: {0}")]
    ConfigParse(String),

    #[error("invalid sample sheet: {0}")]
    SampleSheet(String),

    #[error("failed to read CSV {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("invalid well identifier: {0}")]
    InvalidWell(String),

    #[error("Clarity request failed: {0}")]
    LimsHttp(String),

    #[error("Clarity returned status {status}: {message}")]
    LimsStatus { status: u16, message: String },

    #[error("unexpected Clarity payload: {0}")]
    LimsPayload(String),

    #[error("value {value:?} is not numeric and cannot be multiplied")]
    NonNumericValue { value: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
