//! Error types, one enum per concern.
//!
//! Only `StoreError` is fatal; completion and parse errors are counted as
//! failed items by the batch driver.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Corrupt question database {path}: {source}")]
  Corrupt {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("Question #{index} in {path} is unreadable: {reason}")]
  InvalidRecord { path: PathBuf, index: usize, reason: String },

  #[error("Serialization error: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("Duplicate question id: {0}")]
  DuplicateId(String),
}

impl StoreError {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    StoreError::Io { path: path.into(), source }
  }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum CompletionError {
  #[error("HTTP transport error: {0}")]
  Http(String),

  #[error("Provider returned HTTP {status}: {message}")]
  Status { status: u16, message: String },

  #[error("Completion timed out after {0:?}")]
  Timeout(Duration),

  #[error("Completion was empty")]
  Empty,

  #[error("Missing API key: set {0}")]
  MissingApiKey(&'static str),
}

impl From<reqwest::Error> for CompletionError {
  fn from(err: reqwest::Error) -> Self {
    CompletionError::Http(err.to_string())
  }
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
  #[error("No JSON object found in completion")]
  NoJsonObject,

  #[error("Malformed JSON: {0}")]
  Malformed(String),

  #[error("Missing required field: {0}")]
  MissingField(&'static str),

  #[error("Invalid value for {field}: {reason}")]
  InvalidField { field: &'static str, reason: String },
}

/// Parser failure plus the raw completion text, kept for diagnostics.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ParseFailure {
  pub error: ParseError,
  pub raw: String,
}

/// Shape problems in externally produced records (merge input).
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
  #[error("Record is not a valid question: {0}")]
  Shape(String),

  #[error("Field {field} is invalid: {reason}")]
  Field { field: &'static str, reason: String },

  #[error("Question id already present: {0}")]
  DuplicateId(String),
}
