//! Error types for the read-classification pipeline.

use std::io;
use thiserror::Error;

/// Errors that can occur while running the classification pipeline.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("classification run cancelled")]
    Cancelled,

    #[error("commit failed, archive may be inconsistent: {message}")]
    CommitFailed { message: String },

    #[error("malformed read {read_uid}: {message}")]
    Malformed { read_uid: u64, message: String },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub type Result<T> = std::result::Result<T, ClassifyError>;
