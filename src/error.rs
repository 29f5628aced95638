use std::io;
use thiserror::Error;

/// Errors from tokenizing and resolving records.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Reference at {pos} of length {len} out of bounds for window of {window} bytes")]
    OutOfBounds { pos: usize, len: usize, window: usize },

    #[error("Cannot release {amount} bytes from a reference at offset {pos}")]
    ReleaseOutOfRange { amount: usize, pos: usize },

    #[error("Quality length {quality} does not match sequence length {sequence}")]
    QualityLengthMismatch { sequence: usize, quality: usize },
}

pub type Result<T> = std::result::Result<T, TokenError>;
