//! Error types for pcapflow.
//!
//! This module provides structured error types for all pcapflow operations:
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`SourceError`] - Errors from capture file reading
//! - [`DecodeError`] - Errors from frame decoding
//!
//! All errors implement `std::error::Error` and can be converted to
//! `anyhow::Error`. Neither kind is fatal to a batch: a decode failure drops
//! a single frame and a source failure fails a single file.

use thiserror::Error;

/// Main error type for pcapflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading a capture source
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// Error decoding a captured frame
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to reading a capture source (file or live).
#[derive(Error, Debug)]
pub enum SourceError {
    /// File not found or not openable
    #[error("cannot open capture: {path}")]
    FileNotFound { path: String },

    /// Invalid or corrupt capture format
    #[error("invalid capture format: {reason}")]
    InvalidFormat { reason: String },

    /// Read failed partway through the source
    #[error("read failed at frame {frame}: {reason}")]
    ReadFailed { frame: u64, reason: String },
}

/// Errors related to decoding a single captured frame.
///
/// Always recoverable: the frame is dropped from reconstruction and the
/// batch continues.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A protocol header was truncated or malformed
    #[error("{layer}: truncated or malformed header: {reason}")]
    Malformed {
        layer: &'static str,
        reason: String,
    },
}

impl DecodeError {
    pub(crate) fn malformed(layer: &'static str, reason: impl ToString) -> Self {
        DecodeError::Malformed {
            layer,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
