// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Labprint.

use thiserror::Error;

/// Top-level error type for all Labprint operations.
#[derive(Debug, Error)]
pub enum LabprintError {
    // -- Admission --
    #[error("print queue is full ({capacity} jobs waiting), try again later")]
    QueueFull { capacity: usize },

    // -- Conversion --
    #[error("document conversion failed: {}", causes.join(" | "))]
    ConversionFailed { causes: Vec<String> },

    #[error("unsupported document type: {0}")]
    UnsupportedDocument(String),

    // -- Dispatch --
    #[error("{reason}")]
    Dispatch {
        reason: String,
        #[source]
        source: Option<Box<LabprintError>>,
    },

    #[error("invalid page range: {0}")]
    InvalidRange(String),

    #[error("no printer available: {0}")]
    NoPrinter(String),

    #[error("printer not allowed: {0}")]
    InvalidPrinter(String),

    #[error("invalid print options: {0}")]
    InvalidOptions(String),

    // -- Job lifecycle --
    #[error("illegal job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    // -- External processes --
    #[error("{program} failed: {detail}")]
    Command { program: String, detail: String },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    // -- Documents --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LabprintError {
    /// Wrap `source` in a dispatch failure described by `reason`.
    pub fn dispatch(reason: impl Into<String>, source: LabprintError) -> Self {
        Self::Dispatch {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// A dispatch failure with no underlying error.
    pub fn dispatch_msg(reason: impl Into<String>) -> Self {
        Self::Dispatch {
            reason: reason.into(),
            source: None,
        }
    }
}

/// Render an error and every `source()` beneath it as `outer: inner: ...`.
///
/// This is the diagnostic detail stored on failed jobs.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        current = cause.source();
    }
    out
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LabprintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failure_joins_causes() {
        let err = LabprintError::ConversionFailed {
            causes: vec!["soffice: crashed".into(), "unoconv: not found".into()],
        };
        assert_eq!(
            err.to_string(),
            "document conversion failed: soffice: crashed | unoconv: not found"
        );
    }

    #[test]
    fn chain_walks_nested_dispatch_sources() {
        let err = LabprintError::dispatch(
            "fallback rendering failed",
            LabprintError::dispatch(
                "could not resolve pages",
                LabprintError::InvalidRange("page 12 out of range (1-3)".into()),
            ),
        );
        assert_eq!(
            error_chain(&err),
            "fallback rendering failed: could not resolve pages: \
             invalid page range: page 12 out of range (1-3)"
        );
    }

    #[test]
    fn chain_of_leaf_error_is_its_message() {
        let err = LabprintError::NoPrinter("several printers installed".into());
        assert_eq!(error_chain(&err), err.to_string());
    }
}
