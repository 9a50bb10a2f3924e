// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error summaries for the people standing at the printer.
//
// The status projection shows these instead of raw errors; the raw cause
// chain is only exposed in debug mode.

use crate::error::LabprintError;

/// Severity of an error from the submitter's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Busy system, try again shortly.
    Transient,
    /// The submitter must change something (file, options, printer).
    ActionRequired,
    /// Needs an administrator (missing software, broken printer setup).
    Permanent,
}

/// A plain-language error with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: &str, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Map a `LabprintError` to something a lab user can act on.
pub fn humanize_error(err: &LabprintError) -> HumanError {
    match err {
        LabprintError::QueueFull { .. } => HumanError::new(
            "The print queue is full.",
            "Wait a minute and submit the document again.",
            true,
            Severity::Transient,
        ),
        LabprintError::ConversionFailed { .. } => HumanError::new(
            "The document could not be converted for printing.",
            "Save it as PDF and upload the PDF instead.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::UnsupportedDocument(_) => HumanError::new(
            "This file type cannot be printed.",
            "Upload a PDF, Word document, plain text file or image.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::InvalidRange(_) => HumanError::new(
            "The page range is not valid for this document.",
            "Use page numbers such as 1-3,5 that exist in the document.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::InvalidOptions(_) => HumanError::new(
            "Some print options are not valid.",
            "Check the number of copies (1 to 99) and the other settings.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::NoPrinter(_) | LabprintError::InvalidPrinter(_) => HumanError::new(
            "No usable printer was selected.",
            "Choose one of the listed printers and try again.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::Timeout { .. } => HumanError::new(
            "The printer took too long to respond.",
            "Check that the printer is on, then try again.",
            true,
            Severity::Transient,
        ),
        // Dispatch failures carry the real cause underneath.
        LabprintError::Dispatch {
            source: Some(inner), ..
        } => humanize_error(inner),
        LabprintError::Dispatch { .. } | LabprintError::Command { .. } => HumanError::new(
            "The document could not be sent to the printer.",
            "Check the printer status and ask an administrator if it keeps failing.",
            true,
            Severity::Permanent,
        ),
        LabprintError::PdfError(_) | LabprintError::ImageError(_) => HumanError::new(
            "The document appears to be damaged.",
            "Open it on your computer, export it again and resubmit.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => HumanError::new(
            "The uploaded file is no longer available.",
            "Upload the document again.",
            false,
            Severity::ActionRequired,
        ),
        LabprintError::InvalidTransition { .. }
        | LabprintError::Database(_)
        | LabprintError::Config(_)
        | LabprintError::Io(_)
        | LabprintError::Serialization(_) => HumanError::new(
            "Something went wrong on the print server.",
            "Ask an administrator to check the server log.",
            false,
            Severity::Permanent,
        ),
    }
}
