// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Labprint pipeline.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LabprintError;

/// Highest copy count a single job may request.
pub const MAX_COPIES: u32 = 99;

/// Unique identifier for a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for JobId {
    type Err = LabprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| LabprintError::InvalidOptions(format!("bad job id {s:?}: {e}")))
    }
}

/// Lifecycle states of a print job.
///
/// `Pending -> InProgress -> Success | Failure`; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROGRESS")]
    InProgress,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILURE")]
    Failure,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Staying in the same non-terminal state is allowed so that message
    /// and progress updates can be issued without a transition.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Pending) => true,
            (Self::Pending, Self::InProgress) => true,
            (Self::InProgress, Self::InProgress) => true,
            (Self::InProgress, Self::Success | Self::Failure) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard paper sizes accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            Self::A4 => (210.0, 297.0),
            Self::A3 => (297.0, 420.0),
            Self::A5 => (148.0, 210.0),
            Self::Letter => (215.9, 279.4),
            Self::Legal => (215.9, 355.6),
        }
    }

    /// Dimensions in PostScript points (1/72 inch).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        (w * 72.0 / 25.4, h * 72.0 / 25.4)
    }

    /// Name used by CUPS `media=` and by PPD `PageSize` choices.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::A4 => "A4",
            Self::A3 => "A3",
            Self::A5 => "A5",
            Self::Letter => "Letter",
            Self::Legal => "Legal",
        }
    }

    /// Case-insensitive lookup of a paper keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "a3" => Some(Self::A3),
            "a5" => Some(Self::A5),
            "letter" => Some(Self::Letter),
            "legal" => Some(Self::Legal),
            _ => None,
        }
    }
}

impl Default for PaperSize {
    fn default() -> Self {
        Self::A4
    }
}

/// Duplex printing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuplexMode {
    OneSided,
    TwoSidedLongEdge,
    TwoSidedShortEdge,
}

impl DuplexMode {
    /// IPP / CUPS `sides` keyword.
    pub fn sides_keyword(&self) -> &'static str {
        match self {
            Self::OneSided => "one-sided",
            Self::TwoSidedLongEdge => "two-sided-long-edge",
            Self::TwoSidedShortEdge => "two-sided-short-edge",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "one-sided" | "simplex" | "none" => Some(Self::OneSided),
            "two-sided-long-edge" | "duplexlong" | "long" => Some(Self::TwoSidedLongEdge),
            "two-sided-short-edge" | "duplexshort" | "short" => Some(Self::TwoSidedShortEdge),
            _ => None,
        }
    }
}

impl Default for DuplexMode {
    fn default() -> Self {
        Self::OneSided
    }
}

/// Colour rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    Color,
    Grayscale,
}

impl ColorMode {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "color" | "colour" => Some(Self::Color),
            "grayscale" | "greyscale" | "gray" | "grey" | "monochrome" => Some(Self::Grayscale),
            _ => None,
        }
    }

    pub fn is_grayscale(&self) -> bool {
        matches!(self, Self::Grayscale)
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::Color
    }
}

/// Print options attached to a job by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintOptions {
    pub copies: u32,
    pub duplex: DuplexMode,
    pub color: ColorMode,
    pub paper: PaperSize,
    /// Target printer; empty means the system default.
    pub printer: String,
    /// Page range such as `"1-3,5"`; empty means all pages.
    pub page_range: String,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            copies: 1,
            duplex: DuplexMode::OneSided,
            color: ColorMode::Color,
            paper: PaperSize::A4,
            printer: String::new(),
            page_range: String::new(),
        }
    }
}

impl PrintOptions {
    /// Reject a copy count outside `1..=99`.
    pub fn validate_copies(&self) -> Result<(), LabprintError> {
        if (1..=MAX_COPIES).contains(&self.copies) {
            Ok(())
        } else {
            Err(LabprintError::InvalidOptions(format!(
                "copies must be between 1 and {MAX_COPIES}, got {}",
                self.copies
            )))
        }
    }
}

/// How the pipeline treats a source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Already printable, goes straight to dispatch.
    Pdf,
    /// Word-processor formats that must be converted to PDF first.
    NeedsConversion,
    /// Formats the spooler prints directly (plain text, images, PostScript).
    Native,
}

impl DocumentKind {
    /// Infer document kind from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" | "docx" | "odt" | "rtf" => Some(Self::NeedsConversion),
            "txt" | "png" | "jpg" | "jpeg" | "ps" => Some(Self::Native),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Payload of a successfully dispatched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Spool handle returned by the print backend.
    pub job_id: String,
    pub status: String,
}

impl JobResult {
    pub fn completed(spool_handle: impl Into<String>) -> Self {
        Self {
            job_id: spool_handle.into(),
            status: "completed".into(),
        }
    }
}

/// A print job tracked by the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub source_path: PathBuf,
    pub original_filename: String,
    pub options: PrintOptions,
    pub state: JobState,
    pub message: String,
    pub progress: u8,
    /// Present only in `Success`.
    pub result: Option<JobResult>,
    /// Present only in `Failure`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(source_path: PathBuf, original_filename: String, options: PrintOptions) -> Self {
        Self {
            id: JobId::new(),
            source_path,
            original_filename,
            options,
            state: JobState::Pending,
            message: "Waiting in queue...".into(),
            progress: 0,
            result: None,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// What a status query exposes about a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub state: JobState,
    pub message: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusView {
    /// Project a job; `error` detail is only carried when `include_error`.
    pub fn from_job(job: &Job, include_error: bool) -> Self {
        Self {
            job_id: job.id.to_string(),
            state: job.state,
            message: job.message.clone(),
            progress: job.progress,
            result: job.result.clone(),
            error: if include_error { job.error.clone() } else { None },
        }
    }
}

/// Operational state of an installed printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterStatus {
    Ready,
    Busy,
    Offline,
    Unknown,
}

/// One row of the printer listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterInfo {
    pub name: String,
    pub is_default: bool,
    pub status: PrinterStatus,
    pub status_text: String,
    pub queued_job_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_displays_without_hyphens_and_parses_back() {
        let id = JobId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert!(!text.contains('-'));
        let parsed: JobId = text.parse().expect("parse simple uuid");
        assert_eq!(parsed, id);
    }

    #[test]
    fn terminal_states_never_transition() {
        for next in [
            JobState::Pending,
            JobState::InProgress,
            JobState::Success,
            JobState::Failure,
        ] {
            assert!(!JobState::Success.can_transition_to(next));
            assert!(!JobState::Failure.can_transition_to(next));
        }
        assert!(JobState::Pending.can_transition_to(JobState::InProgress));
        assert!(!JobState::Pending.can_transition_to(JobState::Success));
        assert!(!JobState::InProgress.can_transition_to(JobState::Pending));
    }

    #[test]
    fn copies_bounds() {
        let mut opts = PrintOptions::default();
        assert!(opts.validate_copies().is_ok());
        opts.copies = 99;
        assert!(opts.validate_copies().is_ok());
        opts.copies = 0;
        assert!(opts.validate_copies().is_err());
        opts.copies = 100;
        assert!(opts.validate_copies().is_err());
    }

    #[test]
    fn document_kind_by_extension() {
        assert_eq!(
            DocumentKind::from_path(Path::new("/tmp/report.DOCX")),
            Some(DocumentKind::NeedsConversion)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("scan.pdf")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::from_path(Path::new("notes.txt")),
            Some(DocumentKind::Native)
        );
        assert_eq!(DocumentKind::from_path(Path::new("archive.zip")), None);
        assert_eq!(DocumentKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn status_view_hides_error_unless_requested() {
        let mut job = Job::new("/tmp/a.pdf".into(), "a.pdf".into(), PrintOptions::default());
        job.state = JobState::Failure;
        job.error = Some("lp failed: exit 1".into());

        let hidden = JobStatusView::from_job(&job, false);
        assert!(hidden.error.is_none());
        let json = serde_json::to_value(&hidden).expect("serialize");
        assert_eq!(json["state"], "FAILURE");
        assert!(json.get("error").is_none());

        let shown = JobStatusView::from_job(&job, true);
        assert_eq!(shown.error.as_deref(), Some("lp failed: exit 1"));
    }

    #[test]
    fn paper_points_match_a4() {
        let (w, h) = PaperSize::A4.dimensions_pt();
        assert!((w - 595.3).abs() < 0.5);
        assert!((h - 841.9).abs() < 0.5);
    }
}
