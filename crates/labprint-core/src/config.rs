// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// Settings are persisted as JSON and may be overridden by `LABPRINT_*`
// environment variables. Every section has complete defaults so a missing
// or partial file is never an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LabprintError, Result};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "LABPRINT_";

/// Complete pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Expose error detail in status queries and log at debug level.
    pub debug: bool,
    /// Scratch directory for converted and intermediate artifacts.
    pub work_dir: PathBuf,
    /// Where submitters stage uploaded files.
    pub upload_dir: PathBuf,
    pub queue: QueueConfig,
    pub retention: RetentionConfig,
    pub printers: PrinterConfig,
    pub dispatch: DispatchConfig,
    pub conversion: ConversionConfig,
    pub preprocess: PreprocessConfig,
    /// SQLite print log; in-memory when unset.
    pub print_log_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let work_dir = std::env::temp_dir().join("labprint");
        Self {
            debug: false,
            upload_dir: work_dir.join("uploads"),
            work_dir,
            queue: QueueConfig::default(),
            retention: RetentionConfig::default(),
            printers: PrinterConfig::default(),
            dispatch: DispatchConfig::default(),
            conversion: ConversionConfig::default(),
            preprocess: PreprocessConfig::default(),
            print_log_path: None,
        }
    }
}

/// Queue depth and worker count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of queued jobs; 0 means unbounded.
    pub max_size: usize,
    pub workers: usize,
    /// How long a worker blocks on an empty queue before re-checking for shutdown.
    pub dequeue_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 50,
            workers: 3,
            dequeue_timeout_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

/// How long finished jobs stay queryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub task_retention_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            task_retention_secs: 3600,
            cleanup_interval_secs: 300,
        }
    }
}

impl RetentionConfig {
    pub const MIN_RETENTION_SECS: u64 = 60;
    pub const MIN_INTERVAL_SECS: u64 = 5;

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Printer discovery and access policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub default_printer: Option<String>,
    /// When non-empty, only these printers may be targeted.
    pub allowed: Vec<String>,
    pub lpstat_command: String,
    pub lpoptions_command: String,
    pub cache_ttl_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            default_printer: None,
            allowed: Vec::new(),
            lpstat_command: "lpstat".into(),
            lpoptions_command: "lpoptions".into(),
            cache_ttl_secs: 5,
            probe_timeout_secs: 10,
        }
    }
}

/// The external command used for the fast print path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PrimaryCommand {
    /// CUPS `lp` with `-o` options.
    Lp { command: String },
    /// SumatraPDF silent printing (`-print-to` / `-print-settings`).
    Sumatra { executable: PathBuf },
}

impl Default for PrimaryCommand {
    fn default() -> Self {
        Self::Lp {
            command: "lp".into(),
        }
    }
}

/// Dispatch paths and their limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub primary: PrimaryCommand,
    pub primary_timeout_secs: u64,
    /// `lp` used to spool fallback renders and native-handler files.
    pub lp_command: String,
    /// Resolution of the fallback render target.
    pub fallback_dpi: u32,
    pub native_copy_delay_ms: u64,
    pub gs_command: String,
    pub render_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            primary: PrimaryCommand::default(),
            primary_timeout_secs: 60,
            lp_command: "lp".into(),
            fallback_dpi: 300,
            native_copy_delay_ms: 500,
            gs_command: "gs".into(),
            render_timeout_secs: 120,
        }
    }
}

/// Which conversion engine a candidate drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    LibreOffice,
    Unoconv,
}

/// Retry tuning of one conversion candidate.
///
/// The two stock profiles differ in attempt counts; the values are kept as
/// configuration rather than derived from anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub executable: String,
    pub open_attempts: u32,
    pub export_attempts: u32,
    pub close_attempts: u32,
    pub delay_ms: u64,
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn libreoffice() -> Self {
        Self {
            kind: BackendKind::LibreOffice,
            executable: "soffice".into(),
            open_attempts: 20,
            export_attempts: 10,
            close_attempts: 10,
            delay_ms: 500,
            timeout_secs: 120,
        }
    }

    pub fn unoconv() -> Self {
        Self {
            kind: BackendKind::Unoconv,
            executable: "unoconv".into(),
            open_attempts: 40,
            export_attempts: 20,
            close_attempts: 10,
            delay_ms: 500,
            timeout_secs: 120,
        }
    }
}

/// Ordered conversion candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub backends: Vec<BackendConfig>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendConfig::libreoffice(), BackendConfig::unoconv()],
        }
    }
}

/// Optional Ghostscript pass applied to PDFs before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessMode {
    None,
    GsPdfWrite,
    GsRasterize,
}

impl PreprocessMode {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "off" => Some(Self::None),
            "gs-pdfwrite" | "pdfwrite" => Some(Self::GsPdfWrite),
            "gs-rasterize" | "rasterize" => Some(Self::GsRasterize),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub mode: PreprocessMode,
    pub gs_command: String,
    pub timeout_secs: u64,
    pub raster_dpi: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            mode: PreprocessMode::None,
            gs_command: "gs".into(),
            timeout_secs: 180,
            raster_dpi: 200,
        }
    }
}

// -- Loading / persisting ------------------------------------------------------

impl PipelineConfig {
    /// Read a JSON config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                LabprintError::Config(format!("{}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LabprintError::Io(e)),
        }
    }

    /// Write this config as pretty-printed JSON.
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Overlay the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Overlay `LABPRINT_*` variables obtained through `lookup`.
    ///
    /// Values that fail to parse are ignored; retention and interval are
    /// clamped to their minimums.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let num = |name: &str| get(name).and_then(|v| v.parse::<u64>().ok());

        if let Some(v) = get("DEBUG") {
            self.debug = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = num("MAX_QUEUE_SIZE") {
            self.queue.max_size = v as usize;
        }
        if let Some(v) = num("MAX_CONCURRENT_JOBS") {
            self.queue.workers = (v as usize).max(1);
        }
        if let Some(v) = num("TASK_RETENTION_SECONDS") {
            self.retention.task_retention_secs = v.max(RetentionConfig::MIN_RETENTION_SECS);
        }
        if let Some(v) = num("TASK_CLEANUP_INTERVAL_SECONDS") {
            self.retention.cleanup_interval_secs = v.max(RetentionConfig::MIN_INTERVAL_SECS);
        }
        if let Some(v) = get("DEFAULT_PRINTER") {
            self.printers.default_printer = Some(v);
        }
        if let Some(v) = get("ALLOWED_PRINTERS") {
            self.printers.allowed = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = get("LPSTAT_COMMAND") {
            self.printers.lpstat_command = v;
        }
        if let Some(v) = get("LP_COMMAND") {
            if let PrimaryCommand::Lp { command } = &mut self.dispatch.primary {
                *command = v.clone();
            }
            self.dispatch.lp_command = v;
        }
        if let Some(v) = num("LP_TIMEOUT") {
            self.dispatch.primary_timeout_secs = v.max(1);
        }
        if let Some(v) = get("SOFFICE_PATH") {
            for backend in &mut self.conversion.backends {
                if backend.kind == BackendKind::LibreOffice {
                    backend.executable = v.clone();
                }
            }
        }
        if let Some(v) = num("CONVERT_TIMEOUT") {
            for backend in &mut self.conversion.backends {
                backend.timeout_secs = v.max(1);
            }
        }
        if let Some(mode) = get("PDF_PREPROCESS").and_then(|v| PreprocessMode::from_keyword(&v)) {
            self.preprocess.mode = mode;
        }
        if let Some(v) = get("GS_COMMAND") {
            self.preprocess.gs_command = v.clone();
            self.dispatch.gs_command = v;
        }
        if let Some(v) = num("PDF_PREPROCESS_TIMEOUT") {
            self.preprocess.timeout_secs = v.max(1);
        }
        if let Some(v) = num("PDF_RASTER_DPI") {
            self.preprocess.raster_dpi = (v as u32).clamp(72, 600);
        }
    }
}
