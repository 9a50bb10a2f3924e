// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line office conversion backends.
//
// LibreOffice runs headless with a throwaway user profile per conversion so
// that a crashed or concurrently running desktop instance cannot lock it.
// Unoconv talks to a long-running office listener and serves as the
// second candidate.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use labprint_core::config::{BackendConfig, BackendKind};
use labprint_core::error::{LabprintError, Result};
use labprint_core::process::run_checked;
use tracing::debug;
use uuid::Uuid;

use crate::convert::{ConversionBackend, ConversionSession, RetryTuning};
use crate::retry::{RetryClassifier, RetryPolicy};

/// Environment variables that would make the office suite try to open a display.
const DISPLAY_VARS: [&str; 3] = ["DISPLAY", "WAYLAND_DISPLAY", "XAUTHORITY"];

/// Output fragments an office process prints when another instance holds it.
const BUSY_MARKERS: [&str; 5] = [
    "busy",
    "locked",
    "already running",
    "call was rejected",
    "connection refused",
];

/// Transient errors for command-line office tools: another instance holds
/// the suite. A timed-out process is a failure, never retried.
pub fn office_busy_classifier() -> RetryClassifier {
    Arc::new(|err: &LabprintError| match err {
        LabprintError::Command { detail, .. } => {
            let detail = detail.to_ascii_lowercase();
            BUSY_MARKERS.iter().any(|marker| detail.contains(marker))
        }
        _ => false,
    })
}

fn tuning_from(config: &BackendConfig) -> RetryTuning {
    let delay = Duration::from_millis(config.delay_ms);
    RetryTuning {
        open: RetryPolicy::new(config.open_attempts, delay),
        export: RetryPolicy::new(config.export_attempts, delay),
        close: RetryPolicy::new(config.close_attempts, delay),
        is_retryable: office_busy_classifier(),
    }
}

/// Build a backend for a configured candidate.
pub fn from_config(config: &BackendConfig, scratch_dir: &Path) -> Arc<dyn ConversionBackend> {
    match config.kind {
        BackendKind::LibreOffice => Arc::new(LibreOfficeBackend::new(config, scratch_dir)),
        BackendKind::Unoconv => Arc::new(UnoconvBackend::new(config)),
    }
}

fn check_readable(source: &Path) -> Result<PathBuf> {
    let meta = std::fs::metadata(source)?;
    if !meta.is_file() {
        return Err(LabprintError::UnsupportedDocument(format!(
            "{} is not a regular file",
            source.display()
        )));
    }
    Ok(source.to_path_buf())
}

// -- LibreOffice -----------------------------------------------------------------

pub struct LibreOfficeBackend {
    executable: String,
    timeout: Duration,
    profile_root: PathBuf,
    tuning: RetryTuning,
}

impl LibreOfficeBackend {
    pub fn new(config: &BackendConfig, scratch_dir: &Path) -> Self {
        Self {
            executable: config.executable.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            profile_root: scratch_dir.join("lo-profiles"),
            tuning: tuning_from(config),
        }
    }

    /// Full argument list for one conversion.
    pub fn command_args(profile_dir: &Path, out_dir: &Path, source: &Path) -> Vec<String> {
        vec![
            "--headless".into(),
            "--nologo".into(),
            "--nofirststartwizard".into(),
            "--norestore".into(),
            format!("-env:UserInstallation=file://{}", profile_dir.display()),
            "--convert-to".into(),
            "pdf".into(),
            "--outdir".into(),
            out_dir.display().to_string(),
            source.display().to_string(),
        ]
    }
}

struct LibreOfficeSession<'a> {
    backend: &'a LibreOfficeBackend,
    profile_dir: PathBuf,
    source: Option<PathBuf>,
}

impl ConversionBackend for LibreOfficeBackend {
    fn name(&self) -> &str {
        "libreoffice"
    }

    fn tuning(&self) -> &RetryTuning {
        &self.tuning
    }

    fn launch(&self) -> Result<Box<dyn ConversionSession + '_>> {
        let profile_dir = self.profile_root.join(Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&profile_dir)?;
        Ok(Box::new(LibreOfficeSession {
            backend: self,
            profile_dir,
            source: None,
        }))
    }
}

impl ConversionSession for LibreOfficeSession<'_> {
    fn open(&mut self, source: &Path) -> Result<()> {
        self.source = Some(check_readable(source)?);
        Ok(())
    }

    fn export_pdf(&mut self, target: &Path) -> Result<()> {
        let source = self.source.as_deref().ok_or_else(|| LabprintError::Command {
            program: self.backend.executable.clone(),
            detail: "export requested before a document was opened".into(),
        })?;
        let out_dir = target.parent().unwrap_or(Path::new("."));

        let mut cmd = Command::new(&self.backend.executable);
        cmd.args(LibreOfficeBackend::command_args(&self.profile_dir, out_dir, source));
        for var in DISPLAY_VARS {
            cmd.env_remove(var);
        }
        run_checked(&mut cmd, self.backend.timeout)?;

        // soffice names its output after the source stem.
        let produced = out_dir.join(format!(
            "{}.pdf",
            source.file_stem().unwrap_or_default().to_string_lossy()
        ));
        if produced != target && produced.is_file() {
            std::fs::rename(&produced, target)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.source = None;
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        if self.profile_dir.exists() {
            std::fs::remove_dir_all(&self.profile_dir)?;
            debug!(profile = %self.profile_dir.display(), "removed office profile");
        }
        Ok(())
    }
}

// -- Unoconv ---------------------------------------------------------------------

pub struct UnoconvBackend {
    executable: String,
    timeout: Duration,
    tuning: RetryTuning,
}

impl UnoconvBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            tuning: tuning_from(config),
        }
    }
}

struct UnoconvSession<'a> {
    backend: &'a UnoconvBackend,
    source: Option<PathBuf>,
}

impl ConversionBackend for UnoconvBackend {
    fn name(&self) -> &str {
        "unoconv"
    }

    fn tuning(&self) -> &RetryTuning {
        &self.tuning
    }

    fn launch(&self) -> Result<Box<dyn ConversionSession + '_>> {
        Ok(Box::new(UnoconvSession {
            backend: self,
            source: None,
        }))
    }
}

impl ConversionSession for UnoconvSession<'_> {
    fn open(&mut self, source: &Path) -> Result<()> {
        self.source = Some(check_readable(source)?);
        Ok(())
    }

    fn export_pdf(&mut self, target: &Path) -> Result<()> {
        let source = self.source.as_deref().ok_or_else(|| LabprintError::Command {
            program: self.backend.executable.clone(),
            detail: "export requested before a document was opened".into(),
        })?;
        let mut cmd = Command::new(&self.backend.executable);
        cmd.arg("-f").arg("pdf").arg("-o").arg(target).arg(source);
        for var in DISPLAY_VARS {
            cmd.env_remove(var);
        }
        run_checked(&mut cmd, self.backend.timeout)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.source = None;
        Ok(())
    }

    fn quit(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn libreoffice_arguments_isolate_profile() {
        let args = LibreOfficeBackend::command_args(
            Path::new("/tmp/labprint/lo-profiles/abc"),
            Path::new("/tmp/labprint"),
            Path::new("/tmp/labprint/uploads/f00_essay.docx"),
        );
        assert_eq!(args[0], "--headless");
        assert!(args.contains(&"-env:UserInstallation=file:///tmp/labprint/lo-profiles/abc".to_string()));
        let convert = args.iter().position(|a| a == "--convert-to").expect("convert flag");
        assert_eq!(args[convert + 1], "pdf");
        assert_eq!(args.last().map(String::as_str), Some("/tmp/labprint/uploads/f00_essay.docx"));
    }

    #[test]
    fn busy_classifier() {
        let classify = office_busy_classifier();
        assert!(!classify(&LabprintError::Timeout {
            program: "soffice".into(),
            seconds: 120
        }));
        assert!(classify(&LabprintError::Command {
            program: "unoconv".into(),
            detail: "Error: Unable to connect or start own listener. Connection refused".into()
        }));
        assert!(!classify(&LabprintError::Command {
            program: "soffice".into(),
            detail: "source file could not be loaded".into()
        }));
        assert!(!classify(&LabprintError::UnsupportedDocument("x".into())));
    }

    #[test]
    fn launch_and_quit_manage_profile_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = LibreOfficeBackend::new(&BackendConfig::libreoffice(), dir.path());
        let mut session = backend.launch().expect("launch");
        let profiles = dir.path().join("lo-profiles");
        assert_eq!(std::fs::read_dir(&profiles).expect("profiles").count(), 1);
        session.quit().expect("quit");
        assert_eq!(std::fs::read_dir(&profiles).expect("profiles").count(), 0);
    }

    #[test]
    fn export_without_open_is_rejected() {
        let backend = UnoconvBackend::new(&BackendConfig::unoconv());
        let mut session = backend.launch().expect("launch");
        assert!(session.export_pdf(Path::new("/tmp/out.pdf")).is_err());
    }

    #[test]
    fn tuning_follows_config() {
        let backend = UnoconvBackend::new(&BackendConfig::unoconv());
        assert_eq!(backend.tuning().open.attempts, 40);
        assert_eq!(backend.tuning().export.attempts, 20);
        assert_eq!(backend.tuning().close.delay, Duration::from_millis(500));
    }
}
