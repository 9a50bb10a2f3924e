// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optional Ghostscript rewrite of PDFs before they reach the printer.
//
// Some printer drivers choke on unusual PDF constructs; rewriting through
// pdfwrite, or flattening every page to an image, trades fidelity or size
// for reliability.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use labprint_core::config::{PreprocessConfig, PreprocessMode};
use labprint_core::error::Result;
use labprint_core::process::run_checked;
use tracing::{info, instrument};

pub struct PdfPreprocessor {
    config: PreprocessConfig,
    scratch_dir: PathBuf,
}

impl PdfPreprocessor {
    pub fn new(config: PreprocessConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn mode(&self) -> PreprocessMode {
        self.config.mode
    }

    /// Output path for a rewritten copy of `pdf`.
    pub fn output_path_for(&self, pdf: &Path) -> PathBuf {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        self.scratch_dir.join(format!("{stem}.prepared.pdf"))
    }

    /// Ghostscript arguments for the configured mode; `None` when disabled.
    pub fn command_args(&self, pdf: &Path, output: &Path) -> Option<Vec<String>> {
        let device_args: Vec<String> = match self.config.mode {
            PreprocessMode::None => return None,
            PreprocessMode::GsPdfWrite => vec![
                "-sDEVICE=pdfwrite".into(),
                "-dCompatibilityLevel=1.4".into(),
            ],
            PreprocessMode::GsRasterize => vec![
                "-sDEVICE=pdfimage24".into(),
                format!("-r{}", self.config.raster_dpi.clamp(72, 600)),
            ],
        };
        let mut args: Vec<String> = vec![
            "-dSAFER".into(),
            "-dBATCH".into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
        ];
        args.extend(device_args);
        args.push(format!("-sOutputFile={}", output.display()));
        args.push(pdf.display().to_string());
        Some(args)
    }

    /// Rewrite `pdf`; returns the new file, or `None` when preprocessing is off.
    #[instrument(skip(self), fields(pdf = %pdf.display(), mode = ?self.config.mode))]
    pub fn prepare(&self, pdf: &Path) -> Result<Option<PathBuf>> {
        let output = self.output_path_for(pdf);
        let Some(args) = self.command_args(pdf, &output) else {
            return Ok(None);
        };
        std::fs::create_dir_all(&self.scratch_dir)?;

        let mut cmd = Command::new(&self.config.gs_command);
        cmd.args(args);
        if let Err(e) = run_checked(&mut cmd, Duration::from_secs(self.config.timeout_secs)) {
            let _ = std::fs::remove_file(&output);
            return Err(e);
        }
        info!(output = %output.display(), "PDF preprocessed");
        Ok(Some(output))
    }
}
