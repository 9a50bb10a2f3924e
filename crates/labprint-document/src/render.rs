// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page rasterisation for the native print fallback.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use image::DynamicImage;
use labprint_core::error::{LabprintError, Result};
use labprint_core::process::run_checked;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Renders single PDF pages to images.
pub trait PageRasterizer: Send + Sync {
    /// Render `page` (1-indexed) of `pdf` at `dpi`, optionally in grayscale.
    fn render_page(&self, pdf: &Path, page: u32, dpi: f32, grayscale: bool)
    -> Result<DynamicImage>;
}

/// Rasteriser backed by the Ghostscript command-line tool.
pub struct GhostscriptRasterizer {
    gs_command: String,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl GhostscriptRasterizer {
    pub fn new(gs_command: impl Into<String>, scratch_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            gs_command: gs_command.into(),
            scratch_dir: scratch_dir.into(),
            timeout,
        }
    }

    pub fn command_args(pdf: &Path, output: &Path, page: u32, dpi: f32, grayscale: bool) -> Vec<String> {
        let device = if grayscale { "pnggray" } else { "png16m" };
        vec![
            "-dSAFER".into(),
            "-dBATCH".into(),
            "-dNOPAUSE".into(),
            "-dQUIET".into(),
            format!("-sDEVICE={device}"),
            // Rounded down so the page never overflows the printable area.
            format!("-r{}", dpi.floor().max(1.0) as u32),
            format!("-dFirstPage={page}"),
            format!("-dLastPage={page}"),
            format!("-sOutputFile={}", output.display()),
            pdf.display().to_string(),
        ]
    }
}

impl PageRasterizer for GhostscriptRasterizer {
    #[instrument(skip(self), fields(pdf = %pdf.display()))]
    fn render_page(&self, pdf: &Path, page: u32, dpi: f32, grayscale: bool) -> Result<DynamicImage> {
        std::fs::create_dir_all(&self.scratch_dir)?;
        let output = self
            .scratch_dir
            .join(format!("page-{}-{page}.png", Uuid::new_v4().simple()));

        let mut cmd = Command::new(&self.gs_command);
        cmd.args(Self::command_args(pdf, &output, page, dpi, grayscale));
        let rendered = run_checked(&mut cmd, self.timeout).and_then(|_| {
            image::open(&output).map_err(|e| {
                LabprintError::ImageError(format!("cannot read rendered page {page}: {e}"))
            })
        });
        let _ = std::fs::remove_file(&output);

        let image = rendered?;
        debug!(page, width = image.width(), height = image.height(), "page rendered");
        Ok(image)
    }
}
