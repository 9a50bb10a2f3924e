// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CUPS device driver for the fallback renderer.
//
// The descriptor is derived from the queue's PPD options as reported by
// `lpoptions -l`. Rendered pages are collected into a raster PDF which is
// spooled with `lp` using the validated settings.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use labprint_core::config::{DispatchConfig, PrinterConfig};
use labprint_core::error::{LabprintError, Result};
use labprint_core::process::run_checked;
use labprint_core::types::{ColorMode, DuplexMode, PaperSize, PrintOptions};
use labprint_document::pdf::RasterPdfWriter;
use labprint_document::raster::{DeviceBitmap, DeviceGeometry, PixelFormat};
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::{DeviceContext, DeviceDriver, DeviceFields, DeviceMode};
use crate::directives::{lp_args, translate};
use crate::primary::parse_request_id;

/// One line of `lpoptions -l`: `Keyword/Label: choice *default choice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpdOption {
    pub keyword: String,
    pub choices: Vec<String>,
    pub default: Option<String>,
}

impl PpdOption {
    fn has_choice(&self, choice: &str) -> bool {
        self.choices.iter().any(|c| c.eq_ignore_ascii_case(choice))
    }
}

pub fn parse_lpoptions(output: &str) -> Vec<PpdOption> {
    output
        .lines()
        .filter_map(|line| {
            let (head, values) = line.split_once(':')?;
            let keyword = head.split('/').next()?.trim().to_string();
            if keyword.is_empty() {
                return None;
            }
            let mut default = None;
            let choices = values
                .split_whitespace()
                .map(|choice| match choice.strip_prefix('*') {
                    Some(marked) => {
                        default = Some(marked.to_string());
                        marked.to_string()
                    }
                    None => choice.to_string(),
                })
                .collect();
            Some(PpdOption {
                keyword,
                choices,
                default,
            })
        })
        .collect()
}

fn find<'a>(options: &'a [PpdOption], keywords: &[&str]) -> Option<&'a PpdOption> {
    options
        .iter()
        .find(|o| keywords.iter().any(|k| o.keyword.eq_ignore_ascii_case(k)))
}

const DUPLEX_KEYS: [&str; 2] = ["Duplex", "sides"];
const PAPER_KEYS: [&str; 2] = ["PageSize", "media"];
const COLOR_KEYS: [&str; 3] = ["ColorModel", "print-color-mode", "ColorMode"];
const GRAY_CHOICES: [&str; 4] = ["Gray", "Grayscale", "monochrome", "Mono"];

fn duplex_choice(mode: DuplexMode) -> &'static [&'static str] {
    match mode {
        DuplexMode::OneSided => &["None", "one-sided"],
        DuplexMode::TwoSidedLongEdge => &["DuplexNoTumble", "two-sided-long-edge"],
        DuplexMode::TwoSidedShortEdge => &["DuplexTumble", "two-sided-short-edge"],
    }
}

fn duplex_from_choice(choice: &str) -> DuplexMode {
    [DuplexMode::TwoSidedLongEdge, DuplexMode::TwoSidedShortEdge]
        .into_iter()
        .find(|m| duplex_choice(*m).iter().any(|c| c.eq_ignore_ascii_case(choice)))
        .unwrap_or(DuplexMode::OneSided)
}

/// Descriptor for a queue with the given PPD options.
pub fn mode_from_options(options: &[PpdOption]) -> DeviceMode {
    let duplex = find(options, &DUPLEX_KEYS);
    let paper = find(options, &PAPER_KEYS);
    let color = find(options, &COLOR_KEYS);

    let supported = DeviceFields {
        copies: true,
        collate: true,
        duplex: duplex.is_some_and(|o| {
            duplex_choice(DuplexMode::TwoSidedLongEdge)
                .iter()
                .chain(duplex_choice(DuplexMode::TwoSidedShortEdge))
                .any(|c| o.has_choice(c))
        }),
        paper: paper.is_some(),
        color: color.is_some_and(|o| GRAY_CHOICES.iter().any(|g| o.has_choice(g))),
    };

    DeviceMode {
        supported,
        copies: 1,
        collate: false,
        duplex: duplex
            .and_then(|o| o.default.as_deref())
            .map(duplex_from_choice)
            .unwrap_or(DuplexMode::OneSided),
        paper: paper
            .and_then(|o| o.default.as_deref())
            .and_then(PaperSize::from_keyword)
            .unwrap_or(PaperSize::A4),
        color: match color.and_then(|o| o.default.as_deref()) {
            Some(d) if GRAY_CHOICES.iter().any(|g| g.eq_ignore_ascii_case(d)) => ColorMode::Grayscale,
            _ => ColorMode::Color,
        },
    }
}

/// Normalise `mode` against what the queue actually offers.
pub fn normalise(options: &[PpdOption], mode: &DeviceMode) -> DeviceMode {
    let printer_defaults = mode_from_options(options);
    let mut out = mode.clone();
    out.supported = printer_defaults.supported;

    if let Some(paper) = find(options, &PAPER_KEYS) {
        if !paper.has_choice(mode.paper.keyword()) {
            out.paper = printer_defaults.paper;
        }
    }
    let duplex_ok = find(options, &DUPLEX_KEYS)
        .is_some_and(|o| duplex_choice(mode.duplex).iter().any(|c| o.has_choice(c)));
    if !duplex_ok {
        out.duplex = DuplexMode::OneSided;
    }
    if !out.supported.color {
        out.color = ColorMode::Color;
    }
    out.copies = mode.copies.clamp(1, labprint_core::types::MAX_COPIES);
    out
}

/// Fallback device driver speaking to CUPS.
pub struct CupsDriver {
    lpoptions: String,
    lp: String,
    timeout: Duration,
    dpi: f32,
    scratch_dir: PathBuf,
}

impl CupsDriver {
    pub fn new(printers: &PrinterConfig, dispatch: &DispatchConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            lpoptions: printers.lpoptions_command.clone(),
            lp: dispatch.lp_command.clone(),
            timeout: Duration::from_secs(dispatch.primary_timeout_secs.max(1)),
            dpi: dispatch.fallback_dpi.clamp(72, 1200) as f32,
            scratch_dir: scratch_dir.into(),
        }
    }

    fn ppd_options(&self, printer: &str) -> Result<Vec<PpdOption>> {
        let mut cmd = Command::new(&self.lpoptions);
        cmd.arg("-p").arg(printer).arg("-l");
        let output = run_checked(&mut cmd, self.timeout)?;
        Ok(parse_lpoptions(&output.stdout))
    }
}

impl DeviceDriver for CupsDriver {
    fn device_mode(&self, printer: &str) -> Result<DeviceMode> {
        Ok(mode_from_options(&self.ppd_options(printer)?))
    }

    fn validate(&self, printer: &str, mode: &DeviceMode) -> Result<DeviceMode> {
        Ok(normalise(&self.ppd_options(printer)?, mode))
    }

    fn create_context(
        &self,
        printer: &str,
        mode: &DeviceMode,
        document_name: &str,
    ) -> Result<Box<dyn DeviceContext>> {
        let (page_w_pt, page_h_pt) = mode.paper.dimensions_pt();
        let geometry = DeviceGeometry {
            printable_width_px: (page_w_pt * self.dpi / 72.0).floor() as u32,
            printable_height_px: (page_h_pt * self.dpi / 72.0).floor() as u32,
            dpi_x: self.dpi,
            dpi_y: self.dpi,
        };
        let format = if mode.color.is_grayscale() {
            PixelFormat::Gray8
        } else {
            PixelFormat::Rgb24
        };
        debug!(printer, ?geometry, ?format, "opening CUPS raster context");
        Ok(Box::new(CupsRasterContext {
            printer: printer.to_string(),
            mode: mode.clone(),
            lp: self.lp.clone(),
            timeout: self.timeout,
            scratch_dir: self.scratch_dir.clone(),
            page_pt: (page_w_pt, page_h_pt),
            geometry,
            format,
            writer: RasterPdfWriter::new(document_name),
            pending: None,
        }))
    }
}

/// Collects rendered pages and spools them as one PDF.
pub struct CupsRasterContext {
    printer: String,
    mode: DeviceMode,
    lp: String,
    timeout: Duration,
    scratch_dir: PathBuf,
    page_pt: (f32, f32),
    geometry: DeviceGeometry,
    format: PixelFormat,
    writer: RasterPdfWriter,
    pending: Option<(i32, i32, DeviceBitmap)>,
}

impl CupsRasterContext {
    /// `lp` arguments for the validated descriptor.
    pub fn spool_args(&self) -> Vec<String> {
        let options = PrintOptions {
            copies: self.mode.copies,
            duplex: self.mode.duplex,
            color: self.mode.color,
            paper: self.mode.paper,
            printer: self.printer.clone(),
            page_range: String::new(),
        };
        let mut args = vec!["-d".to_string(), self.printer.clone()];
        args.extend(lp_args(&translate(&options, None, 0)));
        if self.mode.collate {
            args.push("-o".into());
            args.push("collate=true".into());
        }
        args
    }
}

impl DeviceContext for CupsRasterContext {
    fn geometry(&self) -> DeviceGeometry {
        self.geometry
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn start_page(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }

    fn blit(&mut self, x: i32, y: i32, bitmap: &DeviceBitmap) -> Result<()> {
        self.pending = Some((x, y, bitmap.clone()));
        Ok(())
    }

    fn end_page(&mut self) -> Result<()> {
        let (w, h) = self.page_pt;
        match self.pending.take() {
            Some((x, y, bitmap)) => {
                self.writer
                    .add_page(w, h, &bitmap, x, y, self.geometry.dpi_x)?
            }
            None => self.writer.add_blank_page(w, h),
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<String> {
        if self.writer.page_count() == 0 {
            return Err(LabprintError::dispatch_msg("no pages were rendered"));
        }
        std::fs::create_dir_all(&self.scratch_dir)?;
        let spool_file = self
            .scratch_dir
            .join(format!("fallback-{}.pdf", Uuid::new_v4().simple()));
        let args = self.spool_args();
        let CupsRasterContext {
            lp, timeout, writer, ..
        } = *self;
        std::fs::write(&spool_file, writer.finish())?;

        let mut cmd = Command::new(&lp);
        cmd.args(&args).arg(&spool_file);
        let result = run_checked(&mut cmd, timeout);
        let _ = std::fs::remove_file(&spool_file);

        let output = result?;
        let handle = parse_request_id(&output.stdout)
            .unwrap_or_else(|| format!("lp-job-{}", crate::primary::file_label(&spool_file)));
        info!(handle = %handle, "fallback render spooled");
        Ok(handle)
    }

    fn abort(self: Box<Self>) {
        debug!(printer = %self.printer, "fallback render aborted");
    }
}
