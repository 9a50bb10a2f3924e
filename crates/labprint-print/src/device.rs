// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fallback print path: render pages ourselves and draw them on a printer
// device context.
//
// Device settings travel in a device-mode descriptor. The driver gets the
// final say on it and is known to silently reset the copy count while
// validating, so copies are re-asserted after every validation and the
// result decides whether copies are produced by the driver (one render) or
// by rendering every page `copies` times.

use std::path::Path;
use std::sync::Arc;

use labprint_core::error::{LabprintError, Result};
use labprint_core::page_range;
use labprint_core::types::{ColorMode, DuplexMode, PaperSize, PrintOptions};
use labprint_document::pdf::PdfReader;
use labprint_document::raster::{DeviceBitmap, DeviceGeometry, PixelFormat, to_device_bitmap};
use labprint_document::render::PageRasterizer;
use tracing::{debug, info, instrument, warn};

/// Which descriptor fields a driver honours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFields {
    pub copies: bool,
    pub collate: bool,
    pub duplex: bool,
    pub paper: bool,
    pub color: bool,
}

/// Device-mode descriptor: the settings a printer driver applies to a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMode {
    pub supported: DeviceFields,
    pub copies: u32,
    pub collate: bool,
    pub duplex: DuplexMode,
    pub paper: PaperSize,
    pub color: ColorMode,
}

impl Default for DeviceMode {
    /// A descriptor from a driver that honours nothing.
    fn default() -> Self {
        Self {
            supported: DeviceFields::default(),
            copies: 1,
            collate: false,
            duplex: DuplexMode::OneSided,
            paper: PaperSize::A4,
            color: ColorMode::Color,
        }
    }
}

impl DeviceMode {
    /// Write the job's settings into the descriptor.
    ///
    /// Returns whether the driver will produce the copies. Two-sided output
    /// that the driver cannot express is an error; paper and colour fall
    /// back to the printer's own settings.
    pub fn apply(&mut self, options: &PrintOptions) -> Result<bool> {
        let driver_copies = self.supported.copies;
        if driver_copies {
            self.copies = options.copies;
            self.collate = options.copies > 1 && self.supported.collate;
        }

        if self.supported.duplex {
            self.duplex = options.duplex;
        } else if options.duplex != DuplexMode::OneSided {
            return Err(LabprintError::dispatch_msg(format!(
                "printer driver cannot print {}",
                options.duplex.sides_keyword()
            )));
        }

        if self.supported.paper {
            self.paper = options.paper;
        }
        if self.supported.color {
            self.color = options.color;
        }
        Ok(driver_copies)
    }
}

/// A printer driver: owns descriptors and creates device contexts.
pub trait DeviceDriver: Send + Sync {
    /// The printer's current descriptor.
    fn device_mode(&self, printer: &str) -> Result<DeviceMode>;

    /// Validate and normalise `mode`; the driver may override any field.
    fn validate(&self, printer: &str, mode: &DeviceMode) -> Result<DeviceMode>;

    fn create_context(
        &self,
        printer: &str,
        mode: &DeviceMode,
        document_name: &str,
    ) -> Result<Box<dyn DeviceContext>>;
}

/// An open print document on a device.
pub trait DeviceContext {
    fn geometry(&self) -> DeviceGeometry;
    fn pixel_format(&self) -> PixelFormat;
    fn start_page(&mut self) -> Result<()>;
    /// Draw `bitmap` with its top-left corner at (`x`, `y`) device pixels.
    fn blit(&mut self, x: i32, y: i32, bitmap: &DeviceBitmap) -> Result<()>;
    fn end_page(&mut self) -> Result<()>;
    /// Close the document and hand it to the spooler; returns the spool handle.
    fn finish(self: Box<Self>) -> Result<String>;
    fn abort(self: Box<Self>);
}

/// Outcome of descriptor negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub mode: DeviceMode,
    /// How many times each page is rendered.
    pub render_copies: u32,
}

/// Renders a PDF page by page onto a driver's device context.
pub struct FallbackRenderer {
    driver: Arc<dyn DeviceDriver>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl FallbackRenderer {
    pub fn new(driver: Arc<dyn DeviceDriver>, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self { driver, rasterizer }
    }

    /// Acquire, fill, validate and re-assert the device descriptor.
    pub fn negotiate(&self, printer: &str, options: &PrintOptions) -> Result<Negotiated> {
        let mut mode = match self.driver.device_mode(printer) {
            Ok(mode) => mode,
            Err(e) => {
                warn!(printer, error = %e, "no device descriptor, using driver defaults");
                DeviceMode::default()
            }
        };
        let driver_copies = mode.apply(options)?;

        let mut validated = match self.driver.validate(printer, &mode) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(printer, error = %e, "driver rejected descriptor, keeping unvalidated settings");
                mode.clone()
            }
        };
        if validated != mode {
            debug!(printer, requested = ?mode, validated = ?validated, "driver adjusted descriptor");
        }

        // Drivers reset the copy count while validating.
        let driver_copies = driver_copies && validated.supported.copies;
        if driver_copies {
            validated.copies = options.copies;
            validated.collate = options.copies > 1 && validated.supported.collate;
        }
        let render_copies = if driver_copies { 1 } else { options.copies.max(1) };

        Ok(Negotiated {
            mode: validated,
            render_copies,
        })
    }

    /// Print `pdf` on `printer`; returns the spool handle.
    #[instrument(skip(self, options), fields(pdf = %pdf.display(), copies = options.copies))]
    pub fn print(&self, pdf: &Path, printer: &str, options: &PrintOptions) -> Result<String> {
        let reader = PdfReader::open(pdf)?;
        let total = reader.page_count();
        let pages = page_range::parse(&options.page_range, total)?;
        if pages.is_empty() {
            return Err(LabprintError::dispatch_msg("document has no pages to print"));
        }

        let negotiated = self.negotiate(printer, options)?;
        let document_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "labprint".into());
        let mut ctx = self
            .driver
            .create_context(printer, &negotiated.mode, &document_name)?;

        let geometry = ctx.geometry();
        let format = ctx.pixel_format();
        let grayscale = options.color.is_grayscale();

        let mut drawn = 0u32;
        for _copy in 0..negotiated.render_copies {
            for page in pages.iter() {
                if let Err(e) = self.draw_page(ctx.as_mut(), &reader, pdf, page, geometry, format, grayscale) {
                    ctx.abort();
                    return Err(e);
                }
                drawn += 1;
            }
        }

        let handle = ctx.finish()?;
        info!(
            printer,
            pages = pages.len(),
            render_copies = negotiated.render_copies,
            drawn,
            handle = %handle,
            "submitted through fallback renderer"
        );
        Ok(handle)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_page(
        &self,
        ctx: &mut dyn DeviceContext,
        reader: &PdfReader,
        pdf: &Path,
        page: u32,
        geometry: DeviceGeometry,
        format: PixelFormat,
        grayscale: bool,
    ) -> Result<()> {
        let (w_pt, h_pt) = reader.page_size_pt(page)?;
        let dpi = geometry.fit_dpi(w_pt, h_pt);
        let image = self.rasterizer.render_page(pdf, page, dpi, grayscale)?;
        let bitmap = to_device_bitmap(&image, format);
        let (x, y) = geometry.centred_origin(bitmap.width, bitmap.height);

        ctx.start_page()?;
        ctx.blit(x, y, &bitmap)?;
        ctx.end_page()
    }
}
