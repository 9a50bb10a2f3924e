// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster PDF writer: assembles device-resolution page images into a PDF
// using `printpdf` 0.8, so rendered pages can be handed to a spooler.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use labprint_core::error::{LabprintError, Result};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, instrument};

use crate::raster::{DeviceBitmap, PixelFormat};

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

/// Collects full-page raster images and serialises them as one PDF.
pub struct RasterPdfWriter {
    doc: PdfDocument,
    pages: Vec<PdfPage>,
}

impl RasterPdfWriter {
    pub fn new(title: &str) -> Self {
        Self {
            doc: PdfDocument::new(title),
            pages: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Append a page of `page_w_pt` x `page_h_pt` with `bitmap` placed at
    /// pixel offset (`x_px`, `y_px`) from the top-left, at `dpi`.
    #[instrument(skip(self, bitmap), fields(width = bitmap.width, height = bitmap.height))]
    pub fn add_page(
        &mut self,
        page_w_pt: f32,
        page_h_pt: f32,
        bitmap: &DeviceBitmap,
        x_px: i32,
        y_px: i32,
        dpi: f32,
    ) -> Result<()> {
        let data_format = match bitmap.format {
            PixelFormat::Rgb24 => RawImageFormat::RGB8,
            PixelFormat::Gray8 => RawImageFormat::R8,
            PixelFormat::Bgr24Padded => {
                return Err(LabprintError::ImageError(
                    "padded BGR rows cannot be embedded in a PDF".into(),
                ));
            }
        };
        let expected = bitmap.stride * bitmap.height as usize;
        if bitmap.data.len() != expected {
            return Err(LabprintError::ImageError(format!(
                "bitmap holds {} bytes, expected {expected}",
                bitmap.data.len()
            )));
        }

        let raw = RawImage {
            pixels: RawImageData::U8(bitmap.data.clone()),
            width: bitmap.width as usize,
            height: bitmap.height as usize,
            data_format,
            tag: Vec::new(),
        };
        let xobject_id = self.doc.add_image(&raw);

        // PDF space starts bottom-left.
        let to_pt = 72.0 / dpi;
        let x_pt = x_px as f32 * to_pt;
        let y_pt = page_h_pt - (y_px as f32 + bitmap.height as f32) * to_pt;

        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(x_pt)),
                translate_y: Some(Pt(y_pt.max(0.0))),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(dpi),
                rotate: None,
            },
        }];
        self.pages
            .push(PdfPage::new(pt_to_mm(page_w_pt), pt_to_mm(page_h_pt), ops));
        Ok(())
    }

    /// Append an empty page.
    pub fn add_blank_page(&mut self, page_w_pt: f32, page_h_pt: f32) {
        self.pages
            .push(PdfPage::new(pt_to_mm(page_w_pt), pt_to_mm(page_h_pt), Vec::new()));
    }

    /// Serialise all pages collected so far.
    pub fn finish(mut self) -> Vec<u8> {
        let page_count = self.pages.len();
        self.doc.with_pages(self.pages);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = self.doc.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(pages = page_count, bytes = output.len(), warnings = warnings.len(), "raster PDF written");
        output
    }
}
