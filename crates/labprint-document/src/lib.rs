// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// labprint-document: Document handling for the Labprint pipeline.
//
// Converts word-processor documents to PDF through an ordered list of office
// backends, inspects PDFs, renders pages to rasters for the native print
// fallback, and optionally rewrites PDFs through Ghostscript.

pub mod backends;
pub mod convert;
pub mod pdf;
pub mod preprocess;
pub mod raster;
pub mod render;
pub mod retry;

pub use convert::{ConversionBackend, ConversionEngine, ConversionSession, DocumentConverter};
pub use pdf::reader::PdfReader;
pub use pdf::writer::RasterPdfWriter;
pub use preprocess::PdfPreprocessor;
pub use render::{GhostscriptRasterizer, PageRasterizer};
pub use retry::RetryPolicy;
