// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print dispatch: printer resolution, the fast primary path, and the
// rendering fallback.
//
// Primary-path failures are logged and absorbed; everything that stops a
// document from reaching a printer comes back as a `Dispatch` error whose
// source chain says why.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use labprint_core::config::PrinterConfig;
use labprint_core::error::{LabprintError, Result};
use labprint_core::page_range::{self, PageSet};
use labprint_core::types::{DocumentKind, PrintOptions};
use labprint_document::pdf::PdfReader;
use labprint_document::preprocess::PdfPreprocessor;
use tracing::{info, instrument, warn};

use crate::device::FallbackRenderer;
use crate::directives::{Directive, translate};
use crate::native::NativeRegistry;
use crate::primary::PrimaryPrinter;
use crate::printers::{PrinterDirectory, resolve_printer};

/// Sends a printable artifact to a printer.
pub trait Dispatcher: Send + Sync {
    /// Print `file`; returns the spool handle.
    fn dispatch(&self, file: &Path, options: &PrintOptions) -> Result<String>;
}

/// The silent command-line print used before falling back to rendering.
pub trait PrimaryBackend: Send + Sync {
    fn print(&self, printer: &str, directives: &[Directive], file: &Path) -> Result<String>;
}

impl PrimaryBackend for PrimaryPrinter {
    fn print(&self, printer: &str, directives: &[Directive], file: &Path) -> Result<String> {
        PrimaryPrinter::print(self, printer, directives, file)
    }
}

pub struct PrintDispatcher {
    directory: Arc<dyn PrinterDirectory>,
    printer_config: PrinterConfig,
    primary: Option<Arc<dyn PrimaryBackend>>,
    fallback: Option<FallbackRenderer>,
    preprocessor: Option<PdfPreprocessor>,
    native: NativeRegistry,
}

impl PrintDispatcher {
    pub fn new(directory: Arc<dyn PrinterDirectory>, printer_config: PrinterConfig) -> Self {
        Self {
            directory,
            printer_config,
            primary: None,
            fallback: None,
            preprocessor: None,
            native: NativeRegistry::default(),
        }
    }

    pub fn with_primary(mut self, primary: Arc<dyn PrimaryBackend>) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackRenderer) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: PdfPreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    pub fn with_native(mut self, native: NativeRegistry) -> Self {
        self.native = native;
        self
    }

    pub fn directory(&self) -> &Arc<dyn PrinterDirectory> {
        &self.directory
    }

    /// Resolve the requested page set; `None` means every page and no
    /// document inspection was needed.
    fn page_set(file: &Path, spec: &str) -> Result<Option<(PageSet, u32)>> {
        if spec.trim().is_empty() {
            return Ok(None);
        }
        let total = PdfReader::open(file)?.page_count();
        Ok(Some((page_range::parse(spec, total)?, total)))
    }

    fn prepare(&self, file: &Path) -> Option<PathBuf> {
        let preprocessor = self.preprocessor.as_ref()?;
        match preprocessor.prepare(file) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!(error = %e, "PDF preprocessing failed, printing the original");
                None
            }
        }
    }

    fn dispatch_pdf(&self, file: &Path, printer: &str, options: &PrintOptions) -> Result<String> {
        let pages = Self::page_set(file, &options.page_range)
            .map_err(|e| LabprintError::dispatch("cannot use the requested pages", e))?;
        let (page_set, total) = match &pages {
            Some((set, total)) => (Some(set), *total),
            None => (None, 0),
        };
        let directives = translate(options, page_set, total);

        let mut primary_error = None;
        if let Some(primary) = &self.primary {
            let prepared = self.prepare(file);
            let target = prepared.as_deref().unwrap_or(file);
            let result = primary.print(printer, &directives, target);
            if let Some(path) = &prepared {
                let _ = std::fs::remove_file(path);
            }
            match result {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    warn!(printer, error = %e, "primary print path failed, falling back");
                    primary_error = Some(e);
                }
            }
        }

        let Some(fallback) = &self.fallback else {
            return Err(match primary_error {
                Some(e) => LabprintError::dispatch("printing failed and no fallback is available", e),
                None => LabprintError::dispatch_msg("no print path is configured"),
            });
        };
        fallback.print(file, printer, options).map_err(|e| {
            let reason = match &primary_error {
                Some(p) => format!("primary print path failed ({p}); fallback rendering failed"),
                None => "fallback rendering failed".to_string(),
            };
            LabprintError::dispatch(reason, e)
        })
    }
}

impl Dispatcher for PrintDispatcher {
    #[instrument(skip(self, options), fields(file = %file.display(), printer = %options.printer))]
    fn dispatch(&self, file: &Path, options: &PrintOptions) -> Result<String> {
        if !file.is_file() {
            return Err(LabprintError::dispatch(
                "file to print is missing",
                LabprintError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    file.display().to_string(),
                )),
            ));
        }
        options
            .validate_copies()
            .map_err(|e| LabprintError::dispatch("invalid copy count", e))?;
        let printer = resolve_printer(self.directory.as_ref(), &self.printer_config, &options.printer)
            .map_err(|e| LabprintError::dispatch("cannot resolve printer", e))?;

        let handle = match DocumentKind::from_path(file) {
            Some(DocumentKind::Pdf) => self.dispatch_pdf(file, &printer, options)?,
            _ => match self.native.handler_for(file) {
                Some(handler) => handler
                    .print(file, &printer, options.copies)
                    .map_err(|e| LabprintError::dispatch("native print failed", e))?,
                None => {
                    return Err(LabprintError::dispatch(
                        "cannot print this file",
                        LabprintError::UnsupportedDocument(file.display().to_string()),
                    ));
                }
            },
        };
        info!(printer = %printer, handle = %handle, "document dispatched");
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::tests::{FakeDriver, FakeRasterizer, write_pdf};
    use crate::device::DeviceFields;
    use crate::native::NativeHandler;
    use crate::printers::tests::StaticDirectory;
    use labprint_core::error::error_chain;
    use parking_lot::Mutex;

    /// Primary double that records its calls and fails on demand.
    struct FakePrimary {
        fail: bool,
        calls: Mutex<Vec<(String, Vec<Directive>)>>,
    }

    impl FakePrimary {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    impl PrimaryBackend for FakePrimary {
        fn print(&self, printer: &str, directives: &[Directive], _file: &Path) -> Result<String> {
            self.calls.lock().push((printer.to_string(), directives.to_vec()));
            if self.fail {
                Err(LabprintError::Timeout {
                    program: "SumatraPDF".into(),
                    seconds: 120,
                })
            } else {
                Ok("primary-7".into())
            }
        }
    }

    struct RecordingNative(Mutex<Vec<u32>>);

    impl NativeHandler for RecordingNative {
        fn print(&self, _file: &Path, _printer: &str, copies: u32) -> Result<String> {
            self.0.lock().push(copies);
            Ok("native-1".into())
        }
    }

    fn directory() -> Arc<dyn PrinterDirectory> {
        Arc::new(StaticDirectory {
            names: vec!["lab-laser", "lab-color"],
            default: Some("lab-laser"),
        })
    }

    fn fallback() -> FallbackRenderer {
        FallbackRenderer::new(
            Arc::new(FakeDriver::new(DeviceFields {
                copies: true,
                collate: true,
                duplex: true,
                paper: true,
                color: true,
            })),
            Arc::new(FakeRasterizer::new()),
        )
    }

    fn pdf_in(dir: &Path, pages: u32) -> PathBuf {
        let path = dir.join("job.pdf");
        write_pdf(&path, pages);
        path
    }

    #[test]
    fn primary_success_uses_default_printer_and_canonical_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = pdf_in(dir.path(), 6);
        let primary = FakePrimary::new(false);
        let dispatcher = PrintDispatcher::new(directory(), PrinterConfig::default())
            .with_primary(primary.clone())
            .with_fallback(fallback());

        let options = PrintOptions {
            copies: 2,
            page_range: "4-5, 1,2 ,3".into(),
            ..PrintOptions::default()
        };
        let handle = dispatcher.dispatch(&pdf, &options).expect("dispatch");
        assert_eq!(handle, "primary-7");

        let calls = primary.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "lab-laser");
        assert_eq!(
            calls[0].1,
            vec![Directive::Copies(2), Directive::PageRanges("1-5".into())]
        );
    }

    #[test]
    fn primary_failure_falls_back_to_rendering() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = pdf_in(dir.path(), 2);
        let dispatcher = PrintDispatcher::new(directory(), PrinterConfig::default())
            .with_primary(FakePrimary::new(true))
            .with_fallback(fallback());
        let handle = dispatcher
            .dispatch(&pdf, &PrintOptions::default())
            .expect("fallback prints");
        assert_eq!(handle, "fake-1");
    }

    #[test]
    fn primary_failure_without_fallback_is_dispatch_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = pdf_in(dir.path(), 1);
        let dispatcher = PrintDispatcher::new(directory(), PrinterConfig::default())
            .with_primary(FakePrimary::new(true));
        let err = dispatcher
            .dispatch(&pdf, &PrintOptions::default())
            .expect_err("no path left");
        assert!(matches!(err, LabprintError::Dispatch { .. }));
        assert!(error_chain(&err).contains("timed out"));
    }

    #[test]
    fn fatal_preconditions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = pdf_in(dir.path(), 3);
        let dispatcher = PrintDispatcher::new(directory(), PrinterConfig::default())
            .with_primary(FakePrimary::new(false));

        let missing = dispatcher.dispatch(&dir.path().join("gone.pdf"), &PrintOptions::default());
        assert!(matches!(missing, Err(LabprintError::Dispatch { .. })));

        let too_many = PrintOptions {
            copies: 100,
            ..PrintOptions::default()
        };
        assert!(matches!(
            dispatcher.dispatch(&pdf, &too_many),
            Err(LabprintError::Dispatch { .. })
        ));

        let unknown = PrintOptions {
            printer: r"\\attacker\queue".into(),
            ..PrintOptions::default()
        };
        let err = dispatcher.dispatch(&pdf, &unknown).expect_err("rejected printer");
        assert!(error_chain(&err).contains("printer not allowed"));

        let bad_range = PrintOptions {
            page_range: "2-9".into(),
            ..PrintOptions::default()
        };
        let err = dispatcher.dispatch(&pdf, &bad_range).expect_err("bad range");
        assert!(error_chain(&err).contains("out of range"));
    }

    #[test]
    fn ambiguous_printer_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = pdf_in(dir.path(), 1);
        let no_default: Arc<dyn PrinterDirectory> = Arc::new(StaticDirectory {
            names: vec!["lab-laser", "lab-color"],
            default: None,
        });
        let dispatcher = PrintDispatcher::new(no_default, PrinterConfig::default())
            .with_primary(FakePrimary::new(false));
        let err = dispatcher
            .dispatch(&pdf, &PrintOptions::default())
            .expect_err("ambiguous");
        match err {
            LabprintError::Dispatch { source: Some(inner), .. } => {
                assert!(matches!(*inner, LabprintError::NoPrinter(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn native_formats_bypass_pdf_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "hello").expect("write");
        let native = Arc::new(RecordingNative(Mutex::new(Vec::new())));
        let mut registry = NativeRegistry::default();
        registry.register(&["txt"], native.clone());
        let primary = FakePrimary::new(false);

        let dispatcher = PrintDispatcher::new(directory(), PrinterConfig::default())
            .with_primary(primary.clone())
            .with_native(registry);
        let options = PrintOptions {
            copies: 3,
            ..PrintOptions::default()
        };
        assert_eq!(dispatcher.dispatch(&txt, &options).expect("native"), "native-1");
        assert_eq!(*native.0.lock(), vec![3]);
        assert!(primary.calls.lock().is_empty());

        let zip = dir.path().join("bundle.zip");
        std::fs::write(&zip, "PK").expect("write");
        assert!(dispatcher.dispatch(&zip, &options).is_err());
    }
}
