// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end behaviour of the print pipeline with in-process doubles for the
// converter, the dispatcher and the printer directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use labprint_core::config::PipelineConfig;
use labprint_core::error::{LabprintError, Result};
use labprint_core::types::{JobId, JobState, JobStatusView, PrintOptions, PrinterInfo, PrinterStatus};
use labprint_document::convert::DocumentConverter;
use labprint_print::{Dispatcher, PrintLog, PrintPipeline, PrinterDirectory};
use parking_lot::Mutex;

struct TwoPrinters;

impl PrinterDirectory for TwoPrinters {
    fn list_printers(&self) -> Result<Vec<PrinterInfo>> {
        Ok(["lab-laser", "lab-color"]
            .iter()
            .map(|name| PrinterInfo {
                name: name.to_string(),
                is_default: *name == "lab-laser",
                status: PrinterStatus::Ready,
                status_text: "idle".into(),
                queued_job_count: 0,
            })
            .collect())
    }

    fn default_printer(&self) -> Option<String> {
        Some("lab-laser".into())
    }
}

/// "Converts" by copying to `<stem>.pdf`, or fails every time.
struct StubConverter {
    fail: bool,
}

impl DocumentConverter for StubConverter {
    fn convert_to_printable(&self, source: &Path) -> Result<PathBuf> {
        if self.fail {
            return Err(LabprintError::ConversionFailed {
                causes: vec!["libreoffice: office busy".into(), "unoconv: exit 1".into()],
            });
        }
        let target = source.with_extension("pdf");
        std::fs::copy(source, &target)?;
        Ok(target)
    }
}

#[derive(Default)]
struct StubDispatcher {
    printed: Mutex<Vec<PathBuf>>,
    offline: bool,
}

impl Dispatcher for StubDispatcher {
    fn dispatch(&self, file: &Path, _options: &PrintOptions) -> Result<String> {
        self.printed.lock().push(file.to_path_buf());
        if self.offline {
            return Err(LabprintError::dispatch(
                "fallback rendering failed",
                LabprintError::Command {
                    program: "lp".into(),
                    detail: "printer lab-laser is not accepting jobs".into(),
                },
            ));
        }
        Ok(format!("lab-laser-{}", self.printed.lock().len()))
    }
}

fn config(dir: &Path, max_size: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.work_dir = dir.to_path_buf();
    config.upload_dir = dir.join("uploads");
    config.queue.max_size = max_size;
    config.queue.workers = 2;
    config.queue.dequeue_timeout_ms = 20;
    config
}

fn pipeline(config: PipelineConfig, fail_conversion: bool) -> (PrintPipeline, Arc<StubDispatcher>) {
    pipeline_with(config, fail_conversion, StubDispatcher::default())
}

fn pipeline_with(
    config: PipelineConfig,
    fail_conversion: bool,
    dispatcher: StubDispatcher,
) -> (PrintPipeline, Arc<StubDispatcher>) {
    let dispatcher = Arc::new(dispatcher);
    let pipeline = PrintPipeline::with_components(
        config,
        Arc::new(TwoPrinters),
        Arc::new(StubConverter {
            fail: fail_conversion,
        }),
        dispatcher.clone(),
        Some(Arc::new(PrintLog::open_in_memory().expect("print log"))),
    );
    (pipeline, dispatcher)
}

fn upload(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "content").expect("write upload");
    path
}

fn wait_terminal(pipeline: &PrintPipeline, id: &JobId) -> JobStatusView {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let view = pipeline.get_status(id).expect("job known");
        if view.state.is_terminal() {
            return view;
        }
        assert!(Instant::now() < deadline, "job {id} stuck in {}", view.state);
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn overflow_submission_is_rejected_immediately() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, _) = pipeline(config(dir.path(), 3), false);

    let mut ids = Vec::new();
    for i in 0..3 {
        let file = upload(dir.path(), &format!("{i}.pdf"));
        ids.push(pipeline.submit(file, PrintOptions::default(), "doc.pdf").expect("accepted"));
    }
    let extra = upload(dir.path(), "extra.pdf");
    let started = Instant::now();
    let err = pipeline
        .submit(extra, PrintOptions::default(), "extra.pdf")
        .expect_err("queue full");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(err, LabprintError::QueueFull { capacity: 3 }));

    assert_eq!(pipeline.store().len(), 3);
    for id in &ids {
        assert_eq!(pipeline.get_status(id).expect("status").state, JobState::Pending);
    }

    let log = pipeline.print_log().expect("log");
    let entries = log.recent_entries(10).expect("entries");
    assert_eq!(entries.len(), 5);
    assert_eq!(entries[0].kind, "result");
    assert!(!entries[0].success);
    assert_eq!(entries[1].kind, "request");
}

#[test]
fn conversion_job_reaches_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, dispatcher) = pipeline(config(dir.path(), 10), false);
    pipeline.start().expect("start");

    let file = upload(dir.path(), "essay.docx");
    let id = pipeline
        .submit(file.clone(), PrintOptions::default(), "essay.docx")
        .expect("submit");
    let view = wait_terminal(&pipeline, &id);
    pipeline.shutdown();

    assert_eq!(view.state, JobState::Success);
    assert_eq!(view.progress, 100);
    assert_eq!(view.message, "Print complete");
    let result = view.result.expect("result");
    assert_eq!(result.status, "completed");
    assert_eq!(result.job_id, "lab-laser-1");
    assert_eq!(*dispatcher.printed.lock(), vec![dir.path().join("essay.pdf")]);
    assert!(!file.exists());
    assert!(!dir.path().join("essay.pdf").exists());

    let log = pipeline.print_log().expect("log");
    let entries = log.recent_entries(10).expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, "result");
    assert!(entries[0].success);
    assert_eq!(entries[0].details.as_deref(), Some("lab-laser-1"));
    // The request is hashed before any worker can delete the upload.
    assert_eq!(entries[1].kind, "request");
    assert_eq!(entries[1].document_hash.len(), 64);
}

#[test]
fn failed_job_cleans_up_and_hides_detail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, dispatcher) = pipeline(config(dir.path(), 10), true);
    pipeline.start().expect("start");

    let file = upload(dir.path(), "notes.odt");
    let id = pipeline
        .submit(file.clone(), PrintOptions::default(), "notes.odt")
        .expect("submit");
    let view = wait_terminal(&pipeline, &id);
    pipeline.shutdown();

    assert_eq!(view.state, JobState::Failure);
    assert!(view.message.starts_with("Print failed: "));
    assert!(view.message.len() > "Print failed: ".len());
    assert!(view.error.is_none());
    assert!(view.result.is_none());
    assert!(!file.exists());
    assert!(dispatcher.printed.lock().is_empty());

    let stored = pipeline.store().get(&id).expect("job");
    assert!(stored.error.as_deref().unwrap_or("").contains("unoconv: exit 1"));
}

#[test]
fn debug_mode_exposes_error_detail() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), 10);
    config.debug = true;
    let (pipeline, _) = pipeline(config, true);
    pipeline.start().expect("start");

    let id = pipeline
        .submit(upload(dir.path(), "a.rtf"), PrintOptions::default(), "a.rtf")
        .expect("submit");
    let view = wait_terminal(&pipeline, &id);
    pipeline.shutdown();
    assert!(view.error.as_deref().unwrap_or("").contains("libreoffice: office busy"));
}

#[test]
fn finished_jobs_are_evicted_and_pending_jobs_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), 10);
    config.retention.task_retention_secs = 0;
    config.retention.cleanup_interval_secs = 0;
    let (pipeline, _) = pipeline(config, false);

    // Registered but never queued, so it stays Pending while the reaper runs.
    let held = pipeline
        .store()
        .create(dir.path().join("held.pdf"), "held.pdf".into(), PrintOptions::default());

    pipeline.start().expect("start");
    let id = pipeline
        .submit(upload(dir.path(), "done.pdf"), PrintOptions::default(), "done.pdf")
        .expect("submit");

    let deadline = Instant::now() + Duration::from_secs(10);
    while pipeline.get_status(&id).is_some() {
        assert!(Instant::now() < deadline, "terminal job was never evicted");
        std::thread::sleep(Duration::from_millis(10));
    }
    pipeline.shutdown();
    assert!(pipeline.get_status(&id).is_none());
    assert_eq!(pipeline.get_status(&held).expect("held").state, JobState::Pending);
}

#[test]
fn printer_queries_use_the_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), 1);
    let (pipeline, _) = pipeline(config.clone(), false);

    let printers = pipeline.list_printers().expect("printers");
    assert_eq!(printers.len(), 2);
    assert!(printers.iter().any(|p| p.is_default && p.name == "lab-laser"));

    assert!(pipeline.validate_printer_name("lab-color"));
    assert!(!pipeline.validate_printer_name("ghost"));
    assert!(!pipeline.validate_printer_name(r"\\evil-host\lab-color"));
    assert!(!pipeline.validate_printer_name("//evil-host/lab-color"));
    assert!(!pipeline.validate_printer_name(""));

    config.printers.allowed = vec!["lab-laser".into()];
    let (restricted, _) = self::pipeline(config, false);
    assert!(restricted.validate_printer_name("lab-laser"));
    assert!(!restricted.validate_printer_name("lab-color"));
}

#[test]
fn dispatch_failure_removes_converted_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (pipeline, dispatcher) = pipeline_with(
        config(dir.path(), 10),
        false,
        StubDispatcher {
            offline: true,
            ..StubDispatcher::default()
        },
    );
    pipeline.start().expect("start");

    let file = upload(dir.path(), "poster.docx");
    let id = pipeline
        .submit(file.clone(), PrintOptions::default(), "poster.docx")
        .expect("submit");
    let view = wait_terminal(&pipeline, &id);
    pipeline.shutdown();

    assert_eq!(view.state, JobState::Failure);
    assert_eq!(*dispatcher.printed.lock(), vec![dir.path().join("poster.pdf")]);
    assert!(!file.exists());
    assert!(!dir.path().join("poster.pdf").exists());
}

#[test]
fn default_config_keeps_an_in_memory_print_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config(dir.path(), 10);
    assert!(config.print_log_path.is_none());
    let pipeline = PrintPipeline::from_config(config).expect("pipeline");
    let log = pipeline.print_log().expect("print log present");
    assert_eq!(log.count().expect("count"), 0);
}
