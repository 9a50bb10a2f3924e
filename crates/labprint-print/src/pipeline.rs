// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The print pipeline: one object owning the job store, queue, worker pool,
// reaper and printer directory. Built once at startup and shared by handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use labprint_core::config::{PipelineConfig, PreprocessMode};
use labprint_core::error::Result;
use labprint_core::types::{JobId, JobStatusView, PrintOptions, PrinterInfo};
use labprint_document::backends;
use labprint_document::convert::{ConversionEngine, DocumentConverter};
use labprint_document::preprocess::PdfPreprocessor;
use labprint_document::render::GhostscriptRasterizer;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::cups_device::CupsDriver;
use crate::device::FallbackRenderer;
use crate::dispatch::{Dispatcher, PrintDispatcher};
use crate::native::{LpNativeHandler, NativeRegistry};
use crate::primary::PrimaryPrinter;
use crate::print_log::PrintLog;
use crate::printers::{CupsDirectory, PrinterDirectory, validate_printer_name};
use crate::queue::JobQueue;
use crate::reaper::Reaper;
use crate::store::JobStore;
use crate::worker::{JobProcessor, WorkerPool};

pub struct PrintPipeline {
    config: PipelineConfig,
    store: Arc<JobStore>,
    queue: JobQueue,
    processor: Arc<JobProcessor>,
    directory: Arc<dyn PrinterDirectory>,
    print_log: Option<Arc<PrintLog>>,
    workers: Mutex<Option<WorkerPool>>,
    reaper: Mutex<Option<Reaper>>,
}

impl PrintPipeline {
    /// Wire up the CUPS directory, the configured conversion backends and
    /// both print paths. Creates the working directories.
    #[instrument(skip_all, fields(work_dir = %config.work_dir.display()))]
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let scratch = config.work_dir.join("scratch");
        std::fs::create_dir_all(&config.upload_dir)?;
        std::fs::create_dir_all(&scratch)?;

        let directory: Arc<dyn PrinterDirectory> = Arc::new(CupsDirectory::new(&config.printers));
        let engine = ConversionEngine::new(
            config
                .conversion
                .backends
                .iter()
                .map(|b| backends::from_config(b, &scratch))
                .collect(),
            &config.work_dir,
        );
        info!(backends = ?engine.backend_names(), "conversion engine ready");

        let dispatch = &config.dispatch;
        let primary = PrimaryPrinter::new(
            dispatch.primary.clone(),
            Duration::from_secs(dispatch.primary_timeout_secs),
        );
        let fallback = FallbackRenderer::new(
            Arc::new(CupsDriver::new(&config.printers, dispatch, &scratch)),
            Arc::new(GhostscriptRasterizer::new(
                &dispatch.gs_command,
                &scratch,
                Duration::from_secs(dispatch.render_timeout_secs),
            )),
        );
        let mut native = NativeRegistry::default();
        native.register(
            &LpNativeHandler::EXTENSIONS,
            Arc::new(LpNativeHandler::new(
                &dispatch.lp_command,
                Duration::from_secs(dispatch.primary_timeout_secs),
                Duration::from_millis(dispatch.native_copy_delay_ms),
            )),
        );

        let mut dispatcher = PrintDispatcher::new(directory.clone(), config.printers.clone())
            .with_primary(Arc::new(primary))
            .with_fallback(fallback)
            .with_native(native);
        if config.preprocess.mode != PreprocessMode::None {
            dispatcher = dispatcher.with_preprocessor(PdfPreprocessor::new(config.preprocess.clone(), &scratch));
        }

        let print_log = match &config.print_log_path {
            Some(path) => PrintLog::open(path)?,
            None => PrintLog::open_in_memory()?,
        };

        Ok(Self::with_components(
            config,
            directory,
            Arc::new(engine),
            Arc::new(dispatcher),
            Some(Arc::new(print_log)),
        ))
    }

    /// Assemble a pipeline from explicit collaborators. Nothing is started.
    pub fn with_components(
        config: PipelineConfig,
        directory: Arc<dyn PrinterDirectory>,
        converter: Arc<dyn DocumentConverter>,
        dispatcher: Arc<dyn Dispatcher>,
        print_log: Option<Arc<PrintLog>>,
    ) -> Self {
        let store = Arc::new(JobStore::new());
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            converter,
            dispatcher,
            print_log.clone(),
        ));
        Self {
            queue: JobQueue::new(config.queue.max_size),
            config,
            store,
            processor,
            directory,
            print_log,
            workers: Mutex::new(None),
            reaper: Mutex::new(None),
        }
    }

    /// Start the workers and the reaper. Calling it again is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.is_none() {
            *workers = Some(WorkerPool::start(
                self.config.queue.workers,
                self.queue.clone(),
                self.processor.clone(),
                self.config.queue.dequeue_timeout(),
            )?);
        }
        let mut reaper = self.reaper.lock();
        if reaper.is_none() {
            *reaper = Some(Reaper::start(
                self.store.clone(),
                self.config.retention.retention(),
                self.config.retention.interval(),
            )?);
        }
        Ok(())
    }

    /// Queue a print job for `source`.
    ///
    /// Fails immediately with `QueueFull` when the queue is at capacity; the
    /// job record is then discarded.
    #[instrument(skip(self, options), fields(source = %source.display()))]
    pub fn submit(&self, source: PathBuf, options: PrintOptions, original_filename: &str) -> Result<JobId> {
        let id = self.store.create(source, original_filename.to_string(), options);
        // Logged before the job is visible to workers, which delete the source.
        if let (Some(log), Some(job)) = (&self.print_log, self.store.get(&id)) {
            if let Err(e) = log.record_request(&job) {
                warn!(error = %e, "print log write failed");
            }
        }
        if let Err(e) = self.queue.enqueue(id) {
            let rejected = self.store.remove(&id);
            warn!(job_id = %id, error = %e, "submission rejected");
            if let (Some(log), Some(job)) = (&self.print_log, rejected) {
                if let Err(log_err) = log.record_result(&job, false, &e.to_string()) {
                    warn!(error = %log_err, "print log write failed");
                }
            }
            return Err(e);
        }
        info!(job_id = %id, queued = self.queue.len(), "job submitted");
        Ok(id)
    }

    /// Current view of a job, or `None` once it is unknown or evicted.
    pub fn get_status(&self, id: &JobId) -> Option<JobStatusView> {
        self.store
            .get(id)
            .map(|job| JobStatusView::from_job(&job, self.config.debug))
    }

    pub fn list_printers(&self) -> Result<Vec<PrinterInfo>> {
        self.directory.list_printers()
    }

    pub fn validate_printer_name(&self, name: &str) -> bool {
        validate_printer_name(self.directory.as_ref(), &self.config.printers.allowed, name)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn print_log(&self) -> Option<&Arc<PrintLog>> {
        self.print_log.as_ref()
    }

    /// Stop the workers after their current job and stop the reaper.
    pub fn shutdown(&self) {
        if let Some(workers) = self.workers.lock().take() {
            workers.shutdown();
        }
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.shutdown();
        }
    }
}

impl Drop for PrintPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
