// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker pool: long-lived threads that drain the job queue and run the
// convert -> dispatch -> cleanup pipeline for each job.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use labprint_core::error::{LabprintError, Result, error_chain};
use labprint_core::human_errors::humanize_error;
use labprint_core::types::{DocumentKind, Job, JobId, JobResult};
use labprint_document::convert::DocumentConverter;
use tracing::{debug, error, info, instrument, warn};

use crate::dispatch::Dispatcher;
use crate::print_log::PrintLog;
use crate::queue::JobQueue;
use crate::store::{JobStore, JobUpdate};

// -- Per-job pipeline ----------------------------------------------------------------

/// Runs one claimed job to a terminal state.
pub struct JobProcessor {
    store: Arc<JobStore>,
    converter: Arc<dyn DocumentConverter>,
    dispatcher: Arc<dyn Dispatcher>,
    print_log: Option<Arc<PrintLog>>,
}

impl JobProcessor {
    pub fn new(
        store: Arc<JobStore>,
        converter: Arc<dyn DocumentConverter>,
        dispatcher: Arc<dyn Dispatcher>,
        print_log: Option<Arc<PrintLog>>,
    ) -> Self {
        Self {
            store,
            converter,
            dispatcher,
            print_log,
        }
    }

    /// Claim and process `id`. Jobs that are gone or already claimed are
    /// skipped.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn process(&self, id: JobId) {
        let Some(job) = self.store.claim(&id) else {
            debug!("job missing or already claimed, skipping");
            return;
        };
        self.checkpoint(&id, 10, "Processing file");

        let mut converted: Option<PathBuf> = None;
        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(&job, &mut converted)))
            .unwrap_or_else(|panic| {
                let what = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                Err(LabprintError::dispatch_msg(format!("print worker panicked: {what}")))
            });

        match outcome {
            Ok(handle) => {
                self.checkpoint(&id, 90, "Cleaning up temporary files");
                cleanup(&job.source_path, converted.as_deref());
                if let Err(e) = self.store.update(&id, JobUpdate::success(JobResult::completed(&handle))) {
                    error!(error = %e, "could not record job success");
                }
                info!(handle = %handle, "print job complete");
                self.log_result(&job, true, &handle);
            }
            Err(err) => {
                cleanup(&job.source_path, converted.as_deref());
                let human = humanize_error(&err);
                let detail = error_chain(&err);
                warn!(error = %detail, "print job failed");
                let update = JobUpdate::failure(format!("Print failed: {}", human.message), detail.clone());
                if let Err(e) = self.store.update(&id, update) {
                    error!(error = %e, "could not record job failure");
                }
                self.log_result(&job, false, &detail);
            }
        }
    }

    fn run(&self, job: &Job, converted: &mut Option<PathBuf>) -> Result<String> {
        let printable = if DocumentKind::from_path(&job.source_path) == Some(DocumentKind::NeedsConversion) {
            self.checkpoint(&job.id, 30, "Converting document");
            let pdf = self.converter.convert_to_printable(&job.source_path)?;
            *converted = Some(pdf.clone());
            pdf
        } else {
            job.source_path.clone()
        };
        self.checkpoint(&job.id, 70, "Sending to printer");
        self.dispatcher.dispatch(&printable, &job.options)
    }

    fn checkpoint(&self, id: &JobId, progress: u8, message: &str) {
        if let Err(e) = self.store.update(id, JobUpdate::progress(progress, message)) {
            warn!(error = %e, progress, "could not record progress");
        }
    }

    fn log_result(&self, job: &Job, success: bool, details: &str) {
        if let Some(log) = &self.print_log {
            if let Err(e) = log.record_result(job, success, details) {
                warn!(error = %e, "print log write failed");
            }
        }
    }
}

/// Remove the upload and any converted artifact; failures are only logged.
fn cleanup(upload: &Path, converted: Option<&Path>) {
    for path in std::iter::once(upload).chain(converted.filter(|c| *c != upload)) {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed temporary file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove temporary file"),
        }
    }
}

// -- Pool ----------------------------------------------------------------------------

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `count` workers named `print-worker-N`.
    pub fn start(
        count: usize,
        queue: JobQueue,
        processor: Arc<JobProcessor>,
        dequeue_timeout: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(count);
        for i in 0..count.max(1) {
            let queue = queue.clone();
            let processor = Arc::clone(&processor);
            let stop = Arc::clone(&stop);
            let handle = std::thread::Builder::new()
                .name(format!("print-worker-{i}"))
                .spawn(move || worker_loop(&queue, &processor, &stop, dequeue_timeout))?;
            handles.push(handle);
        }
        info!(workers = handles.len(), "worker pool started");
        Ok(Self { handles, stop })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker and wait for them. In-flight jobs finish first.
    pub fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.handles {
            if handle.join().is_err() {
                error!("print worker exited abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

fn worker_loop(queue: &JobQueue, processor: &JobProcessor, stop: &AtomicBool, timeout: Duration) {
    debug!("print worker started");
    while !stop.load(Ordering::SeqCst) {
        if let Some(id) = queue.dequeue_timeout(timeout) {
            processor.process(id);
        }
    }
    debug!("print worker exiting");
}
