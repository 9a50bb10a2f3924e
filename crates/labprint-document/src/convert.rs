// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversion of non-printable documents to PDF.
//
// Candidates are tried in order. Each one runs under the engine-wide
// conversion lock because office automation backends break when two
// instances run side by side. Within a candidate, open/export/close/quit
// are each retried on the backend's own notion of a transient error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use labprint_core::error::{LabprintError, Result};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::retry::{RetryClassifier, RetryPolicy};

/// Anything that can turn a source document into a printable PDF.
pub trait DocumentConverter: Send + Sync {
    fn convert_to_printable(&self, source: &Path) -> Result<PathBuf>;
}

/// Per-phase retry budgets plus the transient-error predicate of a backend.
#[derive(Clone)]
pub struct RetryTuning {
    pub open: RetryPolicy,
    pub export: RetryPolicy,
    pub close: RetryPolicy,
    pub is_retryable: RetryClassifier,
}

impl RetryTuning {
    pub fn uniform(policy: RetryPolicy, is_retryable: RetryClassifier) -> Self {
        Self {
            open: policy,
            export: policy,
            close: policy,
            is_retryable,
        }
    }
}

/// One conversion engine (an office suite, a conversion daemon, ...).
pub trait ConversionBackend: Send + Sync {
    fn name(&self) -> &str;

    fn tuning(&self) -> &RetryTuning;

    /// Start an engine instance for a single conversion.
    fn launch(&self) -> Result<Box<dyn ConversionSession + '_>>;
}

/// A live engine instance.
pub trait ConversionSession {
    fn open(&mut self, source: &Path) -> Result<()>;
    fn export_pdf(&mut self, target: &Path) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn quit(&mut self) -> Result<()>;
}

/// Ordered failover across conversion backends.
pub struct ConversionEngine {
    backends: Vec<Arc<dyn ConversionBackend>>,
    output_dir: PathBuf,
    lock: Mutex<()>,
}

impl ConversionEngine {
    pub fn new(backends: Vec<Arc<dyn ConversionBackend>>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            backends,
            output_dir: output_dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Where the converted copy of `source` is written: `<output_dir>/<stem>.pdf`.
    pub fn output_path_for(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into());
        self.output_dir.join(format!("{stem}.pdf"))
    }

    fn run_candidate(
        &self,
        backend: &dyn ConversionBackend,
        source: &Path,
        target: &Path,
    ) -> Result<()> {
        let _serialized = self.lock.lock();
        let tuning = backend.tuning();
        let retryable: &dyn Fn(&LabprintError) -> bool = &*tuning.is_retryable;
        let name = backend.name();

        let mut session = backend.launch()?;

        let converted = tuning
            .open
            .run(&format!("{name} open"), retryable, || session.open(source))
            .and_then(|()| {
                tuning.export.run(&format!("{name} export"), retryable, || {
                    session.export_pdf(target)
                })
            });

        // Release the instance whatever happened; failures here do not
        // invalidate an export that already succeeded.
        if let Err(e) = tuning
            .close
            .run(&format!("{name} close"), retryable, || session.close())
        {
            warn!(backend = name, error = %e, "closing document failed");
        }
        if let Err(e) = tuning
            .close
            .run(&format!("{name} quit"), retryable, || session.quit())
        {
            warn!(backend = name, error = %e, "shutting down backend failed");
        }

        converted?;
        if !target.is_file() {
            return Err(LabprintError::Command {
                program: name.to_string(),
                detail: format!("reported success but {} was not produced", target.display()),
            });
        }
        Ok(())
    }
}

impl DocumentConverter for ConversionEngine {
    #[instrument(skip(self), fields(source = %source.display()))]
    fn convert_to_printable(&self, source: &Path) -> Result<PathBuf> {
        if !source.is_file() {
            return Err(LabprintError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", source.display()),
            )));
        }
        std::fs::create_dir_all(&self.output_dir)?;
        let target = self.output_path_for(source);

        let mut causes = Vec::new();
        for backend in &self.backends {
            // A stale file from an earlier run would fake a success.
            discard_output(&target);
            debug!(backend = backend.name(), "trying conversion backend");
            match self.run_candidate(backend.as_ref(), source, &target) {
                Ok(()) => {
                    info!(backend = backend.name(), target = %target.display(), "document converted");
                    return Ok(target);
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "conversion backend failed");
                    causes.push(format!("{}: {e}", backend.name()));
                    discard_output(&target);
                }
            }
        }

        if causes.is_empty() {
            causes.push("no conversion backend configured".into());
        }
        Err(LabprintError::ConversionFailed { causes })
    }
}

/// Remove a partial or stale conversion output; absence is fine.
fn discard_output(target: &Path) {
    match std::fs::remove_file(target) {
        Ok(()) => debug!(target = %target.display(), "removed partial conversion output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(target = %target.display(), error = %e, "could not remove conversion output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    fn busy() -> LabprintError {
        LabprintError::Command {
            program: "fake".into(),
            detail: "call rejected".into(),
        }
    }

    fn rejected_is_transient() -> RetryClassifier {
        Arc::new(|e: &LabprintError| e.to_string().contains("rejected"))
    }

    /// Scripted backend: fails open `open_failures` times with a transient
    /// error, then optionally fails export permanently.
    struct ScriptedBackend {
        name: String,
        tuning: RetryTuning,
        open_failures: u32,
        export_error: Option<String>,
        write_output: bool,
        /// Write the target before failing export.
        partial_output: bool,
        open_calls: AtomicU32,
        quit_calls: AtomicU32,
        work: Duration,
        spans: Arc<Mutex<Vec<(Instant, Instant)>>>,
    }

    impl ScriptedBackend {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                tuning: RetryTuning::uniform(
                    RetryPolicy::new(3, Duration::ZERO),
                    rejected_is_transient(),
                ),
                open_failures: 0,
                export_error: None,
                write_output: true,
                partial_output: false,
                open_calls: AtomicU32::new(0),
                quit_calls: AtomicU32::new(0),
                work: Duration::ZERO,
                spans: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct ScriptedSession<'a> {
        backend: &'a ScriptedBackend,
        started: Instant,
    }

    impl ConversionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        fn tuning(&self) -> &RetryTuning {
            &self.tuning
        }

        fn launch(&self) -> Result<Box<dyn ConversionSession + '_>> {
            Ok(Box::new(ScriptedSession {
                backend: self,
                started: Instant::now(),
            }))
        }
    }

    impl ConversionSession for ScriptedSession<'_> {
        fn open(&mut self, _source: &Path) -> Result<()> {
            let n = self.backend.open_calls.fetch_add(1, Ordering::SeqCst);
            if n < self.backend.open_failures {
                Err(busy())
            } else {
                Ok(())
            }
        }

        fn export_pdf(&mut self, target: &Path) -> Result<()> {
            std::thread::sleep(self.backend.work);
            if self.backend.partial_output {
                std::fs::write(target, b"%PDF-1.4 trunc")?;
            }
            if let Some(msg) = &self.backend.export_error {
                return Err(LabprintError::Command {
                    program: self.backend.name.clone(),
                    detail: msg.clone(),
                });
            }
            if self.backend.write_output {
                std::fs::write(target, b"%PDF-1.4 fake")?;
            }
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn quit(&mut self) -> Result<()> {
            self.backend.quit_calls.fetch_add(1, Ordering::SeqCst);
            self.backend
                .spans
                .lock()
                .push((self.started, Instant::now()));
            Ok(())
        }
    }

    fn source_in(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"word document").expect("write source");
        path
    }

    #[test]
    fn first_backend_recovers_from_transient_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_in(dir.path(), "essay.docx");
        let mut backend = ScriptedBackend::new("word");
        backend.open_failures = 2;
        let backend = Arc::new(backend);

        let engine = ConversionEngine::new(vec![backend.clone()], dir.path().join("out"));
        let target = engine.convert_to_printable(&source).expect("convert");

        assert_eq!(target, dir.path().join("out").join("essay.pdf"));
        assert!(target.is_file());
        assert_eq!(backend.open_calls.load(Ordering::SeqCst), 3);
        assert_eq!(backend.quit_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn falls_through_to_second_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_in(dir.path(), "lab.doc");
        let mut first = ScriptedBackend::new("word");
        first.export_error = Some("document is password protected".into());
        let first = Arc::new(first);
        let second = Arc::new(ScriptedBackend::new("wps"));

        let engine = ConversionEngine::new(vec![first.clone(), second.clone()], dir.path());
        let target = engine.convert_to_printable(&source).expect("second backend converts");

        assert!(target.is_file());
        // Permanent export errors are not retried, but the instance is still released.
        assert_eq!(first.open_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.quit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.open_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn all_failures_are_aggregated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_in(dir.path(), "thesis.docx");
        let mut first = ScriptedBackend::new("word");
        first.open_failures = 100;
        let mut second = ScriptedBackend::new("wps");
        second.write_output = false;

        let engine = ConversionEngine::new(vec![Arc::new(first), Arc::new(second)], dir.path());
        match engine.convert_to_printable(&source) {
            Err(LabprintError::ConversionFailed { causes }) => {
                assert_eq!(causes.len(), 2);
                assert!(causes[0].starts_with("word: "));
                assert!(causes[0].contains("rejected"));
                assert!(causes[1].starts_with("wps: "));
                assert!(causes[1].contains("was not produced"));
            }
            other => panic!("expected ConversionFailed, got {other:?}"),
        }
    }

    #[test]
    fn partial_output_is_removed_when_every_backend_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_in(dir.path(), "notes.odt");
        let mut first = ScriptedBackend::new("word");
        first.partial_output = true;
        first.export_error = Some("crashed mid-export".into());
        let mut second = ScriptedBackend::new("wps");
        second.partial_output = true;
        second.export_error = Some("crashed mid-export".into());

        let engine = ConversionEngine::new(vec![Arc::new(first), Arc::new(second)], dir.path().join("out"));
        let err = engine.convert_to_printable(&source).expect_err("both fail");
        assert!(matches!(err, LabprintError::ConversionFailed { .. }));
        assert!(!engine.output_path_for(&source).exists());
    }

    #[test]
    fn partial_output_from_failed_backend_does_not_leak_into_next() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_in(dir.path(), "notes.odt");
        let mut first = ScriptedBackend::new("word");
        first.partial_output = true;
        first.export_error = Some("crashed mid-export".into());
        let mut second = ScriptedBackend::new("wps");
        second.write_output = false;

        let engine = ConversionEngine::new(vec![Arc::new(first), Arc::new(second)], dir.path().join("out"));
        let err = engine.convert_to_printable(&source).expect_err("second produces nothing");
        assert!(err.to_string().contains("was not produced"));
        assert!(!engine.output_path_for(&source).exists());
    }

    #[test]
    fn missing_source_fails_before_any_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = Arc::new(ScriptedBackend::new("word"));
        let engine = ConversionEngine::new(vec![backend.clone()], dir.path());
        assert!(engine.convert_to_printable(&dir.path().join("gone.docx")).is_err());
        assert_eq!(backend.open_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_conversions_never_overlap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = ScriptedBackend::new("word");
        backend.work = Duration::from_millis(60);
        let spans = backend.spans.clone();
        let engine = Arc::new(ConversionEngine::new(
            vec![Arc::new(backend)],
            dir.path().join("out"),
        ));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                let source = source_in(dir.path(), &format!("doc{i}.docx"));
                std::thread::spawn(move || engine.convert_to_printable(&source))
            })
            .collect();
        for handle in handles {
            handle.join().expect("join").expect("convert");
        }

        let mut spans = spans.lock().clone();
        assert_eq!(spans.len(), 4);
        spans.sort_by_key(|(start, _)| *start);
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "conversions overlapped");
        }
    }
}
