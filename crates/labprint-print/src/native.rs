// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native handlers for formats the spooler prints directly.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use labprint_core::error::Result;
use labprint_core::process::run_checked;
use tracing::{debug, instrument};

use crate::primary::{file_label, parse_request_id};

/// Prints a file in its own format, handling copies itself.
pub trait NativeHandler: Send + Sync {
    fn print(&self, file: &Path, printer: &str, copies: u32) -> Result<String>;
}

/// Handlers keyed by lower-case file extension.
#[derive(Clone, Default)]
pub struct NativeRegistry {
    handlers: HashMap<String, Arc<dyn NativeHandler>>,
}

impl NativeRegistry {
    pub fn register(&mut self, extensions: &[&str], handler: Arc<dyn NativeHandler>) {
        for ext in extensions {
            self.handlers.insert(ext.to_ascii_lowercase(), handler.clone());
        }
    }

    pub fn handler_for(&self, file: &Path) -> Option<Arc<dyn NativeHandler>> {
        let ext = file.extension()?.to_str()?.to_ascii_lowercase();
        self.handlers.get(&ext).cloned()
    }
}

/// Sends the file to `lp` once per copy.
pub struct LpNativeHandler {
    lp: String,
    timeout: Duration,
    copy_delay: Duration,
}

impl LpNativeHandler {
    /// Extensions CUPS filters understand without conversion.
    pub const EXTENSIONS: [&'static str; 5] = ["txt", "png", "jpg", "jpeg", "ps"];

    pub fn new(lp: impl Into<String>, timeout: Duration, copy_delay: Duration) -> Self {
        Self {
            lp: lp.into(),
            timeout,
            copy_delay,
        }
    }
}

impl NativeHandler for LpNativeHandler {
    #[instrument(skip(self), fields(file = %file.display()))]
    fn print(&self, file: &Path, printer: &str, copies: u32) -> Result<String> {
        let mut handle = format!("print-job-{}", file_label(file));
        for copy in 1..=copies.max(1) {
            if copy > 1 {
                std::thread::sleep(self.copy_delay);
            }
            let mut cmd = Command::new(&self.lp);
            cmd.arg("-d").arg(printer).arg(file);
            let output = run_checked(&mut cmd, self.timeout)?;
            if let Some(id) = parse_request_id(&output.stdout) {
                handle = id;
            }
            debug!(copy, handle = %handle, "native copy spooled");
        }
        Ok(handle)
    }
}
