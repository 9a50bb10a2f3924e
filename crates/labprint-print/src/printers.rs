// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Installed-printer directory and printer-name policy.
//
// The CUPS probe shells out to `lpstat` and caches the answer briefly; the
// listing is read-only and never on the write path of a job. Name
// validation is the security boundary that keeps jobs away from printers
// the administrator did not install.

use std::collections::HashMap;
use std::process::Command;
use std::time::{Duration, Instant};

use labprint_core::config::PrinterConfig;
use labprint_core::error::{LabprintError, Result};
use labprint_core::process::run_with_timeout;
use labprint_core::types::{PrinterInfo, PrinterStatus};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Read-only view of the printers the OS knows about.
pub trait PrinterDirectory: Send + Sync {
    fn list_printers(&self) -> Result<Vec<PrinterInfo>>;

    /// The OS-level default destination, if one is set.
    fn default_printer(&self) -> Option<String>;

    /// Names of all registered printers; empty when enumeration fails.
    fn printer_names(&self) -> Vec<String> {
        self.list_printers()
            .map(|list| list.into_iter().map(|p| p.name).collect())
            .unwrap_or_default()
    }
}

// -- Name policy -------------------------------------------------------------------

/// Whether `name` may be used as a print target.
///
/// Rejects empty names, option-like names (`-x`), anything shaped like a
/// path or URI (so `\\host\queue` or `//host/queue` can never reach a remote
/// spooler), names outside a non-empty allow-list, and names the system
/// does not know. When no printers can be enumerated nothing validates.
pub fn validate_printer_name(directory: &dyn PrinterDirectory, allowed: &[String], name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || name.starts_with('-') {
        return false;
    }
    if name.contains('\\') || name.contains('/') || name.chars().any(char::is_control) {
        return false;
    }
    if !allowed.is_empty() && !allowed.iter().any(|a| a == name) {
        return false;
    }
    directory.printer_names().iter().any(|known| known == name)
}

/// Pick the printer a job goes to.
///
/// Order: the job's explicit choice, the configured default, the OS
/// default, then the only installed printer. Several printers and no
/// default is ambiguous. Whatever is chosen must pass
/// [`validate_printer_name`].
pub fn resolve_printer(
    directory: &dyn PrinterDirectory,
    config: &PrinterConfig,
    requested: &str,
) -> Result<String> {
    let requested = requested.trim();
    let chosen = if !requested.is_empty() {
        requested.to_string()
    } else if let Some(configured) = config.default_printer.as_deref().filter(|s| !s.trim().is_empty()) {
        configured.trim().to_string()
    } else if let Some(os_default) = directory.default_printer() {
        os_default
    } else {
        let names = directory.printer_names();
        match names.as_slice() {
            [only] => only.clone(),
            [] => return Err(LabprintError::NoPrinter("no printers are installed".into())),
            _ => {
                return Err(LabprintError::NoPrinter(format!(
                    "{} printers installed and no default set",
                    names.len()
                )));
            }
        }
    };

    if validate_printer_name(directory, &config.allowed, &chosen) {
        Ok(chosen)
    } else {
        Err(LabprintError::InvalidPrinter(chosen))
    }
}

// -- lpstat parsing ----------------------------------------------------------------

/// `lpstat -d`: "system default destination: NAME".
pub fn parse_default_destination(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let (_, name) = line.split_once("system default destination:")?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    })
}

/// `lpstat -p`: one "printer NAME ..." line per queue.
pub fn parse_printer_lines(output: &str) -> Vec<(String, PrinterStatus, String)> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("printer ")?;
            let mut parts = rest.splitn(2, char::is_whitespace);
            let name = parts.next()?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let text = parts.next().unwrap_or("").trim().to_string();
            let lowered = text.to_ascii_lowercase();
            let status = if lowered.contains("disabled") {
                PrinterStatus::Offline
            } else if lowered.contains("printing") {
                PrinterStatus::Busy
            } else if lowered.contains("idle") {
                PrinterStatus::Ready
            } else {
                PrinterStatus::Unknown
            };
            Some((name, status, text))
        })
        .collect()
}

/// `lpstat -o`: lines start with "DEST-JOBID".
pub fn parse_job_counts(output: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for line in output.lines() {
        let Some(token) = line.split_whitespace().next() else {
            continue;
        };
        let Some((dest, job)) = token.rsplit_once('-') else {
            continue;
        };
        if !dest.is_empty() && !job.is_empty() && job.bytes().all(|b| b.is_ascii_digit()) {
            *counts.entry(dest.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

// -- CUPS directory ----------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Snapshot {
    printers: Vec<PrinterInfo>,
    default: Option<String>,
}

/// Printer directory backed by CUPS `lpstat`.
pub struct CupsDirectory {
    lpstat: String,
    timeout: Duration,
    ttl: Duration,
    cache: Mutex<Option<(Instant, Snapshot)>>,
}

impl CupsDirectory {
    pub fn new(config: &PrinterConfig) -> Self {
        Self {
            lpstat: config.lpstat_command.clone(),
            timeout: Duration::from_secs(config.probe_timeout_secs.max(1)),
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: Mutex::new(None),
        }
    }

    fn lpstat(&self, flag: &str) -> Result<String> {
        let mut cmd = Command::new(&self.lpstat);
        cmd.arg(flag);
        let output = run_with_timeout(&mut cmd, self.timeout)?;
        // lpstat exits non-zero when there is simply nothing to report.
        if !output.success() {
            debug!(flag, detail = %output.failure_detail(), "lpstat reported an error");
        }
        Ok(output.stdout)
    }

    fn probe(&self) -> Result<Snapshot> {
        let default = parse_default_destination(&self.lpstat("-d")?);
        let counts = match self.lpstat("-o") {
            Ok(out) => parse_job_counts(&out),
            Err(e) => {
                warn!(error = %e, "could not read printer queues");
                HashMap::new()
            }
        };
        let printers = parse_printer_lines(&self.lpstat("-p")?)
            .into_iter()
            .map(|(name, status, status_text)| PrinterInfo {
                is_default: default.as_deref() == Some(name.as_str()),
                queued_job_count: counts.get(&name).copied().unwrap_or(0),
                name,
                status,
                status_text,
            })
            .collect();
        Ok(Snapshot { printers, default })
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let mut cache = self.cache.lock();
        if let Some((taken, snap)) = cache.as_ref() {
            if taken.elapsed() < self.ttl {
                return Ok(snap.clone());
            }
        }
        let snap = self.probe()?;
        *cache = Some((Instant::now(), snap.clone()));
        Ok(snap)
    }
}

impl PrinterDirectory for CupsDirectory {
    fn list_printers(&self) -> Result<Vec<PrinterInfo>> {
        Ok(self.snapshot()?.printers)
    }

    fn default_printer(&self) -> Option<String> {
        match self.snapshot() {
            Ok(snap) => snap.default,
            Err(e) => {
                warn!(error = %e, "could not query default printer");
                None
            }
        }
    }
}
