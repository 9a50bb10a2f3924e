// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Background eviction of finished jobs.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use labprint_core::error::Result;
use tracing::{debug, error, info};

use crate::store::JobStore;

/// Periodically drops terminal jobs older than the retention window.
///
/// Pending and in-progress jobs are never touched, however old.
pub struct Reaper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Reaper {
    pub fn start(store: Arc<JobStore>, retention: Duration, interval: Duration) -> Result<Self> {
        let interval = interval.max(Duration::from_millis(10));
        let (stop, stopped) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("job-reaper".into())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            sweep(&store, retention);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("reaper exiting");
            })?;
        info!(
            retention_secs = retention.as_secs(),
            interval_secs = interval.as_secs(),
            "reaper started"
        );
        Ok(Self { stop, handle })
    }

    pub fn shutdown(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            error!("reaper exited abnormally");
        }
    }
}

/// One eviction pass; returns how many jobs were dropped.
pub fn sweep(store: &JobStore, retention: Duration) -> usize {
    let evicted = store.evict_terminal_older_than(retention, Utc::now());
    if evicted > 0 {
        info!(evicted, remaining = store.len(), "evicted finished jobs");
    }
    evicted
}
