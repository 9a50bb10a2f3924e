// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded FIFO of job ids shared by the submitters and the worker pool.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, unbounded};
use labprint_core::error::{LabprintError, Result};
use labprint_core::types::JobId;

/// Multi-producer multi-consumer job queue.
///
/// Capacity 0 means unbounded.
#[derive(Clone)]
pub struct JobQueue {
    tx: Sender<JobId>,
    rx: Receiver<JobId>,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = if capacity == 0 { unbounded() } else { bounded(capacity) };
        Self { tx, rx, capacity }
    }

    /// Append without blocking; a full queue is reported, never waited on.
    pub fn enqueue(&self, id: JobId) -> Result<()> {
        self.tx.try_send(id).map_err(|e| match e {
            TrySendError::Full(_) => LabprintError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Disconnected(_) => LabprintError::dispatch_msg("job queue is closed"),
        })
    }

    /// Next job id, or `None` if nothing arrived within `timeout`.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<JobId> {
        match self.rx.recv_timeout(timeout) {
            Ok(id) => Some(id),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
