// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded retry for transient backend errors.
//
// The loop itself is generic; which errors count as transient is decided by
// a predicate supplied by each backend. Non-retryable errors are returned on
// the first occurrence.

use std::sync::Arc;
use std::time::Duration;

use labprint_core::error::{LabprintError, Result};
use tracing::{debug, warn};

/// Predicate deciding whether an error is a transient busy/rejected signal.
pub type RetryClassifier = Arc<dyn Fn(&LabprintError) -> bool + Send + Sync>;

/// Attempt count and fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            delay: Duration::from_millis(250),
        }
    }
}

/// Outcome of evaluating a failed attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after this delay.
    RetryAfter(Duration),
    /// Error is not transient.
    GiveUp,
    /// Transient, but the attempt budget is spent.
    Exhausted,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Decide what to do after `attempt` (1-based) failed.
    pub fn decide(&self, attempt: u32, retryable: bool) -> RetryDecision {
        if !retryable {
            RetryDecision::GiveUp
        } else if attempt >= self.attempts.max(1) {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.delay)
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    pub fn run<T>(
        &self,
        label: &str,
        is_retryable: &dyn Fn(&LabprintError) -> bool,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match self.decide(attempt, is_retryable(&err)) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(label, attempt, error = %err, "transient failure, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                RetryDecision::Exhausted => {
                    warn!(label, attempts = attempt, error = %err, "retries exhausted");
                    return Err(err);
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }
}
