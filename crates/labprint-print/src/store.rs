// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory job store.
//
// The single source of truth for job state. Every read and write goes
// through one mutex so a status query never observes a half-applied update,
// and the state machine is enforced here rather than by callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use labprint_core::error::{LabprintError, Result};
use labprint_core::types::{Job, JobId, JobResult, JobState, PrintOptions};
use parking_lot::Mutex;
use tracing::{debug, instrument};

/// Partial update applied atomically by [`JobStore::update`].
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub state: Option<JobState>,
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Message and progress within the current state.
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn success(result: JobResult) -> Self {
        Self {
            state: Some(JobState::Success),
            message: Some("Print complete".into()),
            progress: Some(100),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            state: Some(JobState::Failure),
            message: Some(message.into()),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `Pending` job and return its id.
    pub fn create(&self, source_path: PathBuf, original_filename: String, options: PrintOptions) -> JobId {
        let job = Job::new(source_path, original_filename, options);
        let id = job.id;
        self.jobs.lock().insert(id, job);
        id
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.jobs.lock().remove(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Move a `Pending` job to `InProgress`; returns the claimed snapshot.
    ///
    /// `None` when the job is unknown or already claimed, so two workers can
    /// never process the same job.
    pub fn claim(&self, id: &JobId) -> Option<Job> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id)?;
        if job.state != JobState::Pending {
            return None;
        }
        job.state = JobState::InProgress;
        Some(job.clone())
    }

    /// Apply `update` to job `id`.
    ///
    /// Rejects illegal transitions, results outside `Success` and error
    /// detail outside `Failure`. Progress never decreases and is capped
    /// at 100.
    #[instrument(skip(self, update), fields(job_id = %id))]
    pub fn update(&self, id: &JobId, update: JobUpdate) -> Result<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| LabprintError::InvalidOptions(format!("unknown job {id}")))?;

        let next = update.state.unwrap_or(job.state);
        if !job.state.can_transition_to(next) {
            return Err(LabprintError::InvalidTransition {
                from: job.state.to_string(),
                to: next.to_string(),
            });
        }
        if update.result.is_some() && next != JobState::Success {
            return Err(LabprintError::InvalidTransition {
                from: job.state.to_string(),
                to: format!("{next} with a result"),
            });
        }
        if update.error.is_some() && next != JobState::Failure {
            return Err(LabprintError::InvalidTransition {
                from: job.state.to_string(),
                to: format!("{next} with an error"),
            });
        }

        job.state = next;
        if let Some(message) = update.message {
            job.message = message;
        }
        if let Some(progress) = update.progress {
            job.progress = job.progress.max(progress.min(100));
        }
        if let Some(result) = update.result {
            job.result = Some(result);
        }
        if let Some(error) = update.error {
            job.error = Some(error);
        }
        debug!(state = %job.state, progress = job.progress, "job updated");
        Ok(())
    }

    /// Drop terminal jobs created more than `retention` before `now`.
    pub fn evict_terminal_older_than(&self, retention: Duration, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| !(job.state.is_terminal() && job.created_at < cutoff));
        before - jobs.len()
    }
}
