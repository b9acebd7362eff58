//! Job tracker: lifecycle records for conversion jobs.
//!
//! A job moves `Queued → Processing → {Completed | Failed}`. The orchestrator
//! is the only writer; the service and its callers only read. Once a job is
//! terminal every further update is rejected, so a late write from a
//! panicking task cannot resurrect it.

use crate::error::JobStoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

// ─── Status ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed are final.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── ProcessingJob ──────────────────────────────────────────────────────────

/// Snapshot of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub job_id: String,
    pub session_id: String,
    pub status: JobStatus,
    /// 0–100.
    pub progress: u8,
    /// Human-readable description of the current step.
    pub stage: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// URL of the uploaded `result.json` once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessingJob {
    fn new(job_id: &str, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            session_id: session_id.to_string(),
            status: JobStatus::Queued,
            progress: 0,
            stage: "Queued".to_string(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            result_ref: None,
            error: None,
        }
    }

    fn apply(&mut self, update: JobUpdate) {
        let now = Utc::now();
        self.status = update.status;
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
        if update.result_ref.is_some() {
            self.result_ref = update.result_ref;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
        self.updated_at = now;
        if self.status.is_terminal() {
            self.completed_at = Some(now);
        }
    }
}

/// One mutation of a job. Fields left `None` keep their current value.
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub stage: Option<String>,
    pub result_ref: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Processing with a new progress value and stage.
    pub fn processing(progress: u8, stage: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: Some(progress),
            stage: Some(stage.into()),
            result_ref: None,
            error: None,
        }
    }

    /// Processing with a new stage; progress unchanged.
    pub fn stage(stage: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Processing,
            progress: None,
            stage: Some(stage.into()),
            result_ref: None,
            error: None,
        }
    }

    pub fn completed(result_ref: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: Some(100),
            stage: Some("Completed".to_string()),
            result_ref: Some(result_ref.into()),
            error: None,
        }
    }

    /// Failed; stage and progress keep their last values.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            stage: None,
            result_ref: None,
            error: Some(error.into()),
        }
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Storage for job records.
pub trait JobStore: Send + Sync {
    /// Register a new job in the queued state. Duplicate ids are rejected.
    fn create(&self, job_id: &str, session_id: &str) -> Result<ProcessingJob, JobStoreError>;

    /// Apply an update. Unknown and terminal jobs are rejected.
    fn update(&self, job_id: &str, update: JobUpdate) -> Result<ProcessingJob, JobStoreError>;

    fn get(&self, job_id: &str) -> Option<ProcessingJob>;

    /// Every job ever submitted for a session, oldest first.
    fn jobs_for_session(&self, session_id: &str) -> Vec<ProcessingJob>;
}

/// Process-local job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, ProcessingJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ProcessingJob>> {
        match self.jobs.read() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProcessingJob>> {
        match self.jobs.write() {
            Ok(g) => g,
            Err(poisoned) => {
                warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl JobStore for InMemoryJobStore {
    fn create(&self, job_id: &str, session_id: &str) -> Result<ProcessingJob, JobStoreError> {
        let mut jobs = self.write();
        if jobs.contains_key(job_id) {
            return Err(JobStoreError::DuplicateJob(job_id.to_string()));
        }
        let job = ProcessingJob::new(job_id, session_id);
        jobs.insert(job_id.to_string(), job.clone());
        Ok(job)
    }

    fn update(&self, job_id: &str, update: JobUpdate) -> Result<ProcessingJob, JobStoreError> {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobStoreError::UnknownJob(job_id.to_string()))?;
        if job.status.is_terminal() {
            return Err(JobStoreError::TerminalJob {
                job_id: job_id.to_string(),
                status: job.status.to_string(),
            });
        }
        job.apply(update);
        Ok(job.clone())
    }

    fn get(&self, job_id: &str) -> Option<ProcessingJob> {
        self.read().get(job_id).cloned()
    }

    fn jobs_for_session(&self, session_id: &str) -> Vec<ProcessingJob> {
        let mut jobs: Vec<ProcessingJob> = self
            .read()
            .values()
            .filter(|j| j.session_id == session_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}
