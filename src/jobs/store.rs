//! Persistence for job records.
//!
//! [`JobStore`] is the seam to whatever broker or result backend a
//! deployment uses. Every transition is checked inside the store, so a
//! record can never leave a terminal state and progress can never go
//! backwards, whichever task writes to it.
//!
//! [`InMemoryJobStore`] keeps records in a map for a single process. A
//! persistent backend must also expire abandoned `Progress` jobs (a worker
//! that died mid-run); that is not something an in-process map can detect.

use crate::error::{JobError, Stage};
use crate::jobs::model::{JobId, JobRecord, JobState};
use crate::progress::ProgressUpdate;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Add a new `Queued` record. Fails if the id is already known.
    async fn insert(&self, record: JobRecord) -> Result<(), JobError>;

    /// Move a `Queued` job to `Progress`.
    ///
    /// Returns `false` if the job was already claimed or finished. Only the
    /// caller that gets `true` may run the pipeline for this job.
    async fn claim(&self, id: &JobId) -> Result<bool, JobError>;

    /// Store a progress snapshot for a running job. The percentage never
    /// goes below the stored one; updates to terminal jobs are ignored.
    async fn record_progress(&self, id: &JobId, update: ProgressUpdate) -> Result<(), JobError>;

    /// `Progress → Succeeded` with the output document.
    async fn succeed(&self, id: &JobId, output: Vec<u8>) -> Result<(), JobError>;

    /// `Queued` or `Progress → Failed`, keeping the last progress snapshot.
    async fn fail(&self, id: &JobId, error: String, stage: Stage) -> Result<(), JobError>;

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, JobError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn not_found(id: &JobId) -> JobError {
    JobError::NotFound(id.to_string())
}

fn bad_transition(record: &JobRecord, to: JobState) -> JobError {
    JobError::Store(format!(
        "job {} cannot move from {} to {}",
        record.id, record.state, to
    ))
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<(), JobError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(JobError::Store(format!("job {} already exists", record.id)));
        }
        records.insert(record.id, record);
        Ok(())
    }

    async fn claim(&self, id: &JobId) -> Result<bool, JobError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_found(id))?;
        if record.state != JobState::Queued {
            debug!("Job {} already claimed ({})", id, record.state);
            return Ok(false);
        }
        record.state = JobState::Progress;
        Ok(true)
    }

    async fn record_progress(&self, id: &JobId, update: ProgressUpdate) -> Result<(), JobError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_found(id))?;
        if record.state != JobState::Progress {
            warn!("Ignoring progress for job {} in state {}", id, record.state);
            return Ok(());
        }
        let percent = update.percent.max(record.progress.percent);
        record.progress = ProgressUpdate::new(update.stage, percent, update.detail);
        Ok(())
    }

    async fn succeed(&self, id: &JobId, output: Vec<u8>) -> Result<(), JobError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_found(id))?;
        if record.state != JobState::Progress {
            return Err(bad_transition(record, JobState::Succeeded));
        }
        record.state = JobState::Succeeded;
        record.result = Some(output);
        Ok(())
    }

    async fn fail(&self, id: &JobId, error: String, stage: Stage) -> Result<(), JobError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(id).ok_or_else(|| not_found(id))?;
        if record.state.is_terminal() {
            return Err(bad_transition(record, JobState::Failed));
        }
        record.state = JobState::Failed;
        record.error = Some(error);
        record.failed_stage = Some(stage);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, JobError> {
        Ok(self.records.read().await.get(id).cloned())
    }
}
