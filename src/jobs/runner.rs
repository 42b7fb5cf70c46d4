//! Runs pipeline jobs in the background and answers status queries.
//!
//! `submit` stores a `Queued` record and returns its id straight away. The
//! run itself happens on a spawned task that first waits for a concurrency
//! permit, then claims the job in the store. Claiming is the only way into
//! `Progress`, so a job that is submitted once runs at most once even if
//! several workers share a store.
//!
//! Progress from the pipeline travels over a channel and is written to the
//! store by a forwarder running alongside the pipeline, so the pipeline
//! never waits on the store.

use crate::error::{JobError, Stage};
use crate::jobs::model::{JobId, JobRecord, JobState, JobStatus};
use crate::jobs::store::JobStore;
use crate::orchestrator::Pipeline;
use crate::progress::{ProgressSink, ProgressUpdate};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{error, info, warn};

/// Forwards pipeline progress into a channel.
struct ChannelSink(mpsc::UnboundedSender<ProgressUpdate>);

impl ProgressSink for ChannelSink {
    fn on_progress(&self, update: &ProgressUpdate) {
        // The receiver only goes away once the run is over.
        let _ = self.0.send(update.clone());
    }
}

pub struct JobRunner {
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    inline_limit: usize,
    finished: Arc<Notify>,
}

impl JobRunner {
    /// `concurrency` bounds how many pipelines run at once; further jobs
    /// stay `Queued` until a slot frees up.
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Arc<Pipeline>,
        concurrency: usize,
        inline_limit: usize,
    ) -> Self {
        Self {
            store,
            pipeline,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            inline_limit,
            finished: Arc::new(Notify::new()),
        }
    }

    /// Queue `document` for translation.
    pub async fn submit(&self, document: Vec<u8>) -> Result<JobId, JobError> {
        let id = JobId::new();
        self.store.insert(JobRecord::queued(id)).await?;
        info!("Submitted job {} ({} bytes)", id, document.len());

        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let permits = Arc::clone(&self.permits);
        let finished = Arc::clone(&self.finished);

        tokio::spawn(async move {
            let worker = tokio::spawn(execute(Arc::clone(&store), pipeline, permits, id, document));
            if let Err(e) = worker.await {
                error!("Job {} worker died: {}", id, e);
                let stage = match store.get(&id).await {
                    Ok(Some(record)) => record.progress.stage,
                    _ => Stage::Start,
                };
                if let Err(e) = store.fail(&id, format!("Worker failed: {}", e), stage).await {
                    warn!("Could not mark job {} failed: {}", id, e);
                }
            }
            finished.notify_waiters();
        });

        Ok(id)
    }

    /// Current state, progress and (when done) result or error.
    pub async fn status(&self, id: &JobId) -> Result<JobStatus, JobError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        Ok(record.status(self.inline_limit))
    }

    /// The output document of a succeeded job, whatever its size.
    pub async fn download(&self, id: &JobId) -> Result<Vec<u8>, JobError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        match (record.state, record.result) {
            (JobState::Succeeded, Some(bytes)) => Ok(bytes),
            (state, _) => Err(JobError::NotReady {
                id: id.to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Wait until the job is `Succeeded` or `Failed`.
    pub async fn wait(&self, id: &JobId) -> Result<JobStatus, JobError> {
        loop {
            let notified = self.finished.notified();
            let status = self.status(id).await?;
            if status.state.is_terminal() {
                return Ok(status);
            }
            notified.await;
        }
    }
}

async fn execute(
    store: Arc<dyn JobStore>,
    pipeline: Arc<Pipeline>,
    permits: Arc<Semaphore>,
    id: JobId,
    document: Vec<u8>,
) {
    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            warn!("Job {}: runner closed before start", id);
            let error = "Runner shut down before the job started".to_string();
            give_up(store.as_ref(), &id, error, Stage::Start).await;
            return;
        }
    };

    match store.claim(&id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Job {} was already claimed; not running it again", id);
            return;
        }
        Err(e) => {
            error!("Job {}: claim failed: {}", id, e);
            let error = format!("Could not start job: {}", e);
            give_up(store.as_ref(), &id, error, Stage::Start).await;
            return;
        }
    }

    let started = Instant::now();
    if let Err(e) = store
        .record_progress(&id, ProgressUpdate::new(Stage::Start, 0, "Started"))
        .await
    {
        warn!("Job {}: could not record start: {}", id, e);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let pipeline_ref = pipeline.as_ref();
    let document_ref: &[u8] = &document;
    let store_ref = store.as_ref();

    let run = async move {
        let sink = ChannelSink(tx);
        pipeline_ref.run(document_ref, &sink).await
    };
    let forward = async move {
        while let Some(update) = rx.recv().await {
            if let Err(e) = store_ref.record_progress(&id, update).await {
                warn!("Job {}: could not record progress: {}", id, e);
            }
        }
    };
    let (result, ()) = tokio::join!(run, forward);

    match result {
        Ok(output) => {
            info!(
                "Job {} succeeded in {}ms ({} bytes)",
                id,
                started.elapsed().as_millis(),
                output.len()
            );
            if let Err(e) = store.succeed(&id, output).await {
                error!("Job {}: could not store result: {}", id, e);
                let error = format!("Could not store result: {}", e);
                give_up(store.as_ref(), &id, error, Stage::Complete).await;
            }
        }
        Err(e) => {
            warn!("Job {} failed during {}: {}", id, e.stage(), e);
            give_up(store.as_ref(), &id, e.to_string(), e.stage()).await;
        }
    }
}

/// Mark the job failed; a job must never be left `Queued` or `Progress`
/// once its worker is done with it.
async fn give_up(store: &dyn JobStore, id: &JobId, error: String, stage: Stage) {
    if let Err(e) = store.fail(id, error, stage).await {
        error!("Job {}: could not store failure: {}", id, e);
    }
}
