//! Asynchronous jobs around the pipeline: records, storage and the runner.

pub mod model;
pub mod runner;
pub mod store;

pub use model::{JobId, JobRecord, JobState, JobStatus, Phase, ResultPayload};
pub use runner::JobRunner;
pub use store::{InMemoryJobStore, JobStore};
