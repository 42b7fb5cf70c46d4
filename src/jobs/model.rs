//! Job records and the status payload served to callers.

use crate::error::Stage;
use crate::progress::ProgressUpdate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one submitted run. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Coarse lifecycle state.
///
/// `Queued → Progress → {Succeeded, Failed}`; the last two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Progress,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "QUEUED",
            JobState::Progress => "PROGRESS",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Fine-grained phase shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Queued,
    Ocr,
    Translation,
    Rendering,
    Succeeded,
    Failed,
}

impl Phase {
    /// Phase of a job in `state` whose last report was at `stage`.
    pub fn of(state: JobState, stage: Stage) -> Self {
        match state {
            JobState::Queued => Phase::Queued,
            JobState::Succeeded => Phase::Succeeded,
            JobState::Failed => Phase::Failed,
            JobState::Progress => match stage {
                Stage::Start | Stage::Ocr => Phase::Ocr,
                Stage::Translation => Phase::Translation,
                Stage::Rendering | Stage::Complete => Phase::Rendering,
            },
        }
    }
}

/// Everything the store keeps about one job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    /// Last progress snapshot. Frozen once the job is terminal.
    pub progress: ProgressUpdate,
    /// Output document, present only when `Succeeded`.
    pub result: Option<Vec<u8>>,
    /// Failure description, present only when `Failed`.
    pub error: Option<String>,
    /// Stage the failure came from.
    pub failed_stage: Option<Stage>,
}

impl JobRecord {
    pub fn queued(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Queued,
            progress: ProgressUpdate::new(Stage::Start, 0, "Queued"),
            result: None,
            error: None,
            failed_stage: None,
        }
    }

    /// Caller-facing view. Results smaller than `inline_limit` bytes are
    /// embedded; anything at or above it is replaced by a download reference.
    pub fn status(&self, inline_limit: usize) -> JobStatus {
        let result = self.result.as_ref().map(|bytes| {
            if bytes.len() < inline_limit {
                ResultPayload::Inline {
                    size: bytes.len(),
                    data: bytes.clone(),
                }
            } else {
                ResultPayload::Download {
                    size: bytes.len(),
                    href: download_path(&self.id),
                }
            }
        });
        JobStatus {
            id: self.id,
            state: self.state,
            phase: Phase::of(self.state, self.progress.stage),
            progress: self.progress.percent,
            stage: self.progress.stage,
            detail: self.progress.detail.clone(),
            result,
            error: self.error.clone(),
            failed_stage: self.failed_stage,
        }
    }
}

/// Retrieval path for results too large to inline.
pub fn download_path(id: &JobId) -> String {
    format!("jobs/{}/result", id)
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub phase: Phase,
    /// Percent in `[0, 100]`.
    pub progress: u8,
    pub stage: Stage,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
}

/// The output of a succeeded job, inline or by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultPayload {
    Inline {
        size: usize,
        /// Base64 in JSON.
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    Download { size: usize, href: String },
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique_and_parse() {
        let a = JobId::new();
        let b = JobId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<JobId>().unwrap(), a);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn phase_follows_state_then_stage() {
        assert_eq!(Phase::of(JobState::Queued, Stage::Translation), Phase::Queued);
        assert_eq!(Phase::of(JobState::Progress, Stage::Start), Phase::Ocr);
        assert_eq!(Phase::of(JobState::Progress, Stage::Translation), Phase::Translation);
        assert_eq!(Phase::of(JobState::Progress, Stage::Complete), Phase::Rendering);
        assert_eq!(Phase::of(JobState::Failed, Stage::Translation), Phase::Failed);
    }

    #[test]
    fn small_result_is_inline_base64() {
        let mut record = JobRecord::queued(JobId::new());
        record.state = JobState::Succeeded;
        record.result = Some(b"%PDF".to_vec());

        let json = serde_json::to_value(record.status(1024)).unwrap();
        assert_eq!(json["state"], "SUCCEEDED");
        assert_eq!(json["phase"], "succeeded");
        assert_eq!(json["result"]["kind"], "inline");
        assert_eq!(json["result"]["data"], "JVBERg==");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn large_result_is_a_download_reference() {
        let id = JobId::new();
        let mut record = JobRecord::queued(id);
        record.state = JobState::Succeeded;
        record.result = Some(vec![0u8; 10]);

        match record.status(4).result {
            Some(ResultPayload::Download { size, href }) => {
                assert_eq!(size, 10);
                assert_eq!(href, format!("jobs/{id}/result"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inline_limit_is_exclusive() {
        let limit = 1024 * 1024;
        let mut record = JobRecord::queued(JobId::new());
        record.state = JobState::Succeeded;

        record.result = Some(vec![0u8; limit - 1]);
        assert!(matches!(
            record.status(limit).result,
            Some(ResultPayload::Inline { size, .. }) if size == limit - 1
        ));

        record.result = Some(vec![0u8; limit]);
        assert!(matches!(
            record.status(limit).result,
            Some(ResultPayload::Download { size, .. }) if size == limit
        ));
    }

    #[test]
    fn status_json_round_trips() {
        let mut record = JobRecord::queued(JobId::new());
        record.state = JobState::Succeeded;
        record.result = Some(vec![1, 2, 3, 250]);
        let status = record.status(1024);
        let json = serde_json::to_string(&status).unwrap();
        let back: JobStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
