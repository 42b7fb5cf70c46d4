//! Progress reporting for a pipeline run.
//!
//! The orchestrator reports through a [`ProgressSink`]; the job runner's sink
//! forwards each update into the job store so status queries can see it.
//! [`ProgressTracker`] sits in between and enforces that reported
//! percentages stay within `[0, 100]` and never go backwards.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_translate::{ProgressSink, ProgressUpdate};
//! use std::sync::atomic::{AtomicU8, Ordering};
//!
//! struct LastPercent(AtomicU8);
//!
//! impl ProgressSink for LastPercent {
//!     fn on_progress(&self, update: &ProgressUpdate) {
//!         self.0.store(update.percent, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::error::Stage;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// One progress report: where the run is, how far along, and a short note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: Stage,
    /// Always within `[0, 100]`.
    pub percent: u8,
    pub detail: String,
}

impl ProgressUpdate {
    pub fn new(stage: Stage, percent: u8, detail: impl Into<String>) -> Self {
        Self {
            stage,
            percent: percent.min(100),
            detail: detail.into(),
        }
    }
}

/// Receives progress updates from the pipeline.
///
/// Implementations must be `Send + Sync`; the pipeline may report from a
/// different task than the one that created the sink.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, update: &ProgressUpdate);
}

/// Discards every update.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

impl<T: ProgressSink + ?Sized> ProgressSink for Arc<T> {
    fn on_progress(&self, update: &ProgressUpdate) {
        (**self).on_progress(update)
    }
}

/// Clamps and de-regresses updates before forwarding them.
///
/// A report lower than the last one keeps the last percentage but still
/// carries the new stage and detail.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: Mutex<ProgressUpdate>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: Mutex::new(ProgressUpdate::new(Stage::Start, 0, "")),
        }
    }

    /// Report progress; `percent` is clamped to `[0, 100]` and to at least
    /// the previously reported value.
    pub fn report(&self, stage: Stage, percent: f64, detail: impl Into<String>) {
        let clamped = if percent.is_finite() {
            percent.clamp(0.0, 100.0).floor() as u8
        } else {
            0
        };
        let update = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            let update = ProgressUpdate::new(stage, clamped.max(last.percent), detail);
            *last = update.clone();
            update
        };
        self.sink.on_progress(&update);
    }

    /// The most recent update, or the initial `start / 0` if none was sent.
    pub fn last(&self) -> ProgressUpdate {
        self.last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Linear interpolation of `done / total` into `[from, to]`.
///
/// An empty total counts as complete.
pub fn interpolate(from: f64, to: f64, done: usize, total: usize) -> f64 {
    if total == 0 {
        return to;
    }
    let fraction = (done.min(total) as f64) / (total as f64);
    from + (to - from) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressUpdate>>);

    impl ProgressSink for Recorder {
        fn on_progress(&self, update: &ProgressUpdate) {
            self.0.lock().unwrap().push(update.clone());
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        NoopProgressSink.on_progress(&ProgressUpdate::new(Stage::Ocr, 10, "x"));
    }

    #[test]
    fn tracker_clamps_and_never_regresses() {
        let rec = Recorder::default();
        let tracker = ProgressTracker::new(&rec);
        tracker.report(Stage::Ocr, 10.0, "a");
        tracker.report(Stage::Ocr, 5.0, "b");
        tracker.report(Stage::Translation, 150.0, "c");
        tracker.report(Stage::Rendering, -3.0, "d");
        tracker.report(Stage::Rendering, f64::NAN, "e");

        let seen: Vec<u8> = rec.0.lock().unwrap().iter().map(|u| u.percent).collect();
        assert_eq!(seen, vec![10, 10, 100, 100, 100]);
        assert_eq!(tracker.last().detail, "e");
        assert_eq!(tracker.last().stage, Stage::Rendering);
    }

    #[test]
    fn interpolation() {
        assert_eq!(interpolate(20.0, 80.0, 0, 10), 20.0);
        assert_eq!(interpolate(20.0, 80.0, 5, 10), 50.0);
        assert_eq!(interpolate(20.0, 80.0, 10, 10), 80.0);
        assert_eq!(interpolate(20.0, 80.0, 12, 10), 80.0);
        assert_eq!(interpolate(20.0, 80.0, 0, 0), 80.0);
    }

    #[test]
    fn arc_dyn_sink_works() {
        let rec = Arc::new(Recorder::default());
        let sink: Arc<dyn ProgressSink> = rec.clone();
        sink.on_progress(&ProgressUpdate::new(Stage::Complete, 200, "done"));
        assert_eq!(rec.0.lock().unwrap()[0].percent, 100);
    }
}
