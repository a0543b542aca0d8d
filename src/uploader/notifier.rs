use std::sync::Arc;

use super::progress_tracker::{BatchSummary, UploadOutcome, UploadStatus};

/// Receives upload status as it happens so it can be shown to the user.
///
/// Called from the upload tasks, so implementations must be cheap and must not
/// block.
pub trait UploadNotifier: Send + Sync {
    fn upload_started(&self, index: usize, name: &str);

    fn upload_progress(&self, index: usize, name: &str, fraction: f32);

    fn upload_finished(&self, outcome: &UploadOutcome);

    fn batch_finished(&self, _summary: &BatchSummary) {}
}

/// Reports everything through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl UploadNotifier for LogNotifier {
    fn upload_started(&self, index: usize, name: &str) {
        log::info!("Upload #{} started: {}", index, name);
    }

    fn upload_progress(&self, index: usize, name: &str, fraction: f32) {
        log::debug!(
            "Upload #{} {}: {}%",
            index,
            name,
            (fraction * 100.0).round() as u32
        );
    }

    fn upload_finished(&self, outcome: &UploadOutcome) {
        match &outcome.status {
            UploadStatus::Success(code) => {
                log::info!("Upload #{} {} finished ({})", outcome.index, outcome.name, code)
            }
            UploadStatus::Failure(error) => {
                log::warn!("Upload #{} {} failed: {}", outcome.index, outcome.name, error)
            }
        }
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        if summary.failed == 0 {
            log::info!("{}", summary.message());
        } else {
            log::warn!("{}", summary.message());
        }
    }
}

/// Forwards per-item events and drops batch summaries, so a caller running
/// several dispatch rounds can report one summary for the final outcomes.
pub struct ItemEventsNotifier {
    inner: Arc<dyn UploadNotifier>,
}

impl ItemEventsNotifier {
    pub fn new(inner: Arc<dyn UploadNotifier>) -> Self {
        Self { inner }
    }
}

impl UploadNotifier for ItemEventsNotifier {
    fn upload_started(&self, index: usize, name: &str) {
        self.inner.upload_started(index, name);
    }

    fn upload_progress(&self, index: usize, name: &str, fraction: f32) {
        self.inner.upload_progress(index, name, fraction);
    }

    fn upload_finished(&self, outcome: &UploadOutcome) {
        self.inner.upload_finished(outcome);
    }
}
