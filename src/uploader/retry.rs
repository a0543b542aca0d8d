//! Caller-side retries. The dispatcher never retries on its own; this
//! re-dispatches the retryable part of a finished batch.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::notifier::UploadNotifier;
use super::progress_tracker::{BatchSummary, UploadOutcome, UploadStatus};
use super::request_builder::UploadRequestSpec;
use super::upload_queue::UploadDispatcher;

/// Indices of outcomes that failed in a way worth another attempt.
pub fn retryable_failures(outcomes: &[UploadOutcome]) -> Vec<usize> {
    outcomes
        .iter()
        .filter(|outcome| match &outcome.status {
            UploadStatus::Failure(error) => error.is_retryable(),
            UploadStatus::Success(_) => false,
        })
        .map(|outcome| outcome.index)
        .collect()
}

/// Maps indices of a retried subset back onto the original batch.
struct RemappedNotifier {
    inner: Arc<dyn UploadNotifier>,
    indices: Vec<usize>,
}

impl RemappedNotifier {
    fn original(&self, index: usize) -> usize {
        self.indices.get(index).copied().unwrap_or(index)
    }
}

impl UploadNotifier for RemappedNotifier {
    fn upload_started(&self, index: usize, name: &str) {
        self.inner.upload_started(self.original(index), name);
    }

    fn upload_progress(&self, index: usize, name: &str, fraction: f32) {
        self.inner.upload_progress(self.original(index), name, fraction);
    }

    fn upload_finished(&self, outcome: &UploadOutcome) {
        let outcome = UploadOutcome {
            index: self.original(outcome.index),
            ..outcome.clone()
        };
        self.inner.upload_finished(&outcome);
    }
}

/// Re-dispatch retryable failures for up to `rounds` rounds, replacing their
/// outcomes in place.
pub async fn retry_failed_uploads(
    dispatcher: &UploadDispatcher,
    specs: &[UploadRequestSpec],
    mut outcomes: Vec<UploadOutcome>,
    rounds: u32,
    notifier: Arc<dyn UploadNotifier>,
    cancel: &CancellationToken,
) -> Vec<UploadOutcome> {
    for round in 1..=rounds {
        if cancel.is_cancelled() {
            break;
        }

        let indices: Vec<usize> = retryable_failures(&outcomes)
            .into_iter()
            .filter(|&index| index < specs.len() && index < outcomes.len())
            .collect();
        if indices.is_empty() {
            break;
        }

        log::info!(
            "Retry round {}/{}: re-uploading {} item(s)",
            round,
            rounds,
            indices.len()
        );

        let subset = indices.iter().map(|&index| specs[index].clone()).collect();
        let remapped: Arc<dyn UploadNotifier> = Arc::new(RemappedNotifier {
            inner: notifier.clone(),
            indices: indices.clone(),
        });

        let retried = dispatcher.dispatch(subset, remapped, cancel.clone()).await;
        log::info!(
            "Retry round {}: {}",
            round,
            BatchSummary::from_outcomes(&retried).message()
        );

        for (outcome, original_index) in retried.into_iter().zip(indices) {
            if let Some(slot) = outcomes.get_mut(original_index) {
                *slot = UploadOutcome {
                    index: original_index,
                    ..outcome
                };
            }
        }
    }

    outcomes
}
