use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::{AppResult, UploadError};

use super::notifier::UploadNotifier;
use super::progress_tracker::{
    collect_outcomes, new_progress_state, record_outcome, BatchSummary, ProgressReporter,
    UploadOutcome, UploadStatus,
};
use super::request_builder::UploadRequestSpec;
use super::upload_client::UploadClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on uploads in flight. 0 means unbounded.
    pub max_concurrent: usize,
    /// Budget for each request on its own.
    pub request_timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Runs a batch of upload requests concurrently.
///
/// There are no automatic retries: each item is attempted once and its failure
/// is terminal for this dispatch.
pub struct UploadDispatcher {
    client: Arc<UploadClient>,
    max_concurrent: usize,
}

impl UploadDispatcher {
    pub fn new(options: DispatchOptions) -> AppResult<Self> {
        Ok(Self {
            client: Arc::new(UploadClient::new(options.request_timeout)?),
            max_concurrent: options.max_concurrent,
        })
    }

    /// Upload every spec and wait until all of them are terminal.
    ///
    /// Outcomes are returned in input order regardless of completion order.
    /// Cancelling `cancel` stops items still in flight or waiting; those
    /// resolve to `UploadError::Cancelled` while finished items keep their
    /// real outcome.
    pub async fn dispatch(
        &self,
        specs: Vec<UploadRequestSpec>,
        notifier: Arc<dyn UploadNotifier>,
        cancel: CancellationToken,
    ) -> Vec<UploadOutcome> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let total = specs.len();
        let start_time = Instant::now();

        log::info!(
            "Dispatching batch {} with {} upload(s), max concurrent: {}",
            batch_id,
            total,
            if self.max_concurrent == 0 {
                "unbounded".to_string()
            } else {
                self.max_concurrent.to_string()
            }
        );

        let names = specs.iter().map(|spec| spec.name.clone()).collect();
        let progress_state = new_progress_state(&batch_id, names);
        let semaphore =
            (self.max_concurrent > 0).then(|| Arc::new(Semaphore::new(self.max_concurrent)));

        let handles: Vec<_> = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let client = self.client.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let reporter = ProgressReporter::new(
                    progress_state.clone(),
                    notifier.clone(),
                    index,
                    spec.name.clone(),
                );

                tokio::spawn(async move {
                    let _permit = match semaphore {
                        Some(semaphore) => {
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => {
                                    log::debug!("{} cancelled while queued", spec.name);
                                    reporter.finish(Err(UploadError::Cancelled));
                                    return;
                                }
                                permit = semaphore.acquire_owned() => permit.ok(),
                            }
                        }
                        None => None,
                    };

                    reporter.started();
                    let result = client.upload(&spec, &reporter, &cancel).await;
                    reporter.finish(result);
                })
            })
            .collect();

        for (index, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                log::error!("Upload task {} in batch {} failed: {}", index, batch_id, e);
                let status = UploadStatus::Failure(UploadError::Internal(format!(
                    "upload task failed: {}",
                    e
                )));
                if let Some(outcome) = record_outcome(&progress_state, index, status) {
                    notifier.upload_finished(&outcome);
                }
            }
        }

        let outcomes = collect_outcomes(&progress_state);
        let summary = BatchSummary::from_outcomes(&outcomes);

        log::info!(
            "Batch {} finished in {:.1}s: {}/{} successful, {} failed, {} cancelled",
            batch_id,
            start_time.elapsed().as_secs_f64(),
            summary.succeeded,
            summary.total,
            summary.failed,
            summary.cancelled
        );

        notifier.batch_finished(&summary);
        outcomes
    }
}
