use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::errors::AppResult;
use crate::share_payload::{parse_share_payload, SharePayload};
use crate::uploader::{
    build_request, retry_failed_uploads, BatchSummary, ItemEventsNotifier, UploadDispatcher,
    UploadNotifier, UploadOutcome, UploadRequestSpec, UploadTarget, Uploadable,
};

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<UploadOutcome>,
    pub summary: BatchSummary,
}

pub fn build_requests(
    uploadables: Vec<Uploadable>,
    target: &UploadTarget,
) -> Vec<UploadRequestSpec> {
    uploadables
        .into_iter()
        .map(|item| build_request(item, target))
        .collect()
}

/// Parse a share payload and upload everything it contains.
///
/// A payload that cannot be parsed aborts before any request is sent. Upload
/// failures are per item and reported in the returned `BatchReport`.
pub async fn upload_share(
    payload: &SharePayload,
    target: &UploadTarget,
    dispatcher: &UploadDispatcher,
    retry_rounds: u32,
    notifier: Arc<dyn UploadNotifier>,
    cancel: CancellationToken,
) -> AppResult<BatchReport> {
    let started_at = Utc::now();

    let uploadables = parse_share_payload(payload).map_err(|e| {
        log::error!("Rejected share payload: {}", e);
        e
    })?;

    let specs = build_requests(uploadables, target);
    log::info!(
        "Uploading {} item(s) to {}",
        specs.len(),
        target.base_url()
    );

    // The notifier gets one summary, built from the outcomes after retries
    let item_events: Arc<dyn UploadNotifier> =
        Arc::new(ItemEventsNotifier::new(notifier.clone()));

    let outcomes = dispatcher
        .dispatch(specs.clone(), item_events.clone(), cancel.clone())
        .await;
    let outcomes = if retry_rounds > 0 {
        retry_failed_uploads(
            dispatcher,
            &specs,
            outcomes,
            retry_rounds,
            item_events,
            &cancel,
        )
        .await
    } else {
        outcomes
    };

    let summary = BatchSummary::from_outcomes(&outcomes);
    notifier.batch_finished(&summary);

    Ok(BatchReport {
        started_at,
        finished_at: Utc::now(),
        outcomes,
        summary,
    })
}
