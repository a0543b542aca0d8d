use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::UploadError;

use super::notifier::UploadNotifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum UploadStatus {
    /// Any 2xx response, carrying the status code.
    Success(u16),
    Failure(UploadError),
}

impl UploadStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadStatus::Success(_))
    }
}

impl From<Result<u16, UploadError>> for UploadStatus {
    fn from(result: Result<u16, UploadError>) -> Self {
        match result {
            Ok(code) => UploadStatus::Success(code),
            Err(error) => UploadStatus::Failure(error),
        }
    }
}

/// Terminal result of one item, index-matched to the dispatched specs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub index: usize,
    pub name: String,
    pub status: UploadStatus,
    pub progress_fraction: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemProgress {
    pub name: String,
    pub progress_fraction: f32,
    pub status: Option<UploadStatus>,
    #[serde(skip)]
    last_percent: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub items: Vec<ItemProgress>,
}

/// The one place upload tasks write to. Each item slot takes exactly one
/// terminal status.
pub type ProgressState = Arc<Mutex<BatchProgress>>;

pub fn new_progress_state(batch_id: &str, names: Vec<String>) -> ProgressState {
    let items = names
        .into_iter()
        .map(|name| ItemProgress {
            name,
            progress_fraction: 0.0,
            status: None,
            last_percent: None,
        })
        .collect();

    Arc::new(Mutex::new(BatchProgress {
        batch_id: batch_id.to_string(),
        items,
    }))
}

fn lock_progress<'a>(
    progress_state: &'a ProgressState,
    operation: &str,
) -> MutexGuard<'a, BatchProgress> {
    match progress_state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::error!(
                "Progress lock poisoned during {} (non-critical), recovering",
                operation
            );
            poisoned.into_inner()
        }
    }
}

/// Safe progress state update
pub fn safe_progress_update<F, R>(
    progress_state: &ProgressState,
    index: usize,
    operation: &str,
    f: F,
) -> Option<R>
where
    F: FnOnce(&mut ItemProgress) -> R,
{
    let mut progress = lock_progress(progress_state, operation);
    let batch_id = progress.batch_id.clone();

    match progress.items.get_mut(index) {
        Some(item) => Some(f(item)),
        None => {
            log::warn!(
                "Item {} not found in batch {} for {} operation",
                index,
                batch_id,
                operation
            );
            None
        }
    }
}

/// Returns true when the whole-percent value changed and is worth reporting.
pub fn update_progress_fraction(
    progress_state: &ProgressState,
    index: usize,
    fraction: f32,
) -> bool {
    let fraction = fraction.clamp(0.0, 1.0);

    safe_progress_update(progress_state, index, "progress update", |item| {
        if item.status.is_some() {
            return false;
        }

        item.progress_fraction = fraction;
        let percent = (fraction * 100.0).floor() as u8;
        if item.last_percent == Some(percent) {
            false
        } else {
            item.last_percent = Some(percent);
            true
        }
    })
    .unwrap_or(false)
}

/// Store the terminal status for an item. A second write is ignored.
pub fn record_outcome(
    progress_state: &ProgressState,
    index: usize,
    status: UploadStatus,
) -> Option<UploadOutcome> {
    safe_progress_update(progress_state, index, "outcome update", |item| {
        if let Some(existing) = &item.status {
            log::warn!(
                "Ignoring second outcome for {} (already {:?})",
                item.name,
                existing
            );
            return None;
        }

        if status.is_success() {
            item.progress_fraction = 1.0;
        }
        item.status = Some(status.clone());

        Some(UploadOutcome {
            index,
            name: item.name.clone(),
            status,
            progress_fraction: item.progress_fraction,
        })
    })
    .flatten()
}

pub fn collect_outcomes(progress_state: &ProgressState) -> Vec<UploadOutcome> {
    let progress = lock_progress(progress_state, "collect outcomes");

    progress
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| UploadOutcome {
            index,
            name: item.name.clone(),
            status: item.status.clone().unwrap_or_else(|| {
                log::error!("No outcome recorded for {} in batch {}", item.name, progress.batch_id);
                UploadStatus::Failure(UploadError::Internal("no outcome recorded".to_string()))
            }),
            progress_fraction: item.progress_fraction,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Includes cancelled items.
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[UploadOutcome]) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            match &outcome.status {
                UploadStatus::Success(_) => summary.succeeded += 1,
                UploadStatus::Failure(error) => {
                    summary.failed += 1;
                    if *error == UploadError::Cancelled {
                        summary.cancelled += 1;
                    }
                }
            }
        }

        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn message(&self) -> String {
        if self.failed == 0 {
            return match self.total {
                1 => "Upload succeeded".to_string(),
                n => format!("All {} uploads succeeded", n),
            };
        }

        let mut message = format!("{} of {} uploads failed", self.failed, self.total);
        if self.cancelled > 0 {
            message.push_str(&format!(" ({} cancelled)", self.cancelled));
        }
        message
    }
}

/// Handle one upload task uses to publish its progress and outcome.
#[derive(Clone)]
pub struct ProgressReporter {
    progress_state: ProgressState,
    notifier: Arc<dyn UploadNotifier>,
    index: usize,
    name: String,
}

impl ProgressReporter {
    pub fn new(
        progress_state: ProgressState,
        notifier: Arc<dyn UploadNotifier>,
        index: usize,
        name: String,
    ) -> Self {
        Self {
            progress_state,
            notifier,
            index,
            name,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn started(&self) {
        self.notifier.upload_started(self.index, &self.name);
        self.report_fraction(0.0);
    }

    pub fn report_bytes(&self, sent: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            sent as f32 / total as f32
        };
        self.report_fraction(fraction);
    }

    pub fn report_fraction(&self, fraction: f32) {
        if update_progress_fraction(&self.progress_state, self.index, fraction) {
            self.notifier
                .upload_progress(self.index, &self.name, fraction.clamp(0.0, 1.0));
        }
    }

    /// Returns false when the item already had a terminal outcome.
    pub fn finish(&self, result: Result<u16, UploadError>) -> bool {
        match record_outcome(&self.progress_state, self.index, result.into()) {
            Some(outcome) => {
                self.notifier.upload_finished(&outcome);
                true
            }
            None => false,
        }
    }
}
