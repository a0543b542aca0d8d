// Uploader module - turns uploadables into multipart requests and runs them
//
// Building is synchronous and pure; only dispatch introduces concurrency.

pub mod notifier;
pub mod progress_tracker;
pub mod request_builder;
pub mod retry;
pub mod upload_client;
pub mod upload_queue;
pub mod uploadable;

pub use notifier::{ItemEventsNotifier, LogNotifier, UploadNotifier};
pub use progress_tracker::{BatchSummary, UploadOutcome, UploadStatus};
pub use request_builder::{build_request, Credentials, UploadRequestSpec, UploadTarget};
pub use retry::retry_failed_uploads;
pub use upload_queue::{DispatchOptions, UploadDispatcher};
pub use uploadable::{ResourceRef, Uploadable};
