use futures_util::{Stream, StreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppResult, UploadError};

use super::progress_tracker::ProgressReporter;
use super::request_builder::{MultipartBody, UploadRequestSpec};

/// Failure observed while streaming a file body, which reqwest only reports
/// as an opaque body error.
type BodyFailure = Arc<Mutex<Option<UploadError>>>;

const TEXT_CHUNK_SIZE: usize = 8 * 1024;

/// Executes single upload requests.
pub struct UploadClient {
    client: Client,
}

impl UploadClient {
    pub fn new(request_timeout: Duration) -> AppResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }

    /// POST one spec. Resolves to the 2xx status code or a classified failure.
    pub async fn upload(
        &self,
        spec: &UploadRequestSpec,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<u16, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let body_failure: BodyFailure = Arc::new(Mutex::new(None));
        let form = build_form(&spec.body, reporter, cancel, &body_failure).await?;

        let mut request = self
            .client
            .request(spec.method.clone(), &spec.url)
            .multipart(form);
        if let Some(auth_header) = &spec.auth_header {
            request = request.header(AUTHORIZATION, auth_header);
        }

        log::debug!("POST {} ({})", spec.url, spec.name);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Upload of {} cancelled in flight", spec.name);
                return Err(UploadError::Cancelled);
            }
            result = request.send() => result,
        };

        let response =
            response.map_err(|e| classify_request_error(e, cancel, &body_failure))?;
        let status = response.status();

        if status.is_success() {
            reporter.report_fraction(1.0);
            return Ok(status.as_u16());
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        log::warn!(
            "Server rejected {} with {}: {}",
            spec.name,
            status,
            error_text.chars().take(300).collect::<String>()
        );

        Err(UploadError::ServerRejected {
            code: status.as_u16(),
        })
    }
}

async fn build_form(
    body: &MultipartBody,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
    body_failure: &BodyFailure,
) -> Result<Form, UploadError> {
    match body {
        MultipartBody::Text { field_name, value } => {
            let total = value.len() as u64;
            let chunks: Vec<io::Result<Vec<u8>>> = value
                .as_bytes()
                .chunks(TEXT_CHUNK_SIZE)
                .map(|chunk| Ok(chunk.to_vec()))
                .collect();
            let stream = counted_stream(
                futures_util::stream::iter(chunks),
                total,
                reporter,
                cancel,
                body_failure,
            );

            let part = Part::stream_with_length(Body::wrap_stream(stream), total);
            Ok(Form::new().part(field_name.clone(), part))
        }
        MultipartBody::File {
            field_name,
            file_name,
            source,
            mime_type,
        } => {
            let path = source.to_file_path().ok_or_else(|| {
                UploadError::LocalIo(format!("{} does not refer to a local file", source))
            })?;

            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| UploadError::LocalIo(format!("{}: {}", path.display(), e)))?;
            let total = file
                .metadata()
                .await
                .map_err(|e| UploadError::LocalIo(format!("{}: {}", path.display(), e)))?
                .len();

            let stream =
                counted_stream(ReaderStream::new(file), total, reporter, cancel, body_failure);

            let part = Part::stream_with_length(Body::wrap_stream(stream), total)
                .file_name(file_name.clone())
                .mime_str(mime_type)
                .map_err(|e| UploadError::Internal(format!("invalid MIME type: {}", e)))?;

            Ok(Form::new().part(field_name.clone(), part))
        }
    }
}

/// Counts body bytes into progress. Stops yielding as soon as cancellation is
/// observed; a read error is kept as `LocalIo`.
fn counted_stream<S, B>(
    stream: S,
    total: u64,
    reporter: &ProgressReporter,
    cancel: &CancellationToken,
    body_failure: &BodyFailure,
) -> impl Stream<Item = io::Result<B>> + Send + Sync + 'static
where
    S: Stream<Item = io::Result<B>> + Send + Sync + 'static,
    B: AsRef<[u8]> + Send + Sync + 'static,
{
    let reporter = reporter.clone();
    let cancel = cancel.clone();
    let body_failure = body_failure.clone();
    let mut sent: u64 = 0;

    stream.map(move |chunk| {
        if cancel.is_cancelled() {
            set_body_failure(&body_failure, UploadError::Cancelled);
            return Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled"));
        }

        match chunk {
            Ok(bytes) => {
                sent += bytes.as_ref().len() as u64;
                reporter.report_bytes(sent, total);
                Ok(bytes)
            }
            Err(e) => {
                set_body_failure(&body_failure, UploadError::LocalIo(e.to_string()));
                Err(e)
            }
        }
    })
}

fn set_body_failure(body_failure: &BodyFailure, error: UploadError) {
    match body_failure.lock() {
        Ok(mut slot) => {
            slot.get_or_insert(error);
        }
        Err(e) => {
            log::warn!("Failed to record body failure (non-critical): {}", e);
        }
    }
}

fn classify_request_error(
    error: reqwest::Error,
    cancel: &CancellationToken,
    body_failure: &BodyFailure,
) -> UploadError {
    if cancel.is_cancelled() {
        return UploadError::Cancelled;
    }

    if let Ok(mut slot) = body_failure.lock() {
        if let Some(failure) = slot.take() {
            return failure;
        }
    }

    if error.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Network(error.to_string())
    }
}
