use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use andtransfer::commands::{build_requests, upload_share};
use andtransfer::errors::{AppError, ParseError, UploadError};
use andtransfer::share_payload::{parse_share_payload, SharePayload};
use andtransfer::uploader::{
    build_request, retry_failed_uploads, BatchSummary, Credentials, DispatchOptions,
    ResourceRef, UploadDispatcher, UploadNotifier, UploadOutcome, UploadStatus, UploadTarget,
    Uploadable,
};

/// Integration tests for the upload pipeline
/// These run real multipart requests against a local mock server

#[derive(Debug, Clone)]
struct ReceivedPart {
    field_name: String,
    file_name: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ReceivedRequest {
    mode: String,
    name: String,
    parts: Vec<ReceivedPart>,
}

#[derive(Clone, Default)]
struct MockServer {
    received: Arc<Mutex<Vec<ReceivedRequest>>>,
    flaky_hits: Arc<AtomicUsize>,
    trickled_bytes: Arc<AtomicUsize>,
}

impl MockServer {
    fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().unwrap().clone()
    }
}

// The first path segment picks the server behaviour
async fn handle_upload(
    State(server): State<MockServer>,
    Path((mode, name)): Path<(String, String)>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> StatusCode {
    // Reads the body slowly and counts bytes as they arrive
    if mode == "trickle" {
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(chunk)) = field.chunk().await {
                server.trickled_bytes.fetch_add(chunk.len(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        return StatusCode::OK;
    }

    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        parts.push(ReceivedPart {
            field_name,
            file_name,
            bytes,
        });
    }

    server.received.lock().unwrap().push(ReceivedRequest {
        mode: mode.clone(),
        name,
        parts,
    });

    match mode.as_str() {
        "ok" => StatusCode::OK,
        "created" => StatusCode::CREATED,
        "reject" => StatusCode::FORBIDDEN,
        "fail" => StatusCode::INTERNAL_SERVER_ERROR,
        "slow" => {
            tokio::time::sleep(Duration::from_secs(10)).await;
            StatusCode::OK
        }
        "auth" => {
            let authorized = headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                == Some("Basic dXNlcjpwYXNz");
            if authorized {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            }
        }
        "flaky" => {
            if server.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            }
        }
        _ => StatusCode::NOT_FOUND,
    }
}

async fn start_server() -> (String, MockServer) {
    let server = MockServer::default();
    let app = Router::new()
        .route("/:mode/:name", post(handle_upload))
        .layer(DefaultBodyLimit::disable())
        .with_state(server.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), server)
}

#[derive(Default)]
struct RecordingNotifier {
    started: Mutex<Vec<usize>>,
    progress: Mutex<Vec<(usize, f32)>>,
    finished: Mutex<Vec<UploadOutcome>>,
    summaries: Mutex<Vec<BatchSummary>>,
    started_signal: Notify,
    progress_signal: Notify,
    finished_signal: Notify,
}

impl UploadNotifier for RecordingNotifier {
    fn upload_started(&self, index: usize, _name: &str) {
        self.started.lock().unwrap().push(index);
        self.started_signal.notify_one();
    }

    fn upload_progress(&self, index: usize, _name: &str, fraction: f32) {
        self.progress.lock().unwrap().push((index, fraction));
        if fraction > 0.0 {
            self.progress_signal.notify_one();
        }
    }

    fn upload_finished(&self, outcome: &UploadOutcome) {
        self.finished.lock().unwrap().push(outcome.clone());
        self.finished_signal.notify_one();
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

fn target(base: &str, mode: &str) -> UploadTarget {
    UploadTarget::new(&format!("{}/{}", base, mode), None).unwrap()
}

fn dispatcher() -> UploadDispatcher {
    UploadDispatcher::new(DispatchOptions::default()).unwrap()
}

fn statuses(outcomes: &[UploadOutcome]) -> Vec<UploadStatus> {
    outcomes.iter().map(|o| o.status.clone()).collect()
}

#[tokio::test]
async fn test_single_text_upload() {
    let (base, server) = start_server().await;
    let notifier = Arc::new(RecordingNotifier::default());

    let uploadables = parse_share_payload(&SharePayload::send_text("hello")).unwrap();
    let specs = build_requests(uploadables, &target(&base, "ok"));
    assert_eq!(specs[0].url, format!("{}/ok/0.txt", base));

    let outcomes = dispatcher()
        .dispatch(specs, notifier.clone(), CancellationToken::new())
        .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].name, "0.txt");
    assert_eq!(outcomes[0].status, UploadStatus::Success(200));
    assert_eq!(outcomes[0].progress_fraction, 1.0);

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].name, "0.txt");
    assert_eq!(received[0].parts.len(), 1);
    assert_eq!(received[0].parts[0].field_name, "0.txt");
    assert_eq!(received[0].parts[0].file_name, None);
    assert_eq!(received[0].parts[0].bytes, b"hello");

    assert_eq!(notifier.started.lock().unwrap().as_slice(), &[0]);
    assert_eq!(notifier.finished.lock().unwrap().len(), 1);
    let summaries = notifier.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message(), "Upload succeeded");
}

#[tokio::test]
async fn test_any_2xx_is_success() {
    let (base, _server) = start_server().await;

    let spec = build_request(Uploadable::text("note", 0), &target(&base, "created"));
    let outcomes = dispatcher()
        .dispatch(vec![spec], Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert_eq!(outcomes[0].status, UploadStatus::Success(201));
}

#[tokio::test]
async fn test_mixed_batch_outcomes_are_index_matched() {
    let (base, _server) = start_server().await;

    let specs = vec![
        build_request(Uploadable::text("a", 0), &target(&base, "ok")),
        build_request(Uploadable::text("b", 1), &target(&base, "reject")),
        build_request(Uploadable::text("c", 2), &target(&base, "fail")),
        build_request(Uploadable::text("d", 3), &target(&base, "ok")),
    ];

    let notifier = Arc::new(RecordingNotifier::default());
    let outcomes = dispatcher()
        .dispatch(specs, notifier.clone(), CancellationToken::new())
        .await;

    let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert_eq!(
        statuses(&outcomes),
        vec![
            UploadStatus::Success(200),
            UploadStatus::Failure(UploadError::ServerRejected { code: 403 }),
            UploadStatus::Failure(UploadError::ServerRejected { code: 500 }),
            UploadStatus::Success(200),
        ]
    );

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.message(), "2 of 4 uploads failed");
    assert_eq!(notifier.finished.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_file_upload_streams_content() {
    let (base, server) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.jpg");
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &content).unwrap();

    let payload = SharePayload::send_file(ResourceRef::new(path.to_string_lossy()));
    let specs = build_requests(
        parse_share_payload(&payload).unwrap(),
        &target(&base, "ok"),
    );

    let notifier = Arc::new(RecordingNotifier::default());
    let outcomes = dispatcher()
        .dispatch(specs, notifier.clone(), CancellationToken::new())
        .await;

    assert_eq!(outcomes[0].name, "photo.jpg");
    assert_eq!(outcomes[0].status, UploadStatus::Success(200));
    assert_eq!(outcomes[0].progress_fraction, 1.0);

    let received = server.received();
    assert_eq!(received.len(), 1);
    let part = &received[0].parts[0];
    assert_eq!(part.field_name, "photo.jpg");
    assert_eq!(part.file_name.as_deref(), Some("photo.jpg"));
    assert_eq!(part.bytes, content);

    let progress = notifier.progress.lock().unwrap();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(progress.iter().all(|(_, f)| (0.0..=1.0).contains(f)));
}

#[tokio::test]
async fn test_text_upload_reports_byte_progress() {
    let (base, server) = start_server().await;
    let text = "abcdefghij".repeat(20_000);

    let spec = build_request(Uploadable::text(text.clone(), 0), &target(&base, "ok"));
    let notifier = Arc::new(RecordingNotifier::default());
    let outcomes = dispatcher()
        .dispatch(vec![spec], notifier.clone(), CancellationToken::new())
        .await;

    assert_eq!(outcomes[0].status, UploadStatus::Success(200));
    assert_eq!(server.received()[0].parts[0].bytes, text.as_bytes());

    let progress = notifier.progress.lock().unwrap();
    assert!(progress.iter().any(|&(_, f)| f > 0.0 && f < 1.0));
    assert!(progress.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[tokio::test]
async fn test_file_url_with_escaped_name() {
    let (base, server) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("my photo.png");
    std::fs::write(&path, b"not really a png").unwrap();

    let url = reqwest::Url::from_file_path(&path).unwrap();
    let payload = SharePayload::view(ResourceRef::new(url.as_str()));
    let specs = build_requests(
        parse_share_payload(&payload).unwrap(),
        &target(&base, "ok"),
    );
    assert_eq!(specs[0].url, format!("{}/ok/my%20photo.png", base));

    let outcomes = dispatcher()
        .dispatch(specs, Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert_eq!(outcomes[0].status, UploadStatus::Success(200));
    let received = server.received();
    assert_eq!(received[0].name, "my photo.png");
    assert_eq!(received[0].parts[0].bytes, b"not really a png");
}

#[tokio::test]
async fn test_missing_file_is_local_io_failure() {
    let (base, server) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("gone.bin");

    let specs = vec![
        build_request(
            Uploadable::file(ResourceRef::new(missing.to_string_lossy())).unwrap(),
            &target(&base, "ok"),
        ),
        build_request(Uploadable::text("still sent", 1), &target(&base, "ok")),
    ];

    let outcomes = dispatcher()
        .dispatch(specs, Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert!(matches!(
        outcomes[0].status,
        UploadStatus::Failure(UploadError::LocalIo(_))
    ));
    assert_eq!(outcomes[1].status, UploadStatus::Success(200));

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].name, "1.txt");
}

#[tokio::test]
async fn test_non_file_scheme_is_local_io_failure() {
    let (base, server) = start_server().await;

    let spec = build_request(
        Uploadable::file(ResourceRef::new("content://media/external/images/42")).unwrap(),
        &target(&base, "ok"),
    );
    assert_eq!(spec.name, "42");

    let outcomes = dispatcher()
        .dispatch(vec![spec], Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert!(matches!(
        outcomes[0].status,
        UploadStatus::Failure(UploadError::LocalIo(_))
    ));
    assert!(server.received().is_empty());
}

#[tokio::test]
async fn test_basic_auth_header_is_sent() {
    let (base, _server) = start_server().await;

    let good = UploadTarget::new(
        &format!("{}/auth", base),
        Some(Credentials::new("user", "pass")),
    )
    .unwrap();
    let bad = UploadTarget::new(
        &format!("{}/auth", base),
        Some(Credentials::new("user", "wrong")),
    )
    .unwrap();
    let anonymous = target(&base, "auth");

    let specs = vec![
        build_request(Uploadable::text("a", 0), &good),
        build_request(Uploadable::text("b", 1), &bad),
        build_request(Uploadable::text("c", 2), &anonymous),
    ];

    let outcomes = dispatcher()
        .dispatch(specs, Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert_eq!(
        statuses(&outcomes),
        vec![
            UploadStatus::Success(200),
            UploadStatus::Failure(UploadError::ServerRejected { code: 401 }),
            UploadStatus::Failure(UploadError::ServerRejected { code: 401 }),
        ]
    );
}

#[tokio::test]
async fn test_connection_refused_is_network_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let target = UploadTarget::new(&format!("http://{}", addr), None).unwrap();
    let spec = build_request(Uploadable::text("hello", 0), &target);

    let outcomes = dispatcher()
        .dispatch(vec![spec], Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    match &outcomes[0].status {
        UploadStatus::Failure(error @ UploadError::Network(_)) => assert!(error.is_retryable()),
        other => panic!("expected network failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let (base, _server) = start_server().await;
    let dispatcher = UploadDispatcher::new(DispatchOptions {
        max_concurrent: 0,
        request_timeout: Duration::from_millis(500),
    })
    .unwrap();

    let specs = vec![
        build_request(Uploadable::text("slow", 0), &target(&base, "slow")),
        build_request(Uploadable::text("fast", 1), &target(&base, "ok")),
    ];

    let outcomes = dispatcher
        .dispatch(specs, Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert_eq!(
        statuses(&outcomes),
        vec![
            UploadStatus::Failure(UploadError::Timeout),
            UploadStatus::Success(200),
        ]
    );
}

#[tokio::test]
async fn test_bounded_concurrency_completes_all() {
    let (base, server) = start_server().await;
    let dispatcher = UploadDispatcher::new(DispatchOptions {
        max_concurrent: 1,
        ..Default::default()
    })
    .unwrap();

    let specs: Vec<_> = (0..5)
        .map(|i| build_request(Uploadable::text(format!("item {}", i), i), &target(&base, "ok")))
        .collect();

    let outcomes = dispatcher
        .dispatch(specs, Arc::new(RecordingNotifier::default()), CancellationToken::new())
        .await;

    assert!(outcomes.iter().all(|o| o.status == UploadStatus::Success(200)));
    let names: Vec<String> = outcomes.iter().map(|o| o.name.clone()).collect();
    assert_eq!(names, vec!["0.txt", "1.txt", "2.txt", "3.txt", "4.txt"]);
    assert_eq!(server.received().len(), 5);
}

#[tokio::test]
async fn test_cancel_keeps_finished_outcomes() {
    let (base, _server) = start_server().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let cancel = CancellationToken::new();

    let specs = vec![
        build_request(Uploadable::text("quick", 0), &target(&base, "ok")),
        build_request(Uploadable::text("stuck", 1), &target(&base, "slow")),
    ];

    let dispatcher = dispatcher();
    let (outcomes, _) = tokio::join!(
        dispatcher.dispatch(specs, notifier.clone(), cancel.clone()),
        async {
            notifier.finished_signal.notified().await;
            cancel.cancel();
        }
    );

    assert_eq!(
        statuses(&outcomes),
        vec![
            UploadStatus::Success(200),
            UploadStatus::Failure(UploadError::Cancelled),
        ]
    );

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.cancelled, 1);
    assert_eq!(summary.message(), "1 of 2 uploads failed (1 cancelled)");
}

#[tokio::test]
async fn test_cancel_stops_queued_uploads() {
    let (base, server) = start_server().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let cancel = CancellationToken::new();
    let dispatcher = UploadDispatcher::new(DispatchOptions {
        max_concurrent: 1,
        ..Default::default()
    })
    .unwrap();

    let specs = vec![
        build_request(Uploadable::text("stuck", 0), &target(&base, "slow")),
        build_request(Uploadable::text("queued", 1), &target(&base, "ok")),
        build_request(Uploadable::text("queued", 2), &target(&base, "ok")),
    ];

    let (outcomes, _) = tokio::join!(
        dispatcher.dispatch(specs, notifier.clone(), cancel.clone()),
        async {
            notifier.started_signal.notified().await;
            cancel.cancel();
        }
    );

    assert!(outcomes
        .iter()
        .all(|o| o.status == UploadStatus::Failure(UploadError::Cancelled)));
    assert_eq!(notifier.started.lock().unwrap().len(), 1);
    assert!(server.received().iter().all(|r| r.mode == "slow"));
}

#[tokio::test]
async fn test_cancel_stops_streaming_file_body() {
    let (base, server) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.mp4");
    let content = vec![7u8; 32 * 1024 * 1024];
    std::fs::write(&path, &content).unwrap();

    let spec = build_request(
        Uploadable::file(ResourceRef::new(path.to_string_lossy())).unwrap(),
        &target(&base, "trickle"),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let cancel = CancellationToken::new();

    let dispatcher = dispatcher();
    let (outcomes, _) = tokio::join!(
        dispatcher.dispatch(vec![spec], notifier.clone(), cancel.clone()),
        async {
            notifier.progress_signal.notified().await;
            cancel.cancel();
        }
    );

    assert_eq!(
        outcomes[0].status,
        UploadStatus::Failure(UploadError::Cancelled)
    );
    assert!(outcomes[0].progress_fraction < 1.0);

    // Let the server drain whatever reached it before the connection closed
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(server.trickled_bytes.load(Ordering::SeqCst) < content.len());

    let progress = notifier.progress.lock().unwrap();
    assert!(progress.iter().all(|&(_, f)| f < 1.0));
}

#[tokio::test]
async fn test_retry_recovers_transient_failure() {
    let (base, server) = start_server().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let cancel = CancellationToken::new();
    let dispatcher = dispatcher();

    let specs = vec![
        build_request(Uploadable::text("a", 0), &target(&base, "ok")),
        build_request(Uploadable::text("b", 1), &target(&base, "flaky")),
        build_request(Uploadable::text("c", 2), &target(&base, "reject")),
    ];

    let outcomes = dispatcher
        .dispatch(specs.clone(), notifier.clone(), cancel.clone())
        .await;
    assert_eq!(
        outcomes[1].status,
        UploadStatus::Failure(UploadError::ServerRejected { code: 503 })
    );

    let outcomes =
        retry_failed_uploads(&dispatcher, &specs, outcomes, 2, notifier.clone(), &cancel).await;

    assert_eq!(
        statuses(&outcomes),
        vec![
            UploadStatus::Success(200),
            UploadStatus::Success(200),
            UploadStatus::Failure(UploadError::ServerRejected { code: 403 }),
        ]
    );
    assert_eq!(outcomes[1].index, 1);

    // 403 is not retried
    let rejected = server
        .received()
        .iter()
        .filter(|r| r.mode == "reject")
        .count();
    assert_eq!(rejected, 1);
    assert_eq!(server.flaky_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_upload_share_end_to_end() {
    let (base, server) = start_server().await;
    let notifier = Arc::new(RecordingNotifier::default());

    let payload = SharePayload::send_multiple_texts(vec![
        "first".to_string(),
        "second".to_string(),
        "third".to_string(),
    ]);

    let report = upload_share(
        &payload,
        &target(&base, "ok"),
        &dispatcher(),
        0,
        notifier.clone(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.summary.all_succeeded());
    assert_eq!(report.summary.message(), "All 3 uploads succeeded");
    assert!(report.finished_at >= report.started_at);

    let mut received: Vec<(String, Vec<u8>)> = server
        .received()
        .into_iter()
        .map(|r| (r.name, r.parts[0].bytes.clone()))
        .collect();
    received.sort();
    assert_eq!(
        received,
        vec![
            ("0.txt".to_string(), b"first".to_vec()),
            ("1.txt".to_string(), b"second".to_vec()),
            ("2.txt".to_string(), b"third".to_vec()),
        ]
    );

    assert_eq!(
        notifier.summaries.lock().unwrap().as_slice(),
        &[report.summary]
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcomes"][1]["status"]["result"], "success");
    assert_eq!(json["outcomes"][1]["status"]["value"], 200);
}

#[tokio::test]
async fn test_upload_share_summary_reflects_retries() {
    let (base, server) = start_server().await;
    let notifier = Arc::new(RecordingNotifier::default());

    let report = upload_share(
        &SharePayload::send_text("x"),
        &target(&base, "flaky"),
        &dispatcher(),
        1,
        notifier.clone(),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.outcomes[0].status, UploadStatus::Success(200));
    assert_eq!(report.summary.message(), "Upload succeeded");
    assert_eq!(server.flaky_hits.load(Ordering::SeqCst), 2);

    // One summary per share, built from the final outcomes
    assert_eq!(
        notifier.summaries.lock().unwrap().as_slice(),
        &[report.summary]
    );

    let finished = notifier.finished.lock().unwrap();
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().all(|o| o.index == 0));
}

#[tokio::test]
async fn test_unnamed_reference_aborts_before_dispatch() {
    let (base, server) = start_server().await;
    let dir = tempfile::tempdir().unwrap();
    let named = dir.path().join("b.txt");
    std::fs::write(&named, b"b").unwrap();

    let payload = SharePayload::send_multiple_files(vec![
        ResourceRef::new("content://media/"),
        ResourceRef::new(named.to_string_lossy()),
    ]);

    let notifier = Arc::new(RecordingNotifier::default());
    let result = upload_share(
        &payload,
        &target(&base, "ok"),
        &dispatcher(),
        0,
        notifier.clone(),
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(AppError::Parse(ParseError::InvalidReference { .. }))
    ));
    assert!(server.received().is_empty());
    assert!(notifier.started.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_aborts_before_dispatch() {
    let (base, server) = start_server().await;

    let payloads: Vec<SharePayload> = vec![
        SharePayload::default(),
        serde_json::from_str(r#"{"action": "android.intent.action.SEND"}"#).unwrap(),
        serde_json::from_str(r#"{"action": "SEND_MULTIPLE", "texts": []}"#).unwrap(),
        serde_json::from_str(r#"{"action": "EDIT", "text": "x"}"#).unwrap(),
    ];

    for payload in payloads {
        let result = upload_share(
            &payload,
            &target(&base, "ok"),
            &dispatcher(),
            0,
            Arc::new(RecordingNotifier::default()),
            CancellationToken::new(),
        )
        .await;

        assert!(
            matches!(result, Err(AppError::Parse(ParseError::Malformed { .. }))),
            "{:?}",
            payload
        );
    }

    assert!(server.received().is_empty());
}
