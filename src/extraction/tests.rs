use super::*;
use serde_json::json;
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sleeper fake that records every requested delay instead of waiting.
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn count(&self) -> usize {
        self.sleeps.lock().expect("lock poisoned").len()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("lock poisoned").push(duration);
    }
}

fn classify(body: serde_json::Value) -> Result<ExtractionResult> {
    let response: UploadResponse =
        serde_json::from_value(body).expect("test payload should deserialize");
    classify_upload(response)
}

#[test]
fn upload_response_with_job_id_is_a_job() {
    let result = classify(json!({"id": "job-42"})).expect("classification should succeed");
    assert_eq!(result, ExtractionResult::Job("job-42".to_string()));
}

#[test]
fn upload_response_with_markdown_is_direct() {
    let result =
        classify(json!({"markdown": "# Title"})).expect("classification should succeed");
    assert_eq!(result, ExtractionResult::Direct("# Title".to_string()));
}

#[test]
fn upload_response_with_text_is_direct() {
    let result = classify(json!({"text": "plain"})).expect("classification should succeed");
    assert_eq!(result, ExtractionResult::Direct("plain".to_string()));
}

#[test]
fn upload_response_with_pages_keeps_page_order() {
    let result = classify(json!({
        "pages": [
            {"text": "first"},
            {"markdown": "second"},
            {}
        ]
    }))
    .expect("classification should succeed");

    assert_eq!(
        result,
        ExtractionResult::Pages(vec![
            "first".to_string(),
            "second".to_string(),
            String::new()
        ])
    );
}

#[test]
fn unrecognized_upload_response_is_an_error() {
    assert!(classify(json!({"unexpected": true})).is_err());
}

#[test]
fn job_state_from_status_string() {
    let pending = JobStatusResponse {
        status: "PENDING".to_string(),
        message: None,
    };
    assert_eq!(job_state(&pending), JobState::Pending);

    let in_progress = JobStatusResponse {
        status: "IN_PROGRESS".to_string(),
        message: None,
    };
    assert_eq!(job_state(&in_progress), JobState::Pending);

    let success = JobStatusResponse {
        status: "SUCCESS".to_string(),
        message: None,
    };
    assert_eq!(job_state(&success), JobState::Succeeded);

    let failed = JobStatusResponse {
        status: "FAILED".to_string(),
        message: Some("bad pdf".to_string()),
    };
    assert_eq!(job_state(&failed), JobState::Failed("bad pdf".to_string()));
}

mod poll_loop {
    use super::*;
    use crate::config::ExtractionConfig;

    fn client_for(server_uri: &str, max_attempts: u32, sleeper: Arc<RecordingSleeper>) -> ParseClient {
        let config = ExtractionConfig {
            base_url: server_uri.to_string(),
            api_key: "test-key".to_string(),
            poll_interval_secs: 10,
            max_poll_attempts: max_attempts,
        };
        ParseClient::new(&config)
            .expect("client should build")
            .with_sleeper(sleeper)
    }

    async fn extract_on_blocking_pool(client: ParseClient) -> Result<String> {
        tokio::task::spawn_blocking(move || client.extract(b"%PDF-1.4", "report.pdf"))
            .await
            .expect("blocking task should not panic")
    }

    async fn mount_upload_job(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/parsing/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "job-1"})))
            .mount(server)
            .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_job_is_polled_until_success() {
        let server = MockServer::start().await;
        mount_upload_job(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})),
            )
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1/result/markdown"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"markdown": "--- page 1 ---\nHello."})),
            )
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_for(&server.uri(), 30, Arc::clone(&sleeper));

        let text = extract_on_blocking_pool(client)
            .await
            .expect("extraction should succeed");

        assert_eq!(text, "--- page 1 ---\nHello.");
        assert_eq!(sleeper.count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transient_status_failure_is_retried() {
        let server = MockServer::start().await;
        mount_upload_job(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "SUCCESS"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1/result/markdown"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"markdown": "ok"})))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_for(&server.uri(), 30, Arc::clone(&sleeper));

        let text = extract_on_blocking_pool(client)
            .await
            .expect("extraction should succeed");

        assert_eq!(text, "ok");
        assert_eq!(sleeper.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_job_is_a_terminal_error() {
        let server = MockServer::start().await;
        mount_upload_job(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "FAILED",
                "message": "encrypted document"
            })))
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_for(&server.uri(), 30, Arc::clone(&sleeper));

        let error = extract_on_blocking_pool(client)
            .await
            .expect_err("failed job should error");

        assert!(error.to_string().contains("encrypted document"));
        assert_eq!(sleeper.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exhausted_attempts_time_out() {
        let server = MockServer::start().await;
        mount_upload_job(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v1/parsing/job/job-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "PENDING"})),
            )
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_for(&server.uri(), 3, Arc::clone(&sleeper));

        let error = extract_on_blocking_pool(client)
            .await
            .expect_err("exhausted polling should error");

        assert!(error.to_string().contains("timed out"));
        assert_eq!(sleeper.count(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn direct_response_skips_polling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/parsing/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"markdown": "inline content"})),
            )
            .mount(&server)
            .await;

        let sleeper = Arc::new(RecordingSleeper::default());
        let client = client_for(&server.uri(), 30, Arc::clone(&sleeper));

        let text = extract_on_blocking_pool(client)
            .await
            .expect("extraction should succeed");

        assert_eq!(text, "inline content");
        assert_eq!(sleeper.count(), 0);
    }
}
