/// Integration tests with a mocked email API
/// Exercises the full submission pipeline (honeypot, rate limiter,
/// validation, formatting, dispatch) without a real upstream.
use alloggiati_api::config::Config;
use alloggiati_api::dispatcher::{Attachment, EmailClient};
use alloggiati_api::errors::AppError;
use alloggiati_api::handlers::{router, submit_checkin, AppState};
use alloggiati_api::rate_limit::InMemoryCounterStore;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Json;
use tower::ServiceExt;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper function to create test config
fn create_test_config(email_api_base_url: String) -> Config {
    Config {
        port: 8080,
        email_api_key: "test_key".to_string(),
        email_api_base_url,
        sender_name: "Test Sender".to_string(),
        sender_email: "sender@test.com".to_string(),
        recipient_email: "host@test.com".to_string(),
        subject_prefix: "Check-in".to_string(),
        rate_limit_max: 3,
        rate_limit_window_secs: 3600,
    }
}

fn create_state(config: Config) -> Arc<AppState> {
    let email_client = EmailClient::new(
        config.email_api_base_url.clone(),
        config.email_api_key.clone(),
        config.sender_name.clone(),
        config.sender_email.clone(),
        config.recipient_email.clone(),
    )
    .unwrap();
    let rate_limiter = Arc::new(InMemoryCounterStore::new(
        config.rate_limit_max,
        Duration::from_secs(config.rate_limit_window_secs),
    ));
    Arc::new(AppState {
        config,
        email_client,
        rate_limiter,
    })
}

fn valid_payload() -> serde_json::Value {
    serde_json::json!({
        "appartamento": "Trilo",
        "dataArrivo": "2024-07-01",
        "dataPartenza": "2024-07-05",
        "numeroNotti": 4,
        "guests": [{
            "cognome": "Rossi",
            "nome": "Mario",
            "sesso": "1",
            "dataNascita": "1990-05-20",
            "cittadinanza": "100000100"
        }]
    })
}

#[tokio::test]
async fn test_successful_submission_dispatches_email() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .and(header("api-key", "test_key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "messageId": "<test@smtp-relay>"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = create_state(create_test_config(mock_server.uri()));
    let result = submit_checkin(State(state), HeaderMap::new(), Ok(Json(valid_payload()))).await;

    let response = result.expect("submission should succeed");
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get("x-ratelimit-limit").unwrap().to_str().unwrap(),
        "3"
    );
    assert_eq!(
        headers
            .get("x-ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap(),
        "2"
    );

    // The outbound message carries subject, summary and three attachments
    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["subject"].as_str().unwrap(),
        "Check-in Trilo - arrivo 01/07/2024"
    );
    assert!(body["textContent"].as_str().unwrap().contains("Rossi"));
    assert_eq!(body["attachment"].as_array().unwrap().len(), 3);
    assert_eq!(body["to"][0]["email"].as_str().unwrap(), "host@test.com");
}

#[tokio::test]
async fn test_honeypot_accepts_without_dispatch() {
    let mock_server = MockServer::start().await;

    // Zero calls expected: the trap must never reach the email API
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = create_state(create_test_config(mock_server.uri()));
    let mut payload = valid_payload();
    payload["honeypot"] = serde_json::json!("filled by a bot");

    let result = submit_checkin(State(state), HeaderMap::new(), Ok(Json(payload))).await;
    let response = result.expect("honeypot submissions are silently accepted");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_rejects_after_max() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let mut config = create_test_config(mock_server.uri());
    config.rate_limit_max = 2;
    let state = create_state(config);

    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

    for _ in 0..2 {
        let result = submit_checkin(
            State(state.clone()),
            headers.clone(),
            Ok(Json(valid_payload())),
        )
        .await;
        assert!(result.is_ok());
    }

    let result = submit_checkin(State(state), headers, Ok(Json(valid_payload()))).await;
    match result {
        Err(AppError::RateLimited { limit }) => assert_eq!(limit, 2),
        other => panic!("Expected rate-limit rejection, got {:?}", other.is_ok()),
    }
}

#[tokio::test]
async fn test_rate_limit_window_elapses() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let config = create_test_config(mock_server.uri());
    let email_client = EmailClient::new(
        config.email_api_base_url.clone(),
        config.email_api_key.clone(),
        config.sender_name.clone(),
        config.sender_email.clone(),
        config.recipient_email.clone(),
    )
    .unwrap();
    // Short window so the test can observe the reset
    let rate_limiter = Arc::new(InMemoryCounterStore::new(1, Duration::from_millis(100)));
    let state = Arc::new(AppState {
        config,
        email_client,
        rate_limiter,
    });

    let ok = submit_checkin(State(state.clone()), HeaderMap::new(), Ok(Json(valid_payload()))).await;
    assert!(ok.is_ok());
    let rejected =
        submit_checkin(State(state.clone()), HeaderMap::new(), Ok(Json(valid_payload()))).await;
    assert!(matches!(rejected, Err(AppError::RateLimited { .. })));

    tokio::time::sleep(Duration::from_millis(150)).await;

    let again = submit_checkin(State(state), HeaderMap::new(), Ok(Json(valid_payload()))).await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_validation_error_has_no_side_effects() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = create_state(create_test_config(mock_server.uri()));
    let mut payload = valid_payload();
    payload["dataArrivo"] = serde_json::json!("01/07/2024");

    let result = submit_checkin(State(state), HeaderMap::new(), Ok(Json(payload))).await;
    match result {
        Err(AppError::BadRequest(msg)) => assert!(msg.contains("dataArrivo")),
        other => panic!("Expected validation error, got {:?}", other.is_ok()),
    }
}

#[tokio::test]
async fn test_rejected_submission_keeps_quota_intact() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    // A single slot in the window: if the malformed attempt consumed it,
    // the valid one would be rejected with 429.
    let mut config = create_test_config(mock_server.uri());
    config.rate_limit_max = 1;
    let state = create_state(config);

    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "203.0.113.9".parse().unwrap());

    let mut malformed = valid_payload();
    malformed["dataArrivo"] = serde_json::json!("01/07/2024");
    let rejected = submit_checkin(
        State(state.clone()),
        headers.clone(),
        Ok(Json(malformed)),
    )
    .await;
    assert!(matches!(rejected, Err(AppError::BadRequest(_))));

    let accepted = submit_checkin(State(state), headers, Ok(Json(valid_payload()))).await;
    let response = accepted.expect("quota must be untouched by the rejected attempt");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-remaining")
            .unwrap()
            .to_str()
            .unwrap(),
        "0"
    );
}

#[tokio::test]
async fn test_wrong_method_answers_json_405() {
    let state = create_state(create_test_config("http://127.0.0.1:1".to_string()));
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/v1/checkin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "method_not_allowed");
}

#[tokio::test]
async fn test_missing_content_type_answers_json_400() {
    let state = create_state(create_test_config("http://127.0.0.1:1".to_string()));
    let app = router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/checkin")
                .header("content-type", "text/plain")
                .body(Body::from(valid_payload().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_upstream_rate_limit_maps_to_try_later() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .mount(&mock_server)
        .await;

    let state = create_state(create_test_config(mock_server.uri()));
    let result = submit_checkin(State(state), HeaderMap::new(), Ok(Json(valid_payload()))).await;

    match result {
        Err(AppError::DispatchError { user_message, .. }) => {
            assert!(user_message.contains("try again later"));
        }
        other => panic!("Expected dispatch error, got {:?}", other.is_ok()),
    }
}

#[tokio::test]
async fn test_upstream_auth_failure_maps_to_administrator() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&mock_server)
        .await;

    let state = create_state(create_test_config(mock_server.uri()));
    let result = submit_checkin(State(state), HeaderMap::new(), Ok(Json(valid_payload()))).await;

    match result {
        Err(AppError::DispatchError {
            user_message,
            detail,
        }) => {
            assert!(user_message.contains("contact the administrator"));
            // Upstream detail is kept for logging, never shown to the caller
            assert!(detail.contains("401"));
        }
        other => panic!("Expected dispatch error, got {:?}", other.is_ok()),
    }
}

#[tokio::test]
async fn test_upstream_server_error_maps_to_generic() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let state = create_state(create_test_config(mock_server.uri()));
    let result = submit_checkin(State(state), HeaderMap::new(), Ok(Json(valid_payload()))).await;

    match result {
        Err(AppError::DispatchError { user_message, .. }) => {
            assert!(user_message.contains("please try again"));
            assert!(!user_message.contains("boom"));
        }
        other => panic!("Expected dispatch error, got {:?}", other.is_ok()),
    }
}

#[tokio::test]
async fn test_email_client_direct_send() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v3/smtp/email"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = EmailClient::new(
        mock_server.uri(),
        "test_key".to_string(),
        "Sender".to_string(),
        "sender@test.com".to_string(),
        "host@test.com".to_string(),
    )
    .unwrap();

    let attachments = vec![Attachment {
        name: "alloggiati_010724.txt".to_string(),
        content: "MTZ8dGVzdA==".to_string(),
    }];
    let result = client
        .send_checkin(
            "Check-in Trilo - arrivo 01/07/2024",
            "Ospite 1: Rossi Mario",
            Some("guest@test.com"),
            &attachments,
        )
        .await;
    assert!(result.is_ok());

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(
        body["replyTo"]["email"].as_str().unwrap(),
        "guest@test.com"
    );
    assert_eq!(
        body["attachment"][0]["name"].as_str().unwrap(),
        "alloggiati_010724.txt"
    );
}

#[tokio::test]
async fn test_unreachable_email_api_maps_to_dispatch_error() {
    // Nothing listens here; the transport error must surface as the
    // generic dispatch failure, not a panic or a raw reqwest message.
    let client = EmailClient::new(
        "http://127.0.0.1:1".to_string(),
        "test_key".to_string(),
        "Sender".to_string(),
        "sender@test.com".to_string(),
        "host@test.com".to_string(),
    )
    .unwrap();

    let result = client.send_checkin("subject", "body", None, &[]).await;
    match result {
        Err(AppError::DispatchError { user_message, .. }) => {
            assert!(user_message.contains("please try again"));
        }
        other => panic!("Expected dispatch error, got {:?}", other.is_ok()),
    }
}
