mod support;

use std::sync::Arc;

use audit_chat::{
    BackendError, ClientConfig, HttpCredentialProvider, HttpErrorKind, HttpSessionBackend, Role,
    SessionBackend,
};
use serde_json::json;
use support::{MockResponse, spawn_sequence_server};

fn backend(base_url: &str) -> HttpSessionBackend {
    let mut config = ClientConfig::new(base_url).expect("config");
    config.access_token = Some("tok-1".to_string());
    config.refresh_token = Some("refresh-1".to_string());
    let credentials = Arc::new(HttpCredentialProvider::from_config(&config));
    HttpSessionBackend::new(config, credentials).expect("backend")
}

#[tokio::test]
async fn audit_session_is_decoded_and_id_defaulted() {
    let server = spawn_sequence_server(vec![
        MockResponse::json(
            "GET /audit-sessions/s1 ",
            200,
            json!({ "compliance_domain": "ISO27001", "session_name": "Q2 audit" }),
        )
        .expect("Bearer tok-1"),
    ]);

    let session = backend(&server.base_url)
        .audit_session("s1")
        .await
        .expect("session");
    assert_eq!(session.id, "s1");
    assert_eq!(session.compliance_domain, "ISO27001");
    assert_eq!(session.session_name, "Q2 audit");
}

#[tokio::test]
async fn missing_history_is_not_found() {
    let server = spawn_sequence_server(vec![MockResponse::json(
        "GET /chat/history/c-new ",
        404,
        json!({ "detail": "conversation not found" }),
    )]);

    let error = backend(&server.base_url)
        .chat_history("c-new")
        .await
        .expect_err("history should be missing");
    assert!(error.is_not_found(), "unexpected error: {error:?}");
}

#[tokio::test]
async fn history_uses_backend_field_names() {
    let server = spawn_sequence_server(vec![MockResponse::json(
        "GET /chat/history/c1 ",
        200,
        json!([
            {
                "id": "m1",
                "role": "user",
                "message": "What is clause 4.1?",
                "created_at": "2024-05-01T10:00:00Z"
            },
            {
                "id": "m2",
                "role": "assistant",
                "content": "It covers the organisation's context.",
                "created_at": "2024-05-01T10:00:03Z",
                "sources": ["iso27001.pdf"],
                "response_time_ms": 2900
            }
        ]),
    )]);

    let history = backend(&server.base_url)
        .chat_history("c1")
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "What is clause 4.1?");
    assert_eq!(history[1].sources, vec!["iso27001.pdf".to_string()]);
    assert_eq!(history[1].response_time_ms, Some(2900));
}

#[tokio::test]
async fn history_with_nulls_and_free_form_metadata_still_resumes() {
    let server = spawn_sequence_server(vec![MockResponse::json(
        "GET /chat/history/c1 ",
        200,
        json!([
            {
                "id": "m1",
                "role": "user",
                "message": "Summarise the gaps.",
                "created_at": "2024-05-01T10:00:00Z",
                "sources": null,
                "conversation_id": "c1",
                "audit_session_id": null,
                "compliance_domain": null,
                "metadata": null
            },
            {
                "id": "m2",
                "role": "assistant",
                "content": "Two gaps remain open.",
                "created_at": "2024-05-01T10:00:04Z",
                "sources": ["gap_report.pdf"],
                "response_time_ms": 4180.25,
                "metadata": {
                    "tokens": 42,
                    "cached": false,
                    "scores": [0.91, 0.87],
                    "model": "gpt-4o"
                }
            }
        ]),
    )]);

    let history = backend(&server.base_url)
        .chat_history("c1")
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert!(history[0].sources.is_empty());
    assert_eq!(history[0].audit_session_id, "");
    assert!(history[0].metadata.is_none());
    assert_eq!(history[1].response_time_ms, Some(4180));
    let metadata = history[1].metadata.as_ref().expect("metadata");
    assert_eq!(metadata.get("tokens"), Some(&json!(42)));
    assert_eq!(metadata.get("scores"), Some(&json!([0.91, 0.87])));
    assert_eq!(
        metadata.get("model").and_then(|value| value.as_str()),
        Some("gpt-4o")
    );
}

#[tokio::test]
async fn documents_accept_alternate_filename_field() {
    let server = spawn_sequence_server(vec![MockResponse::json(
        "GET /audit-sessions/s1/documents ",
        200,
        json!([
            { "id": "d1", "file_name": "iso27001.pdf", "document_version": "2022", "document_tags": ["iso"] },
            { "id": "d2", "filename": "access.docx" }
        ]),
    )]);

    let documents = backend(&server.base_url)
        .session_documents("s1")
        .await
        .expect("documents");
    assert_eq!(documents[0].filename, "iso27001.pdf");
    assert_eq!(documents[0].document_version.as_deref(), Some("2022"));
    assert!(documents[1].document_tags.is_empty());
}

#[tokio::test]
async fn backend_requests_share_refresh_handling() {
    let server = spawn_sequence_server(vec![
        MockResponse::text("GET /audit-sessions/s1 ", 401, "expired"),
        MockResponse::json("/auth/refresh", 200, json!({ "access_token": "tok-2" })),
        MockResponse::json(
            "GET /audit-sessions/s1 ",
            200,
            json!({ "id": "s1", "compliance_domain": "SOC2" }),
        )
        .expect("Bearer tok-2"),
    ]);

    let session = backend(&server.base_url)
        .audit_session("s1")
        .await
        .expect("session");
    assert_eq!(session.compliance_domain, "SOC2");
    assert_eq!(server.request_count("/audit-sessions/s1"), 2);
}

#[tokio::test]
async fn server_failure_keeps_status_and_body() {
    let server = spawn_sequence_server(vec![MockResponse::text(
        "GET /audit-sessions/s1/documents ",
        503,
        "maintenance",
    )]);

    let error = backend(&server.base_url)
        .session_documents("s1")
        .await
        .expect_err("documents should fail");
    assert_eq!(
        error,
        BackendError::Status {
            status: 503,
            kind: HttpErrorKind::Server,
            message: "maintenance".to_string(),
        }
    );
}

#[tokio::test]
async fn session_id_is_sent_as_a_single_escaped_segment() {
    let server = spawn_sequence_server(vec![MockResponse::json(
        "GET /audit-sessions/s%201%3Fx ",
        200,
        json!({ "compliance_domain": "GDPR" }),
    )]);

    let session = backend(&server.base_url)
        .audit_session("s 1?x")
        .await
        .expect("session");
    assert_eq!(session.id, "s 1?x");
    assert_eq!(server.request_count("/audit-sessions/"), 1);
}

#[tokio::test]
async fn dot_segment_id_is_rejected_before_any_request() {
    let server = spawn_sequence_server(vec![]);

    let error = backend(&server.base_url)
        .chat_history("..")
        .await
        .expect_err("id should be rejected");
    assert!(matches!(error, BackendError::Configuration(_)));
    assert_eq!(server.request_count("/"), 0);
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = spawn_sequence_server(vec![MockResponse::text(
        "GET /audit-sessions/s1 ",
        200,
        "not json",
    )]);

    let error = backend(&server.base_url)
        .audit_session("s1")
        .await
        .expect_err("decode should fail");
    assert!(matches!(error, BackendError::Decode(_)));
}
