//! ORCID client behavior against a mocked HTTP server.

use std::time::Duration;

use corella_directory::{OrcidClient, OrcidConfig, OrcidError, OrcidLookup};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> OrcidConfig {
    OrcidConfig {
        api_url: server.uri(),
        token_url: format!("{}/oauth/token", server.uri()),
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        max_attempts: 3,
        retry_delay: Duration::from_millis(10),
    }
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "scope": "/read-public",
        })))
        .mount(server)
        .await;
}

fn search_result(orcids: &[&str]) -> serde_json::Value {
    json!({
        "num-found": orcids.len(),
        "result": orcids
            .iter()
            .map(|id| json!({"orcid-identifier": {"path": id}}))
            .collect::<Vec<_>>(),
    })
}

#[tokio::test]
async fn test_search_by_email_found() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "email:alice@example.edu"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(search_result(&["0000-0002-1825-0097"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let orcid = client.search_by_email("alice@example.edu").await.unwrap();
    assert_eq!(orcid.as_deref(), Some("0000-0002-1825-0097"));
}

#[tokio::test]
async fn test_search_by_email_none() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&[])))
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let orcid = client.search_by_email("nobody@example.edu").await.unwrap();
    assert_eq!(orcid, None);
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    // Two failures, then success, within the three-attempt budget.
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(search_result(&["0000-0001-5000-0001"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let orcid = client.search_by_email("alice@example.edu").await.unwrap();
    assert_eq!(orcid.as_deref(), Some("0000-0001-5000-0001"));
}

#[tokio::test]
async fn test_retries_exhausted_propagates_status() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let err = client.search_by_email("alice@example.edu").await.unwrap_err();
    assert!(matches!(err, OrcidError::Status { status: 500 }));
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let err = client.search_by_email("alice@example.edu").await.unwrap_err();
    assert!(matches!(err, OrcidError::Status { status: 400 }));
}

#[tokio::test]
async fn test_multiple_matches_is_fatal() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&[
            "0000-0001-0000-0001",
            "0000-0001-0000-0002",
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let err = client.search_by_email("shared@example.edu").await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, OrcidError::DuplicateMapping { .. }));
}

#[tokio::test]
async fn test_search_by_text_collects_all_matches() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "text:alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_result(&[
            "0000-0001-0000-0001",
            "0000-0001-0000-0002",
        ])))
        .mount(&server)
        .await;

    let client = OrcidClient::new(test_config(&server));
    let ids = client.search_by_text("alice").await.unwrap();
    assert_eq!(ids.len(), 2);
}
