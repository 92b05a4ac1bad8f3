#![allow(clippy::unwrap_used)]
// Integration tests for `SprinklerClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sprinkly_api::{Error, ResultCode, SprinklerClient, Verb};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, SprinklerClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = SprinklerClient::with_client(
        reqwest::Client::new(),
        base_url,
        "opendoor".to_string().into(),
    );
    (server, client)
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

// ── Status tests ────────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_status_returns_document() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ja"))
        .and(query_param("pw", "opendoor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "settings": { "nbrd": 1, "en": 1, "rd": 0 },
            "options": { "hwv": 33 },
            "status": { "sn": [0, 1] }
        })))
        .mount(&server)
        .await;

    let doc = client.fetch_status().await.unwrap();
    assert_eq!(doc["settings"]["nbrd"], 1);
    assert_eq!(doc["status"]["sn"][1], 1);
}

#[tokio::test]
async fn test_fetch_status_rejected_password() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ja"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 2 })))
        .mount(&server)
        .await;

    let err = client.fetch_status().await.unwrap_err();
    assert_eq!(err.result_code(), Some(ResultCode::Unauthorized));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_fetch_status_http_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ja"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client.fetch_status().await.unwrap_err();
    assert!(
        matches!(err, Error::Http { status: 500 }),
        "expected Http error, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_fetch_status_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/ja"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
        .mount(&server)
        .await;

    let result = client.fetch_status().await;
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body.contains("nope")),
        "expected Deserialization error, got: {result:?}"
    );
}

// ── Command tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_success() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cm"))
        .and(query_param("sid", "3"))
        .and(query_param("en", "1"))
        .and(query_param("t", "600"))
        .and(query_param("pw", "opendoor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .send_command(
            Verb::ManualStation,
            &params(&[("sid", "3"), ("en", "1"), ("t", "600")]),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_command_surfaces_result_code() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 17 })))
        .mount(&server)
        .await;

    let result = client
        .send_command(Verb::ChangeVariables, &params(&[("rd", "9999")]))
        .await;

    assert_eq!(
        result.as_ref().err().and_then(Error::result_code),
        Some(ResultCode::OutOfRange),
        "unexpected result: {result:?}"
    );
}

#[tokio::test]
async fn test_send_command_unknown_code() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": 99 })))
        .mount(&server)
        .await;

    let result = client
        .send_command(Verb::StationDisable, &params(&[("d0", "0")]))
        .await;

    assert!(
        matches!(
            result,
            Err(Error::Device {
                code: ResultCode::Unknown(99)
            })
        ),
        "expected unknown result code, got: {result:?}"
    );
}
