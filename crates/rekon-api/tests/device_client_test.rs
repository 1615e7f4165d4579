#![allow(clippy::unwrap_used)]
// Integration tests for `DeviceClient` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rekon_api::{DeviceClient, Error, TransportConfig, WireObject};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, DeviceClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = DeviceClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn cmdb_path(suffix: &str) -> String {
    format!("/api/v2/cmdb/{suffix}")
}

fn object(value: serde_json::Value) -> WireObject {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

// ── Read tests ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_get_object() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(cmdb_path("firewall/policy/3")))
        .and(query_param("scope", "root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "http_status": 200,
            "version": "v6.2.3",
            "results": [{
                "policyid": 3,
                "name": "allow-dns",
                "srcintf": [{ "name": "port1" }]
            }]
        })))
        .mount(&server)
        .await;

    let obj = client
        .get_object("firewall/policy", "3", Some("root"))
        .await
        .unwrap();

    assert_eq!(obj["policyid"], 3);
    assert_eq!(obj["name"], "allow-dns");
    assert_eq!(obj["srcintf"][0]["name"], "port1");
}

#[tokio::test]
async fn test_get_object_http_404_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(cmdb_path("firewall/policy/99")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": "error",
            "http_status": 404
        })))
        .mount(&server)
        .await;

    let err = client
        .get_object("firewall/policy", "99", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got: {err:?}");
}

#[tokio::test]
async fn test_get_object_empty_results_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(cmdb_path("firewall/policy/5")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "results": []
        })))
        .mount(&server)
        .await;

    let err = client
        .get_object("firewall/policy", "5", None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::NotFound { ref path } if path == "firewall/policy/5"),
        "got: {err:?}"
    );
}

// ── Write tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_object_returns_ack() {
    let (server, client) = setup().await;
    let body = object(json!({ "name": "web", "session-ttl": 300 }));

    Mock::given(method("POST"))
        .and(path(cmdb_path("firewall/policy")))
        .and(body_json(json!({ "name": "web", "session-ttl": 300 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "http_status": 200,
            "mkey": 17
        })))
        .mount(&server)
        .await;

    let ack = client
        .create_object("firewall/policy", &body, None)
        .await
        .unwrap();
    assert_eq!(ack["mkey"], 17);
}

#[tokio::test]
async fn test_update_object_sends_partial_body() {
    let (server, client) = setup().await;
    let body = object(json!({ "comments": null }));

    Mock::given(method("PUT"))
        .and(path(cmdb_path("firewall/policy/17")))
        .and(query_param("scope", "dmz"))
        .and(body_json(json!({ "comments": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "http_status": 200,
            "mkey": 17
        })))
        .mount(&server)
        .await;

    client
        .update_object("firewall/policy", "17", &body, Some("dmz"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_object() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path(cmdb_path("firewall/address/lan-net")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "http_status": 200
        })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .delete_object("firewall/address", "lan-net", None)
        .await
        .unwrap();
}

// ── Version probe ───────────────────────────────────────────────────

#[tokio::test]
async fn test_api_version() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/monitor/system/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "version": "v6.2.4",
            "build": 1112,
            "results": { "hostname": "edge-1" }
        })))
        .mount(&server)
        .await;

    assert_eq!(client.api_version().await.unwrap(), "v6.2.4");
}

// ── Error tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.get_object("firewall/policy", "1", None).await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_envelope_error_with_http_200() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path(cmdb_path("firewall/policy")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "error",
            "http_status": 500,
            "error": -651,
            "cli_error": "invalid session-ttl"
        })))
        .mount(&server)
        .await;

    let result = client
        .create_object("firewall/policy", &WireObject::new(), None)
        .await;

    match result {
        Err(Error::Api {
            ref message,
            code,
            status,
        }) => {
            assert_eq!(message, "invalid session-ttl");
            assert_eq!(code, Some(-651));
            assert_eq!(status, 500);
        }
        other => panic!("expected Api error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited_reads_retry_after() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client
        .get_object("firewall/policy", "1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited { retry_after_secs: 7 }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_bearer_header_is_sent() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let key = secrecy::SecretString::from("s3cr3t".to_owned());
    let client = DeviceClient::new(base_url, &key, &TransportConfig::default()).unwrap();

    Mock::given(method("GET"))
        .and(path("/api/v2/monitor/system/status"))
        .and(header("authorization", "Bearer s3cr3t"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "version": "v7.0.1"
        })))
        .mount(&server)
        .await;

    assert_eq!(client.api_version().await.unwrap(), "v7.0.1");
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let key = secrecy::SecretString::from("k".to_owned());
    let transport = TransportConfig {
        timeout: std::time::Duration::from_secs(1),
        ..TransportConfig::default()
    };
    let client = DeviceClient::new(base_url, &key, &transport).unwrap();

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(3))
                .set_body_json(json!({ "status": "success", "results": [] })),
        )
        .mount(&server)
        .await;

    let err = client
        .get_object("firewall/policy", "1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { timeout_secs: 1 }), "got: {err:?}");
    assert!(err.is_transient());
}
