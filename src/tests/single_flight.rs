use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::tests::test_support::harness;
use crate::{CredentialPair, OutboundRequest};

const CONCURRENT_REQUESTS: usize = 6;

#[tokio::test]
async fn concurrent_401s_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/system/bgworker"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(CONCURRENT_REQUESTS as u64)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/system/bgworker"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 0})))
        .expect(CONCURRENT_REQUESTS as u64)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "data": {"access_token": "fresh", "refresh_token": "refresh-2"}
                }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server, CredentialPair::new("stale", "refresh-1"));
    let requests = (0..CONCURRENT_REQUESTS).map(|i| {
        h.gateway
            .request(OutboundRequest::get("/system/bgworker").query("page", i.to_string()))
    });
    let results = futures::future::join_all(requests).await;

    for result in results {
        result.expect("every request is replayed successfully");
    }
    assert!(!h.gateway.coordinator().is_refreshing());
    assert_eq!(h.gateway.access_token(), "fresh");
}

#[tokio::test]
async fn later_failure_starts_a_fresh_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("Authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("Authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 0})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"access_token": "fresh", "refresh_token": "refresh-2"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, CredentialPair::new("stale", "refresh-1"));
    h.gateway.get("/profile").await.expect("first round");

    // Simulate the new access token expiring.
    h.gateway
        .update_token(&CredentialPair::new("stale", "refresh-2"))
        .unwrap();
    h.gateway.get("/profile").await.expect("second round");
}
