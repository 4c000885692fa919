//! Dhiway adapter against a wiremock wallet and issuer.

use serde_json::json;
use walletgate_core::provider::{
    DhiwayConfig, DhiwayProvider, OnboardRequest, QrUpload, VcJsonResolver, WalletProvider,
    WatchRegistrar, WatchRequest,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> DhiwayProvider {
    DhiwayProvider::new(DhiwayConfig {
        api_base: server.uri(),
        api_key: "test-api-key".into(),
        issuer_instance_uri: server.uri(),
        issuer_vc_base_uri: format!("{}/vc", server.uri()),
        watcher_email: "watcher@gw.example".into(),
        ..Default::default()
    })
    .expect("provider")
}

fn watch_request(public_id: &str) -> WatchRequest {
    WatchRequest {
        vc_public_id: public_id.into(),
        identifier: None,
        callback_url: "https://gw.example/api/wallet/vcs/watch/callback".into(),
        email: None,
    }
}

async fn mount_document(server: &MockServer, public_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/vc/{public_id}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "publicId": public_id,
            "identifier": format!("did:cord:{public_id}"),
        })))
        .mount(server)
        .await;
}

// ── Watch registration ──────────────────────────────────────────────────

#[tokio::test]
async fn watch_success_posts_identifier_and_callback() {
    let server = MockServer::start().await;
    mount_document(&server, "pub-1").await;

    Mock::given(method("POST"))
        .and(path("/api/watch"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(body_partial_json(json!({
            "recordPublicId": "pub-1",
            "identifier": "did:cord:pub-1",
            "email": "watcher@gw.example",
            "callbackUrl": "https://gw.example/api/wallet/vcs/watch/callback",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"messageId": "w-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = provider(&server)
        .watch_vc(watch_request("pub-1"))
        .await
        .expect("watch");

    assert_eq!(receipt.status_code, 201);
    assert_eq!(receipt.watch_id.as_deref(), Some("w-1"));
    assert_eq!(receipt.watcher_email.as_deref(), Some("watcher@gw.example"));
}

#[tokio::test]
async fn watch_conflict_is_normalized_to_success() {
    let server = MockServer::start().await;
    mount_document(&server, "pub-2").await;

    Mock::given(method("POST"))
        .and(path("/api/watch"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = provider(&server)
        .watch_vc(watch_request("pub-2"))
        .await
        .expect("watch");

    assert_eq!(receipt.status_code, 200);
    assert_eq!(receipt.message, "VC watch already registered");
}

#[tokio::test]
async fn watch_rejection_passes_status_through() {
    let server = MockServer::start().await;
    mount_document(&server, "pub-3").await;

    Mock::given(method("POST"))
        .and(path("/api/watch"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let err = provider(&server)
        .watch_vc(watch_request("pub-3"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
}

// ── Issuer documents ────────────────────────────────────────────────────

#[tokio::test]
async fn unavailable_issuer_fails_watch_after_one_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vc/pub-4.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/watch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = provider(&server)
        .watch_vc(watch_request("pub-4"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 503);

    let requests = server.received_requests().await.expect("recorded requests");
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn issuer_document_is_fetched_once() {
    let server = MockServer::start().await;
    mount_document(&server, "pub-5").await;

    let document = provider(&server)
        .get_vc_json_by_identifier("ada", "pub-5", "token")
        .await
        .expect("document");
    assert_eq!(document["publicId"], "pub-5");
    assert_eq!(server.received_requests().await.expect("recorded requests").len(), 1);
}

#[tokio::test]
async fn issuer_document_not_found_maps_to_404() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vc/missing.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server)
        .fetch_issuer_document("missing")
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

// ── Wallet API ──────────────────────────────────────────────────────────

#[tokio::test]
async fn list_skips_otp_credentials_and_sorts_newest_first() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/cred"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "c-old",
                "active": true,
                "details": {"documentTitle": "Degree"},
                "credentialVC": {
                    "id": "https://issuer.example/v/pub-old",
                    "validFrom": "2024-01-01T00:00:00Z",
                    "credentialSchema": {"title": "Degree:v1"}
                }
            },
            {
                "id": "c-otp",
                "details": {"documentTitle": "otp"}
            },
            {
                "id": "c-new",
                "active": true,
                "identifier": "rec-new",
                "credentialVC": "{\"validFrom\":\"2025-06-01T00:00:00Z\"}"
            }
        ])))
        .mount(&server)
        .await;

    let vcs = provider(&server)
        .get_all_vcs("acc-1", "user-token")
        .await
        .expect("list");

    let ids: Vec<&str> = vcs.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["c-new", "c-old"]);
    assert_eq!(vcs[1].name, "Degree");
    assert_eq!(vcs[1].public_id.as_deref(), Some("pub-old"));
    assert_eq!(vcs[0].identifier.as_deref(), Some("rec-new"));
}

#[tokio::test]
async fn onboard_returns_token_and_did() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/custom-user/create"))
        .and(body_partial_json(json!({"accountId": "ext-7", "name": "Ada Lovelace"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "t-7", "did": "did:cord:7"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let account = provider(&server)
        .onboard_user(&OnboardRequest {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            external_user_id: Some("ext-7".into()),
            username: "ada".into(),
            password: "pw".into(),
            email: None,
            phone: None,
        })
        .await
        .expect("onboard");

    assert_eq!(account.account_id, "ext-7");
    assert_eq!(account.token, "t-7");
    assert_eq!(account.did.as_deref(), Some("did:cord:7"));
}

#[tokio::test]
async fn upload_without_did_is_rejected_before_any_request() {
    let server = MockServer::start().await;

    let err = provider(&server)
        .upload_vc_from_qr(&QrUpload {
            account_id: "acc".into(),
            qr_data: format!("{}/v/pub-9", server.uri()),
            token: "t".into(),
            did: None,
        })
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), 400);
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn upload_posts_message_for_user_did() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v/pub-9.vc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "urn:vc:9",
            "credentialSubject": {"name": "Transcript"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/message/create/did:cord:ada"))
        .and(body_partial_json(json!({
            "fromDid": "did:cord:ada",
            "details": {"documentTitle": "Transcript"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"messageId": "m-9"})))
        .expect(1)
        .mount(&server)
        .await;

    let receipt = provider(&server)
        .upload_vc_from_qr(&QrUpload {
            account_id: "acc".into(),
            qr_data: format!("{}/v/pub-9", server.uri()),
            token: "t".into(),
            did: Some("did:cord:ada".into()),
        })
        .await
        .expect("upload");

    assert_eq!(receipt.vc_id, "m-9");
}
