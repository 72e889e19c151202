use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use studio_vision::credential::{
    CREDENTIAL_SLOT, Credential, HostKeySelector, KeyManager, encode_for_storage,
};
use studio_vision::data_url::DataUrl;
use studio_vision::gemini::GeminiApi;
use studio_vision::presets::StudioStyle;
use studio_vision::session::{ResultHistory, Studio};
use studio_vision::storage::{KeyValueStore, MemoryStorage};
use studio_vision::transform::{OUTPUT_DIRECTIVE, Transformer};
use studio_vision::StudioError;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE_PATH: &str = "/models/gemini-2.5-flash-image:generateContent";
const PROBE_PATH: &str = "/models/gemini-3-flash-preview:generateContent";

fn input() -> DataUrl {
    DataUrl::new("image/png", "iVBORw0KGgo=")
}

fn image_response(mime_type: &str, data: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"parts": [{"inlineData": {"mimeType": mime_type, "data": data}}]},
            "finishReason": "STOP"
        }]
    })
}

async fn store_key(store: &MemoryStorage, value: &str) {
    let credential = Credential::new(value).unwrap();
    store
        .put(CREDENTIAL_SLOT, &encode_for_storage(&credential))
        .await
        .unwrap();
}

fn transformer(server: &MockServer, store: Arc<MemoryStorage>) -> Transformer {
    let api = Arc::new(GeminiApi::new(server.uri()));
    let keys = Arc::new(KeyManager::new(store, api.clone()));
    Transformer::new(keys, api)
}

#[tokio::test]
async fn test_success_recombines_segment_media_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .and(header("x-goog-api-key", "key-a"))
        .and(body_partial_json(json!({
            "contents": [{"parts": [{"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}]}],
            "generationConfig": {"imageConfig": {"aspectRatio": "1:1"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response("image/webp", "UklGRg==")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    store_key(&store, "key-a").await;
    let result = transformer(&server, store)
        .transform(&input(), "Make it glossy.")
        .await
        .unwrap();

    assert_eq!(result.mime_type(), "image/webp");
    assert_eq!(result.to_string(), "data:image/webp;base64,UklGRg==");
}

#[tokio::test]
async fn test_instruction_includes_directive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response("image/png", "AAAA")))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    store_key(&store, "key-a").await;
    transformer(&server, store)
        .transform(&input(), "Make it glossy.")
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let text = body["contents"][0]["parts"][1]["text"].as_str().unwrap();
    assert!(text.starts_with("Make it glossy."));
    assert!(text.contains(OUTPUT_DIRECTIVE));
}

#[tokio::test]
async fn test_missing_credential_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = transformer(&server, Arc::new(MemoryStorage::new()))
        .transform(&input(), "anything")
        .await
        .unwrap_err();
    assert!(matches!(err, StudioError::NoCredential));
}

#[tokio::test]
async fn test_auth_error_invalidates_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED"}
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    store_key(&store, "revoked").await;
    let transformer = transformer(&server, store.clone());
    assert!(transformer.keys().is_ready().await);

    let err = transformer.transform(&input(), "anything").await.unwrap_err();
    match err {
        StudioError::AuthError(msg) => assert!(msg.contains("Permission denied")),
        other => panic!("expected auth error, got {other:?}"),
    }
    assert!(!transformer.keys().is_ready().await);
    assert_eq!(store.get(CREDENTIAL_SLOT).await.unwrap(), None);

    // next call fails locally
    let err = transformer.transform(&input(), "anything").await.unwrap_err();
    assert!(matches!(err, StudioError::NoCredential));
}

#[tokio::test]
async fn test_auth_error_for_replaced_key_keeps_new_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .and(header("x-goog-api-key", "old-key"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({"error": {"code": 403, "message": "Permission denied"}}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    store_key(&store, "old-key").await;
    let transformer = Arc::new(transformer(&server, store.clone()));

    let in_flight = {
        let transformer = transformer.clone();
        tokio::spawn(async move { transformer.transform(&input(), "x").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    store_key(&store, "new-key").await;

    let err = in_flight.await.unwrap().unwrap_err();
    assert!(matches!(err, StudioError::AuthError(_)));
    assert!(transformer.keys().is_ready().await);
    assert_eq!(
        transformer.keys().resolve().await,
        Credential::new("new-key")
    );
}

struct SilentHost {
    key: Mutex<Option<Credential>>,
}

#[async_trait]
impl HostKeySelector for SilentHost {
    async fn has_selected_key(&self) -> bool {
        self.key.lock().unwrap().is_some()
    }

    async fn open_select_key(&self) -> studio_vision::Result<()> {
        Ok(())
    }

    async fn selected_key(&self) -> Option<Credential> {
        self.key.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_host_selection_without_key_goes_offline_on_next_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let api = Arc::new(GeminiApi::new(server.uri()));
    let host = Arc::new(SilentHost {
        key: Mutex::new(None),
    });
    let keys = Arc::new(KeyManager::new(Arc::new(MemoryStorage::new()), api.clone()).with_host(host));
    let transformer = Transformer::new(keys.clone(), api);

    keys.activate_host().await.unwrap();
    assert!(keys.is_ready().await);

    let err = transformer.transform(&input(), "x").await.unwrap_err();
    assert!(matches!(err, StudioError::NoCredential));
    assert!(!keys.is_ready().await);
}

#[tokio::test]
async fn test_quota_error_keeps_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IMAGE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    store_key(&store, "key-a").await;
    let transformer = transformer(&server, store);

    let err = transformer.transform(&input(), "anything").await.unwrap_err();
    assert!(matches!(err, StudioError::QuotaExceeded(_)));
    assert!(transformer.keys().is_ready().await);
}

#[tokio::test]
async fn test_server_error_is_unknown_with_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    store_key(&store, "key-a").await;
    let err = transformer(&server, store)
        .transform(&input(), "anything")
        .await
        .unwrap_err();
    match err {
        StudioError::Unknown(msg) => assert!(msg.contains("upstream unavailable")),
        other => panic!("expected unknown, got {other:?}"),
    }
}

#[tokio::test]
async fn test_blocked_and_text_only_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-goog-api-key", "blocked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"finishReason": "IMAGE_SAFETY"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-goog-api-key", "chatty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "I can only describe this photo."}]}, "finishReason": "STOP"}]
        })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    let transformer = transformer(&server, store.clone());

    store_key(&store, "blocked").await;
    match transformer.transform(&input(), "x").await.unwrap_err() {
        StudioError::ContentBlocked(reason) => assert_eq!(reason, "IMAGE_SAFETY"),
        other => panic!("expected block, got {other:?}"),
    }

    store_key(&store, "chatty").await;
    match transformer.transform(&input(), "x").await.unwrap_err() {
        StudioError::ModelTextOnly(text) => assert_eq!(text, "I can only describe this photo."),
        other => panic!("expected text-only, got {other:?}"),
    }
}

#[tokio::test]
async fn test_key_rotation_between_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-goog-api-key", "first-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response("image/png", "ONE")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-goog-api-key", "second-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response("image/png", "TWO")))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    let transformer = transformer(&server, store.clone());

    store_key(&store, "first-key").await;
    let first = transformer.transform(&input(), "x").await.unwrap();
    store_key(&store, "second-key").await;
    let second = transformer.transform(&input(), "x").await.unwrap();

    assert_eq!(first.data(), "ONE");
    assert_eq!(second.data(), "TWO");
}

#[tokio::test]
async fn test_probe_against_rejecting_endpoint_persists_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    let api = Arc::new(GeminiApi::new(server.uri()));
    let keys = KeyManager::new(store.clone(), api);

    assert!(!keys.test_credential(&Credential::new("bad-key").unwrap()).await);
    assert!(matches!(
        keys.submit("bad-key").await,
        Err(StudioError::InvalidCredential)
    ));
    assert_eq!(store.get(CREDENTIAL_SLOT).await.unwrap(), None);
    assert!(!keys.is_ready().await);
}

#[tokio::test]
async fn test_probe_success_then_save() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PROBE_PATH))
        .and(header("x-goog-api-key", "good-key"))
        .and(body_partial_json(json!({"generationConfig": {"maxOutputTokens": 1}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Hi"}]}, "finishReason": "MAX_TOKENS"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    let api = Arc::new(GeminiApi::new(server.uri()));
    let keys = KeyManager::new(store.clone(), api);

    keys.submit("good-key").await.unwrap();
    assert!(keys.is_ready().await);
    assert_eq!(keys.resolve().await, Credential::new("good-key"));
}

#[tokio::test]
async fn test_probe_with_empty_text_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let api = Arc::new(GeminiApi::new(server.uri()));
    let keys = KeyManager::new(Arc::new(MemoryStorage::new()), api);
    assert!(!keys.test_credential(&Credential::new("key").unwrap()).await);
}

#[tokio::test]
async fn test_studio_results_are_newest_first() {
    let server = MockServer::start().await;
    for n in 1..=3 {
        Mock::given(method("POST"))
            .and(header("x-goog-api-key", format!("key-{n}").as_str()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(image_response("image/png", &format!("R{n}"))),
            )
            .mount(&server)
            .await;
    }

    let store = Arc::new(MemoryStorage::new());
    let studio = Studio::new(transformer(&server, store.clone()));
    let history = studio.sessions().open("page-1").await.unwrap();
    for n in 1..=3 {
        store_key(&store, &format!("key-{n}")).await;
        studio
            .generate(&history, &input(), StudioStyle::CozyInterior)
            .await
            .unwrap();
    }

    let results = history.list().await;
    let data: Vec<_> = results.iter().map(|r| r.result_url.as_str()).collect();
    assert_eq!(
        data,
        vec![
            "data:image/png;base64,R3",
            "data:image/png;base64,R2",
            "data:image/png;base64,R1",
        ]
    );
    assert!(results.iter().all(|r| r.original_url == input().to_string()));

    let other = studio.sessions().open("page-2").await.unwrap();
    assert!(other.list().await.is_empty());
}

#[tokio::test]
async fn test_failed_generation_keeps_prior_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-goog-api-key", "good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(image_response("image/png", "OK")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("x-goog-api-key", "empty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStorage::new());
    let studio = Studio::new(transformer(&server, store.clone()));
    let history = ResultHistory::new();

    store_key(&store, "good").await;
    studio
        .generate(&history, &input(), StudioStyle::default())
        .await
        .unwrap();
    store_key(&store, "empty").await;
    let err = studio
        .generate(&history, &input(), StudioStyle::default())
        .await
        .unwrap_err();

    assert!(matches!(err, StudioError::EmptyResponse));
    assert_eq!(history.list().await.len(), 1);
    assert!(!studio.is_busy());
}
