//! Request mediator: validation, tier resolution, error mapping, isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use promptbridge::completion::CompletionBackend;
use promptbridge::config::ResolverConfig;
use promptbridge::credential::Credential;
use promptbridge::error::{BridgeError, CompletionError, ErrorKind, StoreError};
use promptbridge::mediator::{Mediator, RequestState};
use promptbridge::native::{
    NativeBridgeClient, NativeHandshakeMessage, NativeTransport, UnavailableTransport,
};
use promptbridge::request::{ChatMessage, OriginContext, PromptRequest};
use promptbridge::response::CompletionStatus;
use promptbridge::store::{CredentialStore, MemoryCredentialStore};

#[derive(Clone, Copy)]
enum Outcome {
    Echo,
    Fixed(&'static str),
    Auth,
    RateLimited,
}

/// Completion backend double. Messages whose last content is "slow" block
/// until `release` is notified.
struct FakeBackend {
    outcome: Outcome,
    calls: AtomicUsize,
    secrets_seen: Mutex<Vec<String>>,
    entered: Notify,
    release: Notify,
}

impl FakeBackend {
    fn new(outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            calls: AtomicUsize::new(0),
            secrets_seen: Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn secrets_seen(&self) -> Vec<String> {
        self.secrets_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn complete(
        &self,
        conversation: &[ChatMessage],
        credential: &Credential,
    ) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.secrets_seen
            .lock()
            .unwrap()
            .push(credential.secret().to_string());

        let last = conversation.last().map(|m| m.content.clone()).unwrap_or_default();
        if last == "slow" {
            self.entered.notify_one();
            self.release.notified().await;
        }

        match self.outcome {
            Outcome::Echo => Ok(format!("echo: {last}")),
            Outcome::Fixed(text) => Ok(text.to_string()),
            Outcome::Auth => Err(CompletionError::Auth { status: 401 }),
            Outcome::RateLimited => Err(CompletionError::RateLimited),
        }
    }
}

/// Store double that counts reads.
#[derive(Default)]
struct CountingStore {
    inner: MemoryCredentialStore,
    reads: AtomicUsize,
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn get(&self) -> Result<Option<Credential>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get().await
    }

    async fn set(&self, secret: &str) -> Result<(), StoreError> {
        self.inner.set(secret).await
    }
}

/// Native host that always answers with the same JSON.
struct FixedHost(Value);

#[async_trait]
impl NativeTransport for FixedHost {
    async fn send(&self, _message: &NativeHandshakeMessage) -> Result<Option<Value>, BridgeError> {
        Ok(Some(self.0.clone()))
    }
}

fn mediator_with(
    store: Arc<CountingStore>,
    host: Arc<dyn NativeTransport>,
    backend: Arc<FakeBackend>,
) -> Arc<Mediator> {
    let bridge = NativeBridgeClient::new(host, store.clone());
    let config = ResolverConfig {
        cache_ttl: Duration::from_secs(60),
        bridge_timeout: Duration::from_millis(200),
    };
    Arc::new(Mediator::new(store, bridge, backend, &config))
}

async fn store_with(secret: &str) -> Arc<CountingStore> {
    let store = Arc::new(CountingStore::default());
    store.set(secret).await.unwrap();
    store
}

fn hello(request_id: &str, origin: &str) -> PromptRequest {
    PromptRequest::new(request_id, origin, vec![ChatMessage::user("hello")])
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_credential_and_upstream_reply_give_success() {
    let backend = FakeBackend::new(Outcome::Fixed("hi there"));
    let mediator = mediator_with(
        store_with("sk-test").await,
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let result = mediator.handle(hello("r1", "popup")).await;
    assert_eq!(result.status(), CompletionStatus::Ok);
    assert_eq!(result.request_id().as_str(), "r1");

    let wire = serde_json::to_value(result.into_response()).unwrap();
    assert_eq!(wire, json!({"success": true, "reply": "hi there"}));
    assert_eq!(backend.secrets_seen(), vec!["sk-test"]);
}

#[tokio::test]
async fn credential_from_native_host_is_used_and_cached() {
    let backend = FakeBackend::new(Outcome::Echo);
    let store = Arc::new(CountingStore::default());
    let mediator = mediator_with(
        store.clone(),
        Arc::new(FixedHost(json!({"apiKey": "sk-native"}))),
        backend.clone(),
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    assert!(mediator.handle(hello("r1", "popup")).await.is_ok());
    assert!(mediator.handle(hello("r2", "popup")).await.is_ok());

    assert_eq!(backend.secrets_seen(), vec!["sk-native", "sk-native"]);
    assert_eq!(store.reads.load(Ordering::SeqCst), 1, "second request served from cache");
}

// ---------------------------------------------------------------------------
// Credential failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_credential_anywhere_skips_network() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        Arc::new(CountingStore::default()),
        Arc::new(FixedHost(json!({"apiKey": ""}))),
        backend.clone(),
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let result = mediator.handle(hello("r1", "popup")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::NoCredentialConfigured));
    assert_eq!(backend.calls(), 0);

    let wire = serde_json::to_value(result.into_response()).unwrap();
    assert_eq!(wire, json!({"success": false, "error": "NoCredentialConfigured"}));
}

#[tokio::test]
async fn bridge_failures_surface_as_no_credential_configured() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        Arc::new(CountingStore::default()),
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let result = mediator.handle(hello("r1", "popup")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::NoCredentialConfigured));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn auth_error_invalidates_cache_without_retry() {
    let backend = FakeBackend::new(Outcome::Auth);
    let store = store_with("sk-revoked").await;
    let mediator = mediator_with(store.clone(), Arc::new(UnavailableTransport), backend.clone());
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let result = mediator.handle(hello("r1", "popup")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::AuthError));
    assert_eq!(backend.calls(), 1, "no automatic retry");
    assert!(!mediator.resolver().is_cached().await);

    // Next resolution goes back to the store rather than reusing the cached key.
    let reads_before = store.reads.load(Ordering::SeqCst);
    store.set("sk-rotated").await.unwrap();
    let cred = mediator.resolver().resolve().await.unwrap();
    assert_eq!(cred.secret(), "sk-rotated");
    assert_eq!(store.reads.load(Ordering::SeqCst), reads_before + 1);
}

#[tokio::test]
async fn other_errors_keep_cache() {
    let backend = FakeBackend::new(Outcome::RateLimited);
    let mediator = mediator_with(
        store_with("sk-test").await,
        Arc::new(UnavailableTransport),
        backend,
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let result = mediator.handle(hello("r1", "popup")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::RateLimited));
    assert!(mediator.resolver().is_cached().await);
}

#[tokio::test]
async fn storing_a_key_replaces_cached_credential() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        store_with("sk-old").await,
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    mediator.handle(hello("r1", "popup")).await;
    mediator.store_credential("sk-new").await.unwrap();
    mediator.handle(hello("r2", "popup")).await;

    assert_eq!(backend.secrets_seen(), vec!["sk-old", "sk-new"]);
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_shape_never_reaches_resolver() {
    let store = store_with("sk-test").await;
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(store.clone(), Arc::new(UnavailableTransport), backend.clone());
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let empty = mediator
        .handle(PromptRequest::new("r1", "popup", vec![]))
        .await;
    assert_eq!(empty.error_kind(), Some(ErrorKind::InvalidRequest));

    let blank = mediator
        .handle(PromptRequest::new("r2", "popup", vec![ChatMessage::user("")]))
        .await;
    assert_eq!(blank.error_kind(), Some(ErrorKind::InvalidRequest));

    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn unknown_origin_is_invalid_request() {
    let store = store_with("sk-test").await;
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(store.clone(), Arc::new(UnavailableTransport), backend.clone());
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let result = mediator.handle(hello("r1", "evil-page")).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidRequest));
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn duplicate_in_flight_request_id_is_rejected() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        store_with("sk-test").await,
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let mut popup = mediator.contexts().attach(OriginContext::new("popup"));

    let slow = PromptRequest::new("r1", "popup", vec![ChatMessage::user("slow")]);
    let first = mediator.dispatch(slow);
    backend.entered.notified().await;

    let dup = mediator.handle(hello("r1", "popup")).await;
    assert_eq!(dup.error_kind(), Some(ErrorKind::InvalidRequest));

    backend.release.notify_one();
    assert!(first.await.unwrap());
    let delivered = popup.recv().await.unwrap();
    assert_eq!(delivered.text(), Some("echo: slow"));

    // Id is free again once the first request finished.
    assert!(mediator.handle(hello("r1", "popup")).await.is_ok());
}

// ---------------------------------------------------------------------------
// Concurrency and isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_requests_are_delivered_to_their_own_origin() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        store_with("sk-test").await,
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let mut popup = mediator.contexts().attach(OriginContext::new("popup"));
    let mut content = mediator.contexts().attach(OriginContext::new("content"));

    // Popup's request blocks upstream; content's must still go through.
    let popup_task = mediator.dispatch(PromptRequest::new(
        "p1",
        "popup",
        vec![ChatMessage::user("slow")],
    ));
    backend.entered.notified().await;

    let content_task = mediator.dispatch(PromptRequest::new(
        "c1",
        "content",
        vec![ChatMessage::user("fast")],
    ));
    let content_result = tokio::time::timeout(Duration::from_secs(5), content.recv())
        .await
        .expect("content request must not wait for popup request")
        .unwrap();
    assert_eq!(content_result.request_id().as_str(), "c1");
    assert_eq!(content_result.text(), Some("echo: fast"));
    assert!(content_task.await.unwrap());
    assert!(popup.try_recv().is_err(), "popup must not see content's result");

    backend.release.notify_one();
    assert!(popup_task.await.unwrap());
    let popup_result = popup.recv().await.unwrap();
    assert_eq!(popup_result.request_id().as_str(), "p1");
    assert_eq!(popup_result.text(), Some("echo: slow"));
    assert!(content.try_recv().is_err(), "content must not see popup's result");
}

#[tokio::test]
async fn many_concurrent_requests_each_get_their_own_result() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        store_with("sk-test").await,
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let _popup = mediator.contexts().attach(OriginContext::new("popup"));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let mediator = Arc::clone(&mediator);
        tasks.push(tokio::spawn(async move {
            let req = PromptRequest::new(
                format!("r{i}"),
                "popup",
                vec![ChatMessage::user(format!("msg {i}"))],
            );
            mediator.handle(req).await
        }));
    }
    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap();
        assert_eq!(result.request_id().as_str(), format!("r{i}"));
        assert_eq!(result.text(), Some(format!("echo: msg {i}").as_str()));
    }
    assert_eq!(backend.calls(), 16);
}

#[tokio::test]
async fn result_for_torn_down_context_is_dropped() {
    let backend = FakeBackend::new(Outcome::Echo);
    let mediator = mediator_with(
        store_with("sk-test").await,
        Arc::new(UnavailableTransport),
        backend.clone(),
    );
    let origin = OriginContext::new("popup");
    let mut popup = mediator.contexts().attach(origin.clone());

    let task = mediator.dispatch(PromptRequest::new(
        "r1",
        "popup",
        vec![ChatMessage::user("slow")],
    ));
    backend.entered.notified().await;

    // Popup closes while upstream is still working.
    mediator.contexts().detach(&origin);
    backend.release.notify_one();

    assert!(!task.await.unwrap(), "result must be dropped");
    assert_eq!(backend.calls(), 1, "in-flight call ran to completion");
    assert!(popup.recv().await.is_none());
}

#[tokio::test]
async fn secret_never_appears_in_responses() {
    let secret = "sk-super-secret-key-12345";
    for outcome in [Outcome::Echo, Outcome::Auth, Outcome::RateLimited] {
        let backend = FakeBackend::new(outcome);
        let store = store_with(secret).await;
        let mediator = mediator_with(store, Arc::new(UnavailableTransport), backend);
        let _popup = mediator.contexts().attach(OriginContext::new("popup"));

        let result = mediator.handle(hello("r1", "popup")).await;
        let wire = serde_json::to_string(&result.into_response()).unwrap();
        assert!(!wire.contains(secret), "leaked secret: {wire}");
    }
}

#[test]
fn terminal_states() {
    assert!(RequestState::Delivered.is_terminal());
    assert!(RequestState::Errored.is_terminal());
    assert!(!RequestState::Received.is_terminal());
    assert!(!RequestState::ResolvingCredential.is_terminal());
    assert!(!RequestState::Completing.is_terminal());
}
