use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::completion::{CompletionBackend, CompletionClient};
use crate::config::{Config, ResolverConfig};
use crate::contexts::ContextRegistry;
use crate::error::{ErrorKind, StoreError};
use crate::native::{NativeBridgeClient, NativeTransport, ProcessTransport, UnavailableTransport};
use crate::request::{PromptRequest, RequestId};
use crate::resolver::CredentialResolver;
use crate::response::CompletionResult;
use crate::store::{CredentialStore, FileCredentialStore};

/// Per-request progress. `Delivered` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    ResolvingCredential,
    Completing,
    Delivered,
    Errored,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Errored)
    }
}

struct Lifecycle {
    request_id: RequestId,
    state: RequestState,
}

impl Lifecycle {
    fn new(request_id: RequestId) -> Self {
        tracing::debug!(
            request_id = %request_id,
            state = ?RequestState::Received,
            "request received"
        );
        Self {
            request_id,
            state: RequestState::Received,
        }
    }

    fn advance(&mut self, next: RequestState) {
        debug_assert!(
            !self.state.is_terminal(),
            "request {} already finished as {:?}",
            self.request_id,
            self.state
        );
        tracing::debug!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "request state"
        );
        self.state = next;
    }

    fn finish(&mut self, delivered_ok: bool) {
        self.advance(if delivered_ok {
            RequestState::Delivered
        } else {
            RequestState::Errored
        });
    }
}

/// Removes a request id from the in-flight set when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<RequestId>>,
    request_id: RequestId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.request_id);
    }
}

/// The one trusted entry point between UI contexts and the network.
///
/// Every context submits through [`Mediator::handle`] (or [`Mediator::dispatch`]
/// for fire-and-deliver). Requests run independently; the only shared state is
/// the resolver's credential cache and the set of in-flight request ids.
pub struct Mediator {
    resolver: CredentialResolver,
    completion: Arc<dyn CompletionBackend>,
    store: Arc<dyn CredentialStore>,
    contexts: ContextRegistry,
    in_flight: Mutex<HashSet<RequestId>>,
}

impl Mediator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        bridge: NativeBridgeClient,
        completion: Arc<dyn CompletionBackend>,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            resolver: CredentialResolver::new(Arc::clone(&store), bridge, config),
            completion,
            store,
            contexts: ContextRegistry::new(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wire up the production stack: file store, process-backed native host
    /// (if configured) and the HTTPS completion client.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(&config.data_dir));
        let transport: Arc<dyn NativeTransport> = match &config.native_host {
            Some(path) => Arc::new(ProcessTransport::new(path)),
            None => Arc::new(UnavailableTransport),
        };
        let bridge = NativeBridgeClient::new(transport, Arc::clone(&store));
        let completion = Arc::new(CompletionClient::new(&config.completion)?);
        Ok(Self::new(store, bridge, completion, &config.resolver))
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    /// Run one request to completion and return its result to the caller.
    pub async fn handle(&self, request: PromptRequest) -> CompletionResult {
        let mut lifecycle = Lifecycle::new(request.request_id().clone());
        let result = self.process(&request, &mut lifecycle).await;
        lifecycle.finish(result.is_ok());
        result
    }

    /// Run a request on its own task and deliver the result to the origin's
    /// outbox. If the origin was torn down meanwhile, the result is dropped;
    /// the upstream call itself is never cancelled. The handle resolves to
    /// whether delivery happened.
    pub fn dispatch(self: &Arc<Self>, request: PromptRequest) -> JoinHandle<bool> {
        let mediator = Arc::clone(self);
        tokio::spawn(async move {
            let mut lifecycle = Lifecycle::new(request.request_id().clone());
            let result = mediator.process(&request, &mut lifecycle).await;
            let ok = result.is_ok();

            if mediator.contexts.deliver(request.origin(), result) {
                lifecycle.finish(ok);
                true
            } else {
                tracing::debug!(
                    request_id = %request.request_id(),
                    origin = %request.origin(),
                    "origin context gone, result dropped"
                );
                lifecycle.finish(false);
                false
            }
        })
    }

    /// Persist a key written by a UI context, verbatim, and drop any cached
    /// credential so it takes effect on the next request.
    pub async fn store_credential(&self, secret: &str) -> Result<(), StoreError> {
        self.store.set(secret).await?;
        self.resolver.invalidate().await;
        Ok(())
    }

    async fn process(
        &self,
        request: &PromptRequest,
        lifecycle: &mut Lifecycle,
    ) -> CompletionResult {
        let request_id = request.request_id().clone();

        if let Err(reason) = request.validate_shape() {
            tracing::warn!(request_id = %request_id, "rejected request: {reason}");
            return CompletionResult::error(request_id, ErrorKind::InvalidRequest);
        }
        if !self.contexts.is_attached(request.origin()) {
            tracing::warn!(
                request_id = %request_id,
                origin = %request.origin(),
                "rejected request from unknown origin"
            );
            return CompletionResult::error(request_id, ErrorKind::InvalidRequest);
        }
        let Some(_in_flight) = self.claim(&request_id) else {
            tracing::warn!(request_id = %request_id, "rejected duplicate in-flight request id");
            return CompletionResult::error(request_id, ErrorKind::InvalidRequest);
        };

        lifecycle.advance(RequestState::ResolvingCredential);
        let credential = match self.resolver.resolve().await {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(
                    request_id = %request_id,
                    kind = %e.kind(),
                    "credential resolution failed: {e}"
                );
                return CompletionResult::error(request_id, ErrorKind::NoCredentialConfigured);
            }
        };
        tracing::debug!(
            request_id = %request_id,
            source = credential.source().as_str(),
            "credential resolved"
        );

        lifecycle.advance(RequestState::Completing);
        match self.completion.complete(request.conversation(), &credential).await {
            Ok(text) => CompletionResult::ok(request_id, text),
            Err(e) => {
                // No retry: a bad stored key must surface, not loop.
                if e.invalidates_credential() {
                    self.resolver.invalidate().await;
                }
                tracing::warn!(
                    request_id = %request_id,
                    kind = %e.kind(),
                    "completion failed: {e}"
                );
                CompletionResult::error(request_id, e.kind())
            }
        }
    }

    fn claim(&self, request_id: &RequestId) -> Option<InFlight<'_>> {
        let inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id.clone());
        inserted.then(|| InFlight {
            set: &self.in_flight,
            request_id: request_id.clone(),
        })
    }
}
