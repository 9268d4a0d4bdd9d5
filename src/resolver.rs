use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::ResolverConfig;
use crate::credential::{Credential, CredentialSource};
use crate::error::{BridgeError, ResolutionError};
use crate::native::NativeBridgeClient;
use crate::store::CredentialStore;

/// In-memory tier. Explicit state rather than "whatever the store returns".
enum CacheState {
    Absent,
    Cached {
        credential: Credential,
        expires_at: Instant,
    },
}

/// Cache slot plus a generation bumped on every invalidation. A lookup that
/// started under an older generation must not write its result back.
struct Cache {
    state: CacheState,
    generation: u64,
}

impl Cache {
    /// Fresh cached credential, clearing the slot if it has expired.
    fn fresh(&mut self) -> Option<Credential> {
        let fresh = match &self.state {
            CacheState::Cached {
                credential,
                expires_at,
            } if Instant::now() < *expires_at => {
                Some(credential.clone().with_source(CredentialSource::Cache))
            }
            _ => None,
        };
        if fresh.is_none() {
            self.state = CacheState::Absent;
        }
        fresh
    }
}

/// Tiered lookup: memory cache, then local store, then native host.
///
/// Each tier is consulted only when the previous one yields nothing. A hit
/// from the store or the host repopulates the cache for `cache_ttl`.
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    bridge: NativeBridgeClient,
    cache: Mutex<Cache>,
    cache_ttl: Duration,
    bridge_timeout: Duration,
}

impl CredentialResolver {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        bridge: NativeBridgeClient,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            store,
            bridge,
            cache: Mutex::new(Cache {
                state: CacheState::Absent,
                generation: 0,
            }),
            cache_ttl: config.cache_ttl,
            bridge_timeout: config.bridge_timeout,
        }
    }

    pub async fn resolve(&self) -> Result<Credential, ResolutionError> {
        let generation = {
            let mut cache = self.cache.lock().await;
            if let Some(credential) = cache.fresh() {
                return Ok(credential);
            }
            cache.generation
        };

        // Cache lock is not held across store or bridge I/O.
        match self.store.get().await {
            Ok(Some(credential)) => {
                tracing::debug!("credential resolved from local store");
                self.populate(&credential, generation).await;
                return Ok(credential);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("local credential store unreadable, trying native host: {e}");
            }
        }

        match self.bridge.request_credential(self.bridge_timeout).await {
            Ok(credential) => {
                tracing::debug!("credential resolved from native host");
                self.populate(&credential, generation).await;
                Ok(credential)
            }
            Err(BridgeError::NotConfigured) => Err(ResolutionError::NoCredentialConfigured),
            Err(e) => {
                tracing::warn!("native host lookup failed: {e}");
                Err(ResolutionError::Bridge(e))
            }
        }
    }

    /// Drop the cached credential so the next `resolve()` goes back to the store/host.
    /// Lookups already in flight will not repopulate the cache with what they read.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        cache.state = CacheState::Absent;
        cache.generation = cache.generation.wrapping_add(1);
        tracing::info!("cached credential invalidated");
    }

    pub async fn is_cached(&self) -> bool {
        self.cache.lock().await.fresh().is_some()
    }

    async fn populate(&self, credential: &Credential, generation: u64) {
        if self.cache_ttl.is_zero() {
            return;
        }
        let mut cache = self.cache.lock().await;
        if cache.generation != generation {
            tracing::debug!("cache invalidated during lookup, result not cached");
            return;
        }
        cache.state = CacheState::Cached {
            credential: credential.clone(),
            expires_at: Instant::now() + self.cache_ttl,
        };
    }
}
