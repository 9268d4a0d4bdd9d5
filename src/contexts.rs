use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::request::OriginContext;
use crate::response::CompletionResult;

type Outboxes = HashMap<OriginContext, mpsc::UnboundedSender<CompletionResult>>;

/// Live UI contexts and the outbox each one reads its results from.
///
/// A result can only be handed to the outbox of the origin named on its
/// request; there is no broadcast path.
#[derive(Default)]
pub struct ContextRegistry {
    outboxes: Mutex<Outboxes>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context. Re-attaching an origin replaces its previous outbox.
    pub fn attach(&self, origin: OriginContext) -> mpsc::UnboundedReceiver<CompletionResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.lock().insert(origin.clone(), tx).is_some() {
            tracing::debug!(%origin, "context re-attached");
        } else {
            tracing::debug!(%origin, "context attached");
        }
        rx
    }

    /// Tear down a context. Results still in flight for it will be dropped.
    pub fn detach(&self, origin: &OriginContext) -> bool {
        let removed = self.lock().remove(origin).is_some();
        if removed {
            tracing::debug!(%origin, "context detached");
        }
        removed
    }

    pub fn is_attached(&self, origin: &OriginContext) -> bool {
        self.lock()
            .get(origin)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Hand `result` to `origin`'s outbox. Returns false if the context is gone.
    pub fn deliver(&self, origin: &OriginContext, result: CompletionResult) -> bool {
        let outbox = self.lock().get(origin).cloned();
        match outbox {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    pub fn origins(&self) -> Vec<OriginContext> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Outboxes> {
        self.outboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
