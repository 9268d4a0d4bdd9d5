//! Privileged request bridge between browser-extension UI contexts and a
//! chat-completion service.
//!
//! UI surfaces never see the API key: they submit conversations to the
//! [`Mediator`](mediator::Mediator), which resolves a credential (memory cache,
//! then local store, then a native host process), calls the completion
//! endpoint, and hands the result back to the originating context only.
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use promptbridge::completion::CompletionBackend;
//! use promptbridge::config::ResolverConfig;
//! use promptbridge::credential::Credential;
//! use promptbridge::error::CompletionError;
//! use promptbridge::mediator::Mediator;
//! use promptbridge::native::{NativeBridgeClient, UnavailableTransport};
//! use promptbridge::request::{ChatMessage, OriginContext, PromptRequest};
//! use promptbridge::store::{CredentialStore, MemoryCredentialStore};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CompletionBackend for Echo {
//!     async fn complete(
//!         &self,
//!         conversation: &[ChatMessage],
//!         _credential: &Credential,
//!     ) -> Result<String, CompletionError> {
//!         Ok(conversation[0].content.to_uppercase())
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_secret("sk-test"));
//! let bridge = NativeBridgeClient::new(Arc::new(UnavailableTransport), Arc::clone(&store));
//! let mediator = Mediator::new(store, bridge, Arc::new(Echo), &ResolverConfig::default());
//! let _outbox = mediator.contexts().attach(OriginContext::new("popup"));
//!
//! let result = mediator
//!     .handle(PromptRequest::new("r1", "popup", vec![ChatMessage::user("hello")]))
//!     .await;
//! assert_eq!(result.text(), Some("HELLO"));
//! # });
//! ```

pub mod completion;
pub mod config;
pub mod contexts;
pub mod credential;
pub mod error;
pub mod mediator;
pub mod native;
pub mod protocol;
pub mod request;
pub mod resolver;
pub mod response;
pub mod server;
pub mod store;
