pub mod codec;
pub mod host;
pub mod process;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credential::{Credential, CredentialSource};
use crate::error::BridgeError;
use crate::store::CredentialStore;

pub use process::ProcessTransport;

/// Action tag asking the host for the stored API key.
pub const GET_API_KEY: &str = "getApiKey";

/// One request or reply on the native channel. Payload entries sit beside
/// `action` on the wire, so an empty payload encodes as `{"action": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeHandshakeMessage {
    pub action: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NativeHandshakeMessage {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: Map::new(),
        }
    }

    pub fn get_api_key() -> Self {
        Self::new(GET_API_KEY)
    }
}

/// Single-exchange channel to the credential host.
///
/// `Ok(None)` means the host went away without sending anything.
#[async_trait]
pub trait NativeTransport: Send + Sync {
    async fn send(&self, message: &NativeHandshakeMessage) -> Result<Option<Value>, BridgeError>;
}

/// Stand-in when no host is configured for this platform.
pub struct UnavailableTransport;

#[async_trait]
impl NativeTransport for UnavailableTransport {
    async fn send(&self, _message: &NativeHandshakeMessage) -> Result<Option<Value>, BridgeError> {
        Err(BridgeError::Unavailable(
            "native messaging host not configured".to_string(),
        ))
    }
}

/// Fetches the API key from the native host and mirrors it into the local store.
#[derive(Clone)]
pub struct NativeBridgeClient {
    transport: Arc<dyn NativeTransport>,
    store: Arc<dyn CredentialStore>,
}

impl NativeBridgeClient {
    pub fn new(transport: Arc<dyn NativeTransport>, store: Arc<dyn CredentialStore>) -> Self {
        Self { transport, store }
    }

    pub async fn request_credential(&self, timeout: Duration) -> Result<Credential, BridgeError> {
        let message = NativeHandshakeMessage::get_api_key();

        let reply = match tokio::time::timeout(timeout, self.transport.send(&message)).await {
            Ok(Ok(Some(reply))) => reply,
            Ok(Ok(None)) => {
                return Err(BridgeError::Unavailable(
                    "host closed without replying".to_string(),
                ));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BridgeError::Timeout(timeout.as_millis() as u64)),
        };

        let secret = parse_api_key(&reply)?;

        // Persist so later resolutions skip the cross-process hop.
        if let Err(e) = self.store.set(&secret).await {
            tracing::warn!("failed to persist bridge credential: {e}");
        }

        Ok(Credential::new(secret, CredentialSource::NativeBridge))
    }
}

fn parse_api_key(reply: &Value) -> Result<String, BridgeError> {
    let key = reply
        .get("apiKey")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Malformed("reply has no string apiKey field".to_string()))?;
    if key.is_empty() {
        return Err(BridgeError::NotConfigured);
    }
    Ok(key.to_string())
}
