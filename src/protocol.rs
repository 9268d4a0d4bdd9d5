//! Messages exchanged with the extension over the host's stdio.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::request::{ChatMessage, OriginContext, PromptRequest, RequestId};
use crate::response::CompletionResult;

pub const PROMPT: &str = "chatgpt:prompt";

/// UI → host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    #[serde(rename = "chatgpt:prompt", rename_all = "camelCase")]
    Prompt {
        request_id: String,
        origin: String,
        messages: Vec<ChatMessage>,
    },
    #[serde(rename = "apiKey:set", rename_all = "camelCase")]
    SetApiKey {
        request_id: String,
        origin: String,
        api_key: String,
    },
    #[serde(rename = "context:open")]
    ContextOpen { origin: String },
    #[serde(rename = "context:close")]
    ContextClose { origin: String },
}

/// Host → UI. Every UI-bound message names its origin so the extension can
/// route it to the right surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Outbound {
    #[serde(rename = "chatgpt:response", rename_all = "camelCase")]
    Response {
        request_id: RequestId,
        origin: OriginContext,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reply: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorKind>,
    },
    #[serde(rename = "apiKey:stored", rename_all = "camelCase")]
    KeyStored {
        request_id: String,
        origin: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorKind>,
    },
    /// A frame that couldn't be attributed to any request.
    #[serde(rename = "protocol:error")]
    ProtocolError { error: ErrorKind, detail: String },
}

impl Outbound {
    pub fn response(origin: OriginContext, result: CompletionResult) -> Self {
        let request_id = result.request_id().clone();
        let body = result.into_response();
        Self::Response {
            request_id,
            origin,
            success: body.success,
            reply: body.reply,
            error: body.error,
        }
    }
}

impl Inbound {
    pub fn into_prompt_request(self) -> Option<PromptRequest> {
        match self {
            Self::Prompt {
                request_id,
                origin,
                messages,
            } => Some(PromptRequest::new(request_id, origin, messages)),
            _ => None,
        }
    }
}

/// Parse a decoded frame. A prompt whose body is unusable but which still
/// carries a request id and origin is answered as that request's
/// `InvalidRequest`; anything else becomes a protocol error.
pub fn parse(frame: Value) -> Result<Inbound, Outbound> {
    let attribution = prompt_attribution(&frame);
    serde_json::from_value::<Inbound>(frame).map_err(|e| match attribution {
        Some((request_id, origin)) => Outbound::Response {
            request_id,
            origin,
            success: false,
            reply: None,
            error: Some(ErrorKind::InvalidRequest),
        },
        None => Outbound::ProtocolError {
            error: ErrorKind::InvalidRequest,
            detail: e.to_string(),
        },
    })
}

fn prompt_attribution(frame: &Value) -> Option<(RequestId, OriginContext)> {
    if frame.get("type").and_then(Value::as_str) != Some(PROMPT) {
        return None;
    }
    let request_id = frame.get("requestId").and_then(Value::as_str)?;
    let origin = frame.get("origin").and_then(Value::as_str)?;
    Some((RequestId::new(request_id), OriginContext::new(origin)))
}
