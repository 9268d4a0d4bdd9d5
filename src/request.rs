use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation, in the shape the completion endpoint expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// Caller-chosen id correlating a prompt with its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque name of a UI surface (popup, content panel, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginContext(String);

impl OriginContext {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prompt submitted by a UI context. Fields are fixed at construction.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    request_id: RequestId,
    origin: OriginContext,
    conversation: Vec<ChatMessage>,
}

impl PromptRequest {
    pub fn new(
        request_id: impl Into<String>,
        origin: impl Into<String>,
        conversation: Vec<ChatMessage>,
    ) -> Self {
        Self {
            request_id: RequestId::new(request_id),
            origin: OriginContext::new(origin),
            conversation,
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn origin(&self) -> &OriginContext {
        &self.origin
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    /// Shape check: at least one message and no blank content.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.request_id.as_str().trim().is_empty() {
            return Err("requestId must not be empty".to_string());
        }
        if self.conversation.is_empty() {
            return Err("conversation must contain at least one message".to_string());
        }
        if let Some(pos) = self
            .conversation
            .iter()
            .position(|m| m.content.trim().is_empty())
        {
            return Err(format!("message {pos} has empty content"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_uses_lowercase_wire_names() {
        let msg: ChatMessage =
            serde_json::from_str(r#"{"role":"assistant","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(serde_json::from_str::<ChatMessage>(r#"{"role":"tool","content":"x"}"#).is_err());
    }

    #[test]
    fn empty_conversation_is_invalid() {
        let req = PromptRequest::new("r1", "popup", vec![]);
        assert!(req.validate_shape().is_err());
    }

    #[test]
    fn blank_message_is_invalid() {
        let req = PromptRequest::new(
            "r1",
            "popup",
            vec![ChatMessage::user("hello"), ChatMessage::user("   ")],
        );
        let err = req.validate_shape().unwrap_err();
        assert!(err.contains("message 1"), "got: {err}");
    }

    #[test]
    fn blank_request_id_is_invalid() {
        let req = PromptRequest::new(" ", "popup", vec![ChatMessage::user("hello")]);
        assert!(req.validate_shape().is_err());
    }
}
