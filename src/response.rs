use serde::Serialize;

use crate::error::ErrorKind;
use crate::request::RequestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Ok,
    Error,
}

/// Outcome of one prompt request. Built only through [`CompletionResult::ok`]
/// and [`CompletionResult::error`], so exactly one of text / error kind is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    request_id: RequestId,
    status: CompletionStatus,
    text: Option<String>,
    error_kind: Option<ErrorKind>,
}

impl CompletionResult {
    pub fn ok(request_id: RequestId, text: String) -> Self {
        Self {
            request_id,
            status: CompletionStatus::Ok,
            text: Some(text),
            error_kind: None,
        }
    }

    pub fn error(request_id: RequestId, kind: ErrorKind) -> Self {
        Self {
            request_id,
            status: CompletionStatus::Error,
            text: None,
            error_kind: Some(kind),
        }
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn status(&self) -> CompletionStatus {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == CompletionStatus::Ok
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn into_response(self) -> PromptResponse {
        PromptResponse {
            success: self.is_ok(),
            reply: self.text,
            error: self.error_kind,
        }
    }
}

/// UI-facing body: `{ success, reply?, error? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}
