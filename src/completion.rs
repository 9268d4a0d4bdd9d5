use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::credential::Credential;
use crate::error::CompletionError;
use crate::request::ChatMessage;

const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Error bodies are only read far enough to build a preview.
const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;

/// Longest upstream error body kept in an error message.
const MAX_ERROR_PREVIEW_CHARS: usize = 200;

/// Anything that can turn a conversation plus credential into reply text.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        conversation: &[ChatMessage],
        credential: &Credential,
    ) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions over HTTPS. One POST per call, never retried.
pub struct CompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f64,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout,
        })
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        conversation: &[ChatMessage],
        credential: &Credential,
    ) -> Result<String, CompletionError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: conversation,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.secret())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // Only the head of the body is kept; upstream error pages can be huge.
            let (error_bytes, _) = read_capped(response, MAX_ERROR_BODY_BYTES)
                .await
                .unwrap_or_default();
            return Err(classify_status(status, &String::from_utf8_lossy(&error_bytes)));
        }

        let (bytes, overflowed) = read_capped(response, MAX_RESPONSE_BYTES).await?;
        if overflowed {
            return Err(CompletionError::Malformed(format!(
                "response too large: more than {MAX_RESPONSE_BYTES} bytes"
            )));
        }

        extract_reply(&bytes)
    }
}

/// Read at most `cap` bytes of body, chunk by chunk. The flag is set when the
/// body runs past `cap`; the remainder is never read.
async fn read_capped(
    mut response: Response,
    cap: usize,
) -> Result<(BytesMut, bool), reqwest::Error> {
    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        let room = cap - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

/// Map a non-success status to its error class.
pub fn classify_status(status: StatusCode, body: &str) -> CompletionError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CompletionError::Auth {
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => CompletionError::RateLimited,
        _ => {
            let preview: String = body.chars().take(MAX_ERROR_PREVIEW_CHARS).collect();
            CompletionError::Upstream {
                status: status.as_u16(),
                message: preview,
            }
        }
    }
}

/// Pull `choices[0].message.content` out of a success body. A missing or
/// null reply is an error, never an empty string.
pub fn extract_reply(body: &[u8]) -> Result<String, CompletionError> {
    let completion: ChatCompletion = serde_json::from_slice(body)
        .map_err(|e| CompletionError::Malformed(format!("failed to parse response: {e}")))?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| CompletionError::Malformed("empty choices or null content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_classify_as_auth() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            CompletionError::Auth { status: 401 }
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            CompletionError::Auth { status: 403 }
        ));
    }

    #[test]
    fn other_statuses_keep_code_and_short_preview() {
        let body = "x".repeat(10_000);
        match classify_status(StatusCode::BAD_GATEWAY, &body) {
            CompletionError::Upstream { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message.len(), MAX_ERROR_PREVIEW_CHARS);
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            CompletionError::RateLimited
        ));
    }

    #[test]
    fn reply_is_read_from_first_choice() {
        let body = br#"{"choices":[{"message":{"role":"assistant","content":" hi there\n"}}]}"#;
        assert_eq!(extract_reply(body).unwrap(), "hi there");
    }

    #[test]
    fn missing_reply_is_malformed_not_empty() {
        let bodies: [&[u8]; 5] = [
            br#"{"choices":[]}"#,
            br#"{"choices":[{"message":{"content":null}}]}"#,
            br#"{"choices":[{"message":{}}]}"#,
            br#"{"id":"x"}"#,
            b"<html>oops</html>",
        ];
        for body in bodies {
            assert!(
                matches!(extract_reply(body), Err(CompletionError::Malformed(_))),
                "body {:?} should be malformed",
                String::from_utf8_lossy(body)
            );
        }
    }
}
