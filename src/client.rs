//! HTTP collaborators: the chat API we read from and the webhook we post to.

use crate::error::{DigestError, Result};
use crate::payload::ConversationPayload;
use crate::sessions::ChatMessage;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const CHATS_PATH: &str = "/v1/admin/workspace-chats";
const DEBUG_BODY_PREVIEW: usize = 500;

/// Where chat messages come from
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Fetch the complete chat log
    async fn fetch_chats(&self) -> Result<Vec<ChatMessage>>;
}

/// Where finished conversations go
#[async_trait]
pub trait ConversationSink: Send + Sync {
    async fn deliver(&self, payload: &ConversationPayload) -> Result<SinkReply>;
}

/// What the webhook said about a delivered conversation
#[derive(Debug, Clone, PartialEq)]
pub struct SinkReply {
    /// `Memory` field: the summary text
    pub memory: String,
    /// `Status` field as sent, `"False"` when absent
    pub status: Value,
}

impl Default for SinkReply {
    fn default() -> Self {
        Self {
            memory: String::new(),
            status: Value::String("False".to_string()),
        }
    }
}

impl SinkReply {
    /// Parse a webhook response body. An empty body counts as `{}`.
    pub fn from_body(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(body)?;
        let Value::Object(obj) = value else {
            return Err(DigestError::MalformedResponse(format!(
                "webhook returned non-object JSON: {}",
                preview(body)
            )));
        };

        let memory = match obj.get("Memory") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        let status = obj
            .get("Status")
            .cloned()
            .unwrap_or_else(|| Value::String("False".to_string()));

        Ok(Self { memory, status })
    }
}

fn preview(body: &str) -> String {
    body.chars().take(DEBUG_BODY_PREVIEW).collect()
}

/// Decode the chat API response: `{"chats": [...]}`. A missing `chats`
/// key is an empty log.
pub fn parse_chats(body: &str) -> Result<Vec<ChatMessage>> {
    let value: Value = serde_json::from_str(body)?;
    let Value::Object(mut obj) = value else {
        return Err(DigestError::MalformedResponse("chat API returned non-object JSON".to_string()));
    };

    match obj.remove("chats") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(chats @ Value::Array(_)) => Ok(serde_json::from_value(chats)?),
        Some(_) => Err(DigestError::MalformedResponse("`chats` is not an array".to_string())),
    }
}

async fn read_checked(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    debug!("Status code: {}", status);
    debug!("Raw response (first {} chars): {}", DEBUG_BODY_PREVIEW, preview(&body));

    if !status.is_success() {
        return Err(DigestError::Status {
            status: status.as_u16(),
            body: preview(&body),
        });
    }
    Ok(body)
}

/// Chat API client
pub struct HttpChatSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpChatSource {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), CHATS_PATH),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ChatSource for HttpChatSource {
    async fn fetch_chats(&self) -> Result<Vec<ChatMessage>> {
        debug!("Making API call to {}", self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .send()
            .await?;

        let body = read_checked(response).await?;
        parse_chats(&body)
    }
}

/// Summarization webhook client
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookSink {
    pub fn new(url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            token,
        })
    }
}

#[async_trait]
impl ConversationSink for WebhookSink {
    async fn deliver(&self, payload: &ConversationPayload) -> Result<SinkReply> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let body = read_checked(request.send().await?).await?;
        SinkReply::from_body(&body)
    }
}
