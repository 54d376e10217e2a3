//! Conversation payloads sent to the summarization webhook.

use crate::client::SinkReply;
use crate::grouping::{Conversation, TimedMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The record posted to the webhook and, once answered, kept in the memory log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationPayload {
    pub conversation: String,
    #[serde(rename = "workspaceID")]
    pub workspace_id: String,
    #[serde(rename = "threadID")]
    pub thread_id: String,
    pub user: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub workspace: String,
    pub summary: String,
    #[serde(rename = "memoryStatus", skip_serializing_if = "Option::is_none", default)]
    pub memory_status: Option<Value>,
}

impl ConversationPayload {
    /// Fold the webhook's answer into the payload before it is logged.
    pub fn apply_reply(&mut self, reply: SinkReply) {
        self.summary = reply.memory;
        self.memory_status = Some(reply.status);
    }
}

/// Assistant text from a stored response.
///
/// Responses are either plain text or a JSON object carrying a `text` field.
/// Anything that isn't such an object is returned unchanged.
pub fn response_text(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(obj)) => match obj.get("text") {
            Some(Value::String(text)) => text.trim().to_string(),
            _ => raw.to_string(),
        },
        _ => raw.to_string(),
    }
}

/// `User: ...` / `Assistant: ...` lines, blank-line separated, empty turns omitted
pub fn build_transcript(messages: &[TimedMessage]) -> String {
    let mut lines = Vec::new();
    for timed in messages {
        let prompt = timed.message.prompt_text();
        let reply = response_text(timed.message.response_raw());

        if !prompt.is_empty() {
            lines.push(format!("User: {}", prompt));
        }
        if !reply.is_empty() {
            lines.push(format!("Assistant: {}", reply));
        }
    }
    lines.join("\n\n")
}

/// Build the outbound payload. Metadata comes from the first message only.
pub fn build_payload(conversation: &Conversation) -> Option<ConversationPayload> {
    let first = conversation.first()?;

    Some(ConversationPayload {
        conversation: build_transcript(&conversation.messages),
        workspace_id: conversation.workspace_id.clone(),
        thread_id: conversation.thread_id.clone(),
        user: first.username(),
        created_at: first.created_at_raw().to_string(),
        workspace: first.workspace_name(),
        summary: String::new(),
        memory_status: None,
    })
}
