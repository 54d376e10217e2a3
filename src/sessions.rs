//! Chat records as returned by the workspace-chats API.
//!
//! Records are kept close to the wire shape. Identifier fields stay as raw
//! JSON values because the API mixes strings and numbers for them; the
//! accessor methods below apply the "falsy means absent" rule.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_THREAD: &str = "default";
pub const DEFAULT_WORKSPACE_NAME: &str = "Default Workspace";

/// One prompt/response exchange from the chat API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "workspaceId", default)]
    pub workspace_id: Value,
    #[serde(default)]
    pub thread_id: Value,
    #[serde(default)]
    pub prompt: Option<String>,
    /// Plain text or a JSON document with a `text` field
    #[serde(default)]
    pub response: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub workspace: Option<WorkspaceInfo>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: Option<String>,
}

/// Render an identifier-like JSON value as text.
///
/// Null, `""`, `0` and `false` are treated as missing, matching how the chat
/// export has always been read.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("True".to_string()),
        _ => None,
    }
}

impl ChatMessage {
    /// Workspace id, or `None` when the record can't be attributed
    pub fn workspace_key(&self) -> Option<String> {
        scalar_text(&self.workspace_id)
    }

    pub fn thread_key(&self) -> String {
        scalar_text(&self.thread_id).unwrap_or_else(|| DEFAULT_THREAD.to_string())
    }

    pub fn created_at_raw(&self) -> &str {
        self.created_at.as_deref().unwrap_or("")
    }

    pub fn prompt_text(&self) -> &str {
        self.prompt.as_deref().unwrap_or("").trim()
    }

    pub fn response_raw(&self) -> &str {
        self.response.as_deref().unwrap_or("").trim()
    }

    /// Falls back to "Default Workspace" when `workspace`, or its `name`,
    /// is missing or null
    pub fn workspace_name(&self) -> String {
        self.workspace
            .as_ref()
            .and_then(|w| w.name.clone())
            .unwrap_or_else(|| DEFAULT_WORKSPACE_NAME.to_string())
    }

    pub fn username(&self) -> String {
        self.user
            .as_ref()
            .and_then(|u| u.username.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
pub fn sample_message(
    workspace: &str,
    thread: Option<&str>,
    prompt: &str,
    response: &str,
    created_at: &str,
) -> ChatMessage {
    ChatMessage {
        workspace_id: Value::String(workspace.to_string()),
        thread_id: thread.map_or(Value::Null, |t| Value::String(t.to_string())),
        prompt: Some(prompt.to_string()),
        response: Some(response.to_string()),
        created_at: Some(created_at.to_string()),
        workspace: Some(WorkspaceInfo {
            name: Some(format!("Workspace {}", workspace)),
        }),
        user: Some(UserInfo {
            username: Some("alice".to_string()),
        }),
    }
}
