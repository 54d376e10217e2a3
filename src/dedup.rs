//! Tracking which conversations were delivered by earlier runs.
//!
//! The processed store is a list of loosely shaped records. Current records
//! carry a `conversationId`; older ones only have workspace, thread and the
//! time they were processed. Both are resolved once, at load time, into a
//! flat set of conversation ids.

use crate::error::{DigestError, Result};
use crate::grouping::{base_conversation_id, Conversation};
use crate::sessions::scalar_text;
use crate::timestamps::{earliest, now_stamp, parse_timestamp};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::warn;

/// The marker written for a conversation delivered in this run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRecord {
    #[serde(rename = "workspaceId")]
    pub workspace_id: String,
    pub thread_id: String,
    #[serde(rename = "processedTime")]
    pub processed_time: String,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
}

impl ProcessedRecord {
    pub fn for_conversation(conversation: &Conversation) -> Self {
        Self {
            workspace_id: conversation.workspace_id.clone(),
            thread_id: conversation.thread_id.clone(),
            processed_time: now_stamp(),
            conversation_id: conversation.id.clone(),
        }
    }
}

/// What a stored record says about past deliveries
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedEntry {
    Identified(String),
    Legacy {
        workspace_id: String,
        thread_id: String,
        processed_at: NaiveDateTime,
    },
    /// Legacy record missing a workspace, thread or time
    Incomplete,
    /// Not shaped like any known record; stays in the file, ignored for dedup
    Unrecognized,
}

impl ProcessedEntry {
    /// Read one stored record. Records are taken field by field, so a stray
    /// type in one field never affects the rest of the store.
    ///
    /// Fails only if a legacy record has a malformed `processedTime` string.
    pub fn classify(record: &Value) -> Result<Self> {
        let Value::Object(obj) = record else {
            return Ok(ProcessedEntry::Unrecognized);
        };

        match obj.get("conversationId") {
            Some(Value::String(id)) => return Ok(ProcessedEntry::Identified(id.clone())),
            None | Some(Value::Null) => {}
            Some(_) => return Ok(ProcessedEntry::Unrecognized),
        }

        let processed_time = match obj.get("processedTime") {
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Ok(ProcessedEntry::Unrecognized),
        };
        let processed_at = parse_timestamp(processed_time)?;

        let field = |key: &str| obj.get(key).and_then(scalar_text);
        match (field("workspaceId"), field("thread_id")) {
            (Some(workspace_id), Some(thread_id)) if processed_at != earliest() => {
                Ok(ProcessedEntry::Legacy {
                    workspace_id,
                    thread_id,
                    processed_at,
                })
            }
            _ => Ok(ProcessedEntry::Incomplete),
        }
    }

    pub fn conversation_id(self) -> Option<String> {
        match self {
            ProcessedEntry::Identified(id) => Some(id),
            ProcessedEntry::Legacy {
                workspace_id,
                thread_id,
                processed_at,
            } => Some(base_conversation_id(&workspace_id, &thread_id, &processed_at)),
            ProcessedEntry::Incomplete | ProcessedEntry::Unrecognized => None,
        }
    }
}

/// How a candidate id is matched against past deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Exact id match, or any processed id sharing the `{workspace}_{thread}`
    /// prefix. Once a thread has delivered one conversation, later ones in
    /// that thread are treated as done too.
    #[default]
    ThreadPrefix,
    /// Exact id match only
    Exact,
}

impl FromStr for DedupPolicy {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thread-prefix" | "prefix" => Ok(DedupPolicy::ThreadPrefix),
            "exact" => Ok(DedupPolicy::Exact),
            other => Err(DigestError::Config(format!("unknown dedup policy: {}", other))),
        }
    }
}

/// First two `_`-separated fields of a conversation id
pub fn thread_prefix(conversation_id: &str) -> String {
    conversation_id.split('_').take(2).collect::<Vec<_>>().join("_")
}

/// Conversation ids delivered by previous runs
#[derive(Debug, Clone, Default)]
pub struct ProcessedSet {
    ids: HashSet<String>,
    policy: DedupPolicy,
}

impl ProcessedSet {
    pub fn from_records(records: &[Value], policy: DedupPolicy) -> Result<Self> {
        let mut ids = HashSet::new();
        for record in records {
            match ProcessedEntry::classify(record)? {
                ProcessedEntry::Unrecognized => warn!("Ignoring unrecognized processed record: {}", record),
                entry => ids.extend(entry.conversation_id()),
            }
        }
        Ok(Self { ids, policy })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_processed(&self, conversation_id: &str) -> bool {
        if self.ids.contains(conversation_id) {
            return true;
        }
        match self.policy {
            DedupPolicy::Exact => false,
            DedupPolicy::ThreadPrefix => {
                let prefix = thread_prefix(conversation_id);
                self.ids.iter().any(|id| id.starts_with(&prefix))
            }
        }
    }
}
