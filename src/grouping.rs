//! Conversation reconstruction.
//!
//! The chat API returns a flat log. It is rebuilt into conversations in
//! three steps:
//! 1. bucket messages by (workspace, thread), oldest first
//! 2. split each bucket wherever two consecutive messages are more than
//!    `max_gap_secs` apart
//! 3. name each segment `{workspace}_{thread}_{YYYYMMDDHHMMSS}` after its
//!    first message, disambiguating repeats within the run

use crate::error::Result;
use crate::sessions::ChatMessage;
use crate::timestamps::{compact_stamp, parse_timestamp};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Default rolling-window gap: one hour.
pub const DEFAULT_MAX_GAP_SECS: i64 = 3600;

/// A message paired with its parsed creation time
#[derive(Debug, Clone)]
pub struct TimedMessage {
    pub at: NaiveDateTime,
    pub message: ChatMessage,
}

/// All messages of one (workspace, thread), sorted by time
#[derive(Debug, Clone)]
pub struct ThreadBucket {
    pub workspace_id: String,
    pub thread_id: String,
    pub messages: Vec<TimedMessage>,
}

impl ThreadBucket {
    pub fn key(&self) -> String {
        format!("{}_{}", self.workspace_id, self.thread_id)
    }
}

/// A time-contiguous run of messages within one thread
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub workspace_id: String,
    pub thread_id: String,
    pub messages: Vec<TimedMessage>,
}

impl Conversation {
    pub fn first(&self) -> Option<&ChatMessage> {
        self.messages.first().map(|m| &m.message)
    }
}

/// `{workspace}_{thread}_{YYYYMMDDHHMMSS}`
pub fn base_conversation_id(workspace_id: &str, thread_id: &str, started: &NaiveDateTime) -> String {
    format!("{}_{}_{}", workspace_id, thread_id, compact_stamp(started))
}

/// Bucket messages by (workspace, thread).
///
/// Buckets come out in order of first appearance. Messages without a
/// workspace are dropped before their timestamps are looked at. Each bucket
/// is stably sorted, so equal timestamps keep fetch order.
pub fn group_by_thread(messages: Vec<ChatMessage>) -> Result<Vec<ThreadBucket>> {
    let mut buckets: Vec<ThreadBucket> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut dropped = 0usize;

    for message in messages {
        let Some(workspace_id) = message.workspace_key() else {
            dropped += 1;
            continue;
        };
        let thread_id = message.thread_key();
        let at = parse_timestamp(message.created_at_raw())?;

        let slot = *index
            .entry((workspace_id.clone(), thread_id.clone()))
            .or_insert_with(|| {
                buckets.push(ThreadBucket {
                    workspace_id,
                    thread_id,
                    messages: Vec::new(),
                });
                buckets.len() - 1
            });
        buckets[slot].messages.push(TimedMessage { at, message });
    }

    if dropped > 0 {
        debug!("Dropped {} messages without a workspace id", dropped);
    }

    for bucket in &mut buckets {
        bucket.messages.sort_by_key(|m| m.at);
    }

    Ok(buckets)
}

/// Split a sorted bucket into segments.
///
/// The gap is measured against the previous message, not the segment start,
/// and a message is never moved back into an earlier segment.
pub fn split_rolling_window(messages: Vec<TimedMessage>, max_gap_secs: i64) -> Vec<Vec<TimedMessage>> {
    let mut segments: Vec<Vec<TimedMessage>> = Vec::new();
    let mut last_at: Option<NaiveDateTime> = None;

    for msg in messages {
        let at = msg.at;
        match (last_at, segments.last_mut()) {
            (Some(prev), Some(current)) if (at - prev).num_seconds() <= max_gap_secs => {
                current.push(msg);
            }
            _ => segments.push(vec![msg]),
        }
        last_at = Some(at);
    }

    segments
}

/// Hands out conversation ids, suffixing `_1`, `_2`, ... when a base id has
/// already been issued in this run.
#[derive(Debug, Default)]
pub struct IdAllocator {
    issued: HashSet<String>,
    counters: HashMap<String, usize>,
}

impl IdAllocator {
    pub fn allocate(&mut self, base: String) -> String {
        if self.issued.insert(base.clone()) {
            return base;
        }
        let counter = self.counters.entry(base.clone()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}_{}", base, counter);
            if self.issued.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Full reconstruction: buckets, then segments, then ids.
///
/// Conversations are returned grouped by thread (first-appearance order) and
/// chronologically within each thread.
pub fn build_conversations(messages: Vec<ChatMessage>, max_gap_secs: i64) -> Result<Vec<Conversation>> {
    let buckets = group_by_thread(messages)?;
    let mut ids = IdAllocator::default();
    let mut conversations = Vec::new();

    for bucket in buckets {
        debug!("Thread {}: {} messages", bucket.key(), bucket.messages.len());
        let ThreadBucket {
            workspace_id,
            thread_id,
            messages,
        } = bucket;

        for segment in split_rolling_window(messages, max_gap_secs) {
            let Some(started) = segment.first().map(|m| m.at) else {
                continue;
            };
            let id = ids.allocate(base_conversation_id(&workspace_id, &thread_id, &started));
            conversations.push(Conversation {
                id,
                workspace_id: workspace_id.clone(),
                thread_id: thread_id.clone(),
                messages: segment,
            });
        }
    }

    Ok(conversations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::sample_message;
    use crate::timestamps::parse_timestamp;

    fn timed(ts: &str) -> TimedMessage {
        TimedMessage {
            at: parse_timestamp(ts).unwrap(),
            message: sample_message("1", None, ts, "", ts),
        }
    }

    #[test]
    fn test_group_sorts_and_drops_unattributed() {
        let mut orphan = sample_message("1", None, "orphan", "", "2024-01-01T00:00:00Z");
        orphan.workspace_id = serde_json::Value::Null;

        let buckets = group_by_thread(vec![
            sample_message("1", Some("t1"), "late", "", "2024-01-01T12:00:00Z"),
            orphan,
            sample_message("2", None, "other", "", "2024-01-01T10:00:00Z"),
            sample_message("1", Some("t1"), "early", "", "2024-01-01T09:00:00Z"),
        ])
        .unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].key(), "1_t1");
        assert_eq!(buckets[1].key(), "2_default");
        let prompts: Vec<&str> = buckets[0].messages.iter().map(|m| m.message.prompt_text()).collect();
        assert_eq!(prompts, vec!["early", "late"]);
        assert!(buckets
            .iter()
            .flat_map(|b| &b.messages)
            .all(|m| m.message.prompt_text() != "orphan"));
    }

    #[test]
    fn test_group_is_stable_for_equal_times() {
        let buckets = group_by_thread(vec![
            sample_message("1", None, "first", "", "2024-01-01T12:00:00Z"),
            sample_message("1", None, "second", "", "2024-01-01T12:00:00.500Z"),
            sample_message("1", None, "zero", "", "2024-01-01T11:00:00Z"),
        ])
        .unwrap();
        let prompts: Vec<&str> = buckets[0].messages.iter().map(|m| m.message.prompt_text()).collect();
        assert_eq!(prompts, vec!["zero", "first", "second"]);
    }

    #[test]
    fn test_group_missing_timestamp_sorts_first() {
        let buckets = group_by_thread(vec![
            sample_message("1", None, "dated", "", "2024-01-01T12:00:00Z"),
            sample_message("1", None, "undated", "", ""),
        ])
        .unwrap();
        assert_eq!(buckets[0].messages[0].message.prompt_text(), "undated");
    }

    #[test]
    fn test_group_malformed_timestamp_is_fatal() {
        let result = group_by_thread(vec![sample_message("1", None, "x", "", "not-a-date")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_split_thirty_then_ninety_minutes() {
        let segments = split_rolling_window(
            vec![
                timed("2024-01-01T12:00:00"),
                timed("2024-01-01T12:30:00"),
                timed("2024-01-01T13:30:00"),
            ],
            3600,
        );
        // T, T+30m, T+90m is sometimes quoted as two segments, but 12:30 -> 13:30
        // is a gap of exactly 3600s and gaps equal to the limit keep the run going
        assert_eq!(segments.len(), 1);

        let segments = split_rolling_window(
            vec![
                timed("2024-01-01T12:00:00"),
                timed("2024-01-01T12:30:00"),
                timed("2024-01-01T13:30:01"),
            ],
            3600,
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].len(), 2);
        assert_eq!(segments[1].len(), 1);
    }

    #[test]
    fn test_split_gaps_are_pairwise() {
        // Each step is 50 minutes, the span is far beyond an hour
        let input = vec![
            timed("2024-01-01T10:00:00"),
            timed("2024-01-01T10:50:00"),
            timed("2024-01-01T11:40:00"),
            timed("2024-01-01T12:30:00"),
        ];
        let segments = split_rolling_window(input, 3600);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 4);
    }

    #[test]
    fn test_split_preserves_length_and_empty() {
        assert!(split_rolling_window(Vec::new(), 3600).is_empty());

        let input = vec![
            timed("2024-01-01T00:00:00"),
            timed("2024-01-01T05:00:00"),
            timed("2024-01-01T05:10:00"),
            timed("2024-01-02T00:00:00"),
        ];
        let segments = split_rolling_window(input, 3600);
        assert_eq!(segments.iter().map(Vec::len).sum::<usize>(), 4);
        assert_eq!(segments.len(), 3);
    }

    #[test]
    fn test_ids_are_stable() {
        let msgs = || {
            vec![
                sample_message("5", None, "a", "", "2024-01-01T12:00:00Z"),
                sample_message("5", None, "b", "", "2024-01-02T09:00:00Z"),
            ]
        };
        let first: Vec<String> = build_conversations(msgs(), 3600).unwrap().into_iter().map(|c| c.id).collect();
        let second: Vec<String> = build_conversations(msgs(), 3600).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(first, vec!["5_default_20240101120000", "5_default_20240102090000"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_colliding_ids_get_counter_suffix() {
        // A negative threshold puts every message in its own segment
        let convs = build_conversations(
            vec![
                sample_message("5", None, "a", "", "2024-01-01T12:00:00.100Z"),
                sample_message("5", None, "b", "", "2024-01-01T12:00:00.200Z"),
                sample_message("5", None, "c", "", "2024-01-01T12:00:00.300Z"),
            ],
            -1,
        )
        .unwrap();
        let ids: Vec<&str> = convs.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "5_default_20240101120000",
                "5_default_20240101120000_1",
                "5_default_20240101120000_2",
            ]
        );
    }

    #[test]
    fn test_allocator_skips_taken_suffix() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.allocate("a_b_1_1".to_string()), "a_b_1_1");
        assert_eq!(ids.allocate("a_b_1".to_string()), "a_b_1");
        assert_eq!(ids.allocate("a_b_1".to_string()), "a_b_1_2");
    }
}
