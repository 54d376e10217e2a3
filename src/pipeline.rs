//! One digest run: fetch, rebuild conversations, skip what was already
//! delivered, post the rest to the webhook and record the outcome.

use crate::client::{ChatSource, ConversationSink};
use crate::config::DigestConfig;
use crate::dedup::{DedupPolicy, ProcessedRecord, ProcessedSet};
use crate::error::Result;
use crate::grouping::{build_conversations, DEFAULT_MAX_GAP_SECS};
use crate::memory::DataStore;
use crate::payload::build_payload;
use tracing::{debug, error, info};

/// Knobs for the reconstruction and dedup stages
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub max_gap_secs: i64,
    pub dedup: DedupPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_gap_secs: DEFAULT_MAX_GAP_SECS,
            dedup: DedupPolicy::default(),
        }
    }
}

impl From<&DigestConfig> for RunOptions {
    fn from(cfg: &DigestConfig) -> Self {
        Self {
            max_gap_secs: cfg.max_gap_secs,
            dedup: cfg.dedup,
        }
    }
}

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub conversations: usize,
    pub skipped: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Run the whole pipeline once.
///
/// Fetch failures, bad timestamps, undecodable store files and filesystem
/// errors abort the run before anything is delivered or written. A conversation whose delivery fails is logged and
/// left unrecorded so the next run tries it again.
pub async fn run_digest<S, K>(source: &S, sink: &K, store: &DataStore, options: RunOptions) -> Result<RunSummary>
where
    S: ChatSource + ?Sized,
    K: ConversationSink + ?Sized,
{
    store.ensure_files()?;

    let processed = ProcessedSet::from_records(&store.load_processed()?.processed, options.dedup)?;
    info!("Found {} previously processed conversations", processed.len());

    let mut memories = store.load_memories()?;

    let chats = source.fetch_chats().await?;
    info!("Retrieved {} chat(s) from API", chats.len());

    let mut summary = RunSummary {
        fetched: chats.len(),
        ..RunSummary::default()
    };

    let conversations = build_conversations(chats, options.max_gap_secs)?;
    summary.conversations = conversations.len();
    info!("Grouped into {} conversations", conversations.len());

    let mut new_records = Vec::new();

    for conversation in &conversations {
        if processed.is_processed(&conversation.id) {
            info!("Skipping already processed conversation: {}", conversation.id);
            summary.skipped += 1;
            continue;
        }

        let Some(mut payload) = build_payload(conversation) else {
            continue;
        };

        info!(
            "Processing conversation {} with {} messages",
            conversation.id,
            conversation.messages.len()
        );
        debug!("Sending payload for conversation {}", conversation.id);

        match sink.deliver(&payload).await {
            Ok(reply) => {
                info!(
                    "Webhook response for {}: memory={:?} status={}",
                    conversation.id, reply.memory, reply.status
                );
                payload.apply_reply(reply);
                memories.push(&payload)?;
                new_records.push(ProcessedRecord::for_conversation(conversation));
                summary.delivered += 1;
            }
            Err(e) if e.is_delivery_recoverable() => {
                error!("Error sending payload for {}: {}", conversation.id, e);
                summary.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    store.append_processed(&new_records)?;
    store.save_memories(&memories)?;

    Ok(summary)
}
