//! # convo-digest
//!
//! One-shot job that turns a flat chat log into conversation summaries.
//!
//! Each invocation:
//! - fetches every chat record from the workspace-chats API
//! - rebuilds conversations per (workspace, thread) with a rolling time window
//! - skips conversations recorded as delivered by earlier runs
//! - posts each new conversation to the summarization webhook
//! - appends the results to the processed and memory logs in the data dir
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   chats   ┌──────────────┐  conversations  ┌─────────────┐
//! │  Chat API    │──────────▶│  grouping.rs │────────────────▶│ pipeline.rs │
//! │ (client.rs)  │           └──────────────┘                 └─────────────┘
//! └──────────────┘                                             │    │     ▲
//!                                             payload.rs ◀─────┘    │     │ dedup.rs
//!                                                 │                 ▼     │
//!                                                 ▼           ┌─────────────────┐
//!                                         ┌──────────────┐    │ data/*.json     │
//!                                         │   Webhook    │    │ (memory.rs)     │
//!                                         └──────────────┘    └─────────────────┘
//! ```
//!
//! Runs must not overlap; schedule it from cron or a job runner that
//! guarantees a single instance.

mod client;
mod config;
mod dedup;
mod error;
mod grouping;
mod memory;
mod payload;
mod pipeline;
mod sessions;
mod timestamps;

use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::client::{HttpChatSource, WebhookSink};
use crate::config::DigestConfig;
use crate::error::Result;
use crate::memory::DataStore;
use crate::pipeline::{run_digest, RunOptions, RunSummary};

async fn run(config: &DigestConfig) -> Result<RunSummary> {
    let source = HttpChatSource::new(&config.base_url, &config.api_key, config.http_timeout)?;
    let sink = WebhookSink::new(&config.webhook_url, config.webhook_key.clone(), config.http_timeout)?;
    let store = DataStore::open(&config.data_dir)?;

    run_digest(&source, &sink, &store, RunOptions::from(config)).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("convo_digest=info")))
        .init();

    let config = match DigestConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting chat processing at {}", timestamps::now_stamp());
    info!(
        "Data dir: {}, window: {}s, dedup: {:?}",
        config.data_dir.display(),
        config.max_gap_secs,
        config.dedup
    );

    match run(&config).await {
        Ok(summary) => {
            info!("Processing complete at {}", timestamps::now_stamp());
            info!(
                "Processed {} new conversations ({} fetched chats, {} conversations, {} skipped, {} failed)",
                summary.delivered, summary.fetched, summary.conversations, summary.skipped, summary.failed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
