//! Run configuration, read from the environment.

use crate::dedup::DedupPolicy;
use crate::error::{DigestError, Result};
use crate::grouping::DEFAULT_MAX_GAP_SECS;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Everything a digest run needs to know
#[derive(Debug, Clone)]
pub struct DigestConfig {
    /// Chat API base, e.g. `https://chat.example.com/api`
    pub base_url: String,
    pub api_key: String,
    pub webhook_url: String,
    /// Bearer token for the webhook, if it wants one
    pub webhook_key: Option<String>,
    /// Holds processed_conversations.json and conversation_memories.json
    pub data_dir: PathBuf,
    /// Rolling-window gap between consecutive messages of one conversation
    pub max_gap_secs: i64,
    pub dedup: DedupPolicy,
    pub http_timeout: Duration,
}

impl DigestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| DigestError::Config(format!("{} is not set", key)));

        let max_gap_secs = match get("CONVO_DIGEST_MAX_GAP_SECS") {
            Some(v) => v
                .trim()
                .parse::<i64>()
                .map_err(|e| DigestError::Config(format!("CONVO_DIGEST_MAX_GAP_SECS={:?}: {}", v, e)))?,
            None => DEFAULT_MAX_GAP_SECS,
        };

        let http_timeout = match get("CONVO_DIGEST_HTTP_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(v.trim().parse::<u64>().map_err(|e| {
                DigestError::Config(format!("CONVO_DIGEST_HTTP_TIMEOUT_SECS={:?}: {}", v, e))
            })?),
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let dedup = match get("CONVO_DIGEST_DEDUP") {
            Some(v) => v.parse()?,
            None => DedupPolicy::default(),
        };

        Ok(Self {
            base_url: required("CONVO_DIGEST_BASE_URL")?,
            api_key: required("CONVO_DIGEST_API_KEY")?,
            webhook_url: required("CONVO_DIGEST_WEBHOOK_URL")?,
            webhook_key: get("CONVO_DIGEST_WEBHOOK_KEY"),
            data_dir: get("CONVO_DIGEST_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            max_gap_secs,
            dedup,
            http_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("CONVO_DIGEST_BASE_URL", "http://localhost:3001/api"),
        ("CONVO_DIGEST_API_KEY", "key"),
        ("CONVO_DIGEST_WEBHOOK_URL", "http://localhost:5678/webhook/x"),
    ];

    #[test]
    fn test_defaults() {
        let cfg = DigestConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(cfg.max_gap_secs, 3600);
        assert_eq!(cfg.dedup, DedupPolicy::ThreadPrefix);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.http_timeout, Duration::from_secs(60));
        assert!(cfg.webhook_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("CONVO_DIGEST_MAX_GAP_SECS", "900"),
            ("CONVO_DIGEST_DEDUP", "exact"),
            ("CONVO_DIGEST_DATA_DIR", "/var/lib/digest"),
            ("CONVO_DIGEST_WEBHOOK_KEY", "hook-token"),
        ]);
        let cfg = DigestConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.max_gap_secs, 900);
        assert_eq!(cfg.dedup, DedupPolicy::Exact);
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/digest"));
        assert_eq!(cfg.webhook_key.as_deref(), Some("hook-token"));
    }

    #[test]
    fn test_missing_required_and_bad_numbers() {
        let err = DigestConfig::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("CONVO_DIGEST_WEBHOOK_URL"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CONVO_DIGEST_MAX_GAP_SECS", "an hour"));
        assert!(matches!(
            DigestConfig::from_lookup(lookup(&pairs)).unwrap_err(),
            DigestError::Config(_)
        ));
    }
}
