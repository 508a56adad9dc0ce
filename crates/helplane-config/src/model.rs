// SPDX-FileCopyrightText: 2026 Helplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Helplane support engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Helplane configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HelplaneConfig {
    /// Dispatcher worker pool and event retry settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Conversation continuity window settings.
    #[serde(default)]
    pub continuity: ContinuityConfig,

    /// Hard escalation trigger settings.
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// External responder call settings.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// Outbound delivery retry settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Dispatcher worker pool and event retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of concurrent dispatcher workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Sleep between queue polls when the queue is empty, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Queue name the dispatcher consumes inbound events from.
    #[serde(default = "default_inbound_queue")]
    pub inbound_queue: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            inbound_queue: default_inbound_queue(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_inbound_queue() -> String {
    "inbound".to_string()
}

/// Conversation continuity window configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContinuityConfig {
    /// Maximum age of an active conversation, measured from its start time,
    /// for an inbound message to attach to it.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

impl Default for ContinuityConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
        }
    }
}

fn default_window_hours() -> i64 {
    24
}

/// Hard escalation trigger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    /// Sentiment score below which a conversation escalates. Scores are in
    /// [0.0, 1.0] with 0.5 neutral.
    #[serde(default = "default_sentiment_floor")]
    pub sentiment_floor: f64,

    /// Case-insensitive keywords that force escalation when present in an
    /// inbound body.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            sentiment_floor: default_sentiment_floor(),
            keywords: default_keywords(),
        }
    }
}

fn default_sentiment_floor() -> f64 {
    0.3
}

fn default_keywords() -> Vec<String> {
    // Matched as substrings, so entries must not appear inside everyday
    // words ("sue" would match "issue").
    [
        "lawyer", "attorney", "legal", "lawsuit", "refund", "chargeback",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// External responder call configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    /// Bound on a single responder call, in seconds.
    #[serde(default = "default_responder_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_responder_timeout_secs(),
        }
    }
}

fn default_responder_timeout_secs() -> u64 {
    30
}

/// Outbound delivery retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Maximum send attempts per outbound message.
    #[serde(default = "default_delivery_max_attempts")]
    pub max_attempts: i64,

    /// Base backoff between attempts, in milliseconds. Doubles per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound on a single backoff sleep, in milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_delivery_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

fn default_delivery_max_attempts() -> i64 {
    3
}

fn default_backoff_base_ms() -> u64 {
    200
}

fn default_backoff_cap_ms() -> u64 {
    5_000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("helplane").join("helplane.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "helplane.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let config = HelplaneConfig::default();
        assert_eq!(config.pipeline.workers, 4);
        assert_eq!(config.continuity.window_hours, 24);
        assert_eq!(config.escalation.sentiment_floor, 0.3);
        assert!(config.escalation.keywords.contains(&"lawyer".to_string()));
        assert_eq!(config.responder.timeout_secs, 30);
        assert_eq!(config.delivery.max_attempts, 3);
        assert!(config.storage.wal_mode);
    }
}
