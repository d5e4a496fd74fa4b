//! Session configuration.

use serde::{Deserialize, Serialize};

/// Which resource kinds the state cache tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Master switch; when off only the READY identity survives.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-channel message retention; 0 keeps no messages.
    #[serde(default)]
    pub max_message_count: usize,

    #[serde(default = "default_true")]
    pub track_channels: bool,

    #[serde(default = "default_true")]
    pub track_threads: bool,

    #[serde(default = "default_true")]
    pub track_emojis: bool,

    #[serde(default = "default_true")]
    pub track_members: bool,

    #[serde(default = "default_true")]
    pub track_thread_members: bool,

    #[serde(default = "default_true")]
    pub track_roles: bool,

    #[serde(default = "default_true")]
    pub track_voice: bool,

    #[serde(default = "default_true")]
    pub track_presences: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_message_count: 0,
            track_channels: true,
            track_threads: true,
            track_emojis: true,
            track_members: true,
            track_thread_members: true,
            track_roles: true,
            track_voice: true,
            track_presences: true,
        }
    }
}

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bot token, with or without the `Bot ` prefix.
    pub token: String,

    /// Gateway intents bitmask.
    #[serde(default = "default_intents")]
    pub intents: u64,

    /// Whether the gateway may compress dispatches.
    #[serde(default = "default_true")]
    pub compress: bool,

    /// Member-list threshold above which a guild is "large".
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,

    /// This session's shard index.
    #[serde(default)]
    pub shard_id: u32,

    /// Total shard count; sharding engages above 1.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,

    /// Retries for 429 and 5xx REST responses.
    #[serde(default = "default_max_rest_retries")]
    pub max_rest_retries: u32,

    /// Reconnect the gateway after transport errors.
    #[serde(default = "default_true")]
    pub reconnect_on_error: bool,

    /// Re-join voice channels after a gateway reconnect.
    #[serde(default = "default_true")]
    pub reconnect_voice: bool,

    /// Sleep out 429 responses instead of failing.
    #[serde(default = "default_true")]
    pub retry_on_rate_limit: bool,

    /// Run handlers sequentially in dispatch order instead of spawning
    /// one task per handler.
    #[serde(default)]
    pub sync_events: bool,

    /// State cache tracking toggles.
    #[serde(default)]
    pub state: StateConfig,

    /// Gateway URL override; fetched from the API when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,

    /// REST API base override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl SessionConfig {
    /// Configuration with stock defaults for a token.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_owned(),
            intents: default_intents(),
            compress: true,
            large_threshold: default_large_threshold(),
            shard_id: 0,
            shard_count: 1,
            max_rest_retries: default_max_rest_retries(),
            reconnect_on_error: true,
            reconnect_voice: true,
            retry_on_rate_limit: true,
            sync_events: false,
            state: StateConfig::default(),
            gateway_url: None,
            api_url: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_intents() -> u64 {
    banter_model::intents::ALL_WITHOUT_PRIVILEGED
}

fn default_large_threshold() -> u32 {
    250
}

fn default_shard_count() -> u32 {
    1
}

fn default_max_rest_retries() -> u32 {
    3
}
