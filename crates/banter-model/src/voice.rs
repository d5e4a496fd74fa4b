//! Voice states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Member;

/// A member's voice state within a guild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceState {
    /// Guild ID; stamped by the dispatcher when absent on the wire.
    #[serde(default)]
    pub guild_id: String,

    /// Channel the user is connected to; empty when disconnecting.
    #[serde(default)]
    pub channel_id: String,

    /// User ID.
    #[serde(default)]
    pub user_id: String,

    /// Guild member record, present with the right intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Box<Member>>,

    /// Voice session ID.
    #[serde(default)]
    pub session_id: String,

    /// Server-deafened.
    #[serde(default)]
    pub deaf: bool,

    /// Server-muted.
    #[serde(default)]
    pub mute: bool,

    /// Self-deafened.
    #[serde(default)]
    pub self_deaf: bool,

    /// Self-muted.
    #[serde(default)]
    pub self_mute: bool,

    /// Streaming via "Go Live".
    #[serde(default)]
    pub self_stream: bool,

    /// Camera enabled.
    #[serde(default)]
    pub self_video: bool,

    /// Suppressed (stage channels).
    #[serde(default)]
    pub suppress: bool,

    /// Pending request to speak.
    #[serde(default)]
    pub request_to_speak_timestamp: Option<DateTime<Utc>>,
}
