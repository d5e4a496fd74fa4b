//! Gateway envelope and control payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Activity, Status};

/// Gateway API version appended to the gateway URL.
pub const API_VERSION: &str = "10";

/// Gateway opcodes.
pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const PRESENCE_UPDATE: u8 = 3;
    pub const VOICE_STATE_UPDATE: u8 = 4;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const REQUEST_GUILD_MEMBERS: u8 = 8;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Gateway intents bitmask.
pub mod intents {
    pub const GUILDS: u64 = 1 << 0;
    pub const GUILD_MEMBERS: u64 = 1 << 1;
    pub const GUILD_MODERATION: u64 = 1 << 2;
    pub const GUILD_EMOJIS: u64 = 1 << 3;
    pub const GUILD_INTEGRATIONS: u64 = 1 << 4;
    pub const GUILD_WEBHOOKS: u64 = 1 << 5;
    pub const GUILD_INVITES: u64 = 1 << 6;
    pub const GUILD_VOICE_STATES: u64 = 1 << 7;
    pub const GUILD_PRESENCES: u64 = 1 << 8;
    pub const GUILD_MESSAGES: u64 = 1 << 9;
    pub const GUILD_MESSAGE_REACTIONS: u64 = 1 << 10;
    pub const GUILD_MESSAGE_TYPING: u64 = 1 << 11;
    pub const DIRECT_MESSAGES: u64 = 1 << 12;
    pub const DIRECT_MESSAGE_REACTIONS: u64 = 1 << 13;
    pub const DIRECT_MESSAGE_TYPING: u64 = 1 << 14;
    pub const MESSAGE_CONTENT: u64 = 1 << 15;
    pub const GUILD_SCHEDULED_EVENTS: u64 = 1 << 16;
    pub const AUTO_MODERATION_CONFIGURATION: u64 = 1 << 20;
    pub const AUTO_MODERATION_EXECUTION: u64 = 1 << 21;

    /// Every intent that does not require privileged access.
    pub const ALL_WITHOUT_PRIVILEGED: u64 = GUILDS
        | GUILD_MODERATION
        | GUILD_EMOJIS
        | GUILD_INTEGRATIONS
        | GUILD_WEBHOOKS
        | GUILD_INVITES
        | GUILD_VOICE_STATES
        | GUILD_MESSAGES
        | GUILD_MESSAGE_REACTIONS
        | GUILD_MESSAGE_TYPING
        | DIRECT_MESSAGES
        | DIRECT_MESSAGE_REACTIONS
        | DIRECT_MESSAGE_TYPING
        | GUILD_SCHEDULED_EVENTS
        | AUTO_MODERATION_CONFIGURATION
        | AUTO_MODERATION_EXECUTION;

    /// Every intent, privileged ones included.
    pub const ALL: u64 =
        ALL_WITHOUT_PRIVILEGED | GUILD_MEMBERS | GUILD_PRESENCES | MESSAGE_CONTENT;
}

/// The gateway JSON envelope: `{op, d, s, t}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Opcode.
    pub op: u8,

    /// Event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,

    /// Sequence number, set on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name, set on dispatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    /// Build an envelope around an opcode and serialized data.
    ///
    /// # Errors
    ///
    /// Returns a JSON error when `data` fails to serialize.
    pub fn new<T: Serialize>(op: u8, data: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            op,
            d: Some(serde_json::to_value(data)?),
            s: None,
            t: None,
        })
    }
}

/// Identify connection properties.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Host operating system.
    #[serde(rename = "$os")]
    pub os: String,

    /// Library identifier.
    #[serde(rename = "$browser")]
    pub browser: String,

    /// Device identifier.
    #[serde(rename = "$device")]
    pub device: String,
}

/// Op-2 identify payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identify {
    /// Bot token.
    pub token: String,

    /// Connection properties.
    pub properties: IdentifyProperties,

    /// Whether the server may compress dispatches.
    pub compress: bool,

    /// Member-list threshold above which a guild is "large".
    pub large_threshold: u32,

    /// Shard tuple `[shard_id, shard_count]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,

    /// Gateway intents bitmask.
    pub intents: u64,
}

/// Op-6 resume payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resume {
    pub token: String,

    pub session_id: String,

    pub seq: u64,
}

/// Op-10 hello payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat period in milliseconds.
    pub heartbeat_interval: u64,
}

/// Op-3 presence update payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateStatusData {
    /// Milliseconds since the client went idle, or null.
    pub since: Option<u64>,

    /// Current activities.
    #[serde(default)]
    pub activities: Vec<Activity>,

    /// Whether the client is AFK.
    pub afk: bool,

    /// Status string.
    pub status: Status,
}

impl UpdateStatusData {
    /// Build an online presence with a single activity of the given type.
    #[must_use]
    pub fn with_activity(idle_since: Option<u64>, activity: Activity) -> Self {
        Self {
            since: idle_since,
            activities: vec![activity],
            afk: false,
            status: Status::Online,
        }
    }
}

/// Op-8 request guild members payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestGuildMembersData {
    /// Guilds to fetch members for.
    pub guild_id: Vec<String>,

    /// Username prefix filter; empty string matches everyone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Explicit user IDs to fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,

    /// Maximum members to return; 0 means no limit (query mode only).
    pub limit: u32,

    /// Echoed back in the resulting chunks.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub nonce: String,

    /// Whether to include presences.
    pub presences: bool,
}

/// Op-4 voice state update payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoiceStateUpdateData {
    pub guild_id: String,

    /// Channel to join, or null to disconnect.
    pub channel_id: Option<String>,

    pub self_mute: bool,

    pub self_deaf: bool,
}
