//! Guilds, roles, emojis, and members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Channel, Presence, User, VoiceState};

/// A guild role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role ID.
    pub id: String,

    /// Role name.
    #[serde(default)]
    pub name: String,

    /// Whether the role is managed by an integration.
    #[serde(default)]
    pub managed: bool,

    /// Whether the role is mentionable.
    #[serde(default)]
    pub mentionable: bool,

    /// Whether the role is hoisted in the member list.
    #[serde(default)]
    pub hoist: bool,

    /// Role color as an integer RGB value; 0 means no color.
    #[serde(default)]
    pub color: u32,

    /// Sorting position; higher positions sort first.
    #[serde(default)]
    pub position: i32,

    /// Permission bits.
    #[serde(with = "crate::string_i64", default)]
    pub permissions: i64,

    /// Unicode emoji shown next to the role.
    #[serde(default)]
    pub unicode_emoji: String,
}

/// A custom guild emoji.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    /// Emoji ID; empty for unicode emoji.
    #[serde(default)]
    pub id: String,

    /// Emoji name.
    #[serde(default)]
    pub name: String,

    /// Roles allowed to use this emoji.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Whether the emoji is animated.
    #[serde(default)]
    pub animated: bool,

    /// Whether the emoji is managed by an integration.
    #[serde(default)]
    pub managed: bool,

    /// Whether the emoji requires colons to use.
    #[serde(default)]
    pub require_colons: bool,

    /// Whether the emoji is currently usable.
    #[serde(default)]
    pub available: bool,
}

impl Emoji {
    /// The `name:id` form used by reaction endpoints; unicode emoji are
    /// their name alone.
    #[must_use]
    pub fn api_name(&self) -> String {
        if self.id.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.name, self.id)
        }
    }
}

/// A guild member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Guild ID; stamped by the dispatcher when absent on the wire.
    #[serde(default)]
    pub guild_id: String,

    /// When the user joined the guild.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,

    /// Guild nickname.
    #[serde(default)]
    pub nick: String,

    /// Whether the member is server-deafened.
    #[serde(default)]
    pub deaf: bool,

    /// Whether the member is server-muted.
    #[serde(default)]
    pub mute: bool,

    /// Guild avatar hash.
    #[serde(default)]
    pub avatar: String,

    /// The underlying user.
    #[serde(default)]
    pub user: Option<User>,

    /// Role IDs.
    #[serde(default)]
    pub roles: Vec<String>,

    /// When the member started boosting.
    #[serde(default)]
    pub premium_since: Option<DateTime<Utc>>,

    /// Whether the member has not yet passed membership screening.
    #[serde(default)]
    pub pending: bool,

    /// Total computed permissions, returned on interaction payloads.
    #[serde(with = "crate::string_i64", default)]
    pub permissions: i64,

    /// Timeout expiry.
    #[serde(default)]
    pub communication_disabled_until: Option<DateTime<Utc>>,
}

impl Member {
    /// The member's user ID, or empty when the user block is absent.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.user.as_ref().map_or("", |u| u.id.as_str())
    }
}

/// A guild.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    /// Guild ID.
    pub id: String,

    /// Guild name.
    #[serde(default)]
    pub name: String,

    /// Icon hash.
    #[serde(default)]
    pub icon: String,

    /// Owner's user ID.
    #[serde(default)]
    pub owner_id: String,

    /// When the current user joined.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,

    /// Total member count; 0 means not provided.
    #[serde(default)]
    pub member_count: u32,

    /// Whether the guild is considered large.
    #[serde(default)]
    pub large: bool,

    /// Whether the guild is unavailable due to an outage.
    #[serde(default)]
    pub unavailable: bool,

    /// Roles.
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Custom emojis.
    #[serde(default)]
    pub emojis: Vec<Emoji>,

    /// Members, bounded by the large threshold at GUILD_CREATE.
    #[serde(default)]
    pub members: Vec<Member>,

    /// Presences of online members.
    #[serde(default)]
    pub presences: Vec<Presence>,

    /// Channels.
    #[serde(default)]
    pub channels: Vec<Channel>,

    /// Active threads the current user can see.
    #[serde(default)]
    pub threads: Vec<Channel>,

    /// Voice states of members in voice channels.
    #[serde(default)]
    pub voice_states: Vec<VoiceState>,

    /// Enabled guild features.
    #[serde(default)]
    pub features: Vec<String>,

    /// Description of a community guild.
    #[serde(default)]
    pub description: String,

    /// Banner hash.
    #[serde(default)]
    pub banner: String,

    /// Preferred locale of a community guild.
    #[serde(default)]
    pub preferred_locale: String,

    /// System messages channel.
    #[serde(default)]
    pub system_channel_id: String,

    /// AFK voice channel.
    #[serde(default)]
    pub afk_channel_id: String,

    /// AFK timeout in seconds.
    #[serde(default)]
    pub afk_timeout: u32,

    /// Total permissions for the current user, on partial guild objects.
    #[serde(with = "crate::string_i64", default)]
    pub permissions: i64,
}
