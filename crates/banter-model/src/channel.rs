//! Channels, threads, and permission overwrites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Member, Message, User};

/// Channel type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelType(pub u8);

impl ChannelType {
    pub const GUILD_TEXT: Self = Self(0);
    pub const DM: Self = Self(1);
    pub const GUILD_VOICE: Self = Self(2);
    pub const GROUP_DM: Self = Self(3);
    pub const GUILD_CATEGORY: Self = Self(4);
    pub const GUILD_NEWS: Self = Self(5);
    pub const GUILD_NEWS_THREAD: Self = Self(10);
    pub const GUILD_PUBLIC_THREAD: Self = Self(11);
    pub const GUILD_PRIVATE_THREAD: Self = Self(12);
    pub const GUILD_STAGE_VOICE: Self = Self(13);
    pub const GUILD_FORUM: Self = Self(15);

    /// Whether this type is a thread.
    #[must_use]
    pub fn is_thread(self) -> bool {
        matches!(
            self,
            Self::GUILD_NEWS_THREAD | Self::GUILD_PUBLIC_THREAD | Self::GUILD_PRIVATE_THREAD
        )
    }

    /// Whether this type is a DM or group DM.
    #[must_use]
    pub fn is_private(self) -> bool {
        matches!(self, Self::DM | Self::GROUP_DM)
    }
}

/// Permission overwrite target type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverwriteType(pub u8);

impl OverwriteType {
    pub const ROLE: Self = Self(0);
    pub const MEMBER: Self = Self(1);
}

/// A channel permission overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionOverwrite {
    /// Role or user ID this overwrite applies to.
    pub id: String,

    /// Whether `id` is a role or a member.
    #[serde(rename = "type")]
    pub kind: OverwriteType,

    /// Allowed permission bits.
    #[serde(with = "crate::string_i64", default)]
    pub allow: i64,

    /// Denied permission bits.
    #[serde(with = "crate::string_i64", default)]
    pub deny: i64,
}

/// Thread-specific channel metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    /// Whether the thread is archived.
    #[serde(default)]
    pub archived: bool,

    /// Auto-archive duration in minutes.
    #[serde(default)]
    pub auto_archive_duration: u32,

    /// When the archive status last changed.
    #[serde(default)]
    pub archive_timestamp: Option<DateTime<Utc>>,

    /// Whether the thread is locked.
    #[serde(default)]
    pub locked: bool,

    /// Whether non-moderators can add members.
    #[serde(default)]
    pub invitable: bool,
}

/// A member of a thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMember {
    /// Thread ID.
    #[serde(default)]
    pub id: String,

    /// User ID.
    #[serde(default)]
    pub user_id: String,

    /// When the user joined the thread.
    #[serde(default)]
    pub join_timestamp: Option<DateTime<Utc>>,

    /// User-thread settings bitset.
    #[serde(default)]
    pub flags: u64,

    /// Guild member record, present with the right intents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Box<Member>>,
}

/// A guild channel, DM, or thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID.
    pub id: String,

    /// Owning guild ID; empty for DMs.
    #[serde(default)]
    pub guild_id: String,

    /// Channel name.
    #[serde(default)]
    pub name: String,

    /// Channel topic.
    #[serde(default)]
    pub topic: String,

    /// Channel type.
    #[serde(rename = "type", default)]
    pub kind: ChannelType,

    /// ID of the most recent message.
    #[serde(default)]
    pub last_message_id: String,

    /// Approximate message count (threads).
    #[serde(default)]
    pub message_count: u32,

    /// Approximate member count (threads, capped by the API).
    #[serde(default)]
    pub member_count: u32,

    /// Whether the channel is NSFW.
    #[serde(default)]
    pub nsfw: bool,

    /// Sorting position.
    #[serde(default)]
    pub position: i32,

    /// Voice bitrate.
    #[serde(default)]
    pub bitrate: u32,

    /// Voice user limit.
    #[serde(default)]
    pub user_limit: u32,

    /// DM / group DM recipients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<User>,

    /// Cached message history. Never on the wire; maintained by the state
    /// cache, bounded by its configured cap.
    #[serde(skip)]
    pub messages: Vec<Message>,

    /// Permission overwrites.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permission_overwrites: Vec<PermissionOverwrite>,

    /// Parent category or, for threads, parent channel.
    #[serde(default)]
    pub parent_id: String,

    /// Slowmode interval in seconds.
    #[serde(default)]
    pub rate_limit_per_user: u32,

    /// Creator of a group DM or thread.
    #[serde(default)]
    pub owner_id: String,

    /// Application ID of a bot-created group DM.
    #[serde(default)]
    pub application_id: String,

    /// Thread metadata, present only on threads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_metadata: Option<ThreadMetadata>,

    /// The current user's thread membership.
    #[serde(rename = "thread_member", default, skip_serializing_if = "Option::is_none")]
    pub member: Option<ThreadMember>,

    /// Thread member list. Never on the wire; maintained from
    /// thread-members-update dispatches.
    #[serde(skip)]
    pub members: Vec<ThreadMember>,

    /// Channel flags bitset.
    #[serde(default)]
    pub flags: u64,
}

impl Channel {
    /// Mention string for this channel.
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }

    /// Whether this channel is a thread.
    #[must_use]
    pub fn is_thread(&self) -> bool {
        self.kind.is_thread()
    }
}
