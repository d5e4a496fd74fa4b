//! Presences and activities.

use serde::{Deserialize, Serialize};

use crate::User;

/// Online status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Idle,
    Dnd,
    Invisible,
    #[default]
    Offline,
}

impl Status {
    /// Wire string for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Idle => "idle",
            Self::Dnd => "dnd",
            Self::Invisible => "invisible",
            Self::Offline => "offline",
        }
    }
}

/// Activity type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityType(pub u8);

impl ActivityType {
    pub const GAME: Self = Self(0);
    pub const STREAMING: Self = Self(1);
    pub const LISTENING: Self = Self(2);
    pub const WATCHING: Self = Self(3);
    pub const CUSTOM: Self = Self(4);
    pub const COMPETING: Self = Self(5);
}

/// A user activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity name.
    #[serde(default)]
    pub name: String,

    /// Activity type.
    #[serde(rename = "type", default)]
    pub kind: ActivityType,

    /// Stream URL, validated for streaming activities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Custom status text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// What the player is currently doing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Per-platform status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desktop: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<Status>,
}

/// A member's presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// The user this presence is for; often a partial user with only an id.
    #[serde(default)]
    pub user: User,

    /// Overall status.
    #[serde(default)]
    pub status: Option<Status>,

    /// Current activities.
    #[serde(default)]
    pub activities: Vec<Activity>,

    /// Per-platform status.
    #[serde(default)]
    pub client_status: ClientStatus,
}
