//! Users.

use serde::{Deserialize, Serialize};

/// A Discord user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User ID (snowflake).
    pub id: String,

    /// Username.
    #[serde(default)]
    pub username: String,

    /// Discriminator (legacy, "0" for migrated users).
    #[serde(default)]
    pub discriminator: String,

    /// Global display name.
    #[serde(default)]
    pub global_name: Option<String>,

    /// Avatar hash.
    #[serde(default)]
    pub avatar: Option<String>,

    /// Banner hash.
    #[serde(default)]
    pub banner: Option<String>,

    /// Accent color.
    #[serde(default)]
    pub accent_color: Option<u32>,

    /// Chosen locale.
    #[serde(default)]
    pub locale: Option<String>,

    /// Whether this account is a bot.
    #[serde(default)]
    pub bot: bool,

    /// Whether this account is an official system user.
    #[serde(default)]
    pub system: bool,

    /// Whether MFA is enabled.
    #[serde(default)]
    pub mfa_enabled: bool,

    /// Public flags bitset.
    #[serde(default)]
    pub public_flags: u64,
}

impl User {
    /// Mention string for this user.
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}
