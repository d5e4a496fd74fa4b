//! Messages, embeds, and attachments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Channel, Member, MessageComponent, User};

/// A chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID.
    pub id: String,

    /// Channel the message was sent in.
    #[serde(default)]
    pub channel_id: String,

    /// Guild the message was sent in; empty for DMs.
    #[serde(default)]
    pub guild_id: String,

    /// Text content.
    #[serde(default)]
    pub content: String,

    /// When the message was sent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// When the message was last edited.
    #[serde(default)]
    pub edited_timestamp: Option<DateTime<Utc>>,

    /// Whether this was a TTS message.
    #[serde(default)]
    pub tts: bool,

    /// Whether this message mentions everyone.
    #[serde(default)]
    pub mention_everyone: bool,

    /// Author; absent on some webhook messages.
    #[serde(default)]
    pub author: Option<User>,

    /// Author's member record, on guild messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Box<Member>>,

    /// Users specifically mentioned.
    #[serde(default)]
    pub mentions: Vec<User>,

    /// Roles specifically mentioned.
    #[serde(default)]
    pub mention_roles: Vec<String>,

    /// Attached files.
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Embedded content.
    #[serde(default)]
    pub embeds: Vec<Embed>,

    /// Reactions on the message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reactions>,

    /// Interactive components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<MessageComponent>,

    /// Whether the message is pinned.
    #[serde(default)]
    pub pinned: bool,

    /// Message type discriminator.
    #[serde(rename = "type", default)]
    pub kind: u8,

    /// Webhook that produced the message, if any.
    #[serde(default)]
    pub webhook_id: String,

    /// Reply / crosspost reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,

    /// The message this one replies to, resolved by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_message: Option<Box<Message>>,

    /// Thread started from this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<Box<Channel>>,

    /// Message flags bitset.
    #[serde(default)]
    pub flags: u64,
}

/// A reaction tally on a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reactions {
    /// Number of users that reacted.
    #[serde(default)]
    pub count: u32,

    /// Whether the current user reacted.
    #[serde(default)]
    pub me: bool,

    /// The emoji reacted with.
    #[serde(default)]
    pub emoji: crate::Emoji,
}

/// A single user's reaction, as carried by reaction gateway events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReaction {
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub message_id: String,

    #[serde(default)]
    pub channel_id: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub emoji: crate::Emoji,
}

/// Reference to another message (replies, crossposts).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

/// An uploaded attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,

    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub size: u64,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub proxy_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Embedded rich content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

/// Embed footer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Embed image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedImage {
    pub url: String,
}

/// Embed thumbnail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

/// Embed author.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Embed field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,

    pub value: String,

    #[serde(default)]
    pub inline: bool,
}

/// Controls which mentions actually ping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowedMentions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,

    #[serde(default)]
    pub replied_user: bool,
}

/// Outbound message creation payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageSend {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<bool>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<MessageComponent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,

    /// Files to upload alongside the JSON payload; sent as multipart parts,
    /// never serialized.
    #[serde(skip)]
    pub files: Vec<File>,
}

/// Outbound message edit payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Embed>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<MessageComponent>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
}

/// A file to upload.
#[derive(Debug, Clone, Default)]
pub struct File {
    /// File name as shown in the client.
    pub name: String,

    /// MIME type.
    pub content_type: String,

    /// Raw file contents.
    pub data: Vec<u8>,
}
