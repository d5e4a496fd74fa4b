//! The closed event sum type and its per-name decoder.
//!
//! Every dispatch the gateway can deliver decodes into one [`Event`]
//! variant; names without a variant decode to [`Event::Unknown`] so the
//! stream never stalls on new event types. The synthetic `__CONNECT__`,
//! `__DISCONNECT__`, and `__RATE_LIMIT__` events use the same type so
//! handlers subscribe to them like any other.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Channel, Emoji, Guild, Interaction, Member, Message, MessageReaction, Presence, Role,
    ThreadMember, User, VoiceState,
};

/// Synthetic event name emitted after a successful gateway open.
pub const CONNECT_EVENT: &str = "__CONNECT__";
/// Synthetic event name emitted after the gateway closes.
pub const DISCONNECT_EVENT: &str = "__DISCONNECT__";
/// Synthetic event name emitted when a REST call is rate limited.
pub const RATE_LIMIT_EVENT: &str = "__RATE_LIMIT__";

/// Gateway connected; fired after identify or resume completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect;

/// Gateway connection lost or closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect;

/// Body of an HTTP 429 response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TooManyRequests {
    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub message: String,

    /// Seconds to wait before retrying.
    #[serde(default)]
    pub retry_after: f64,
}

/// A REST call hit a rate limit; carries the 429 body and the URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimited {
    #[serde(flatten)]
    pub response: TooManyRequests,

    pub url: String,
}

/// READY dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ready {
    #[serde(rename = "v", default)]
    pub version: u32,

    #[serde(default)]
    pub session_id: String,

    #[serde(default)]
    pub user: User,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,

    #[serde(default)]
    pub guilds: Vec<Guild>,

    #[serde(default)]
    pub private_channels: Vec<Channel>,
}

/// RESUMED dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resumed {
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
}

/// CHANNEL_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCreate {
    #[serde(flatten)]
    pub channel: Channel,
}

/// CHANNEL_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    #[serde(flatten)]
    pub channel: Channel,

    /// Cached channel as of just before this update.
    #[serde(skip)]
    pub before_update: Option<Box<Channel>>,
}

/// CHANNEL_DELETE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelDelete {
    #[serde(flatten)]
    pub channel: Channel,
}

/// CHANNEL_PINS_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPinsUpdate {
    #[serde(default)]
    pub channel_id: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub last_pin_timestamp: String,
}

/// THREAD_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadCreate {
    #[serde(flatten)]
    pub channel: Channel,

    #[serde(default)]
    pub newly_created: bool,
}

/// THREAD_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    #[serde(flatten)]
    pub channel: Channel,

    /// Cached thread as of just before this update.
    #[serde(skip)]
    pub before_update: Option<Box<Channel>>,
}

/// THREAD_DELETE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadDelete {
    #[serde(flatten)]
    pub channel: Channel,
}

/// THREAD_LIST_SYNC dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadListSync {
    #[serde(default)]
    pub guild_id: String,

    /// Parent channels the sync covers; absent means the whole guild.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_ids: Vec<String>,

    #[serde(default)]
    pub threads: Vec<Channel>,

    #[serde(default)]
    pub members: Vec<ThreadMember>,
}

/// THREAD_MEMBER_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMemberUpdate {
    #[serde(flatten)]
    pub member: ThreadMember,

    #[serde(default)]
    pub guild_id: String,
}

/// A member added by THREAD_MEMBERS_UPDATE, with optional ride-alongs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddedThreadMember {
    #[serde(flatten)]
    pub thread_member: ThreadMember,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Box<Member>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<Box<Presence>>,
}

/// THREAD_MEMBERS_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadMembersUpdate {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub member_count: u32,

    #[serde(default)]
    pub added_members: Vec<AddedThreadMember>,

    #[serde(rename = "removed_member_ids", default)]
    pub removed_members: Vec<String>,
}

/// GUILD_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildCreate {
    #[serde(flatten)]
    pub guild: Guild,
}

/// GUILD_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildUpdate {
    #[serde(flatten)]
    pub guild: Guild,
}

/// GUILD_DELETE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildDelete {
    #[serde(flatten)]
    pub guild: Guild,

    /// Cached guild as of just before removal.
    #[serde(skip)]
    pub before_delete: Option<Box<Guild>>,
}

/// GUILD_BAN_ADD dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildBanAdd {
    #[serde(default)]
    pub user: User,

    #[serde(default)]
    pub guild_id: String,
}

/// GUILD_BAN_REMOVE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildBanRemove {
    #[serde(default)]
    pub user: User,

    #[serde(default)]
    pub guild_id: String,
}

/// GUILD_MEMBER_ADD dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberAdd {
    #[serde(flatten)]
    pub member: Member,
}

/// GUILD_MEMBER_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberUpdate {
    #[serde(flatten)]
    pub member: Member,

    /// Cached member as of just before this update.
    #[serde(skip)]
    pub before_update: Option<Box<Member>>,
}

/// GUILD_MEMBER_REMOVE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberRemove {
    #[serde(flatten)]
    pub member: Member,
}

/// GUILD_MEMBERS_CHUNK dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildMembersChunk {
    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub members: Vec<Member>,

    #[serde(default)]
    pub chunk_index: u32,

    #[serde(default)]
    pub chunk_count: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_found: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presences: Vec<Presence>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
}

/// GUILD_ROLE_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildRoleCreate {
    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub role: Role,
}

/// GUILD_ROLE_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildRoleUpdate {
    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub role: Role,
}

/// GUILD_ROLE_DELETE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildRoleDelete {
    #[serde(default)]
    pub role_id: String,

    #[serde(default)]
    pub guild_id: String,
}

/// GUILD_EMOJIS_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildEmojisUpdate {
    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub emojis: Vec<Emoji>,
}

/// GUILD_INTEGRATIONS_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildIntegrationsUpdate {
    #[serde(default)]
    pub guild_id: String,
}

/// MESSAGE_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageCreate {
    #[serde(flatten)]
    pub message: Message,
}

/// MESSAGE_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    #[serde(flatten)]
    pub message: Message,

    /// Cached message as of just before this update.
    #[serde(skip)]
    pub before_update: Option<Box<Message>>,
}

/// MESSAGE_DELETE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDelete {
    #[serde(flatten)]
    pub message: Message,

    /// Cached message as of just before removal.
    #[serde(skip)]
    pub before_delete: Option<Box<Message>>,
}

/// MESSAGE_DELETE_BULK dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeleteBulk {
    #[serde(rename = "ids", default)]
    pub messages: Vec<String>,

    #[serde(default)]
    pub channel_id: String,

    #[serde(default)]
    pub guild_id: String,
}

/// MESSAGE_REACTION_ADD dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionAdd {
    #[serde(flatten)]
    pub reaction: MessageReaction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<Box<Member>>,
}

/// MESSAGE_REACTION_REMOVE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionRemove {
    #[serde(flatten)]
    pub reaction: MessageReaction,
}

/// MESSAGE_REACTION_REMOVE_ALL dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionRemoveAll {
    #[serde(flatten)]
    pub reaction: MessageReaction,
}

/// PRESENCE_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    #[serde(flatten)]
    pub presence: Presence,

    #[serde(default)]
    pub guild_id: String,
}

/// TYPING_START dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingStart {
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub channel_id: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub timestamp: u64,
}

/// USER_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(flatten)]
    pub user: User,
}

/// VOICE_SERVER_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceServerUpdate {
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub endpoint: String,
}

/// VOICE_STATE_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    #[serde(flatten)]
    pub state: VoiceState,

    /// Cached state as of just before this update.
    #[serde(skip)]
    pub before_update: Option<Box<VoiceState>>,
}

/// WEBHOOKS_UPDATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhooksUpdate {
    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub channel_id: String,
}

/// INTERACTION_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionCreate {
    #[serde(flatten)]
    pub interaction: Interaction,
}

/// INVITE_CREATE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InviteCreate {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub channel_id: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inviter: Option<User>,

    #[serde(default)]
    pub max_age: u64,

    #[serde(default)]
    pub max_uses: u64,

    #[serde(default)]
    pub temporary: bool,
}

/// INVITE_DELETE dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InviteDelete {
    #[serde(default)]
    pub channel_id: String,

    #[serde(default)]
    pub guild_id: String,

    #[serde(default)]
    pub code: String,
}

macro_rules! events {
    ( $( $name:literal => $kind:ident ( $payload:ty ) ),+ $(,)? ) => {
        /// A decoded gateway (or synthetic) event.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $( $kind(Box<$payload>), )+
            /// A dispatch with no known variant; delivered to catch-alls only.
            Unknown {
                name: String,
                data: Value,
            },
        }

        /// Registration key for one event type.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $( $kind, )+
            /// Catch-all key; handlers under it see every event.
            Any,
            /// Key for dispatches with no known variant.
            Unknown,
        }

        impl Event {
            /// Decode a dispatch by event name.
            ///
            /// Unknown names yield [`Event::Unknown`] rather than an error.
            ///
            /// # Errors
            ///
            /// Returns a JSON error when the payload does not match the
            /// event's shape.
            pub fn decode(name: &str, data: Value) -> Result<Self, serde_json::Error> {
                match name {
                    $( $name => Ok(Self::$kind(Box::new(serde_json::from_value(data)?))), )+
                    _ => Ok(Self::Unknown {
                        name: name.to_owned(),
                        data,
                    }),
                }
            }

            /// The registration key for this event.
            #[must_use]
            pub fn kind(&self) -> EventKind {
                match self {
                    $( Self::$kind(_) => EventKind::$kind, )+
                    Self::Unknown { .. } => EventKind::Unknown,
                }
            }

            /// The wire name of this event.
            #[must_use]
            pub fn name(&self) -> &str {
                match self {
                    $( Self::$kind(_) => $name, )+
                    Self::Unknown { name, .. } => name,
                }
            }
        }

        $(
            impl TypedEvent for $payload {
                const KIND: EventKind = EventKind::$kind;

                fn extract(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$kind(payload) => Some(payload),
                        _ => None,
                    }
                }
            }
        )+
    };
}

/// A payload type with a fixed event key.
///
/// Handler registration is generic over this trait: the payload type chosen
/// by the handler determines which dispatches it receives.
pub trait TypedEvent: Clone + Send + Sync + 'static {
    /// The registration key for this payload type.
    const KIND: EventKind;

    /// Borrow this payload out of an [`Event`], if the variant matches.
    fn extract(event: &Event) -> Option<&Self>;
}

// The whole-event catch-all registers under `EventKind::Any`.
impl TypedEvent for Event {
    const KIND: EventKind = EventKind::Any;

    fn extract(event: &Event) -> Option<&Self> {
        Some(event)
    }
}

events! {
    "__CONNECT__" => Connect(Connect),
    "__DISCONNECT__" => Disconnect(Disconnect),
    "__RATE_LIMIT__" => RateLimit(RateLimited),
    "READY" => Ready(Ready),
    "RESUMED" => Resumed(Resumed),
    "CHANNEL_CREATE" => ChannelCreate(ChannelCreate),
    "CHANNEL_UPDATE" => ChannelUpdate(ChannelUpdate),
    "CHANNEL_DELETE" => ChannelDelete(ChannelDelete),
    "CHANNEL_PINS_UPDATE" => ChannelPinsUpdate(ChannelPinsUpdate),
    "THREAD_CREATE" => ThreadCreate(ThreadCreate),
    "THREAD_UPDATE" => ThreadUpdate(ThreadUpdate),
    "THREAD_DELETE" => ThreadDelete(ThreadDelete),
    "THREAD_LIST_SYNC" => ThreadListSync(ThreadListSync),
    "THREAD_MEMBER_UPDATE" => ThreadMemberUpdate(ThreadMemberUpdate),
    "THREAD_MEMBERS_UPDATE" => ThreadMembersUpdate(ThreadMembersUpdate),
    "GUILD_CREATE" => GuildCreate(GuildCreate),
    "GUILD_UPDATE" => GuildUpdate(GuildUpdate),
    "GUILD_DELETE" => GuildDelete(GuildDelete),
    "GUILD_BAN_ADD" => GuildBanAdd(GuildBanAdd),
    "GUILD_BAN_REMOVE" => GuildBanRemove(GuildBanRemove),
    "GUILD_MEMBER_ADD" => GuildMemberAdd(GuildMemberAdd),
    "GUILD_MEMBER_UPDATE" => GuildMemberUpdate(GuildMemberUpdate),
    "GUILD_MEMBER_REMOVE" => GuildMemberRemove(GuildMemberRemove),
    "GUILD_MEMBERS_CHUNK" => GuildMembersChunk(GuildMembersChunk),
    "GUILD_ROLE_CREATE" => GuildRoleCreate(GuildRoleCreate),
    "GUILD_ROLE_UPDATE" => GuildRoleUpdate(GuildRoleUpdate),
    "GUILD_ROLE_DELETE" => GuildRoleDelete(GuildRoleDelete),
    "GUILD_EMOJIS_UPDATE" => GuildEmojisUpdate(GuildEmojisUpdate),
    "GUILD_INTEGRATIONS_UPDATE" => GuildIntegrationsUpdate(GuildIntegrationsUpdate),
    "MESSAGE_CREATE" => MessageCreate(MessageCreate),
    "MESSAGE_UPDATE" => MessageUpdate(MessageUpdate),
    "MESSAGE_DELETE" => MessageDelete(MessageDelete),
    "MESSAGE_DELETE_BULK" => MessageDeleteBulk(MessageDeleteBulk),
    "MESSAGE_REACTION_ADD" => MessageReactionAdd(MessageReactionAdd),
    "MESSAGE_REACTION_REMOVE" => MessageReactionRemove(MessageReactionRemove),
    "MESSAGE_REACTION_REMOVE_ALL" => MessageReactionRemoveAll(MessageReactionRemoveAll),
    "PRESENCE_UPDATE" => PresenceUpdate(PresenceUpdate),
    "TYPING_START" => TypingStart(TypingStart),
    "USER_UPDATE" => UserUpdate(UserUpdate),
    "VOICE_SERVER_UPDATE" => VoiceServerUpdate(VoiceServerUpdate),
    "VOICE_STATE_UPDATE" => VoiceStateUpdate(VoiceStateUpdate),
    "WEBHOOKS_UPDATE" => WebhooksUpdate(WebhooksUpdate),
    "INTERACTION_CREATE" => InteractionCreate(InteractionCreate),
    "INVITE_CREATE" => InviteCreate(InviteCreate),
    "INVITE_DELETE" => InviteDelete(InviteDelete),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message_create() {
        let event = Event::decode(
            "MESSAGE_CREATE",
            serde_json::json!({"id": "1", "channel_id": "C", "content": "hi"}),
        )
        .unwrap();

        let Event::MessageCreate(payload) = &event else {
            panic!("wrong variant: {event:?}");
        };
        assert_eq!(payload.message.content, "hi");
        assert_eq!(event.kind(), EventKind::MessageCreate);
        assert_eq!(event.name(), "MESSAGE_CREATE");
    }

    #[test]
    fn decode_unknown_event() {
        let event =
            Event::decode("SOME_FUTURE_EVENT", serde_json::json!({"x": 1})).unwrap();
        assert_eq!(event.kind(), EventKind::Unknown);
        assert_eq!(event.name(), "SOME_FUTURE_EVENT");
    }

    #[test]
    fn typed_extraction_matches_variant() {
        let event = Event::decode(
            "GUILD_ROLE_DELETE",
            serde_json::json!({"role_id": "r", "guild_id": "g"}),
        )
        .unwrap();

        let payload = GuildRoleDelete::extract(&event).unwrap();
        assert_eq!(payload.role_id, "r");
        assert!(MessageCreate::extract(&event).is_none());
    }

    #[test]
    fn catch_all_extracts_everything() {
        let event = Event::decode("TYPING_START", serde_json::json!({})).unwrap();
        assert!(Event::extract(&event).is_some());
        assert_eq!(Event::KIND, EventKind::Any);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let result = Event::decode("READY", serde_json::json!("not an object"));
        assert!(result.is_err());
    }
}
