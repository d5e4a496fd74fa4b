//! The in-memory state cache.
//!
//! The cache is advanced only by the dispatcher, before handlers run, so a
//! handler invoked for event X observes the state as of X inclusive. Guild
//! upserts merge: fields absent (empty) in the incoming guild keep their
//! cached values. Channels and threads are indexed by ID across guilds and
//! private channels; per-channel message history is bounded FIFO.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use banter_model::{
    permissions, Channel, Emoji, Event, Guild, Member, Message, Presence, Ready, Role,
    ThreadListSync, ThreadMembersUpdate, User, VoiceState,
};

use crate::config::StateConfig;

/// State cache errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// The requested item is not cached.
    #[error("state cache not found")]
    NotFound,

    /// The message lacks the author or member data permissions need.
    #[error("message is missing author or member for permission calculation")]
    MessageIncompletePermissions,
}

/// Result type for cache queries.
pub type StateResult<T> = Result<T, StateError>;

/// Where a channel lives in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelLocation {
    Private,
    Guild(String),
}

#[derive(Default)]
struct StateInner {
    ready: Ready,
    guilds: HashMap<String, Guild>,
    guild_order: Vec<String>,
    private_channels: Vec<Channel>,
    channel_index: HashMap<String, ChannelLocation>,
    /// guild id → user id → member; kept in step with each guild's member
    /// list so lookups stay O(1).
    members: HashMap<String, HashMap<String, Member>>,
}

/// The shared state cache.
pub struct State {
    config: StateConfig,
    inner: RwLock<StateInner>,
}

impl State {
    /// Create a cache with the given tracking toggles.
    #[must_use]
    pub fn new(config: StateConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(StateInner::default()),
        }
    }

    /// The cache configuration.
    #[must_use]
    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// The current bot user from READY.
    #[must_use]
    pub fn user(&self) -> User {
        self.inner.read().ready.user.clone()
    }

    /// The gateway session ID from READY.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.inner.read().ready.session_id.clone()
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Look up a guild.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn guild(&self, guild_id: &str) -> StateResult<Guild> {
        self.inner
            .read()
            .guilds
            .get(guild_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// IDs of all cached guilds, in arrival order.
    #[must_use]
    pub fn guild_ids(&self) -> Vec<String> {
        self.inner.read().guild_order.clone()
    }

    /// Look up a channel, thread, or private channel.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the channel is not cached.
    pub fn channel(&self, channel_id: &str) -> StateResult<Channel> {
        let inner = self.inner.read();
        inner.find_channel(channel_id).cloned().ok_or(StateError::NotFound)
    }

    /// Look up a guild member.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the member is not cached.
    pub fn member(&self, guild_id: &str, user_id: &str) -> StateResult<Member> {
        self.inner
            .read()
            .members
            .get(guild_id)
            .and_then(|members| members.get(user_id))
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// Look up a role.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild or role is not cached.
    pub fn role(&self, guild_id: &str, role_id: &str) -> StateResult<Role> {
        let inner = self.inner.read();
        let guild = inner.guilds.get(guild_id).ok_or(StateError::NotFound)?;
        guild
            .roles
            .iter()
            .find(|r| r.id == role_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// Look up a custom emoji.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild or emoji is not cached.
    pub fn emoji(&self, guild_id: &str, emoji_id: &str) -> StateResult<Emoji> {
        let inner = self.inner.read();
        let guild = inner.guilds.get(guild_id).ok_or(StateError::NotFound)?;
        guild
            .emojis
            .iter()
            .find(|e| e.id == emoji_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// Look up a member's presence.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild or presence is not cached.
    pub fn presence(&self, guild_id: &str, user_id: &str) -> StateResult<Presence> {
        let inner = self.inner.read();
        let guild = inner.guilds.get(guild_id).ok_or(StateError::NotFound)?;
        guild
            .presences
            .iter()
            .find(|p| p.user.id == user_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// Look up a member's voice state.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild or state is not cached.
    pub fn voice_state(&self, guild_id: &str, user_id: &str) -> StateResult<VoiceState> {
        let inner = self.inner.read();
        let guild = inner.guilds.get(guild_id).ok_or(StateError::NotFound)?;
        guild
            .voice_states
            .iter()
            .find(|v| v.user_id == user_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// Look up a cached message.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the channel or message is not cached.
    pub fn message(&self, channel_id: &str, message_id: &str) -> StateResult<Message> {
        let inner = self.inner.read();
        let channel = inner.find_channel(channel_id).ok_or(StateError::NotFound)?;
        channel
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or(StateError::NotFound)
    }

    /// Effective permissions of a user in a channel.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the channel, guild, or member is not
    /// cached.
    pub fn user_channel_permissions(&self, user_id: &str, channel_id: &str) -> StateResult<i64> {
        let inner = self.inner.read();
        let channel = inner.find_channel(channel_id).ok_or(StateError::NotFound)?;
        let guild = inner
            .guilds
            .get(&channel.guild_id)
            .ok_or(StateError::NotFound)?;
        let member = inner
            .members
            .get(&guild.id)
            .and_then(|m| m.get(user_id))
            .ok_or(StateError::NotFound)?;

        Ok(permissions::member_permissions(
            guild,
            channel,
            user_id,
            &member.roles,
        ))
    }

    /// Effective permissions of a message's author, from the member data
    /// riding on the message itself.
    ///
    /// # Errors
    ///
    /// [`StateError::MessageIncompletePermissions`] when the message lacks
    /// its author or member block; [`StateError::NotFound`] when the
    /// channel or guild is not cached.
    pub fn message_permissions(&self, message: &Message) -> StateResult<i64> {
        let (Some(author), Some(member)) = (&message.author, &message.member) else {
            return Err(StateError::MessageIncompletePermissions);
        };

        let inner = self.inner.read();
        let channel = inner
            .find_channel(&message.channel_id)
            .ok_or(StateError::NotFound)?;
        let guild = inner
            .guilds
            .get(&channel.guild_id)
            .ok_or(StateError::NotFound)?;

        Ok(permissions::member_permissions(
            guild,
            channel,
            &author.id,
            &member.roles,
        ))
    }

    /// Display color of a user in a channel; 0 when unknown.
    #[must_use]
    pub fn user_color(&self, user_id: &str, channel_id: &str) -> u32 {
        let inner = self.inner.read();
        let Some(channel) = inner.find_channel(channel_id) else {
            return 0;
        };
        let Some(guild) = inner.guilds.get(&channel.guild_id) else {
            return 0;
        };
        let Some(member) = inner.members.get(&guild.id).and_then(|m| m.get(user_id)) else {
            return 0;
        };
        permissions::member_color(guild, member)
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Upsert a guild with merge semantics: empty incoming collections and
    /// a zero member count inherit the cached values.
    pub fn guild_add(&self, guild: Guild) {
        let mut inner = self.inner.write();
        inner.guild_add(guild);
    }

    /// Remove a guild.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn guild_remove(&self, guild_id: &str) -> StateResult<()> {
        let mut inner = self.inner.write();
        let guild = inner.guilds.remove(guild_id).ok_or(StateError::NotFound)?;
        inner.guild_order.retain(|id| id != guild_id);
        inner.members.remove(guild_id);
        for channel in guild.channels.iter().chain(guild.threads.iter()) {
            inner.channel_index.remove(&channel.id);
        }
        Ok(())
    }

    /// Upsert a member.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn member_add(&self, member: Member) -> StateResult<()> {
        let mut inner = self.inner.write();
        inner.member_add(member)
    }

    /// Remove a member.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild or member is not cached.
    pub fn member_remove(&self, guild_id: &str, user_id: &str) -> StateResult<()> {
        let mut inner = self.inner.write();

        let members = inner.members.get_mut(guild_id).ok_or(StateError::NotFound)?;
        members.remove(user_id).ok_or(StateError::NotFound)?;

        let guild = inner.guilds.get_mut(guild_id).ok_or(StateError::NotFound)?;
        guild.members.retain(|m| m.user_id() != user_id);
        Ok(())
    }

    /// Upsert a role.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn role_add(&self, guild_id: &str, role: Role) -> StateResult<()> {
        let mut inner = self.inner.write();
        let guild = inner.guilds.get_mut(guild_id).ok_or(StateError::NotFound)?;

        if let Some(existing) = guild.roles.iter_mut().find(|r| r.id == role.id) {
            *existing = role;
        } else {
            guild.roles.push(role);
        }
        Ok(())
    }

    /// Remove a role.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild or role is not cached.
    pub fn role_remove(&self, guild_id: &str, role_id: &str) -> StateResult<()> {
        let mut inner = self.inner.write();
        let guild = inner.guilds.get_mut(guild_id).ok_or(StateError::NotFound)?;

        let before = guild.roles.len();
        guild.roles.retain(|r| r.id != role_id);
        if guild.roles.len() == before {
            return Err(StateError::NotFound);
        }
        Ok(())
    }

    /// Upsert a channel, preserving cached messages, overwrites, and
    /// thread metadata the update omits.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] for guild channels whose guild is not
    /// cached.
    pub fn channel_add(&self, channel: Channel) -> StateResult<()> {
        let mut inner = self.inner.write();
        inner.channel_add(channel)
    }

    /// Remove a channel.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the channel is not cached.
    pub fn channel_remove(&self, channel_id: &str) -> StateResult<()> {
        let mut inner = self.inner.write();
        let location = inner
            .channel_index
            .remove(channel_id)
            .ok_or(StateError::NotFound)?;

        match location {
            ChannelLocation::Private => {
                inner.private_channels.retain(|c| c.id != channel_id);
            }
            ChannelLocation::Guild(guild_id) => {
                if let Some(guild) = inner.guilds.get_mut(&guild_id) {
                    guild.channels.retain(|c| c.id != channel_id);
                    guild.threads.retain(|c| c.id != channel_id);
                }
            }
        }
        Ok(())
    }

    /// Apply a thread list sync: archived threads and threads outside the
    /// synced parents survive, everything else is replaced by the sync.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn thread_list_sync(&self, sync: &ThreadListSync) -> StateResult<()> {
        let mut inner = self.inner.write();
        inner.thread_list_sync(sync)
    }

    /// Apply a thread members update.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the thread is not cached.
    pub fn thread_members_update(&self, update: &ThreadMembersUpdate) -> StateResult<()> {
        let mut inner = self.inner.write();

        {
            let thread = inner
                .find_channel_mut(&update.id)
                .ok_or(StateError::NotFound)?;

            thread
                .members
                .retain(|member| !update.removed_members.iter().any(|id| *id == member.user_id));

            for added in &update.added_members {
                thread.members.push(added.thread_member.clone());
            }
            thread.member_count = update.member_count;
        }

        for added in &update.added_members {
            if let Some(member) = &added.member {
                let _ = inner.member_add((**member).clone());
            }
            if let Some(presence) = &added.presence {
                let _ = inner.presence_add(&update.guild_id, (**presence).clone());
            }
        }

        Ok(())
    }

    /// Upsert a message; on ID match only non-empty incoming fields
    /// overwrite, otherwise it is appended and the oldest evicted past the
    /// configured cap.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the channel is not cached.
    pub fn message_add(&self, message: &Message) -> StateResult<()> {
        let max = self.config.max_message_count;
        let mut inner = self.inner.write();
        let channel = inner
            .find_channel_mut(&message.channel_id)
            .ok_or(StateError::NotFound)?;

        if let Some(existing) = channel.messages.iter_mut().find(|m| m.id == message.id) {
            merge_message(existing, message);
            return Ok(());
        }

        channel.messages.push(message.clone());
        if channel.messages.len() > max {
            let excess = channel.messages.len() - max;
            channel.messages.drain(..excess);
        }
        Ok(())
    }

    /// Remove a cached message.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the channel or message is not cached.
    pub fn message_remove(&self, channel_id: &str, message_id: &str) -> StateResult<()> {
        let mut inner = self.inner.write();
        let channel = inner
            .find_channel_mut(channel_id)
            .ok_or(StateError::NotFound)?;

        let before = channel.messages.len();
        channel.messages.retain(|m| m.id != message_id);
        if channel.messages.len() == before {
            return Err(StateError::NotFound);
        }
        Ok(())
    }

    /// Upsert a presence.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn presence_add(&self, guild_id: &str, presence: Presence) -> StateResult<()> {
        let mut inner = self.inner.write();
        inner.presence_add(guild_id, presence)
    }

    /// Apply a voice state: an empty channel removes the user's state,
    /// otherwise it upserts by user ID.
    ///
    /// # Errors
    ///
    /// [`StateError::NotFound`] when the guild is not cached.
    pub fn voice_state_update(&self, state: &VoiceState) -> StateResult<()> {
        let mut inner = self.inner.write();
        let guild = inner
            .guilds
            .get_mut(&state.guild_id)
            .ok_or(StateError::NotFound)?;

        if state.channel_id.is_empty() {
            guild.voice_states.retain(|v| v.user_id != state.user_id);
            return Ok(());
        }

        if let Some(existing) = guild
            .voice_states
            .iter_mut()
            .find(|v| v.user_id == state.user_id)
        {
            *existing = state.clone();
        } else {
            guild.voice_states.push(state.clone());
        }
        Ok(())
    }

    /// Seed the cache from READY.
    pub fn on_ready(&self, ready: &Ready) {
        let mut inner = self.inner.write();

        if !self.config.enabled {
            // Identity only; no resource tracking.
            inner.ready = Ready {
                version: ready.version,
                session_id: ready.session_id.clone(),
                user: ready.user.clone(),
                shard: ready.shard,
                guilds: Vec::new(),
                private_channels: Vec::new(),
            };
            return;
        }

        inner.ready = Ready {
            guilds: Vec::new(),
            private_channels: Vec::new(),
            ..ready.clone()
        };

        for guild in &ready.guilds {
            inner.guild_add(guild.clone());
        }
        for channel in &ready.private_channels {
            let _ = inner.channel_add(channel.clone());
        }
    }

    // ── Dispatcher entry ─────────────────────────────────────────────────

    /// Advance the cache for one event, honoring the tracking toggles and
    /// filling in before-update/delete snapshots.
    pub fn apply(&self, event: &mut Event) {
        if let Event::Ready(ready) = event {
            self.on_ready(ready);
            return;
        }
        if !self.config.enabled {
            return;
        }

        let result: StateResult<()> = match event {
            Event::GuildCreate(e) => {
                self.guild_add(e.guild.clone());
                Ok(())
            }
            Event::GuildUpdate(e) => {
                self.guild_add(e.guild.clone());
                Ok(())
            }
            Event::GuildDelete(e) => {
                e.before_delete = self.guild(&e.guild.id).ok().map(Box::new);
                self.guild_remove(&e.guild.id)
            }
            Event::GuildMemberAdd(e) => {
                let bumped = {
                    let mut inner = self.inner.write();
                    match inner.guilds.get_mut(&e.member.guild_id) {
                        Some(guild) => {
                            guild.member_count += 1;
                            Ok(())
                        }
                        None => Err(StateError::NotFound),
                    }
                };
                match bumped {
                    Ok(()) if self.config.track_members => self.member_add(e.member.clone()),
                    other => other,
                }
            }
            Event::GuildMemberUpdate(e) => {
                if self.config.track_members {
                    e.before_update = self
                        .member(&e.member.guild_id, e.member.user_id())
                        .ok()
                        .map(Box::new);
                    self.member_add(e.member.clone())
                } else {
                    Ok(())
                }
            }
            Event::GuildMemberRemove(e) => {
                let dropped = {
                    let mut inner = self.inner.write();
                    match inner.guilds.get_mut(&e.member.guild_id) {
                        Some(guild) => {
                            guild.member_count = guild.member_count.saturating_sub(1);
                            Ok(())
                        }
                        None => Err(StateError::NotFound),
                    }
                };
                match dropped {
                    Ok(()) if self.config.track_members => {
                        self.member_remove(&e.member.guild_id, e.member.user_id())
                    }
                    other => other,
                }
            }
            Event::GuildMembersChunk(e) => {
                if self.config.track_members {
                    for member in &e.members {
                        let mut member = member.clone();
                        member.guild_id = e.guild_id.clone();
                        let _ = self.member_add(member);
                    }
                }
                if self.config.track_presences {
                    for presence in &e.presences {
                        let _ = self.presence_add(&e.guild_id, presence.clone());
                    }
                }
                Ok(())
            }
            Event::GuildRoleCreate(e) => {
                if self.config.track_roles {
                    self.role_add(&e.guild_id, e.role.clone())
                } else {
                    Ok(())
                }
            }
            Event::GuildRoleUpdate(e) => {
                if self.config.track_roles {
                    self.role_add(&e.guild_id, e.role.clone())
                } else {
                    Ok(())
                }
            }
            Event::GuildRoleDelete(e) => {
                if self.config.track_roles {
                    self.role_remove(&e.guild_id, &e.role_id)
                } else {
                    Ok(())
                }
            }
            Event::GuildEmojisUpdate(e) => {
                if self.config.track_emojis {
                    let mut inner = self.inner.write();
                    match inner.guilds.get_mut(&e.guild_id) {
                        Some(guild) => {
                            guild.emojis = e.emojis.clone();
                            Ok(())
                        }
                        None => Err(StateError::NotFound),
                    }
                } else {
                    Ok(())
                }
            }
            Event::ChannelCreate(e) => {
                if self.config.track_channels {
                    self.channel_add(e.channel.clone())
                } else {
                    Ok(())
                }
            }
            Event::ChannelUpdate(e) => {
                if self.config.track_channels {
                    e.before_update = self.channel(&e.channel.id).ok().map(Box::new);
                    self.channel_add(e.channel.clone())
                } else {
                    Ok(())
                }
            }
            Event::ChannelDelete(e) => {
                if self.config.track_channels {
                    self.channel_remove(&e.channel.id)
                } else {
                    Ok(())
                }
            }
            Event::ThreadCreate(e) => {
                if self.config.track_threads {
                    self.channel_add(e.channel.clone())
                } else {
                    Ok(())
                }
            }
            Event::ThreadUpdate(e) => {
                if self.config.track_threads {
                    e.before_update = self.channel(&e.channel.id).ok().map(Box::new);
                    self.channel_add(e.channel.clone())
                } else {
                    Ok(())
                }
            }
            Event::ThreadDelete(e) => {
                if self.config.track_threads {
                    self.channel_remove(&e.channel.id)
                } else {
                    Ok(())
                }
            }
            Event::ThreadListSync(e) => {
                if self.config.track_threads {
                    self.thread_list_sync(e)
                } else {
                    Ok(())
                }
            }
            Event::ThreadMemberUpdate(e) => {
                if self.config.track_threads {
                    let mut inner = self.inner.write();
                    match inner.find_channel_mut(&e.member.id) {
                        Some(thread) => {
                            thread.member = Some(e.member.clone());
                            Ok(())
                        }
                        None => Err(StateError::NotFound),
                    }
                } else {
                    Ok(())
                }
            }
            Event::ThreadMembersUpdate(e) => {
                if self.config.track_thread_members {
                    self.thread_members_update(e)
                } else {
                    Ok(())
                }
            }
            Event::MessageCreate(e) => {
                if self.config.max_message_count > 0 {
                    self.message_add(&e.message)
                } else {
                    Ok(())
                }
            }
            Event::MessageUpdate(e) => {
                if self.config.max_message_count > 0 {
                    e.before_update = self
                        .message(&e.message.channel_id, &e.message.id)
                        .ok()
                        .map(Box::new);
                    self.message_add(&e.message)
                } else {
                    Ok(())
                }
            }
            Event::MessageDelete(e) => {
                if self.config.max_message_count > 0 {
                    e.before_delete = self
                        .message(&e.message.channel_id, &e.message.id)
                        .ok()
                        .map(Box::new);
                    self.message_remove(&e.message.channel_id, &e.message.id)
                } else {
                    Ok(())
                }
            }
            Event::MessageDeleteBulk(e) => {
                if self.config.max_message_count > 0 {
                    for message_id in &e.messages {
                        let _ = self.message_remove(&e.channel_id, message_id);
                    }
                }
                Ok(())
            }
            Event::VoiceStateUpdate(e) => {
                if self.config.track_voice {
                    e.before_update = self
                        .voice_state(&e.state.guild_id, &e.state.user_id)
                        .ok()
                        .map(Box::new);
                    self.voice_state_update(&e.state)
                } else {
                    Ok(())
                }
            }
            Event::PresenceUpdate(e) => {
                if self.config.track_presences {
                    let _ = self.presence_add(&e.guild_id, e.presence.clone());
                }
                if self.config.track_members {
                    self.member_from_presence(e)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            debug!(event = event.name(), error = %e, "state update skipped");
        }
    }

    /// Synthesize or refresh a member record from a presence, used when
    /// member tracking sees presences for members it never fetched.
    fn member_from_presence(
        &self,
        event: &banter_model::PresenceUpdate,
    ) -> StateResult<()> {
        use banter_model::Status;

        if event.presence.status == Some(Status::Offline) {
            return Ok(());
        }

        let member = match self.member(&event.guild_id, &event.presence.user.id) {
            Ok(mut member) => {
                if !event.presence.user.username.is_empty() {
                    if let Some(user) = member.user.as_mut() {
                        user.username = event.presence.user.username.clone();
                    }
                }
                member
            }
            Err(_) => Member {
                guild_id: event.guild_id.clone(),
                user: Some(event.presence.user.clone()),
                ..Default::default()
            },
        };

        self.member_add(member)
    }
}

impl StateInner {
    fn find_channel(&self, channel_id: &str) -> Option<&Channel> {
        match self.channel_index.get(channel_id)? {
            ChannelLocation::Private => {
                self.private_channels.iter().find(|c| c.id == channel_id)
            }
            ChannelLocation::Guild(guild_id) => {
                let guild = self.guilds.get(guild_id)?;
                guild
                    .channels
                    .iter()
                    .chain(guild.threads.iter())
                    .find(|c| c.id == channel_id)
            }
        }
    }

    fn find_channel_mut(&mut self, channel_id: &str) -> Option<&mut Channel> {
        match self.channel_index.get(channel_id)?.clone() {
            ChannelLocation::Private => self
                .private_channels
                .iter_mut()
                .find(|c| c.id == channel_id),
            ChannelLocation::Guild(guild_id) => {
                let guild = self.guilds.get_mut(&guild_id)?;
                guild
                    .channels
                    .iter_mut()
                    .chain(guild.threads.iter_mut())
                    .find(|c| c.id == channel_id)
            }
        }
    }

    fn guild_add(&mut self, mut guild: Guild) {
        for channel in guild.channels.iter().chain(guild.threads.iter()) {
            self.channel_index
                .insert(channel.id.clone(), ChannelLocation::Guild(guild.id.clone()));
        }

        if guild.members.is_empty() {
            self.members.entry(guild.id.clone()).or_default();
        } else {
            let map = guild
                .members
                .iter()
                .map(|m| (m.user_id().to_owned(), m.clone()))
                .collect();
            self.members.insert(guild.id.clone(), map);
        }

        if let Some(existing) = self.guilds.get_mut(&guild.id) {
            // Merge: empty incoming fields inherit the cached values.
            if guild.member_count == 0 {
                guild.member_count = existing.member_count;
            }
            if guild.roles.is_empty() {
                guild.roles = std::mem::take(&mut existing.roles);
            }
            if guild.emojis.is_empty() {
                guild.emojis = std::mem::take(&mut existing.emojis);
            }
            if guild.members.is_empty() {
                guild.members = std::mem::take(&mut existing.members);
            }
            if guild.presences.is_empty() {
                guild.presences = std::mem::take(&mut existing.presences);
            }
            if guild.channels.is_empty() {
                guild.channels = std::mem::take(&mut existing.channels);
            }
            if guild.threads.is_empty() {
                guild.threads = std::mem::take(&mut existing.threads);
            }
            if guild.voice_states.is_empty() {
                guild.voice_states = std::mem::take(&mut existing.voice_states);
            }
            *existing = guild;
            return;
        }

        self.guild_order.push(guild.id.clone());
        self.guilds.insert(guild.id.clone(), guild);
    }

    fn channel_add(&mut self, channel: Channel) -> StateResult<()> {
        if let Some(existing) = self.find_channel_mut(&channel.id) {
            let mut channel = channel;
            // Wire updates never carry these; keep the cached copies.
            if channel.messages.is_empty() {
                channel.messages = std::mem::take(&mut existing.messages);
            }
            if channel.permission_overwrites.is_empty() {
                channel.permission_overwrites =
                    std::mem::take(&mut existing.permission_overwrites);
            }
            if channel.thread_metadata.is_none() {
                channel.thread_metadata = existing.thread_metadata.take();
            }
            *existing = channel;
            return Ok(());
        }

        if channel.kind.is_private() {
            self.channel_index
                .insert(channel.id.clone(), ChannelLocation::Private);
            self.private_channels.push(channel);
            return Ok(());
        }

        let guild = self
            .guilds
            .get_mut(&channel.guild_id)
            .ok_or(StateError::NotFound)?;
        self.channel_index
            .insert(channel.id.clone(), ChannelLocation::Guild(channel.guild_id.clone()));
        if channel.is_thread() {
            guild.threads.push(channel);
        } else {
            guild.channels.push(channel);
        }
        Ok(())
    }

    fn member_add(&mut self, member: Member) -> StateResult<()> {
        let guild = self
            .guilds
            .get_mut(&member.guild_id)
            .ok_or(StateError::NotFound)?;
        let members = self
            .members
            .get_mut(&member.guild_id)
            .ok_or(StateError::NotFound)?;

        let user_id = member.user_id().to_owned();
        match members.get_mut(&user_id) {
            None => {
                members.insert(user_id, member.clone());
                guild.members.push(member);
            }
            Some(existing) => {
                let mut member = member;
                if member.joined_at.is_none() {
                    member.joined_at = existing.joined_at;
                }
                *existing = member.clone();
                if let Some(slot) = guild.members.iter_mut().find(|m| m.user_id() == user_id) {
                    *slot = member;
                }
            }
        }
        Ok(())
    }

    fn thread_list_sync(&mut self, sync: &ThreadListSync) -> StateResult<()> {
        let guild = self
            .guilds
            .get_mut(&sync.guild_id)
            .ok_or(StateError::NotFound)?;

        // Keep archived threads and threads outside the synced parents;
        // everything else is replaced by the sync contents.
        let mut dropped = Vec::new();
        guild.threads.retain(|thread| {
            let archived = thread
                .thread_metadata
                .as_ref()
                .is_some_and(|meta| meta.archived);
            let outside_sync = !sync.channel_ids.is_empty()
                && !sync.channel_ids.iter().any(|id| *id == thread.parent_id);

            if archived || outside_sync {
                true
            } else {
                dropped.push(thread.id.clone());
                false
            }
        });

        for thread in &sync.threads {
            let mut thread = thread.clone();
            if let Some(member) = sync.members.iter().find(|member| member.id == thread.id) {
                thread.member = Some(member.clone());
            }
            guild.threads.retain(|t| t.id != thread.id);
            guild.threads.push(thread);
        }

        let retained: Vec<String> = guild.threads.iter().map(|t| t.id.clone()).collect();
        for id in dropped {
            if !retained.contains(&id) {
                self.channel_index.remove(&id);
            }
        }
        for thread in &sync.threads {
            self.channel_index
                .insert(thread.id.clone(), ChannelLocation::Guild(sync.guild_id.clone()));
        }

        Ok(())
    }

    fn presence_add(&mut self, guild_id: &str, presence: Presence) -> StateResult<()> {
        let guild = self.guilds.get_mut(guild_id).ok_or(StateError::NotFound)?;

        if let Some(existing) = guild
            .presences
            .iter_mut()
            .find(|p| p.user.id == presence.user.id)
        {
            // Activities always follow the update; other fields only when
            // they carry a value.
            existing.activities = presence.activities;
            if presence.status.is_some() {
                existing.status = presence.status;
            }
            if presence.client_status.desktop.is_some() {
                existing.client_status.desktop = presence.client_status.desktop;
            }
            if presence.client_status.mobile.is_some() {
                existing.client_status.mobile = presence.client_status.mobile;
            }
            if presence.client_status.web.is_some() {
                existing.client_status.web = presence.client_status.web;
            }
            if !presence.user.username.is_empty() {
                existing.user.username = presence.user.username;
            }
            if !presence.user.discriminator.is_empty() {
                existing.user.discriminator = presence.user.discriminator;
            }
            if let Some(avatar) = presence.user.avatar {
                existing.user.avatar = Some(avatar);
            }
            return Ok(());
        }

        guild.presences.push(presence);
        Ok(())
    }
}

/// Merge a message update into the cached copy; only non-empty incoming
/// fields overwrite.
fn merge_message(existing: &mut Message, update: &Message) {
    if !update.content.is_empty() {
        existing.content = update.content.clone();
    }
    if update.edited_timestamp.is_some() {
        existing.edited_timestamp = update.edited_timestamp;
    }
    if !update.mentions.is_empty() {
        existing.mentions = update.mentions.clone();
    }
    if !update.embeds.is_empty() {
        existing.embeds = update.embeds.clone();
    }
    if !update.attachments.is_empty() {
        existing.attachments = update.attachments.clone();
    }
    if update.timestamp.is_some() {
        existing.timestamp = update.timestamp;
    }
    if update.author.is_some() {
        existing.author = update.author.clone();
    }
    if !update.components.is_empty() {
        existing.components = update.components.clone();
    }
}
