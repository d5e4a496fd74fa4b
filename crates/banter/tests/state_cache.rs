//! State cache semantics: merge-on-upsert, indexing, thread lifecycle,
//! and the bounded message buffer.

use banter::{
    Channel, ChannelType, Emoji, Event, Guild, Member, Message, Role, State, StateConfig,
    StateError, ThreadListSync, ThreadMember, ThreadMetadata, User, VoiceState,
};

fn state() -> State {
    State::new(StateConfig::default())
}

fn state_with_messages(max: usize) -> State {
    State::new(StateConfig {
        max_message_count: max,
        ..Default::default()
    })
}

fn guild_with_channel(guild_id: &str, channel_id: &str) -> Guild {
    Guild {
        id: guild_id.to_owned(),
        name: "Test Guild".to_owned(),
        channels: vec![Channel {
            id: channel_id.to_owned(),
            guild_id: guild_id.to_owned(),
            kind: ChannelType::GUILD_TEXT,
            ..Default::default()
        }],
        roles: vec![Role {
            id: guild_id.to_owned(),
            permissions: banter::permissions::VIEW_CHANNEL,
            ..Default::default()
        }],
        member_count: 5,
        ..Default::default()
    }
}

fn member(guild_id: &str, user_id: &str) -> Member {
    Member {
        guild_id: guild_id.to_owned(),
        user: Some(User {
            id: user_id.to_owned(),
            username: user_id.to_owned(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn guild_channels_are_indexed() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    let channel = state.channel("C").unwrap();
    assert_eq!(channel.guild_id, "G");
    assert_eq!(channel.id, "C");
}

#[test]
fn guild_upsert_preserves_absent_fields() {
    let state = state();
    let mut guild = guild_with_channel("G", "C");
    guild.emojis = vec![Emoji {
        id: "E".to_owned(),
        name: "party".to_owned(),
        ..Default::default()
    }];
    state.guild_add(guild);
    state.member_add(member("G", "u1")).unwrap();

    // Update with a new name but no roles/emojis/channels/member count.
    state.guild_add(Guild {
        id: "G".to_owned(),
        name: "Renamed".to_owned(),
        ..Default::default()
    });

    let merged = state.guild("G").unwrap();
    assert_eq!(merged.name, "Renamed");
    assert_eq!(merged.member_count, 5);
    assert_eq!(merged.roles.len(), 1);
    assert_eq!(merged.emojis.len(), 1);
    assert_eq!(merged.channels.len(), 1);
    assert_eq!(merged.members.len(), 1);

    // The channel index still resolves after the merge.
    assert!(state.channel("C").is_ok());
    // And present fields overwrite.
    state.guild_add(Guild {
        id: "G".to_owned(),
        name: "Renamed".to_owned(),
        roles: vec![Role {
            id: "new-role".to_owned(),
            ..Default::default()
        }],
        ..Default::default()
    });
    let overwritten = state.guild("G").unwrap();
    assert_eq!(overwritten.roles.len(), 1);
    assert_eq!(overwritten.roles[0].id, "new-role");
}

#[test]
fn guild_remove_clears_indexes() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    state.guild_remove("G").unwrap();
    assert_eq!(state.guild("G"), Err(StateError::NotFound));
    assert_eq!(state.channel("C"), Err(StateError::NotFound));
    assert_eq!(state.guild_remove("G"), Err(StateError::NotFound));
}

#[test]
fn member_map_and_list_stay_in_step() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    state.member_add(member("G", "u1")).unwrap();
    state.member_add(member("G", "u2")).unwrap();
    assert_eq!(state.guild("G").unwrap().members.len(), 2);
    assert!(state.member("G", "u1").is_ok());

    // Upserting an existing member must not duplicate it.
    let mut updated = member("G", "u1");
    updated.nick = "nickname".to_owned();
    state.member_add(updated).unwrap();

    let guild = state.guild("G").unwrap();
    assert_eq!(guild.members.len(), 2);
    assert_eq!(state.member("G", "u1").unwrap().nick, "nickname");

    state.member_remove("G", "u1").unwrap();
    assert_eq!(state.member("G", "u1"), Err(StateError::NotFound));
    assert_eq!(state.guild("G").unwrap().members.len(), 1);
}

#[test]
fn channel_update_preserves_messages_and_overwrites() {
    let state = state_with_messages(10);
    state.guild_add(guild_with_channel("G", "C"));

    state
        .message_add(&Message {
            id: "m1".to_owned(),
            channel_id: "C".to_owned(),
            content: "hello".to_owned(),
            ..Default::default()
        })
        .unwrap();

    // A channel update from the wire has no messages attached.
    state
        .channel_add(Channel {
            id: "C".to_owned(),
            guild_id: "G".to_owned(),
            name: "renamed".to_owned(),
            kind: ChannelType::GUILD_TEXT,
            ..Default::default()
        })
        .unwrap();

    let channel = state.channel("C").unwrap();
    assert_eq!(channel.name, "renamed");
    assert_eq!(channel.messages.len(), 1);
}

#[test]
fn private_channels_live_outside_guilds() {
    let state = state();
    state
        .channel_add(Channel {
            id: "dm".to_owned(),
            kind: ChannelType::DM,
            ..Default::default()
        })
        .unwrap();

    assert!(state.channel("dm").is_ok());
}

#[test]
fn message_buffer_is_fifo_bounded() {
    let state = state_with_messages(3);
    state.guild_add(guild_with_channel("G", "C"));

    for i in 0..5 {
        state
            .message_add(&Message {
                id: format!("m{i}"),
                channel_id: "C".to_owned(),
                content: format!("msg {i}"),
                ..Default::default()
            })
            .unwrap();
    }

    let channel = state.channel("C").unwrap();
    let ids: Vec<_> = channel.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m3", "m4"]);
}

#[test]
fn message_update_merges_non_empty_fields() {
    let state = state_with_messages(10);
    state.guild_add(guild_with_channel("G", "C"));

    state
        .message_add(&Message {
            id: "m1".to_owned(),
            channel_id: "C".to_owned(),
            content: "original".to_owned(),
            author: Some(User {
                id: "author".to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();

    // An edit carrying only new content keeps the author.
    state
        .message_add(&Message {
            id: "m1".to_owned(),
            channel_id: "C".to_owned(),
            content: "edited".to_owned(),
            ..Default::default()
        })
        .unwrap();

    let message = state.message("C", "m1").unwrap();
    assert_eq!(message.content, "edited");
    assert_eq!(message.author.as_ref().unwrap().id, "author");

    // Still exactly one message cached.
    assert_eq!(state.channel("C").unwrap().messages.len(), 1);
}

fn thread(guild_id: &str, thread_id: &str, parent_id: &str, archived: bool) -> Channel {
    Channel {
        id: thread_id.to_owned(),
        guild_id: guild_id.to_owned(),
        parent_id: parent_id.to_owned(),
        kind: ChannelType::GUILD_PUBLIC_THREAD,
        thread_metadata: Some(ThreadMetadata {
            archived,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn thread_list_sync_replaces_active_threads_in_synced_parents() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    state.channel_add(thread("G", "t-archived", "C", true)).unwrap();
    state.channel_add(thread("G", "t-active", "C", false)).unwrap();
    state.channel_add(thread("G", "t-elsewhere", "other", false)).unwrap();

    state
        .thread_list_sync(&ThreadListSync {
            guild_id: "G".to_owned(),
            channel_ids: vec!["C".to_owned()],
            threads: vec![thread("G", "t-new", "C", false)],
            members: vec![ThreadMember {
                id: "t-new".to_owned(),
                user_id: "me".to_owned(),
                ..Default::default()
            }],
        })
        .unwrap();

    let guild = state.guild("G").unwrap();
    let ids: Vec<_> = guild.threads.iter().map(|t| t.id.as_str()).collect();

    // Archived and out-of-scope threads survive; the active one in a
    // synced parent was replaced by the sync contents.
    assert!(ids.contains(&"t-archived"));
    assert!(ids.contains(&"t-elsewhere"));
    assert!(ids.contains(&"t-new"));
    assert!(!ids.contains(&"t-active"));

    // The sync's member records attach to their threads.
    let new_thread = guild.threads.iter().find(|t| t.id == "t-new").unwrap();
    assert_eq!(new_thread.member.as_ref().unwrap().user_id, "me");

    assert!(state.channel("t-new").is_ok());
    assert_eq!(state.channel("t-active"), Err(StateError::NotFound));
}

#[test]
fn thread_members_update_adds_and_removes() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));
    state.channel_add(thread("G", "T", "C", false)).unwrap();

    let update: banter::ThreadMembersUpdate = serde_json::from_value(serde_json::json!({
        "id": "T",
        "guild_id": "G",
        "member_count": 2,
        "added_members": [
            {"id": "T", "user_id": "u1"},
            {"id": "T", "user_id": "u2"}
        ],
        "removed_member_ids": []
    }))
    .unwrap();
    state.thread_members_update(&update).unwrap();

    let cached = state.channel("T").unwrap();
    assert_eq!(cached.members.len(), 2);
    assert_eq!(cached.member_count, 2);

    let removal: banter::ThreadMembersUpdate = serde_json::from_value(serde_json::json!({
        "id": "T",
        "guild_id": "G",
        "member_count": 1,
        "added_members": [],
        "removed_member_ids": ["u1"]
    }))
    .unwrap();
    state.thread_members_update(&removal).unwrap();

    let cached = state.channel("T").unwrap();
    assert_eq!(cached.members.len(), 1);
    assert_eq!(cached.members[0].user_id, "u2");
}

#[test]
fn voice_state_upserts_and_removes_on_empty_channel() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    state
        .voice_state_update(&VoiceState {
            guild_id: "G".to_owned(),
            channel_id: "C".to_owned(),
            user_id: "u1".to_owned(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(state.voice_state("G", "u1").unwrap().channel_id, "C");

    // Moving channels upserts in place.
    state
        .voice_state_update(&VoiceState {
            guild_id: "G".to_owned(),
            channel_id: "C2".to_owned(),
            user_id: "u1".to_owned(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(state.voice_state("G", "u1").unwrap().channel_id, "C2");
    assert_eq!(state.guild("G").unwrap().voice_states.len(), 1);

    // Empty channel removes the state.
    state
        .voice_state_update(&VoiceState {
            guild_id: "G".to_owned(),
            user_id: "u1".to_owned(),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(state.voice_state("G", "u1"), Err(StateError::NotFound));
}

#[test]
fn presence_update_synthesizes_thin_member() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    let mut event = Event::decode(
        "PRESENCE_UPDATE",
        serde_json::json!({
            "guild_id": "G",
            "user": {"id": "ghost", "username": "ghost"},
            "status": "online"
        }),
    )
    .unwrap();
    state.apply(&mut event);

    let synthesized = state.member("G", "ghost").unwrap();
    assert_eq!(synthesized.user.as_ref().unwrap().id, "ghost");
    assert!(state.presence("G", "ghost").is_ok());
}

#[test]
fn apply_fills_before_update_snapshot() {
    let state = state_with_messages(10);
    state.guild_add(guild_with_channel("G", "C"));
    state
        .message_add(&Message {
            id: "m1".to_owned(),
            channel_id: "C".to_owned(),
            content: "original".to_owned(),
            ..Default::default()
        })
        .unwrap();

    let mut event = Event::decode(
        "MESSAGE_UPDATE",
        serde_json::json!({"id": "m1", "channel_id": "C", "content": "edited"}),
    )
    .unwrap();
    state.apply(&mut event);

    let Event::MessageUpdate(update) = &event else {
        panic!("wrong variant");
    };
    assert_eq!(update.before_update.as_ref().unwrap().content, "original");
    assert_eq!(state.message("C", "m1").unwrap().content, "edited");
}

#[test]
fn member_events_adjust_member_count() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    let mut add = Event::decode(
        "GUILD_MEMBER_ADD",
        serde_json::json!({"guild_id": "G", "user": {"id": "u9", "username": "nine"}}),
    )
    .unwrap();
    state.apply(&mut add);

    assert_eq!(state.guild("G").unwrap().member_count, 6);
    assert!(state.member("G", "u9").is_ok());

    let mut remove = Event::decode(
        "GUILD_MEMBER_REMOVE",
        serde_json::json!({"guild_id": "G", "user": {"id": "u9", "username": "nine"}}),
    )
    .unwrap();
    state.apply(&mut remove);

    assert_eq!(state.guild("G").unwrap().member_count, 5);
    assert_eq!(state.member("G", "u9"), Err(StateError::NotFound));
}

#[test]
fn permissions_resolve_through_the_cache() {
    let state = state();
    let mut guild = guild_with_channel("G", "C");
    guild.roles.push(Role {
        id: "mod".to_owned(),
        permissions: banter::permissions::MANAGE_MESSAGES,
        position: 2,
        color: 0xAB_CD_EF,
        ..Default::default()
    });
    state.guild_add(guild);

    let mut moderator = member("G", "u1");
    moderator.roles = vec!["mod".to_owned()];
    state.member_add(moderator).unwrap();

    let permissions = state.user_channel_permissions("u1", "C").unwrap();
    assert_ne!(permissions & banter::permissions::MANAGE_MESSAGES, 0);
    assert_ne!(permissions & banter::permissions::VIEW_CHANNEL, 0);

    assert_eq!(state.user_color("u1", "C"), 0xAB_CD_EF);
    assert_eq!(
        state.user_channel_permissions("missing", "C"),
        Err(StateError::NotFound)
    );
}

#[test]
fn message_permissions_require_author_and_member() {
    let state = state();
    state.guild_add(guild_with_channel("G", "C"));

    let bare = Message {
        id: "m".to_owned(),
        channel_id: "C".to_owned(),
        ..Default::default()
    };
    assert_eq!(
        state.message_permissions(&bare),
        Err(StateError::MessageIncompletePermissions)
    );
}

#[test]
fn disabled_state_keeps_identity_only() {
    let state = State::new(StateConfig {
        enabled: false,
        ..Default::default()
    });

    let mut ready = Event::decode(
        "READY",
        serde_json::json!({
            "v": 10,
            "session_id": "s1",
            "user": {"id": "bot", "username": "bot"},
            "guilds": [{"id": "G", "name": "Guild"}]
        }),
    )
    .unwrap();
    state.apply(&mut ready);

    assert_eq!(state.user().id, "bot");
    assert_eq!(state.session_id(), "s1");
    assert_eq!(state.guild("G"), Err(StateError::NotFound));
}
