//! Permission bits and the member permission fold.

use crate::{Channel, Guild, Member, OverwriteType};

pub const CREATE_INSTANT_INVITE: i64 = 1 << 0;
pub const KICK_MEMBERS: i64 = 1 << 1;
pub const BAN_MEMBERS: i64 = 1 << 2;
pub const ADMINISTRATOR: i64 = 1 << 3;
pub const MANAGE_CHANNELS: i64 = 1 << 4;
pub const MANAGE_GUILD: i64 = 1 << 5;
pub const ADD_REACTIONS: i64 = 1 << 6;
pub const VIEW_AUDIT_LOG: i64 = 1 << 7;
pub const PRIORITY_SPEAKER: i64 = 1 << 8;
pub const STREAM: i64 = 1 << 9;
pub const VIEW_CHANNEL: i64 = 1 << 10;
pub const SEND_MESSAGES: i64 = 1 << 11;
pub const SEND_TTS_MESSAGES: i64 = 1 << 12;
pub const MANAGE_MESSAGES: i64 = 1 << 13;
pub const EMBED_LINKS: i64 = 1 << 14;
pub const ATTACH_FILES: i64 = 1 << 15;
pub const READ_MESSAGE_HISTORY: i64 = 1 << 16;
pub const MENTION_EVERYONE: i64 = 1 << 17;
pub const USE_EXTERNAL_EMOJIS: i64 = 1 << 18;
pub const CONNECT: i64 = 1 << 20;
pub const SPEAK: i64 = 1 << 21;
pub const MUTE_MEMBERS: i64 = 1 << 22;
pub const DEAFEN_MEMBERS: i64 = 1 << 23;
pub const MOVE_MEMBERS: i64 = 1 << 24;
pub const USE_VAD: i64 = 1 << 25;
pub const CHANGE_NICKNAME: i64 = 1 << 26;
pub const MANAGE_NICKNAMES: i64 = 1 << 27;
pub const MANAGE_ROLES: i64 = 1 << 28;
pub const MANAGE_WEBHOOKS: i64 = 1 << 29;
pub const MANAGE_EMOJIS: i64 = 1 << 30;
pub const MANAGE_THREADS: i64 = 1 << 34;
pub const CREATE_PUBLIC_THREADS: i64 = 1 << 35;
pub const CREATE_PRIVATE_THREADS: i64 = 1 << 36;
pub const SEND_MESSAGES_IN_THREADS: i64 = 1 << 38;

/// All permission bits set.
pub const ALL: i64 = !0 >> 1;

/// Compute a member's effective permissions in a channel.
///
/// Folds the everyone role and the member's role permissions, then applies
/// channel overwrites in order: everyone overwrite, role overwrites, member
/// overwrite. The guild owner and administrators hold every permission.
#[must_use]
pub fn member_permissions(
    guild: &Guild,
    channel: &Channel,
    user_id: &str,
    member_roles: &[String],
) -> i64 {
    if user_id == guild.owner_id {
        return ALL;
    }

    let mut permissions = 0i64;

    for role in &guild.roles {
        // The everyone role shares its ID with the guild.
        if role.id == guild.id {
            permissions |= role.permissions;
            break;
        }
    }

    for role in &guild.roles {
        if member_roles.iter().any(|id| *id == role.id) {
            permissions |= role.permissions;
        }
    }

    if permissions & ADMINISTRATOR == ADMINISTRATOR {
        return ALL;
    }

    for overwrite in &channel.permission_overwrites {
        if overwrite.kind == OverwriteType::ROLE && overwrite.id == guild.id {
            permissions &= !overwrite.deny;
            permissions |= overwrite.allow;
            break;
        }
    }

    let (mut allows, mut denies) = (0i64, 0i64);
    for overwrite in &channel.permission_overwrites {
        if overwrite.kind == OverwriteType::ROLE
            && overwrite.id != guild.id
            && member_roles.iter().any(|id| *id == overwrite.id)
        {
            allows |= overwrite.allow;
            denies |= overwrite.deny;
        }
    }
    permissions &= !denies;
    permissions |= allows;

    for overwrite in &channel.permission_overwrites {
        if overwrite.kind == OverwriteType::MEMBER && overwrite.id == user_id {
            permissions &= !overwrite.deny;
            permissions |= overwrite.allow;
            break;
        }
    }

    permissions
}

/// First non-zero role color for a member, scanning roles by descending
/// position; falls back to the everyone role's color.
#[must_use]
pub fn member_color(guild: &Guild, member: &Member) -> u32 {
    let mut roles: Vec<_> = guild.roles.iter().collect();
    roles.sort_by(|a, b| b.position.cmp(&a.position));

    for role in &roles {
        if member.roles.iter().any(|id| *id == role.id) && role.color != 0 {
            return role.color;
        }
    }

    roles
        .iter()
        .find(|r| r.id == guild.id)
        .map_or(0, |r| r.color)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PermissionOverwrite, Role, User};

    fn guild_fixture() -> Guild {
        Guild {
            id: "G".into(),
            owner_id: "owner".into(),
            roles: vec![
                Role {
                    id: "G".into(),
                    permissions: VIEW_CHANNEL | SEND_MESSAGES,
                    color: 0x11_22_33,
                    position: 0,
                    ..Default::default()
                },
                Role {
                    id: "mod".into(),
                    permissions: MANAGE_MESSAGES,
                    color: 0xFF_00_00,
                    position: 5,
                    ..Default::default()
                },
                Role {
                    id: "admin".into(),
                    permissions: ADMINISTRATOR,
                    position: 10,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn everyone_and_role_permissions_fold() {
        let guild = guild_fixture();
        let channel = Channel {
            id: "C".into(),
            guild_id: "G".into(),
            ..Default::default()
        };

        let perms = member_permissions(&guild, &channel, "u1", &["mod".into()]);
        assert_eq!(perms & VIEW_CHANNEL, VIEW_CHANNEL);
        assert_eq!(perms & MANAGE_MESSAGES, MANAGE_MESSAGES);
        assert_eq!(perms & BAN_MEMBERS, 0);
    }

    #[test]
    fn administrator_bypasses_overwrites() {
        let guild = guild_fixture();
        let channel = Channel {
            id: "C".into(),
            guild_id: "G".into(),
            permission_overwrites: vec![PermissionOverwrite {
                id: "G".into(),
                kind: OverwriteType::ROLE,
                deny: VIEW_CHANNEL,
                allow: 0,
            }],
            ..Default::default()
        };

        let perms = member_permissions(&guild, &channel, "u1", &["admin".into()]);
        assert_eq!(perms, ALL);
    }

    #[test]
    fn owner_holds_everything() {
        let guild = guild_fixture();
        let channel = Channel::default();
        assert_eq!(member_permissions(&guild, &channel, "owner", &[]), ALL);
    }

    #[test]
    fn member_overwrite_applies_last() {
        let guild = guild_fixture();
        let channel = Channel {
            id: "C".into(),
            guild_id: "G".into(),
            permission_overwrites: vec![
                PermissionOverwrite {
                    id: "mod".into(),
                    kind: OverwriteType::ROLE,
                    deny: SEND_MESSAGES,
                    allow: 0,
                },
                PermissionOverwrite {
                    id: "u1".into(),
                    kind: OverwriteType::MEMBER,
                    deny: 0,
                    allow: SEND_MESSAGES,
                },
            ],
            ..Default::default()
        };

        let perms = member_permissions(&guild, &channel, "u1", &["mod".into()]);
        assert_eq!(perms & SEND_MESSAGES, SEND_MESSAGES);
    }

    #[test]
    fn member_color_prefers_highest_colored_role() {
        let guild = guild_fixture();
        let member = Member {
            guild_id: "G".into(),
            user: Some(User {
                id: "u1".into(),
                ..Default::default()
            }),
            roles: vec!["mod".into(), "admin".into()],
            ..Default::default()
        };

        // "admin" sits higher but has no color; "mod" supplies it.
        assert_eq!(member_color(&guild, &member), 0xFF_00_00);
    }

    #[test]
    fn member_color_falls_back_to_everyone() {
        let guild = guild_fixture();
        let member = Member {
            guild_id: "G".into(),
            ..Default::default()
        };
        assert_eq!(member_color(&guild, &member), 0x11_22_33);
    }
}
