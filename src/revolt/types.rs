//! Wire types for the Revolt REST API.

use bitflags::bitflags;

use serde::{Deserialize, Serialize};

use std::collections::HashMap;

bitflags! {
    /// Revolt's server/channel permission bits.
    ///
    /// Revolt uses a single flag set for both server roles and channel
    /// overrides, unlike Discord's split model.
    pub struct Permissions: u64 {
        const MANAGE_CHANNEL = 1 << 0;
        const MANAGE_SERVER = 1 << 1;
        const MANAGE_PERMISSIONS = 1 << 2;
        const MANAGE_ROLE = 1 << 3;
        const MANAGE_CUSTOMISATION = 1 << 4;
        const KICK_MEMBERS = 1 << 6;
        const BAN_MEMBERS = 1 << 7;
        const TIMEOUT_MEMBERS = 1 << 8;
        const ASSIGN_ROLES = 1 << 9;
        const CHANGE_NICKNAME = 1 << 10;
        const MANAGE_NICKNAMES = 1 << 11;
        const CHANGE_AVATAR = 1 << 12;
        const REMOVE_AVATARS = 1 << 13;
        const VIEW_CHANNEL = 1 << 20;
        const READ_MESSAGE_HISTORY = 1 << 21;
        const SEND_MESSAGE = 1 << 22;
        const MANAGE_MESSAGES = 1 << 23;
        const MANAGE_WEBHOOKS = 1 << 24;
        const INVITE_OTHERS = 1 << 25;
        const SEND_EMBEDS = 1 << 26;
        const UPLOAD_FILES = 1 << 27;
        const MASQUERADE = 1 << 28;
        const REACT = 1 << 29;
        const CONNECT = 1 << 30;
        const SPEAK = 1 << 31;
        const VIDEO = 1 << 32;
        const MUTE_MEMBERS = 1 << 33;
        const DEAFEN_MEMBERS = 1 << 34;
        const MOVE_MEMBERS = 1 << 35;
    }
}

/// An allow/deny pair for a role on a channel or server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Override {
    #[serde(rename = "a", alias = "allow")]
    pub allow: u64,
    #[serde(rename = "d", alias = "deny")]
    pub deny: u64,
}

/// A Revolt server, as returned by `GET /servers/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Ids of the server's channels; resolved individually.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub roles: HashMap<String, Role>,
}

/// A Revolt server channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub channel_type: ChannelType,
}

/// The kind of a Revolt channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    TextChannel,
    VoiceChannel,
    /// DM/group kinds that never appear inside a server, but the endpoint is
    /// shared, so tolerate them.
    #[serde(other)]
    Other,
}

/// A role on a Revolt server.
#[derive(Debug, Clone, Deserialize)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub permissions: Override,
    #[serde(default)]
    pub colour: Option<String>,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub rank: i64,
}

/// A channel category. Revolt stores these on the server object, not as
/// channels of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub channels: Vec<String>,
}

/// Revolt caps category titles at 32 characters.
pub const MAX_CATEGORY_TITLE: usize = 32;

impl Category {
    /// Creates a category, truncating the title to the API limit.
    pub fn new(id: String, title: &str, channels: Vec<String>) -> Category {
        Category {
            id,
            title: title.chars().take(MAX_CATEGORY_TITLE).collect(),
            channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_deserializes() {
        let server: Server = serde_json::from_str(
            r#"{
                "_id": "01ABC",
                "name": "My Server",
                "channels": ["01DEF"],
                "categories": [{"id": "cat1", "title": "Info", "channels": ["01DEF"]}],
                "roles": {
                    "01R": {"name": "mods", "permissions": {"a": 8, "d": 0}, "rank": 1}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(server.channels, vec!["01DEF"]);
        assert_eq!(server.categories[0].title, "Info");
        assert_eq!(server.roles["01R"].permissions.allow, 8);
    }

    #[test]
    fn unknown_channel_types_are_tolerated() {
        let channel: Channel = serde_json::from_str(
            r#"{"_id": "01X", "channel_type": "Group", "name": "dm"}"#,
        )
        .unwrap();

        assert_eq!(channel.channel_type, ChannelType::Other);
    }

    #[test]
    fn category_titles_are_truncated() {
        let long = "a".repeat(40);
        let category = Category::new(String::from("c"), &long, Vec::new());

        assert_eq!(category.title.len(), MAX_CATEGORY_TITLE);
    }
}
