//! Serde model of a Discord server template.
//!
//! Only the parts of `serialized_source_guild` the importer cares about;
//! everything else in the payload is ignored.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use std::fmt::{self, Formatter};

/// The response to `GET /guilds/templates/{code}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateResponse {
    #[serde(default)]
    pub code: Option<String>,
    pub serialized_source_guild: Template,
}

/// The guild structure serialized into a template.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub roles: Vec<SourceRole>,
    #[serde(default)]
    pub channels: Vec<SourceChannel>,
}

impl Template {
    /// The template's `@everyone` role id, if present.
    ///
    /// In serialized guilds `@everyone` is a regular entry in the role list.
    pub fn everyone_role(&self) -> Option<u64> {
        self.roles
            .iter()
            .find(|role| role.name == "@everyone")
            .map(|role| role.id)
    }

    /// Channels of a given kind, in template order.
    pub fn channels_of(&self, kind: ChannelKind) -> impl Iterator<Item = &SourceChannel> {
        self.channels.iter().filter(move |ch| ch.kind() == kind)
    }

    /// Text and voice channels, text first, both in template order.
    ///
    /// Categories are excluded; they map to Revolt categories, not channels.
    pub fn concrete_channels(&self) -> impl Iterator<Item = &SourceChannel> {
        self.channels_of(ChannelKind::Text)
            .chain(self.channels_of(ChannelKind::Voice))
    }
}

/// A channel in the source template.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceChannel {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: i64,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub permission_overwrites: Vec<Overwrite>,
}

impl SourceChannel {
    /// What this channel maps to on the Revolt side.
    pub fn kind(&self) -> ChannelKind {
        match self.channel_type {
            2 => ChannelKind::Voice,
            4 => ChannelKind::Category,
            // announcement/forum/etc. channels all degrade to text
            _ => ChannelKind::Text,
        }
    }
}

/// The coarse kind of a source channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
}

/// A role in the source template.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRole {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i64,
    #[serde(deserialize_with = "permission_bits")]
    pub permissions: u64,
}

impl SourceRole {
    /// The role's colour as a CSS hex string, or `None` for the Discord
    /// default (color zero means "no colour").
    pub fn color_hex(&self) -> Option<String> {
        if self.color == 0 {
            None
        } else {
            Some(format!("#{:06x}", self.color))
        }
    }
}

/// A permission overwrite on a source channel.
#[derive(Debug, Clone, Deserialize)]
pub struct Overwrite {
    /// The template role this overwrite applies to.
    pub id: u64,
    #[serde(default, deserialize_with = "permission_bits")]
    pub allow: u64,
    #[serde(default, deserialize_with = "permission_bits")]
    pub deny: u64,
}

/// Deserializes Discord permission bits, which arrive as either a JSON
/// number or a decimal string depending on API vintage.
fn permission_bits<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct BitsVisitor;

    impl<'de> Visitor<'de> for BitsVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut Formatter) -> fmt::Result {
            f.write_str("permission bits as an integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
            Ok(v as u64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
            v.parse().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(BitsVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "code": "abcdef",
        "serialized_source_guild": {
            "name": "Test Guild",
            "description": null,
            "roles": [
                {"id": 0, "name": "@everyone", "permissions": "1071698660929"},
                {"id": 1, "name": "mods", "color": 15158332, "hoist": true, "permissions": 8196}
            ],
            "channels": [
                {"id": 2, "type": 4, "name": "INFO", "position": 0},
                {
                    "id": 3, "type": 0, "name": "rules", "parent_id": 2, "position": 1,
                    "topic": "read me",
                    "permission_overwrites": [{"id": 0, "allow": "0", "deny": "2048"}]
                },
                {"id": 4, "type": 2, "name": "Lounge", "parent_id": 2, "position": 2}
            ]
        }
    }"#;

    #[test]
    fn sample_template_deserializes() {
        let response: TemplateResponse = serde_json::from_str(SAMPLE).unwrap();
        let template = response.serialized_source_guild;

        assert_eq!(template.name, "Test Guild");
        assert_eq!(template.everyone_role(), Some(0));
        // string and integer permission encodings both parse
        assert_eq!(template.roles[0].permissions, 1071698660929);
        assert_eq!(template.roles[1].permissions, 8196);
        assert_eq!(template.roles[1].color_hex().as_deref(), Some("#e74c3c"));
    }

    #[test]
    fn channel_kinds() {
        let response: TemplateResponse = serde_json::from_str(SAMPLE).unwrap();
        let template = response.serialized_source_guild;

        let kinds: Vec<_> = template.channels.iter().map(|ch| ch.kind()).collect();
        assert_eq!(
            kinds,
            vec![ChannelKind::Category, ChannelKind::Text, ChannelKind::Voice]
        );

        // concrete channels skip the category
        let names: Vec<_> = template.concrete_channels().map(|ch| &ch.name[..]).collect();
        assert_eq!(names, vec!["rules", "Lounge"]);
    }

    #[test]
    fn overwrites_parse_string_bits() {
        let response: TemplateResponse = serde_json::from_str(SAMPLE).unwrap();
        let rules = &response.serialized_source_guild.channels[1];

        assert_eq!(rules.permission_overwrites[0].deny, 2048);
    }
}
