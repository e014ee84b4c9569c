//! Discord → Revolt permission translation.
//!
//! Discord and Revolt both use bit sets, but the bits line up nowhere, and a
//! fair number of Discord permissions simply have no Revolt analogue. Those
//! are dropped, with a warning naming what was lost.

use crate::revolt::{self, Override};

use twilight_model::guild::Permissions as Discord;

/// Discord's timeout permission, newer than our model crate.
const MODERATE_MEMBERS: u64 = 1 << 40;

/// Discord's emoji/sticker/soundboard creation permission.
const CREATE_GUILD_EXPRESSIONS: u64 = 1 << 43;

/// Each Discord permission bit and the Revolt bit it becomes.
const TRANSLATION: &[(u64, revolt::Permissions)] = &[
    (Discord::CREATE_INVITE.bits(), revolt::Permissions::INVITE_OTHERS),
    (Discord::KICK_MEMBERS.bits(), revolt::Permissions::KICK_MEMBERS),
    (Discord::BAN_MEMBERS.bits(), revolt::Permissions::BAN_MEMBERS),
    (Discord::MANAGE_CHANNELS.bits(), revolt::Permissions::MANAGE_CHANNEL),
    (Discord::MANAGE_GUILD.bits(), revolt::Permissions::MANAGE_SERVER),
    (Discord::ADD_REACTIONS.bits(), revolt::Permissions::REACT),
    (Discord::VIEW_CHANNEL.bits(), revolt::Permissions::VIEW_CHANNEL),
    (Discord::SEND_MESSAGES.bits(), revolt::Permissions::SEND_MESSAGE),
    (Discord::MANAGE_MESSAGES.bits(), revolt::Permissions::MANAGE_MESSAGES),
    (Discord::EMBED_LINKS.bits(), revolt::Permissions::SEND_EMBEDS),
    (Discord::ATTACH_FILES.bits(), revolt::Permissions::UPLOAD_FILES),
    (
        Discord::READ_MESSAGE_HISTORY.bits(),
        revolt::Permissions::READ_MESSAGE_HISTORY,
    ),
    (Discord::CONNECT.bits(), revolt::Permissions::CONNECT),
    (Discord::SPEAK.bits(), revolt::Permissions::SPEAK),
    (Discord::MUTE_MEMBERS.bits(), revolt::Permissions::MUTE_MEMBERS),
    (Discord::DEAFEN_MEMBERS.bits(), revolt::Permissions::DEAFEN_MEMBERS),
    (Discord::MOVE_MEMBERS.bits(), revolt::Permissions::MOVE_MEMBERS),
    (Discord::CHANGE_NICKNAME.bits(), revolt::Permissions::CHANGE_NICKNAME),
    (Discord::MANAGE_NICKNAMES.bits(), revolt::Permissions::MANAGE_NICKNAMES),
    (Discord::MANAGE_ROLES.bits(), revolt::Permissions::MANAGE_ROLE),
    (Discord::MANAGE_WEBHOOKS.bits(), revolt::Permissions::MANAGE_WEBHOOKS),
    (MODERATE_MEMBERS, revolt::Permissions::TIMEOUT_MEMBERS),
    (CREATE_GUILD_EXPRESSIONS, revolt::Permissions::MANAGE_CUSTOMISATION),
];

/// The result of translating one Discord bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    /// The Revolt permissions the mapped bits became.
    pub permissions: revolt::Permissions,
    /// Source bits that had no Revolt analogue.
    pub dropped: u64,
}

impl Translation {
    /// Logs a warning for any dropped bits, naming the ones we know.
    pub fn warn_dropped(&self, what: &str) {
        if self.dropped == 0 {
            return;
        }

        let named = Discord::from_bits_truncate(self.dropped);
        let unnamed = self.dropped & !named.bits();

        if unnamed != 0 {
            warn!(
                "{}: no Revolt analogue for {:?} (+{:#x}), dropping",
                what, named, unnamed
            );
        } else {
            warn!("{}: no Revolt analogue for {:?}, dropping", what, named);
        }
    }
}

/// Translates a Discord permission bit set into Revolt permissions.
///
/// Pure; unmapped bits land in [`Translation::dropped`] and never fail the
/// translation.
pub fn translate(bits: u64) -> Translation {
    let mut permissions = revolt::Permissions::empty();
    let mut remaining = bits;

    for &(discord, revolt) in TRANSLATION {
        if bits & discord != 0 {
            permissions |= revolt;
            remaining &= !discord;
        }
    }

    Translation {
        permissions,
        dropped: remaining,
    }
}

/// Translates an allow/deny overwrite pair into a Revolt override.
pub fn translate_override(allow: u64, deny: u64) -> Override {
    Override {
        allow: translate(allow).permissions.bits(),
        deny: translate(deny).permissions.bits(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_bits() {
        let bits = Discord::VIEW_CHANNEL | Discord::SEND_MESSAGES | Discord::CONNECT;
        let translation = translate(bits.bits());

        assert_eq!(
            translation.permissions,
            revolt::Permissions::VIEW_CHANNEL
                | revolt::Permissions::SEND_MESSAGE
                | revolt::Permissions::CONNECT
        );
        assert_eq!(translation.dropped, 0);
    }

    #[test]
    fn drops_unmapped_bits() {
        // administrator has no safe Revolt analogue
        let translation = translate(Discord::ADMINISTRATOR.bits());

        assert_eq!(translation.permissions, revolt::Permissions::empty());
        assert_eq!(translation.dropped, Discord::ADMINISTRATOR.bits());
    }

    #[test]
    fn mixed_bits_split_cleanly() {
        let bits = Discord::ADMINISTRATOR.bits() | Discord::KICK_MEMBERS.bits();
        let translation = translate(bits);

        assert_eq!(translation.permissions, revolt::Permissions::KICK_MEMBERS);
        assert_eq!(translation.dropped, Discord::ADMINISTRATOR.bits());
    }

    #[test]
    fn timeout_translates() {
        let translation = translate(MODERATE_MEMBERS);

        assert_eq!(translation.permissions, revolt::Permissions::TIMEOUT_MEMBERS);
    }

    #[test]
    fn override_pairs_translate_independently() {
        let allow = Discord::VIEW_CHANNEL.bits();
        let deny = Discord::SEND_MESSAGES.bits();

        let ow = translate_override(allow, deny);

        assert_eq!(ow.allow, revolt::Permissions::VIEW_CHANNEL.bits());
        assert_eq!(ow.deny, revolt::Permissions::SEND_MESSAGE.bits());
    }
}
