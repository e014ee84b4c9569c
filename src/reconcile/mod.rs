//! Reconciliation between a source template and an existing server.
//!
//! Planning is pure: given the template, a snapshot of the destination server
//! and any previously saved links, [`plan`] decides for every source entity
//! whether to link it to an existing destination entity, create a new one, or
//! skip it. Applying the plan over the network lives in [`apply`].

pub mod apply;

pub use apply::{Importer, Summary};

use crate::discord::{ChannelKind, Template};
use crate::matcher::{self, normalize};
use crate::progress::Links;
use crate::revolt::{Channel, ChannelType, Role, Server};

use std::collections::HashSet;

/// Revolt refuses to create more than this many channels on one server.
pub const MAX_CHANNELS: usize = 200;

/// Similarity below this is "no match".
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// The importer's phases, strictly in order.
///
/// Roles and categories resolve before channels so channel creation and
/// overwrite translation always have valid destination ids to reference, and
/// overwrites come last of all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    RolesDone,
    CategoriesDone,
    ChannelsDone,
    OverwritesDone,
}

impl Phase {
    /// The phase after this one.
    pub fn next(self) -> Phase {
        match self {
            Phase::Pending => Phase::RolesDone,
            Phase::RolesDone => Phase::CategoriesDone,
            Phase::CategoriesDone => Phase::ChannelsDone,
            Phase::ChannelsDone => Phase::OverwritesDone,
            Phase::OverwritesDone => Phase::OverwritesDone,
        }
    }
}

/// How the run treats entities that are missing on the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reuse what exists, create what doesn't.
    Smart,
    /// Only organize existing channels into categories; create nothing.
    CategoriesOnly,
}

/// Knobs for planning.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub mode: Mode,
    pub threshold: f64,
    pub max_channels: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            mode: Mode::Smart,
            threshold: DEFAULT_THRESHOLD,
            max_channels: MAX_CHANNELS,
        }
    }
}

/// A point-in-time view of the destination server.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub channels: Vec<Channel>,
    /// Roles with their ids, in a stable order.
    pub roles: Vec<(String, Role)>,
    pub categories: Vec<crate::revolt::Category>,
}

impl Snapshot {
    /// Builds a snapshot from a fetched server and its resolved channels.
    ///
    /// Roles come out of an unordered map, so they are sorted by rank (then
    /// id) to make "first-listed wins" tie-breaking deterministic.
    pub fn new(server: &Server, channels: Vec<Channel>) -> Snapshot {
        let mut roles: Vec<(String, Role)> = server
            .roles
            .iter()
            .map(|(id, role)| (id.clone(), role.clone()))
            .collect();

        roles.sort_by(|a, b| a.1.rank.cmp(&b.1.rank).then_with(|| a.0.cmp(&b.0)));

        Snapshot {
            channels,
            roles,
            categories: server.categories.clone(),
        }
    }
}

/// What to do with one source entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reuse an existing destination entity.
    Link(String),
    /// Create a new destination entity.
    Create,
    /// Leave this entity out of the import.
    Skip(SkipReason),
}

/// Why a source entity was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Creating it would put the server over the channel cap.
    ChannelCap,
    /// Nothing matched and the mode forbids creation.
    NoMatch,
}

/// A planned role.
#[derive(Debug, Clone, PartialEq)]
pub struct RolePlan {
    pub source_id: u64,
    pub name: String,
    pub rank: i64,
    pub color: Option<String>,
    pub hoist: bool,
    /// Discord permission bits, translated at apply time.
    pub permissions: u64,
    pub action: Action,
}

/// A planned category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPlan {
    pub source_id: u64,
    /// The destination category id: an existing category's id when matched,
    /// otherwise the source id carried over as a new one.
    pub dest_id: String,
    pub title: String,
    /// Source ids of member channels, in template order.
    pub members: Vec<u64>,
    pub existing: bool,
}

/// A planned channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    pub source_id: u64,
    pub name: String,
    pub kind: ChannelKind,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub action: Action,
}

/// The overwrites planned for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwritePlan {
    pub channel_source_id: u64,
    pub channel_name: String,
    pub entries: Vec<OverwriteEntry>,
}

/// One planned overwrite, still in Discord bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverwriteEntry {
    pub target: OverwriteTarget,
    pub allow: u64,
    pub deny: u64,
}

/// Who an overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    /// The channel's default (everyone) override.
    Default,
    /// A role, by source id.
    Role(u64),
}

/// The full plan for a run.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Discord bits for the server default permissions, from `@everyone`.
    pub default_permissions: Option<u64>,
    pub roles: Vec<RolePlan>,
    pub categories: Vec<CategoryPlan>,
    pub channels: Vec<ChannelPlan>,
    pub overwrites: Vec<OverwritePlan>,
}

/// Plans a full import.
///
/// Pure: no network, no logging, same output for the same input. Saved links
/// always win over fuzzy matches, and no destination entity is ever handed to
/// two source entities.
pub fn plan(template: &Template, snapshot: &Snapshot, links: &Links, opts: &Options) -> Plan {
    let mut plan = Plan::default();

    let everyone = template.everyone_role();

    plan_roles(&mut plan, template, snapshot, links, opts, everyone);
    plan_categories(&mut plan, template, snapshot, opts);
    plan_channels(&mut plan, template, snapshot, links, opts);
    plan_overwrites(&mut plan, template, opts, everyone);

    plan
}

fn plan_roles(
    plan: &mut Plan,
    template: &Template,
    snapshot: &Snapshot,
    links: &Links,
    opts: &Options,
    everyone: Option<u64>,
) {
    if opts.mode == Mode::CategoriesOnly {
        return;
    }

    let mut pool = Pool::new(
        snapshot
            .roles
            .iter()
            .map(|(id, role)| (id.clone(), normalize(&role.name), None)),
    );

    for role in &template.roles {
        if Some(role.id) == everyone {
            plan.default_permissions = Some(role.permissions);
            continue;
        }

        // a saved link wins, as long as its destination is still around
        let saved = links
            .roles
            .get(&role.id)
            .filter(|dest| pool.claim(dest))
            .cloned();

        let action = match saved {
            Some(dest) => Action::Link(dest),
            None => match pool.take(&role.name, None, opts.threshold) {
                Some(dest) => Action::Link(dest),
                None => Action::Create,
            },
        };

        plan.roles.push(RolePlan {
            source_id: role.id,
            name: role.name.clone(),
            rank: role.position.max(1),
            color: role.color_hex(),
            hoist: role.hoist,
            permissions: role.permissions,
            action,
        });
    }
}

fn plan_categories(plan: &mut Plan, template: &Template, snapshot: &Snapshot, opts: &Options) {
    let mut pool = Pool::new(
        snapshot
            .categories
            .iter()
            .map(|cat| (cat.id.clone(), normalize(&cat.title), None)),
    );

    for category in template.channels_of(ChannelKind::Category) {
        let members: Vec<u64> = template
            .concrete_channels()
            .filter(|ch| ch.parent_id == Some(category.id))
            .map(|ch| ch.id)
            .collect();

        let (dest_id, existing) = match pool.take(&category.name, None, opts.threshold) {
            Some(id) => (id, true),
            // new categories carry the source id over; Revolt accepts any
            // unique string here
            None => (category.id.to_string(), false),
        };

        plan.categories.push(CategoryPlan {
            source_id: category.id,
            dest_id,
            title: category.name.clone(),
            members,
            existing,
        });
    }
}

fn plan_channels(
    plan: &mut Plan,
    template: &Template,
    snapshot: &Snapshot,
    links: &Links,
    opts: &Options,
) {
    let mut pool = Pool::new(snapshot.channels.iter().map(|ch| {
        let kind = match ch.channel_type {
            ChannelType::VoiceChannel => Some(ChannelKind::Voice),
            ChannelType::TextChannel => Some(ChannelKind::Text),
            ChannelType::Other => None,
        };

        (ch.id.clone(), normalize(&ch.name), kind)
    }));

    let mut total = snapshot.channels.len();

    for channel in template.concrete_channels() {
        let saved = links
            .channels
            .get(&channel.id)
            .filter(|dest| pool.claim(dest))
            .cloned();

        let action = match saved {
            Some(dest) => Action::Link(dest),
            None => {
                // prefer a candidate of the same kind, fall back to any
                let matched = pool
                    .take(&channel.name, Some(channel.kind()), opts.threshold)
                    .or_else(|| pool.take(&channel.name, None, opts.threshold));

                match matched {
                    Some(dest) => Action::Link(dest),
                    None if opts.mode == Mode::CategoriesOnly => Action::Skip(SkipReason::NoMatch),
                    None if total >= opts.max_channels => Action::Skip(SkipReason::ChannelCap),
                    None => {
                        total += 1;
                        Action::Create
                    }
                }
            }
        };

        plan.channels.push(ChannelPlan {
            source_id: channel.id,
            name: channel.name.clone(),
            kind: channel.kind(),
            topic: channel.topic.clone(),
            nsfw: channel.nsfw,
            action,
        });
    }
}

fn plan_overwrites(plan: &mut Plan, template: &Template, opts: &Options, everyone: Option<u64>) {
    if opts.mode == Mode::CategoriesOnly {
        return;
    }

    // only roles the plan knows about can be referenced
    let known_roles: HashSet<u64> = plan.roles.iter().map(|role| role.source_id).collect();

    for channel in template.concrete_channels() {
        // channels that didn't make it into the plan get no overwrites
        let planned = plan
            .channels
            .iter()
            .any(|ch| ch.source_id == channel.id && !matches!(ch.action, Action::Skip(_)));

        if !planned || channel.permission_overwrites.is_empty() {
            continue;
        }

        let entries: Vec<OverwriteEntry> = channel
            .permission_overwrites
            .iter()
            .filter_map(|ow| {
                let target = if Some(ow.id) == everyone {
                    OverwriteTarget::Default
                } else if known_roles.contains(&ow.id) {
                    OverwriteTarget::Role(ow.id)
                } else {
                    // member overwrites and unknown role refs have no home
                    return None;
                };

                Some(OverwriteEntry {
                    target,
                    allow: ow.allow,
                    deny: ow.deny,
                })
            })
            .collect();

        if !entries.is_empty() {
            plan.overwrites.push(OverwritePlan {
                channel_source_id: channel.id,
                channel_name: channel.name.clone(),
                entries,
            });
        }
    }
}

/// A pool of destination candidates, each claimable exactly once.
struct Pool {
    entries: Vec<PoolEntry>,
}

struct PoolEntry {
    id: String,
    key: String,
    kind: Option<ChannelKind>,
    used: bool,
}

impl Pool {
    fn new<I>(entries: I) -> Pool
    where
        I: IntoIterator<Item = (String, String, Option<ChannelKind>)>,
    {
        Pool {
            entries: entries
                .into_iter()
                .map(|(id, key, kind)| PoolEntry {
                    id,
                    key,
                    kind,
                    used: false,
                })
                .collect(),
        }
    }

    /// Claims a specific candidate by id, if it is present and unused.
    fn claim(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id && !e.used) {
            Some(entry) => {
                entry.used = true;
                true
            }
            None => false,
        }
    }

    /// Takes the best unused fuzzy match for `name`, optionally restricted to
    /// one kind of candidate.
    fn take(&mut self, name: &str, kind: Option<ChannelKind>, threshold: f64) -> Option<String> {
        let candidates: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.used && (kind.is_none() || e.kind == kind))
            .map(|(idx, _)| idx)
            .collect();

        let keys: Vec<String> = candidates
            .iter()
            .map(|&idx| self.entries[idx].key.clone())
            .collect();

        let winner = matcher::best_match(name, &keys, threshold)?;
        let idx = candidates[winner];

        self.entries[idx].used = true;

        Some(self.entries[idx].id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::discord::{Overwrite, SourceChannel, SourceRole};
    use crate::revolt::Override;

    fn source_channel(id: u64, name: &str, channel_type: i64, parent: Option<u64>) -> SourceChannel {
        SourceChannel {
            id,
            name: String::from(name),
            channel_type,
            parent_id: parent,
            position: 0,
            topic: None,
            nsfw: false,
            permission_overwrites: Vec::new(),
        }
    }

    fn source_role(id: u64, name: &str, permissions: u64) -> SourceRole {
        SourceRole {
            id,
            name: String::from(name),
            color: 0,
            hoist: false,
            position: 1,
            permissions,
        }
    }

    fn dest_channel(id: &str, name: &str, kind: ChannelType) -> Channel {
        Channel {
            id: String::from(id),
            name: String::from(name),
            channel_type: kind,
        }
    }

    fn dest_role(id: &str, name: &str, rank: i64) -> (String, Role) {
        (
            String::from(id),
            Role {
                name: String::from(name),
                permissions: Override::default(),
                colour: None,
                hoist: false,
                rank,
            },
        )
    }

    fn template(roles: Vec<SourceRole>, channels: Vec<SourceChannel>) -> Template {
        Template {
            name: String::from("test"),
            description: None,
            roles,
            channels,
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let mut phase = Phase::Pending;
        let expected = [
            Phase::RolesDone,
            Phase::CategoriesDone,
            Phase::ChannelsDone,
            Phase::OverwritesDone,
            // terminal state stays put
            Phase::OverwritesDone,
        ];

        for want in expected {
            phase = phase.next();
            assert_eq!(phase, want);
        }
    }

    #[test]
    fn links_existing_channels_and_creates_missing() {
        let template = template(
            Vec::new(),
            vec![
                source_channel(1, "🔥general🔥", 0, None),
                source_channel(2, "brand-new", 0, None),
            ],
        );

        let snapshot = Snapshot {
            channels: vec![dest_channel("01A", "general", ChannelType::TextChannel)],
            ..Snapshot::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &Options::default());

        assert_eq!(plan.channels[0].action, Action::Link(String::from("01A")));
        assert_eq!(plan.channels[1].action, Action::Create);
    }

    #[test]
    fn saved_links_beat_fuzzy_matching() {
        let template = template(Vec::new(), vec![source_channel(1, "general", 0, None)]);

        let snapshot = Snapshot {
            channels: vec![
                dest_channel("01A", "general", ChannelType::TextChannel),
                dest_channel("01B", "renamed-long-ago", ChannelType::TextChannel),
            ],
            ..Snapshot::default()
        };

        // a previous run linked the template channel to 01B before a rename
        let mut links = Links::default();
        links.channels.insert(1, String::from("01B"));

        let plan = plan(&template, &snapshot, &links, &Options::default());

        assert_eq!(plan.channels[0].action, Action::Link(String::from("01B")));
    }

    #[test]
    fn repeated_runs_are_idempotent() {
        let template = template(Vec::new(), vec![source_channel(1, "general", 0, None)]);

        let snapshot = Snapshot {
            channels: vec![dest_channel("01A", "general", ChannelType::TextChannel)],
            ..Snapshot::default()
        };

        // first run links the channel
        let first = plan(&template, &snapshot, &Links::default(), &Options::default());
        assert_eq!(first.channels[0].action, Action::Link(String::from("01A")));

        // a second run with the saved links makes the same decision; nothing
        // is ever created for an already-linked source entity
        let mut links = Links::default();
        links.channels.insert(1, String::from("01A"));

        let second = plan(&template, &snapshot, &links, &Options::default());
        assert_eq!(second.channels[0].action, Action::Link(String::from("01A")));
    }

    #[test]
    fn destination_entities_are_never_shared() {
        // two template channels with the same name, one existing channel
        let template = template(
            Vec::new(),
            vec![
                source_channel(1, "general", 0, None),
                source_channel(2, "general", 0, None),
            ],
        );

        let snapshot = Snapshot {
            channels: vec![dest_channel("01A", "general", ChannelType::TextChannel)],
            ..Snapshot::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &Options::default());

        assert_eq!(plan.channels[0].action, Action::Link(String::from("01A")));
        assert_eq!(plan.channels[1].action, Action::Create);
    }

    #[test]
    fn voice_channels_prefer_voice_candidates() {
        let template = template(Vec::new(), vec![source_channel(1, "lounge", 2, None)]);

        let snapshot = Snapshot {
            channels: vec![
                dest_channel("01T", "lounge", ChannelType::TextChannel),
                dest_channel("01V", "lounge", ChannelType::VoiceChannel),
            ],
            ..Snapshot::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &Options::default());

        assert_eq!(plan.channels[0].action, Action::Link(String::from("01V")));
    }

    #[test]
    fn excess_channels_skip_over_the_cap() {
        let template = template(
            Vec::new(),
            vec![
                source_channel(1, "existing", 0, None),
                source_channel(2, "new-one", 0, None),
                source_channel(3, "new-two", 0, None),
            ],
        );

        let snapshot = Snapshot {
            channels: vec![
                dest_channel("01A", "existing", ChannelType::TextChannel),
                dest_channel("01B", "unrelated", ChannelType::TextChannel),
            ],
            ..Snapshot::default()
        };

        let opts = Options {
            max_channels: 3,
            ..Options::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &opts);

        // linking doesn't count against the cap; one create fits, one doesn't
        assert_eq!(plan.channels[0].action, Action::Link(String::from("01A")));
        assert_eq!(plan.channels[1].action, Action::Create);
        assert_eq!(
            plan.channels[2].action,
            Action::Skip(SkipReason::ChannelCap)
        );
    }

    #[test]
    fn everyone_becomes_default_permissions() {
        let template = template(
            vec![
                source_role(0, "@everyone", 1024),
                source_role(1, "mods", 8196),
            ],
            Vec::new(),
        );

        let plan = plan(
            &template,
            &Snapshot::default(),
            &Links::default(),
            &Options::default(),
        );

        assert_eq!(plan.default_permissions, Some(1024));
        // @everyone never becomes a role of its own
        assert_eq!(plan.roles.len(), 1);
        assert_eq!(plan.roles[0].name, "mods");
        assert_eq!(plan.roles[0].action, Action::Create);
    }

    #[test]
    fn roles_link_by_name() {
        let template = template(vec![source_role(1, "⭐Mods⭐", 0)], Vec::new());

        let snapshot = Snapshot {
            roles: vec![dest_role("01R", "mods", 1)],
            ..Snapshot::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &Options::default());

        assert_eq!(plan.roles[0].action, Action::Link(String::from("01R")));
    }

    #[test]
    fn categories_collect_members_in_template_order() {
        let template = template(
            Vec::new(),
            vec![
                source_channel(10, "INFO", 4, None),
                source_channel(1, "rules", 0, Some(10)),
                source_channel(2, "lounge", 2, Some(10)),
                source_channel(3, "stray", 0, None),
            ],
        );

        let plan = plan(
            &template,
            &Snapshot::default(),
            &Links::default(),
            &Options::default(),
        );

        assert_eq!(plan.categories.len(), 1);
        assert_eq!(plan.categories[0].members, vec![1, 2]);
        assert!(!plan.categories[0].existing);
        assert_eq!(plan.categories[0].dest_id, "10");
    }

    #[test]
    fn categories_match_existing_by_title() {
        let template = template(Vec::new(), vec![source_channel(10, "📜 INFO", 4, None)]);

        let snapshot = Snapshot {
            categories: vec![crate::revolt::Category {
                id: String::from("cat-1"),
                title: String::from("Info"),
                channels: Vec::new(),
            }],
            ..Snapshot::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &Options::default());

        assert!(plan.categories[0].existing);
        assert_eq!(plan.categories[0].dest_id, "cat-1");
    }

    #[test]
    fn categories_only_mode_never_creates() {
        let template = template(
            vec![source_role(1, "mods", 8)],
            vec![
                source_channel(1, "general", 0, None),
                source_channel(2, "missing", 0, None),
            ],
        );

        let snapshot = Snapshot {
            channels: vec![dest_channel("01A", "general", ChannelType::TextChannel)],
            ..Snapshot::default()
        };

        let opts = Options {
            mode: Mode::CategoriesOnly,
            ..Options::default()
        };

        let plan = plan(&template, &snapshot, &Links::default(), &opts);

        assert!(plan.roles.is_empty());
        assert!(plan.overwrites.is_empty());
        assert_eq!(plan.default_permissions, None);
        assert_eq!(plan.channels[0].action, Action::Link(String::from("01A")));
        assert_eq!(plan.channels[1].action, Action::Skip(SkipReason::NoMatch));
    }

    #[test]
    fn overwrites_only_reference_known_targets() {
        let mut channel = source_channel(1, "rules", 0, None);
        channel.permission_overwrites = vec![
            Overwrite {
                id: 0,
                allow: 0,
                deny: 2048,
            },
            Overwrite {
                id: 5,
                allow: 1024,
                deny: 0,
            },
            // a member overwrite; no role with this id exists
            Overwrite {
                id: 999,
                allow: 1,
                deny: 0,
            },
        ];

        let template = template(
            vec![source_role(0, "@everyone", 0), source_role(5, "mods", 0)],
            vec![channel],
        );

        let plan = plan(
            &template,
            &Snapshot::default(),
            &Links::default(),
            &Options::default(),
        );

        assert_eq!(plan.overwrites.len(), 1);

        let targets: Vec<_> = plan.overwrites[0]
            .entries
            .iter()
            .map(|entry| entry.target)
            .collect();

        assert_eq!(
            targets,
            vec![OverwriteTarget::Default, OverwriteTarget::Role(5)]
        );
    }

    #[test]
    fn skipped_channels_get_no_overwrites() {
        let mut channel = source_channel(1, "over-cap", 0, None);
        channel.permission_overwrites = vec![Overwrite {
            id: 0,
            allow: 0,
            deny: 2048,
        }];

        let template = template(vec![source_role(0, "@everyone", 0)], vec![channel]);

        let opts = Options {
            max_channels: 0,
            ..Options::default()
        };

        let plan = plan(&template, &Snapshot::default(), &Links::default(), &opts);

        assert_eq!(
            plan.channels[0].action,
            Action::Skip(SkipReason::ChannelCap)
        );
        assert!(plan.overwrites.is_empty());
    }
}
