//! Applies a [`Plan`](super::Plan) to a live server.
//!
//! Calls run sequentially and every mutation is journaled to the progress
//! file as soon as it lands. A failure on one entity is logged and skipped;
//! the run keeps going with the next one.

use super::{Action, OverwriteTarget, Phase, Plan, SkipReason};

use crate::discord::ChannelKind;
use crate::perms;
use crate::progress::Progress;
use crate::revolt::{Category, ChannelType, Client, Permissions};

use anyhow::{anyhow, Error};

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// Created/linked/skipped tallies for one kind of entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub created: usize,
    pub linked: usize,
    pub skipped: usize,
}

impl Display for Counts {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} created, {} linked, {} skipped",
            self.created, self.linked, self.skipped
        )
    }
}

/// The final report of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Summary {
    pub roles: Counts,
    pub categories: Counts,
    pub channels: Counts,
    pub overwrites: Counts,
}

/// Drives a plan against the Revolt API, phase by phase.
pub struct Importer<'a> {
    client: &'a Client,
    server_id: &'a str,
    progress: &'a mut Progress,
    phase: Phase,
    summary: Summary,
    dry_run: bool,
}

impl<'a> Importer<'a> {
    pub fn new(client: &'a Client, server_id: &'a str, progress: &'a mut Progress) -> Importer<'a> {
        Importer {
            client,
            server_id,
            progress,
            phase: Phase::Pending,
            summary: Summary::default(),
            dry_run: false,
        }
    }

    /// Logs what would happen instead of doing it.
    pub fn dry_run(mut self, dry_run: bool) -> Importer<'a> {
        self.dry_run = dry_run;
        self
    }

    /// Runs every phase in order and returns the final tallies.
    pub async fn run(mut self, plan: &Plan) -> Result<Summary, Error> {
        self.apply_roles(plan).await?;
        self.apply_categories(plan)?;
        self.apply_channels(plan).await?;
        self.apply_overwrites(plan).await?;

        Ok(self.summary)
    }

    /// Creates or links roles and pushes the server default permissions.
    pub async fn apply_roles(&mut self, plan: &Plan) -> Result<(), Error> {
        self.enter(Phase::Pending)?;

        if let Some(bits) = plan.default_permissions {
            let translation = perms::translate(bits);
            translation.warn_dropped("default permissions");

            if self.dry_run {
                info!("would set default permissions to {:?}", translation.permissions);
            } else if let Err(err) = self
                .client
                .set_default_permissions(self.server_id, translation.permissions)
                .await
            {
                error!("could not set default permissions: {}", err);
            }
        }

        for role in &plan.roles {
            let dest_id = match &role.action {
                Action::Link(id) => {
                    info!("role {:?} exists, reusing", role.name);
                    self.summary.roles.linked += 1;
                    id.clone()
                }
                Action::Create => {
                    if self.dry_run {
                        info!("would create role {:?}", role.name);
                        self.summary.roles.created += 1;
                        continue;
                    }

                    match self.client.create_role(self.server_id, &role.name, role.rank).await {
                        Ok(new) => {
                            info!("created role {:?}", role.name);
                            self.summary.roles.created += 1;
                            new.id
                        }
                        Err(err) => {
                            error!("could not create role {:?}: {}", role.name, err);
                            self.summary.roles.skipped += 1;
                            continue;
                        }
                    }
                }
                Action::Skip(_) => {
                    self.summary.roles.skipped += 1;
                    continue;
                }
            };

            self.progress.links.roles.insert(role.source_id, dest_id.clone());
            self.checkpoint();

            if self.dry_run {
                continue;
            }

            // matched and fresh roles both get the template's styling and
            // permissions
            if let Err(err) = self
                .client
                .edit_role(self.server_id, &dest_id, role.color.as_deref(), role.hoist)
                .await
            {
                warn!("could not style role {:?}: {}", role.name, err);
            }

            let translation = perms::translate(role.permissions);
            translation.warn_dropped(&format!("role {:?}", role.name));

            if let Err(err) = self
                .client
                .set_role_permissions(
                    self.server_id,
                    &dest_id,
                    translation.permissions,
                    Permissions::empty(),
                )
                .await
            {
                error!("could not set permissions for role {:?}: {}", role.name, err);
            }
        }

        self.advance();
        Ok(())
    }

    /// Resolves category links.
    ///
    /// Revolt stores category membership on the server object, so the actual
    /// edit waits until channel ids are final at the end of the channel
    /// phase; this phase fixes the category set itself.
    pub fn apply_categories(&mut self, plan: &Plan) -> Result<(), Error> {
        self.enter(Phase::RolesDone)?;

        for category in &plan.categories {
            if category.existing {
                info!("category {:?} exists, reusing", category.title);
                self.summary.categories.linked += 1;
            } else {
                info!("new category {:?}", category.title);
                self.summary.categories.created += 1;
            }
        }

        self.advance();
        Ok(())
    }

    /// Creates or links channels, then pushes category membership.
    pub async fn apply_channels(&mut self, plan: &Plan) -> Result<(), Error> {
        self.enter(Phase::CategoriesDone)?;

        for channel in &plan.channels {
            let dest_id = match &channel.action {
                Action::Link(id) => {
                    info!("channel {:?} exists, reusing", channel.name);
                    self.summary.channels.linked += 1;
                    id.clone()
                }
                Action::Create => {
                    if self.dry_run {
                        info!("would create {:?} channel {:?}", channel.kind, channel.name);
                        self.summary.channels.created += 1;
                        continue;
                    }

                    let kind = match channel.kind {
                        ChannelKind::Voice => ChannelType::VoiceChannel,
                        _ => ChannelType::TextChannel,
                    };

                    let created = self
                        .client
                        .create_channel(
                            self.server_id,
                            kind,
                            &channel.name,
                            channel.topic.as_deref(),
                            channel.nsfw,
                        )
                        .await;

                    match created {
                        Ok(new) => {
                            info!("created channel {:?}", channel.name);
                            self.summary.channels.created += 1;
                            new.id
                        }
                        Err(err) if err.is_too_many_channels() => {
                            warn!("channel {:?} skipped: server channel limit reached", channel.name);
                            self.summary.channels.skipped += 1;
                            continue;
                        }
                        Err(err) => {
                            error!("could not create channel {:?}: {}", channel.name, err);
                            self.summary.channels.skipped += 1;
                            continue;
                        }
                    }
                }
                Action::Skip(SkipReason::ChannelCap) => {
                    warn!("channel {:?} skipped: over the {} channel cap", channel.name, super::MAX_CHANNELS);
                    self.summary.channels.skipped += 1;
                    continue;
                }
                Action::Skip(_) => {
                    self.summary.channels.skipped += 1;
                    continue;
                }
            };

            self.progress.links.channels.insert(channel.source_id, dest_id);
            self.checkpoint();
        }

        self.push_categories(plan).await;

        self.advance();
        Ok(())
    }

    /// Pushes the planned categories, with membership resolved to live
    /// channel ids, as one server edit.
    async fn push_categories(&mut self, plan: &Plan) {
        // a channel may appear in at most one category overall
        let mut assigned: HashSet<&str> = HashSet::new();
        let mut categories: Vec<Category> = Vec::new();

        for category in &plan.categories {
            let members: Vec<String> = category
                .members
                .iter()
                .filter_map(|source_id| self.progress.links.channels.get(source_id))
                .filter(|id| assigned.insert(id.as_str()))
                .cloned()
                .collect();

            if members.is_empty() {
                debug!("category {:?} has no member channels, leaving it out", category.title);
                continue;
            }

            categories.push(Category::new(
                category.dest_id.clone(),
                &category.title,
                members,
            ));
        }

        if categories.is_empty() {
            return;
        }

        if self.dry_run {
            info!("would apply {} categories", categories.len());
            return;
        }

        match self.client.edit_categories(self.server_id, &categories).await {
            Ok(()) => info!("applied {} categories", categories.len()),
            Err(err) => error!("could not apply categories: {}", err),
        }
    }

    /// Translates and pushes per-channel permission overwrites.
    pub async fn apply_overwrites(&mut self, plan: &Plan) -> Result<(), Error> {
        self.enter(Phase::ChannelsDone)?;

        for overwrite in &plan.overwrites {
            let channel_id = match self.progress.links.channels.get(&overwrite.channel_source_id) {
                Some(id) => id.clone(),
                // the channel never made it onto the server
                None => {
                    self.summary.overwrites.skipped += overwrite.entries.len();
                    continue;
                }
            };

            for entry in &overwrite.entries {
                let allow = perms::translate(entry.allow);
                let deny = perms::translate(entry.deny);
                allow.warn_dropped(&format!("overwrite on {:?}", overwrite.channel_name));
                deny.warn_dropped(&format!("overwrite on {:?}", overwrite.channel_name));

                if self.dry_run {
                    self.summary.overwrites.created += 1;
                    continue;
                }

                let result = match entry.target {
                    OverwriteTarget::Default => {
                        self.client
                            .set_channel_default_permissions(
                                &channel_id,
                                allow.permissions,
                                deny.permissions,
                            )
                            .await
                    }
                    OverwriteTarget::Role(source_id) => {
                        match self.progress.links.roles.get(&source_id) {
                            Some(role_id) => {
                                self.client
                                    .set_channel_role_permissions(
                                        &channel_id,
                                        role_id,
                                        allow.permissions,
                                        deny.permissions,
                                    )
                                    .await
                            }
                            None => {
                                debug!(
                                    "overwrite on {:?} references unlinked role {}",
                                    overwrite.channel_name, source_id
                                );
                                self.summary.overwrites.skipped += 1;
                                continue;
                            }
                        }
                    }
                };

                match result {
                    Ok(()) => self.summary.overwrites.created += 1,
                    Err(err) => {
                        error!("could not set overwrite on {:?}: {}", overwrite.channel_name, err);
                        self.summary.overwrites.skipped += 1;
                    }
                }
            }
        }

        self.advance();
        Ok(())
    }

    fn enter(&self, expect: Phase) -> Result<(), Error> {
        if self.phase == expect {
            Ok(())
        } else {
            Err(anyhow!(
                "phase out of order: at {:?}, expected {:?}",
                self.phase,
                expect
            ))
        }
    }

    fn advance(&mut self) {
        self.phase = self.phase.next();
    }

    /// Persists progress after a mutation; losing the file only costs
    /// re-matching, so a write failure is not fatal.
    fn checkpoint(&self) {
        if self.dry_run {
            return;
        }

        if let Err(err) = self.progress.save() {
            warn!("could not save progress: {}", err);
        }
    }
}
