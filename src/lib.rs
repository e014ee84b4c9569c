//! Imports Discord server templates into existing Revolt servers.
//!
//! A template describes roles, categories, channels and permission
//! overwrites. This crate fetches one, takes a snapshot of a Revolt server,
//! and reconciles the two: entities that already exist are matched by fuzzy
//! name and reused, everything else is created, and Discord permissions are
//! translated into Revolt's model along the way.

pub mod discord;
pub mod matcher;
pub mod perms;
pub mod progress;
pub mod reconcile;
pub mod revolt;

#[macro_use]
extern crate log;

/// The cargo package version of the tool.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
