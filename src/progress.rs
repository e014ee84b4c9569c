//! Resumable progress tracking.
//!
//! Every source → destination link is written to a JSON file as soon as it is
//! made, so an interrupted run picks up where it left off instead of creating
//! a second copy of everything.

use serde::{Deserialize, Serialize};

use anyhow::Error;

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

/// The default progress file, next to wherever the tool runs.
pub const DEFAULT_PATH: &str = "import_progress.json";

/// Links from source (template) ids to destination (Revolt) ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Links {
    #[serde(default)]
    pub roles: HashMap<u64, String>,
    #[serde(default)]
    pub channels: HashMap<u64, String>,
}

impl Links {
    /// Drops links whose destination entity no longer exists.
    ///
    /// Runs against a fresh server snapshot so that a link saved last week
    /// doesn't point a new run at a deleted channel.
    pub fn prune(&mut self, channels: &HashSet<String>, roles: &HashSet<String>) {
        self.channels.retain(|_, id| channels.contains(id));
        self.roles.retain(|_, id| roles.contains(id));
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.channels.is_empty()
    }
}

/// The progress file: [`Links`] plus where they are persisted.
#[derive(Debug)]
pub struct Progress {
    path: PathBuf,
    pub links: Links,
}

impl Progress {
    /// Opens a progress file, loading saved links if the file exists.
    pub fn open(path: &Path) -> Result<Progress, Error> {
        let links = if path.exists() {
            let file = File::open(path)?;
            serde_json::from_reader(file)?
        } else {
            Links::default()
        };

        Ok(Progress {
            path: path.to_path_buf(),
            links,
        })
    }

    /// Opens a progress file but discards anything saved in it.
    pub fn fresh(path: &Path) -> Progress {
        Progress {
            path: path.to_path_buf(),
            links: Links::default(),
        }
    }

    /// Writes the current links out.
    pub fn save(&self) -> Result<(), Error> {
        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(file, &self.links)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("transplant-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn round_trips_through_disk() {
        let path = scratch("roundtrip");

        let mut progress = Progress::fresh(&path);
        progress.links.channels.insert(42, String::from("01ABC"));
        progress.links.roles.insert(7, String::from("01DEF"));
        progress.save().unwrap();

        let reloaded = Progress::open(&path).unwrap();
        assert_eq!(reloaded.links, progress.links);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_empty() {
        let path = scratch("missing");
        let progress = Progress::open(&path).unwrap();

        assert!(progress.links.is_empty());
    }

    #[test]
    fn prune_discards_stale_links() {
        let mut links = Links::default();
        links.channels.insert(1, String::from("live"));
        links.channels.insert(2, String::from("gone"));
        links.roles.insert(3, String::from("gone-role"));

        let channels: HashSet<_> = [String::from("live")].into_iter().collect();
        links.prune(&channels, &HashSet::new());

        assert_eq!(links.channels.len(), 1);
        assert!(links.roles.is_empty());
    }
}
