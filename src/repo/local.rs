//! Local add-on cache index.
//!
//! Merges every directory that can hold already-available add-ons (the
//! bundled set, the download cache, user-supplied directories) into one
//! id-keyed view. Within the merged view a higher version always
//! supersedes a lower one, so the index holds the most authoritative
//! descriptor known for each id.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::addon::{AddonDescriptor, load_manifest};
use crate::env::Environment;
use crate::error::{Error, Result};

/// Merged index of locally available add-ons.
#[derive(Debug, Default)]
pub struct LocalRepo {
    addons: HashMap<String, AddonDescriptor>,
}

impl LocalRepo {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans the environment's add-on directories for manifests.
    ///
    /// An unreadable or invalid manifest only warns; one broken cached
    /// add-on should not take the whole run down.
    #[must_use]
    pub fn scan(env: &Environment) -> Self {
        let mut repo = Self::new();
        for dir in env.addon_dirs() {
            repo.scan_dir(&dir);
        }
        repo
    }

    /// Scans one directory of add-on subdirectories.
    pub fn scan_dir(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!("skipping unreadable addon dir {}", dir.display());
                return;
            }
        };

        for entry in entries.filter_map(std::result::Result::ok) {
            let manifest = entry.path().join("addon.xml");
            if !manifest.exists() {
                continue;
            }
            match load_manifest(&manifest) {
                Ok(addon) => {
                    self.insert(addon);
                }
                Err(e) => warn!("ignoring {}: {}", manifest.display(), e),
            }
        }
    }

    /// Inserts a descriptor; for an already-known id the higher version
    /// wins. Returns whether the descriptor was stored.
    pub fn insert(&mut self, addon: AddonDescriptor) -> bool {
        match self.addons.get(&addon.id) {
            Some(existing) if existing.version >= addon.version => {
                debug!(
                    "keeping {} {} over {}",
                    existing.id, existing.version, addon.version
                );
                false
            }
            _ => {
                self.addons.insert(addon.id.clone(), addon);
                true
            }
        }
    }

    /// Looks up a descriptor by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&AddonDescriptor> {
        self.addons.get(id)
    }

    /// Mutable lookup, for lazy settings/strings access.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut AddonDescriptor> {
        self.addons.get_mut(id)
    }

    /// Looks up a descriptor that must exist.
    pub fn request(&self, id: &str) -> Result<&AddonDescriptor> {
        self.addons
            .get(id)
            .ok_or_else(|| Error::DependencyNotFound(id.to_string()))
    }

    /// Returns whether an id is known.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.addons.contains_key(id)
    }

    /// Iterates over all known descriptors.
    pub fn iter(&self) -> impl Iterator<Item = &AddonDescriptor> {
        self.addons.values()
    }

    /// Number of known add-ons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.addons.len()
    }

    /// Returns whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }
}
