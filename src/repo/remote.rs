//! Remote repository client and package cache.
//!
//! Fetches the addons.xml catalog from each configured mirror, downloads
//! add-on archives into the packages directory and extracts them into
//! the cache root. Catalog refreshes are amortized with an on-disk
//! timestamp sentinel.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::addon::{AddonDescriptor, Dependency, parse_addon_node};
use crate::env::Environment;
use crate::error::{Error, Result};
use super::local::LocalRepo;

/// Catalog age after which a refresh is forced (5 days).
const CATALOG_MAX_AGE: Duration = Duration::from_secs(432_000);

/// Name of the timestamp sentinel file in the cache root.
const SENTINEL_FILE: &str = "update_check";

/// Anything the resolver can request downloads from.
///
/// The production implementation is [`RemoteRepo`]; tests substitute a
/// scripted source to keep resolution off the network.
pub trait PackageSource {
    /// Downloads (or reuses) the add-on an id refers to, returning its
    /// descriptor rooted in the extracted cache directory.
    fn download(&mut self, dep: &Dependency) -> Result<AddonDescriptor>;
}

/// One catalog entry: the mirror that advertises the add-on plus its
/// descriptor (path empty until downloaded).
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub repo_url: String,
    pub addon: AddonDescriptor,
}

/// Remote repository client over one or more mirrors.
pub struct RemoteRepo {
    cache_root: PathBuf,
    packages_dir: PathBuf,
    repo_urls: Vec<String>,
    client: reqwest::blocking::Client,
    catalog: Option<std::collections::HashMap<String, CatalogEntry>>,
}

impl RemoteRepo {
    /// Creates a client for the environment's mirrors. No network
    /// traffic happens until the catalog is first needed.
    #[must_use]
    pub fn new(env: &Environment) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent("kodidev")
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            cache_root: env.cache_root.clone(),
            packages_dir: env.packages_dir.clone(),
            repo_urls: env.remote_repos.clone(),
            client,
            catalog: None,
        }
    }

    /// Returns whether the sentinel says the catalog is due a refresh.
    /// A missing or unreadable sentinel counts as stale.
    #[must_use]
    pub fn update_required(&self) -> bool {
        let sentinel = self.cache_root.join(SENTINEL_FILE);
        let Ok(data) = fs::read_to_string(&sentinel) else {
            return true;
        };
        let Ok(stamp) = serde_json::from_str::<u64>(&data) else {
            return true;
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        stamp + CATALOG_MAX_AGE.as_secs() < now
    }

    /// Writes the sentinel with the current timestamp.
    fn touch_sentinel(&self) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let sentinel = self.cache_root.join(SENTINEL_FILE);
        fs::write(sentinel, serde_json::to_string(&now).unwrap_or_default())?;
        Ok(())
    }

    /// When the sentinel is stale, compares every cached add-on against
    /// the catalog: ids that vanished from the remote side only warn,
    /// newer remote versions are re-downloaded. Rewrites the sentinel on
    /// success.
    pub fn refresh_if_stale(&mut self, local: &mut LocalRepo) -> Result<()> {
        if !self.update_required() {
            return Ok(());
        }
        info!("checking repository for add-on updates...");

        let cached: Vec<(String, crate::addon::Version)> = local
            .iter()
            .map(|a| (a.id.clone(), a.version.clone()))
            .collect();

        for (id, version) in cached {
            let entry = match self.catalog()?.get(&id) {
                Some(entry) => entry.clone(),
                None => {
                    warn!("cached add-on '{}' is no longer available on the repository", id);
                    continue;
                }
            };
            if entry.addon.version > version {
                info!(
                    "updating {} {} -> {}",
                    id, version, entry.addon.version
                );
                let dep = Dependency::new(id, entry.addon.version.clone(), false);
                let addon = self.download(&dep)?;
                local.insert(addon);
            }
        }

        self.touch_sentinel()
    }

    /// Returns the merged catalog, fetching it on first access.
    pub fn catalog(&mut self) -> Result<&std::collections::HashMap<String, CatalogEntry>> {
        if self.catalog.is_none() {
            let fetched = self.fetch_catalog()?;
            self.catalog = Some(fetched);
        }
        // Populated above.
        Ok(self.catalog.get_or_insert_with(Default::default))
    }

    /// Fetches and parses addons.xml from every mirror. Later mirrors
    /// override earlier ones for the same id.
    fn fetch_catalog(&self) -> Result<std::collections::HashMap<String, CatalogEntry>> {
        info!("fetching add-on catalog: please wait");
        let mut catalog = std::collections::HashMap::new();

        for repo_url in &self.repo_urls {
            let url = format!("{}/addons.xml", repo_url.trim_end_matches('/'));
            debug!("fetching catalog {}", url);
            let body = self
                .client
                .get(&url)
                .send()?
                .error_for_status()?
                .text()?;

            let doc = match roxmltree::Document::parse(&body) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("malformed catalog from {}: {}", repo_url, e);
                    continue;
                }
            };

            for node in doc
                .root_element()
                .children()
                .filter(|n| n.has_tag_name("addon"))
            {
                // Catalogs list every add-on kind; entries without a
                // runnable extension point are simply not offered.
                match parse_addon_node(node, PathBuf::new(), Path::new(&url)) {
                    Ok(addon) => {
                        catalog.insert(
                            addon.id.clone(),
                            CatalogEntry {
                                repo_url: repo_url.clone(),
                                addon,
                            },
                        );
                    }
                    Err(e) => debug!("skipping catalog entry: {}", e),
                }
            }
        }

        info!("catalog holds {} usable add-ons", catalog.len());
        Ok(catalog)
    }

    /// Removes all stale archives belonging to an id.
    fn cleanup_packages(&self, addon_id: &str) {
        let prefix = format!("{}-", addon_id);
        let Ok(entries) = fs::read_dir(&self.packages_dir) else {
            return;
        };
        for entry in entries.filter_map(std::result::Result::ok) {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(&prefix) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("could not remove stale package {}: {}", name, e);
                }
            }
        }
    }

    /// Streams an archive to disk, removing the partial file on any
    /// failure so a later run cannot mistake it for a complete download.
    fn stream_to_file(&self, url: &str, dest: &Path) -> Result<()> {
        let mut resp = self.client.get(url).send()?.error_for_status()?;
        let mut file = File::create(dest)?;
        if let Err(e) = io::copy(&mut resp, &mut file) {
            drop(file);
            let _ = fs::remove_file(dest);
            return Err(Error::DownloadFailed(url.to_string(), e));
        }
        Ok(())
    }

    /// Extracts an archive into the cache root. Archives carry the
    /// add-on directory as their top-level entry.
    fn extract_archive(&self, archive_path: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(relative) = entry.enclosed_name() else {
                warn!("skipping archive entry with unsafe path: {}", entry.name());
                continue;
            };
            let outpath = self.cache_root.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&outpath)?;
            } else {
                if let Some(parent) = outpath.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut outfile = File::create(&outpath)?;
                io::copy(&mut entry, &mut outfile)?;
            }
        }

        Ok(())
    }
}

impl PackageSource for RemoteRepo {
    fn download(&mut self, dep: &Dependency) -> Result<AddonDescriptor> {
        let entry = self
            .catalog()?
            .get(&dep.id)
            .cloned()
            .ok_or_else(|| Error::AddonNotAvailable(dep.id.clone()))?;
        let available = &entry.addon;

        if available.version < dep.version {
            warn!(
                "requested version of '{}' is newer than available: {} < {}",
                dep.id, available.version, dep.version
            );
        }

        let filename = format!("{}-{}.zip", available.id, available.version);
        let filepath = self.packages_dir.join(&filename);

        if filepath.exists() {
            info!("using cached package '{}'", filename);
        } else {
            info!("downloading '{}'", filename);
            self.cleanup_packages(&dep.id);

            let url = format!(
                "{}/{}/{}",
                entry.repo_url.trim_end_matches('/'),
                available.id,
                filename
            );
            self.stream_to_file(&url, &filepath)?;
        }

        // Idempotent re-extraction: drop whatever an older version left.
        let addon_dir = self.cache_root.join(&available.id);
        if addon_dir.exists() {
            fs::remove_dir_all(&addon_dir)?;
        }
        self.extract_archive(&filepath)?;

        crate::addon::load_manifest(&addon_dir.join("addon.xml"))
    }
}
