//! Runtime environment.
//!
//! All paths and policy knobs live in one [`Environment`] value built at
//! startup and passed by reference to every component, so nothing in the
//! crate reaches for process-global state.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::Result;

/// Default remote repository mirrors.
pub const DEFAULT_REPOS: &[&str] = &["http://mirrors.kodi.tv/addons/krypton"];

/// Prefix used for per-run scratch home directories.
const HOME_PREFIX: &str = "kodidev.";

/// Distinguishes multiple environments within one process.
static HOME_SEQ: AtomicU64 = AtomicU64::new(0);

/// Paths and policy for one run of the tool.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Root of the extracted add-on cache.
    pub cache_root: PathBuf,
    /// Directory of downloaded package archives, under the cache root.
    pub packages_dir: PathBuf,
    /// Per-run scratch directory emulating the host's home tree.
    pub home: PathBuf,
    /// Optional directory of add-ons bundled with the tool.
    pub bundled_dir: Option<PathBuf>,
    /// User-supplied directories of local add-ons.
    pub local_repos: Vec<PathBuf>,
    /// Remote repository urls, defaults plus user additions.
    pub remote_repos: Vec<String>,
    /// Interpreter used to run add-on entry points.
    pub interpreter: String,
    /// Whether workers stay alive between invocations of the same add-on.
    pub reuse_workers: bool,
}

impl Environment {
    /// Builds the environment, creating the cache and scratch
    /// directories and sweeping scratch homes left behind by earlier
    /// runs.
    pub fn new(
        local_repos: Vec<PathBuf>,
        extra_repos: Vec<String>,
        clean: bool,
    ) -> Result<Self> {
        let cache_root = default_cache_root();
        Self::with_cache_root(cache_root, local_repos, extra_repos, clean)
    }

    /// Like [`Environment::new`] with an explicit cache root; used by
    /// tests to stay inside a temp directory.
    pub fn with_cache_root(
        cache_root: PathBuf,
        local_repos: Vec<PathBuf>,
        extra_repos: Vec<String>,
        clean: bool,
    ) -> Result<Self> {
        if clean && cache_root.exists() {
            debug!("wiping cache root {}", cache_root.display());
            fs::remove_dir_all(&cache_root)?;
        }

        let packages_dir = cache_root.join("packages");
        fs::create_dir_all(&packages_dir)?;

        sweep_stale_homes();
        let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
        let home = std::env::temp_dir().join(format!(
            "{}{}-{}",
            HOME_PREFIX,
            process::id(),
            seq
        ));
        fs::create_dir_all(&home)?;

        let mut remote_repos: Vec<String> =
            DEFAULT_REPOS.iter().map(ToString::to_string).collect();
        remote_repos.extend(extra_repos);

        Ok(Self {
            cache_root,
            packages_dir,
            home,
            bundled_dir: None,
            local_repos,
            remote_repos,
            interpreter: "python3".to_string(),
            reuse_workers: true,
        })
    }

    /// Profile directory for an add-on's saved data.
    #[must_use]
    pub fn profile_dir(&self, addon_id: &str) -> PathBuf {
        self.home.join("userdata").join("addon_data").join(addon_id)
    }

    /// Path the archive for an exact id-version pair would occupy.
    #[must_use]
    pub fn package_path(&self, addon_id: &str, version: &str) -> PathBuf {
        self.packages_dir
            .join(format!("{}-{}.zip", addon_id, version))
    }

    /// All directories scanned for already-available add-ons, in
    /// precedence order: bundled set, download cache, user directories.
    #[must_use]
    pub fn addon_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(ref bundled) = self.bundled_dir {
            dirs.push(bundled.clone());
        }
        dirs.push(self.cache_root.clone());
        dirs.extend(self.local_repos.iter().cloned());
        dirs
    }
}

/// Default cache root under the platform cache directory.
fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("kodidev")
}

/// Removes scratch homes left over from crashed or killed runs. Homes
/// belonging to this process are left alone.
fn sweep_stale_homes() {
    let tmp = std::env::temp_dir();
    let own_prefix = format!("{}{}-", HOME_PREFIX, process::id());
    let Ok(entries) = fs::read_dir(&tmp) else {
        return;
    };
    for entry in entries.filter_map(std::result::Result::ok) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(HOME_PREFIX) && !name.starts_with(&own_prefix) {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!("could not remove stale home {}: {}", name, e);
            }
        }
    }
}

/// Removes this run's scratch home. Called on shutdown.
pub fn cleanup_home(home: &Path) {
    if home.exists() {
        if let Err(e) = fs::remove_dir_all(home) {
            warn!("could not remove scratch home {}: {}", home.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_in(dir: &TempDir) -> Environment {
        Environment::with_cache_root(
            dir.path().join("cache"),
            Vec::new(),
            Vec::new(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_creates_directories() {
        let dir = TempDir::new().unwrap();
        let env = env_in(&dir);
        assert!(env.packages_dir.is_dir());
        assert!(env.home.is_dir());
        assert_eq!(env.packages_dir, env.cache_root.join("packages"));
        cleanup_home(&env.home);
    }

    #[test]
    fn test_clean_wipes_cache() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache");
        fs::create_dir_all(cache.join("plugin.video.old")).unwrap();

        let env = Environment::with_cache_root(cache.clone(), Vec::new(), Vec::new(), true)
            .unwrap();
        assert!(!cache.join("plugin.video.old").exists());
        assert!(env.packages_dir.is_dir());
        cleanup_home(&env.home);
    }

    #[test]
    fn test_addon_dirs_order() {
        let dir = TempDir::new().unwrap();
        let mut env = env_in(&dir);
        env.bundled_dir = Some(dir.path().join("bundled"));
        env.local_repos = vec![dir.path().join("repo_a"), dir.path().join("repo_b")];

        let dirs = env.addon_dirs();
        assert_eq!(dirs[0], dir.path().join("bundled"));
        assert_eq!(dirs[1], env.cache_root);
        assert_eq!(dirs[2], dir.path().join("repo_a"));
        cleanup_home(&env.home);
    }

    #[test]
    fn test_default_repo_always_present() {
        let dir = TempDir::new().unwrap();
        let env = Environment::with_cache_root(
            dir.path().join("cache"),
            Vec::new(),
            vec!["http://repo.example.com/addons".to_string()],
            false,
        )
        .unwrap();
        assert_eq!(env.remote_repos.len(), 2);
        assert_eq!(env.remote_repos[0], DEFAULT_REPOS[0]);
        cleanup_home(&env.home);
    }

    #[test]
    fn test_package_path_is_content_addressed() {
        let dir = TempDir::new().unwrap();
        let env = env_in(&dir);
        assert_eq!(
            env.package_path("plugin.video.example", "1.2.0"),
            env.packages_dir.join("plugin.video.example-1.2.0.zip")
        );
        cleanup_home(&env.home);
    }
}
