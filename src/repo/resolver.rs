//! Transitive dependency resolution.
//!
//! Walks a work-list of dependency requirements, reusing local add-ons
//! when their version satisfies the request and downloading otherwise.
//! Requeue decisions are identity-based: the first requested version of
//! an id wins the work-list slot, while the cache keeps the highest
//! version actually fetched.

use tracing::{debug, warn};

use crate::addon::{AddonDescriptor, Dependency, Version};
use crate::error::{Error, Result};
use super::local::LocalRepo;
use super::remote::PackageSource;

/// Every add-on implicitly depends on the default language pack for
/// localized string lookups.
pub const DEFAULT_LANGUAGE_PACK: &str = "resource.language.en_gb";

/// Version floor for the injected language pack requirement.
const LANGUAGE_PACK_FLOOR: &str = "1.0.0";

/// Resolves the transitive closure of a root dependency list.
///
/// Returns the resolved descriptors in resolution order; the local
/// index ends up owning the authoritative copy of each. A required id
/// that exists neither locally nor remotely fails with
/// [`Error::DependencyNotFound`]; optional dependencies are best-effort
/// and only warn when they cannot be fetched.
pub fn resolve(
    root_deps: &[Dependency],
    local: &mut LocalRepo,
    source: &mut dyn PackageSource,
) -> Result<Vec<AddonDescriptor>> {
    let mut worklist: Vec<Dependency> = root_deps.to_vec();

    // Injected language pack requirement; skipped if already declared.
    let language_pack = Dependency::new(
        DEFAULT_LANGUAGE_PACK,
        Version::parse(LANGUAGE_PACK_FLOOR)?,
        false,
    );
    if !worklist.contains(&language_pack) {
        worklist.push(language_pack);
    }

    let mut resolved = Vec::new();
    let mut index = 0;

    while index < worklist.len() {
        let dep = worklist[index].clone();
        index += 1;
        debug!("processing dependency {}", dep.id);

        let cached = local.get(&dep.id).cloned();
        let addon = match cached {
            Some(existing) if existing.version >= dep.version => existing,
            cached => {
                let had_local = cached.is_some();
                match source.download(&dep) {
                    Ok(addon) => {
                        local.insert(addon.clone());
                        addon
                    }
                    Err(Error::AddonNotAvailable(id)) if had_local => {
                        // An older local copy beats failing outright when
                        // the repository no longer offers the id.
                        warn!(
                            "'{}' not on the repository; using older local version",
                            id
                        );
                        match cached {
                            Some(older) => older,
                            None => return Err(Error::DependencyNotFound(id)),
                        }
                    }
                    Err(Error::AddonNotAvailable(id)) if dep.optional => {
                        warn!("skipping optional dependency '{}': not available", id);
                        continue;
                    }
                    Err(Error::AddonNotAvailable(id)) => {
                        return Err(Error::DependencyNotFound(id));
                    }
                    Err(e) if dep.optional => {
                        warn!("skipping optional dependency '{}': {}", dep.id, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        // Requeue this add-on's own requirements, identity-checked so a
        // dependency cycle cannot loop forever.
        for extra in &addon.dependencies {
            if !worklist.contains(extra) {
                worklist.push(extra.clone());
            }
        }

        resolved.push(addon);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::ExtensionKind;
    use crate::addon::descriptor::{AddonAssets, AddonTexts};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn descriptor(id: &str, version: &str, deps: Vec<Dependency>) -> AddonDescriptor {
        AddonDescriptor::new(
            id.to_string(),
            Version::parse(version).unwrap(),
            String::new(),
            id.to_string(),
            ExtensionKind::Module,
            PathBuf::from("lib"),
            deps,
            PathBuf::new(),
            AddonTexts::default(),
            AddonAssets::default(),
        )
    }

    fn dep(id: &str, version: &str) -> Dependency {
        Dependency::new(id, Version::parse(version).unwrap(), false)
    }

    /// Scripted source that serves from a map and counts downloads.
    struct ScriptedSource {
        available: HashMap<String, AddonDescriptor>,
        downloads: usize,
    }

    impl ScriptedSource {
        fn new(addons: Vec<AddonDescriptor>) -> Self {
            Self {
                available: addons.into_iter().map(|a| (a.id.clone(), a)).collect(),
                downloads: 0,
            }
        }
    }

    impl PackageSource for ScriptedSource {
        fn download(&mut self, dep: &Dependency) -> crate::error::Result<AddonDescriptor> {
            self.downloads += 1;
            self.available
                .get(&dep.id)
                .cloned()
                .ok_or_else(|| Error::AddonNotAvailable(dep.id.clone()))
        }
    }

    fn language_pack() -> AddonDescriptor {
        descriptor(DEFAULT_LANGUAGE_PACK, "1.0.0", Vec::new())
    }

    #[test]
    fn test_language_pack_always_injected() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![
            descriptor("script.module.requests", "2.22.0", Vec::new()),
            language_pack(),
        ]);

        let resolved = resolve(
            &[dep("script.module.requests", "2.22.0")],
            &mut local,
            &mut source,
        )
        .unwrap();

        let ids: Vec<&str> = resolved.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["script.module.requests", DEFAULT_LANGUAGE_PACK]);
    }

    #[test]
    fn test_transitive_dependencies_followed() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![
            descriptor(
                "script.module.a",
                "1.0.0",
                vec![dep("script.module.b", "1.0.0")],
            ),
            descriptor("script.module.b", "1.0.0", Vec::new()),
            language_pack(),
        ]);

        let resolved =
            resolve(&[dep("script.module.a", "1.0.0")], &mut local, &mut source).unwrap();
        assert!(resolved.iter().any(|a| a.id == "script.module.b"));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![
            descriptor(
                "script.module.a",
                "1.0.0",
                vec![dep("script.module.b", "1.0.0")],
            ),
            descriptor(
                "script.module.b",
                "1.0.0",
                vec![dep("script.module.a", "1.0.0")],
            ),
            language_pack(),
        ]);

        let resolved =
            resolve(&[dep("script.module.a", "1.0.0")], &mut local, &mut source).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["script.module.a", DEFAULT_LANGUAGE_PACK, "script.module.b"]
        );
    }

    #[test]
    fn test_cache_hit_performs_no_downloads() {
        let mut local = LocalRepo::new();
        local.insert(descriptor("script.module.a", "2.0.0", Vec::new()));
        local.insert(language_pack());
        let mut source = ScriptedSource::new(Vec::new());

        let resolved =
            resolve(&[dep("script.module.a", "1.0.0")], &mut local, &mut source).unwrap();
        assert_eq!(source.downloads, 0);
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![
            descriptor("script.module.a", "1.0.0", Vec::new()),
            language_pack(),
        ]);
        let deps = [dep("script.module.a", "1.0.0")];

        let first = resolve(&deps, &mut local, &mut source).unwrap();
        let downloads_after_first = source.downloads;
        let second = resolve(&deps, &mut local, &mut source).unwrap();

        assert_eq!(first, second);
        assert_eq!(source.downloads, downloads_after_first);
    }

    #[test]
    fn test_newer_version_triggers_download() {
        let mut local = LocalRepo::new();
        local.insert(descriptor("script.module.a", "1.0.0", Vec::new()));
        local.insert(language_pack());
        let mut source =
            ScriptedSource::new(vec![descriptor("script.module.a", "3.0.0", Vec::new())]);

        let resolved =
            resolve(&[dep("script.module.a", "2.0.0")], &mut local, &mut source).unwrap();
        assert_eq!(source.downloads, 1);
        assert_eq!(
            local.get("script.module.a").unwrap().version.as_str(),
            "3.0.0"
        );
        assert!(resolved.iter().any(|a| a.version.as_str() == "3.0.0"));
    }

    #[test]
    fn test_missing_required_dependency_is_fatal() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![language_pack()]);

        let result = resolve(&[dep("plugin.video.gone", "1.0.0")], &mut local, &mut source);
        assert!(matches!(result, Err(Error::DependencyNotFound(id)) if id == "plugin.video.gone"));
    }

    #[test]
    fn test_missing_optional_dependency_is_skipped() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![language_pack()]);
        let optional = Dependency::new(
            "script.module.extra",
            Version::parse("1.0.0").unwrap(),
            true,
        );

        let resolved = resolve(&[optional], &mut local, &mut source).unwrap();
        let ids: Vec<&str> = resolved.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![DEFAULT_LANGUAGE_PACK]);
    }

    #[test]
    fn test_vanished_id_falls_back_to_local_copy() {
        let mut local = LocalRepo::new();
        local.insert(descriptor("script.module.old", "1.0.0", Vec::new()));
        local.insert(language_pack());
        let mut source = ScriptedSource::new(Vec::new());

        let resolved = resolve(
            &[dep("script.module.old", "2.0.0")],
            &mut local,
            &mut source,
        )
        .unwrap();
        assert!(resolved.iter().any(|a| a.id == "script.module.old"));
    }

    #[test]
    fn test_declared_language_pack_not_duplicated() {
        let mut local = LocalRepo::new();
        let mut source = ScriptedSource::new(vec![descriptor(
            DEFAULT_LANGUAGE_PACK,
            "2.0.0",
            Vec::new(),
        )]);

        let resolved = resolve(
            &[dep(DEFAULT_LANGUAGE_PACK, "2.0.0")],
            &mut local,
            &mut source,
        )
        .unwrap();
        assert_eq!(resolved.len(), 1);
    }
}
