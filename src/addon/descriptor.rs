//! Add-on descriptor types.
//!
//! An [`AddonDescriptor`] is built once from an addon.xml manifest and
//! carries immutable identity plus lazily loaded settings and localized
//! strings. Descriptors cross the worker boundary, so everything except
//! the lazy caches is serializable.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use super::version::Version;

/// Extension points that mark an add-on as runnable or importable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionKind {
    /// A browsable content provider (`xbmc.python.pluginsource`).
    PluginSource,
    /// A shared python library (`xbmc.python.module`).
    Module,
}

impl ExtensionKind {
    /// The manifest `point` attribute for this kind.
    #[must_use]
    pub fn point(self) -> &'static str {
        match self {
            ExtensionKind::PluginSource => "xbmc.python.pluginsource",
            ExtensionKind::Module => "xbmc.python.module",
        }
    }
}

/// A required companion add-on.
///
/// Equality is identity-only (by `id`), so containment checks against
/// dependency lists ignore the requested version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    /// Add-on id of the requirement.
    pub id: String,
    /// Minimum requested version.
    pub version: Version,
    /// Whether the add-on claims to work without it.
    pub optional: bool,
}

impl Dependency {
    /// Creates a new dependency requirement.
    #[must_use]
    pub fn new(id: impl Into<String>, version: Version, optional: bool) -> Self {
        Self {
            id: id.into(),
            version,
            optional,
        }
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Dependency {}

/// Localized metadata texts from the manifest, resolved at parse time
/// with the en_GB -> en_US -> en -> first-found fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonTexts {
    pub description: String,
    pub summary: String,
    pub disclaimer: String,
    pub news: String,
}

/// Asset file locations referenced by the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonAssets {
    pub icon: Option<PathBuf>,
    pub fanart: Option<PathBuf>,
}

/// A parsed add-on manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonDescriptor {
    /// Unique add-on id (e.g. "plugin.video.example").
    pub id: String,
    /// Parsed version.
    pub version: Version,
    /// Provider name.
    pub author: String,
    /// Human readable name.
    pub name: String,
    /// The recognized extension point.
    pub kind: ExtensionKind,
    /// Entry point (plugin source) or library directory (module),
    /// relative to the add-on directory.
    pub library: PathBuf,
    /// Declared dependencies, host-provided capabilities excluded.
    pub dependencies: Vec<Dependency>,
    /// Directory holding the add-on's files. Empty for catalog entries
    /// that have not been downloaded yet.
    pub path: PathBuf,
    /// Localized metadata.
    pub texts: AddonTexts,
    /// Icon/fanart locations.
    pub assets: AddonAssets,

    /// Lazily loaded settings map. Not sent across the worker boundary;
    /// the worker reloads from disk on first access.
    #[serde(skip)]
    settings: Option<HashMap<String, String>>,
    /// Lazily loaded localized strings map.
    #[serde(skip)]
    strings: Option<HashMap<u32, String>>,
}

impl PartialEq for AddonDescriptor {
    /// Identity-only, matching [`Dependency`] so the two can share
    /// containment checks.
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AddonDescriptor {}

impl fmt::Display for AddonDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

impl AddonDescriptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        version: Version,
        author: String,
        name: String,
        kind: ExtensionKind,
        library: PathBuf,
        dependencies: Vec<Dependency>,
        path: PathBuf,
        texts: AddonTexts,
        assets: AddonAssets,
    ) -> Self {
        Self {
            id,
            version,
            author,
            name,
            kind,
            library,
            dependencies,
            path,
            texts,
            assets,
            settings: None,
            strings: None,
        }
    }

    /// Absolute path of the entry point / library directory.
    #[must_use]
    pub fn library_path(&self) -> PathBuf {
        self.path.join(&self.library)
    }

    /// The changelog text: the manifest `<news>` block if present,
    /// otherwise the versioned changelog file beside the manifest.
    #[must_use]
    pub fn changelog(&self) -> String {
        if !self.texts.news.is_empty() {
            return self.texts.news.clone();
        }
        let file = self.path.join(format!("changelog-{}.txt", self.version));
        fs::read_to_string(file)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// Loads the settings map if it has not been loaded yet.
    ///
    /// Settings merge the add-on's shipped `resources/settings.xml` with
    /// the profile's saved `settings.xml`; the profile wins. Idempotent.
    pub fn ensure_settings(&mut self, profile_dir: &Path) -> &HashMap<String, String> {
        if self.settings.is_none() {
            let mut settings = HashMap::new();
            let sources = [
                self.path.join("resources").join("settings.xml"),
                profile_dir.join("settings.xml"),
            ];
            for source in &sources {
                if source.exists() {
                    read_settings_file(source, &mut settings);
                }
            }
            self.settings = Some(settings);
        }
        // Populated above.
        self.settings.get_or_insert_with(HashMap::new)
    }

    /// Returns a setting value, loading the map on first access.
    pub fn get_setting(&mut self, profile_dir: &Path, key: &str) -> Option<String> {
        self.ensure_settings(profile_dir).get(key).cloned()
    }

    /// Stores a setting, persisting the profile settings.xml to disk and
    /// updating the in-memory map.
    pub fn set_setting(&mut self, profile_dir: &Path, key: &str, value: &str) -> Result<()> {
        self.ensure_settings(profile_dir);
        let settings = self.settings.get_or_insert_with(HashMap::new);
        settings.insert(key.to_string(), value.to_string());

        // Rewrite the whole profile file from the merged map. Keys are
        // sorted so repeated writes produce identical files.
        let mut keys: Vec<&String> = settings.keys().collect();
        keys.sort();

        let mut doc = String::from("<settings>\n");
        for k in keys {
            let v = &settings[k.as_str()];
            doc.push_str(&format!(
                "    <setting id=\"{}\" value=\"{}\"/>\n",
                xml_escape(k),
                xml_escape(v)
            ));
        }
        doc.push_str("</settings>\n");

        fs::create_dir_all(profile_dir)?;
        fs::write(profile_dir.join("settings.xml"), doc)?;
        Ok(())
    }

    /// Loads the localized strings map if it has not been loaded yet.
    ///
    /// Searches the usual strings.po locations in language priority
    /// order and takes the first file found. Idempotent.
    pub fn ensure_strings(&mut self) -> &HashMap<u32, String> {
        if self.strings.is_none() {
            let res = self.path.join("resources");
            let locations = [
                res.join("language")
                    .join("resource.language.en_gb")
                    .join("strings.po"),
                res.join("language")
                    .join("resource.language.en_us")
                    .join("strings.po"),
                res.join("language").join("English").join("strings.po"),
                res.join("strings.po"),
            ];

            let mut strings = HashMap::new();
            for location in &locations {
                if location.exists() {
                    match fs::read_to_string(location) {
                        Ok(data) => parse_strings_po(&data, &mut strings),
                        Err(e) => warn!("failed to read {}: {}", location.display(), e),
                    }
                    break;
                }
            }
            self.strings = Some(strings);
        }
        // Populated above.
        self.strings.get_or_insert_with(HashMap::new)
    }

    /// Looks up a localized string by id, loading the map on first access.
    pub fn localized_string(&mut self, id: u32) -> Option<String> {
        self.ensure_strings().get(&id).cloned()
    }
}

/// Pulls `<setting id value|default>` entries out of a settings.xml file.
fn read_settings_file(path: &Path, into: &mut HashMap<String, String>) {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            warn!("failed to read {}: {}", path.display(), e);
            return;
        }
    };

    let doc = match roxmltree::Document::parse(&data) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("malformed settings file {}: {}", path.display(), e);
            return;
        }
    };

    for setting in doc.descendants().filter(|n| n.has_tag_name("setting")) {
        let Some(id) = setting.attribute("id") else {
            continue;
        };
        let value = setting
            .attribute("value")
            .or_else(|| setting.attribute("default"))
            .unwrap_or("");
        into.insert(id.to_string(), value.to_string());
    }
}

/// Extracts `msgctxt "#id"` entries from a strings.po file. An empty
/// `msgstr` falls back to the `msgid` text.
fn parse_strings_po(data: &str, into: &mut HashMap<u32, String>) {
    let pattern = Regex::new(r##"msgctxt\s+"#(\d+)"\s+msgid\s+"([^"]*)"\s+msgstr\s+"([^"]*)""##)
        .unwrap_or_else(|e| unreachable!("static regex: {e}"));

    for caps in pattern.captures_iter(data) {
        let Ok(id) = caps[1].parse::<u32>() else {
            continue;
        };
        let msgstr = &caps[3];
        let text = if msgstr.is_empty() { &caps[2] } else { msgstr };
        into.insert(id, text.to_string());
    }
}

/// Escapes text for use in an XML attribute value.
fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn descriptor(path: PathBuf) -> AddonDescriptor {
        AddonDescriptor::new(
            "plugin.video.example".to_string(),
            Version::parse("1.0.0").unwrap(),
            "tester".to_string(),
            "Example".to_string(),
            ExtensionKind::PluginSource,
            PathBuf::from("addon.py"),
            Vec::new(),
            path,
            AddonTexts::default(),
            AddonAssets::default(),
        )
    }

    #[test]
    fn test_dependency_equality_is_identity_only() {
        let a = Dependency::new("script.module.a", Version::parse("1.0.0").unwrap(), false);
        let b = Dependency::new("script.module.a", Version::parse("2.0.0").unwrap(), true);
        let c = Dependency::new("script.module.c", Version::parse("1.0.0").unwrap(), false);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!([a].contains(&b));
    }

    #[test]
    fn test_settings_merge_profile_wins() {
        let addon_dir = TempDir::new().unwrap();
        let profile_dir = TempDir::new().unwrap();

        let res = addon_dir.path().join("resources");
        fs::create_dir_all(&res).unwrap();
        fs::write(
            res.join("settings.xml"),
            r#"<settings>
                <setting id="quality" default="720p"/>
                <setting id="cache" value="true"/>
            </settings>"#,
        )
        .unwrap();
        fs::write(
            profile_dir.path().join("settings.xml"),
            r#"<settings><setting id="quality" value="1080p"/></settings>"#,
        )
        .unwrap();

        let mut addon = descriptor(addon_dir.path().to_path_buf());
        let settings = addon.ensure_settings(profile_dir.path());
        assert_eq!(settings.get("quality").map(String::as_str), Some("1080p"));
        assert_eq!(settings.get("cache").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_set_setting_persists() {
        let addon_dir = TempDir::new().unwrap();
        let profile_dir = TempDir::new().unwrap();
        let profile = profile_dir.path().join("plugin.video.example");

        let mut addon = descriptor(addon_dir.path().to_path_buf());
        addon.set_setting(&profile, "token", "abc&123").unwrap();

        // A fresh descriptor sees the persisted value.
        let mut fresh = descriptor(addon_dir.path().to_path_buf());
        assert_eq!(
            fresh.get_setting(&profile, "token"),
            Some("abc&123".to_string())
        );
    }

    #[test]
    fn test_strings_po_parsing() {
        let addon_dir = TempDir::new().unwrap();
        let lang = addon_dir
            .path()
            .join("resources")
            .join("language")
            .join("resource.language.en_gb");
        fs::create_dir_all(&lang).unwrap();
        fs::write(
            lang.join("strings.po"),
            r##"
msgctxt "#30000"
msgid "Search"
msgstr ""

msgctxt "#30001"
msgid "Quality"
msgstr "Stream quality"
"##,
        )
        .unwrap();

        let mut addon = descriptor(addon_dir.path().to_path_buf());
        assert_eq!(addon.localized_string(30000), Some("Search".to_string()));
        assert_eq!(
            addon.localized_string(30001),
            Some("Stream quality".to_string())
        );
        assert_eq!(addon.localized_string(30002), None);
    }

    #[test]
    fn test_ensure_strings_idempotent() {
        let addon_dir = TempDir::new().unwrap();
        let mut addon = descriptor(addon_dir.path().to_path_buf());
        assert!(addon.ensure_strings().is_empty());
        assert!(addon.ensure_strings().is_empty());
    }

    #[test]
    fn test_changelog_from_file() {
        let addon_dir = TempDir::new().unwrap();
        fs::write(addon_dir.path().join("changelog-1.0.0.txt"), "fixed it\n").unwrap();

        let addon = descriptor(addon_dir.path().to_path_buf());
        assert_eq!(addon.changelog(), "fixed it");
    }
}
