//! Manifest parsing.
//!
//! Parses addon.xml files into [`AddonDescriptor`] values. The same node
//! parser serves both a single manifest on disk and the entries of a
//! repository's addons.xml catalog.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use super::descriptor::{AddonAssets, AddonDescriptor, AddonTexts, Dependency, ExtensionKind};
use super::version::Version;

/// Host-provided capabilities that never need resolving.
const IGNORE_LIST: &[&str] = &["xbmc.python", "xbmc.core", "kodi.resource"];

/// Extension point of the metadata block; skipped during detection.
const METADATA_POINT: &str = "xbmc.addon.metadata";

/// Language fallback order for localized manifest texts.
const LANG_PRIORITY: &[&str] = &["en_GB", "en_US", "en"];

/// Loads an add-on descriptor from an addon.xml file.
pub fn load_manifest(path: &Path) -> Result<AddonDescriptor> {
    let data = std::fs::read_to_string(path).map_err(|e| Error::ManifestInvalid {
        path: path.to_path_buf(),
        reason: format!("failed to read manifest: {}", e),
    })?;

    let doc = roxmltree::Document::parse(&data).map_err(|e| Error::ManifestInvalid {
        path: path.to_path_buf(),
        reason: format!("malformed xml: {}", e),
    })?;

    let addon_dir = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    parse_addon_node(doc.root_element(), addon_dir, path)
}

/// Parses a single `<addon>` element.
///
/// `addon_dir` is the directory holding the add-on's files; catalog
/// entries pass an empty path until they are downloaded. `origin` only
/// feeds error messages.
pub fn parse_addon_node(
    node: roxmltree::Node<'_, '_>,
    addon_dir: PathBuf,
    origin: &Path,
) -> Result<AddonDescriptor> {
    let invalid = |reason: String| Error::ManifestInvalid {
        path: origin.to_path_buf(),
        reason,
    };

    if !node.has_tag_name("addon") {
        return Err(invalid(format!(
            "expected <addon> root, found <{}>",
            node.tag_name().name()
        )));
    }

    let id = node
        .attribute("id")
        .ok_or_else(|| invalid("missing id attribute".to_string()))?
        .to_string();
    let version_raw = node
        .attribute("version")
        .ok_or_else(|| invalid("missing version attribute".to_string()))?;
    let version = Version::parse(version_raw)
        .map_err(|_| invalid(format!("unparseable version '{}'", version_raw)))?;
    let author = node.attribute("provider-name").unwrap_or("").to_string();
    let name = node.attribute("name").unwrap_or(&id).to_string();

    // The first extension block matching a recognized point decides the
    // add-on kind; the metadata block never counts.
    let mut detected: Option<(ExtensionKind, PathBuf)> = None;
    let mut metadata_node = None;
    for ext in node.children().filter(|n| n.has_tag_name("extension")) {
        let point = ext.attribute("point").unwrap_or("");
        if point == METADATA_POINT {
            metadata_node = Some(ext);
            continue;
        }
        if detected.is_some() {
            continue;
        }
        let kind = match point {
            "xbmc.python.pluginsource" => ExtensionKind::PluginSource,
            "xbmc.python.module" => ExtensionKind::Module,
            other => {
                debug!("ignoring extension point '{}' in {}", other, id);
                continue;
            }
        };
        let library = ext.attribute("library").ok_or_else(|| {
            invalid(format!("extension point '{}' missing library", kind.point()))
        })?;
        detected = Some((kind, PathBuf::from(library)));
    }

    let (kind, library) = detected
        .ok_or_else(|| invalid("no recognized extension point".to_string()))?;

    // Declared imports, minus capabilities the host always provides.
    let mut dependencies = Vec::new();
    for imp in node
        .children()
        .filter(|n| n.has_tag_name("requires"))
        .flat_map(|req| req.children().filter(|n| n.has_tag_name("import")))
    {
        let Some(dep_id) = imp.attribute("addon") else {
            continue;
        };
        if IGNORE_LIST.contains(&dep_id) {
            continue;
        }
        let dep_version = imp.attribute("version").unwrap_or("0.0.1");
        let dep_version = Version::parse(dep_version)
            .map_err(|_| invalid(format!("unparseable version for import '{}'", dep_id)))?;
        let optional = imp.attribute("optional") == Some("true");
        dependencies.push(Dependency::new(dep_id, dep_version, optional));
    }

    let texts = metadata_node.map(parse_texts).unwrap_or_default();
    let assets = metadata_node
        .map(|meta| parse_assets(meta, &addon_dir))
        .unwrap_or_else(|| fallback_assets(&addon_dir));

    Ok(AddonDescriptor::new(
        id, version, author, name, kind, library, dependencies, addon_dir, texts, assets,
    ))
}

/// Resolves a localized child of the metadata block, trying en_GB, then
/// en_US, then plain en, then the first element found.
fn localized_text(meta: roxmltree::Node<'_, '_>, tag: &str) -> String {
    let candidates: Vec<_> = meta.children().filter(|n| n.has_tag_name(tag)).collect();
    for &lang in LANG_PRIORITY {
        if let Some(node) = candidates
            .iter()
            .find(|n| n.attribute("lang") == Some(lang))
        {
            return node.text().unwrap_or("").trim().to_string();
        }
    }
    candidates
        .first()
        .and_then(|n| n.text())
        .unwrap_or("")
        .trim()
        .to_string()
}

fn parse_texts(meta: roxmltree::Node<'_, '_>) -> AddonTexts {
    AddonTexts {
        description: localized_text(meta, "description"),
        summary: localized_text(meta, "summary"),
        disclaimer: localized_text(meta, "disclaimer"),
        news: localized_text(meta, "news"),
    }
}

fn parse_assets(meta: roxmltree::Node<'_, '_>, addon_dir: &Path) -> AddonAssets {
    let from_assets = |tag: &str| {
        meta.children()
            .find(|n| n.has_tag_name("assets"))
            .and_then(|assets| assets.children().find(|n| n.has_tag_name(tag)))
            .and_then(|n| n.text())
            .map(|rel| addon_dir.join(rel.trim()))
    };

    let fallback = fallback_assets(addon_dir);
    AddonAssets {
        icon: from_assets("icon").or(fallback.icon),
        fanart: from_assets("fanart").or(fallback.fanart),
    }
}

/// The conventional `icon.png` / `fanart.jpg` beside the manifest.
fn fallback_assets(addon_dir: &Path) -> AddonAssets {
    // Catalog entries have no directory yet.
    if addon_dir.as_os_str().is_empty() {
        return AddonAssets::default();
    }
    let probe = |file: &str| {
        let path = addon_dir.join(file);
        path.exists().then_some(path)
    };
    AddonAssets {
        icon: probe("icon.png"),
        fanart: probe("fanart.jpg"),
    }
}
