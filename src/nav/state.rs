//! Navigation results.
//!
//! A [`NavigationState`] is produced once per add-on invocation and
//! crosses the worker boundary as part of the channel's final message.
//! It carries either a browsable listing or a single resolved playable
//! item, never both meaningfully at once.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One displayable entry of an add-on listing.
///
/// Add-ons attach arbitrary info labels, so everything beyond the known
/// fields is kept in a catch-all map and passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    /// Display label, possibly containing `[B]`-style formatting tags
    /// and `$LOCALIZE[id]` references.
    #[serde(default)]
    pub label: String,
    /// Callback url or direct media path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// String properties; `folder` decides the listing icon.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
    /// Context menu entries as (label, command) pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<(String, String)>,
    /// Everything else the add-on attached.
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ListItem {
    /// Creates a bare item with a label.
    #[must_use]
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Synthetic "go up" entry pointing at a parent url.
    #[must_use]
    pub fn back_entry(parent_path: &str) -> Self {
        Self {
            label: "..".to_string(),
            path: Some(parent_path.to_string()),
            ..Self::default()
        }
    }

    /// Whether this entry denotes a browsable folder. Defaults to true
    /// when the property is absent.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.properties
            .get("folder")
            .is_none_or(|v| v == "true")
    }

    /// Merges a resolved playable result over the item that requested
    /// it: the resolved fields win, the context menu is dropped.
    #[must_use]
    pub fn merged_with(&self, resolved: &Self) -> Self {
        let mut merged = self.clone();
        merged.context.clear();
        if !resolved.label.is_empty() {
            merged.label = resolved.label.clone();
        }
        if resolved.path.is_some() {
            merged.path = resolved.path.clone();
        }
        merged
            .properties
            .extend(resolved.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .extra
            .extend(resolved.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Everything one add-on invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationState {
    /// Whether the add-on reported success.
    #[serde(default)]
    pub succeeded: bool,
    /// Browsable listing entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listitems: Vec<ListItem>,
    /// Single playable result, exclusive with `listitems`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ListItem>,
    /// Playlist entries trailing a resolved result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub playlist: Vec<ListItem>,
    /// Sort method hints announced by the add-on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sortmethods: Vec<u32>,
    /// Listing category label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Listing content type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenttype: Option<String>,
    /// Whether the add-on asked for the current listing to be replaced
    /// instead of pushed.
    #[serde(default)]
    pub updatelisting: bool,
    /// The callback url this state answers.
    #[serde(default)]
    pub path: String,
    /// The item whose selection triggered this invocation, kept for
    /// back-navigation merges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling_item: Option<ListItem>,
}
