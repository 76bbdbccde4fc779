//! Add-on model: manifests, descriptors and versions.

pub mod descriptor;
pub mod manifest;
pub mod version;

pub use descriptor::{AddonAssets, AddonDescriptor, AddonTexts, Dependency, ExtensionKind};
pub use manifest::{load_manifest, parse_addon_node};
pub use version::Version;
