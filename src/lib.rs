//! Kodidev
//!
//! Run and debug Kodi add-ons from the command line, outside of Kodi.
//! Emulates the host's plugin invocation model: resolves an add-on's
//! dependency graph against a local cache and the official repository,
//! executes callback urls in isolated worker processes, and drives
//! multi-level navigation through the add-on's virtual directory tree.
//!
//! # Architecture
//!
//! - **Addon Module**: addon.xml manifests, descriptors and versions
//! - **Repo Module**: local cache index, remote catalog and resolver
//! - **Sandbox Module**: worker processes and the channel protocol
//! - **Nav Module**: the navigation loop and terminal listing output

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

pub mod addon;
pub mod env;
pub mod error;
pub mod logging;
pub mod nav;
pub mod repo;
pub mod sandbox;
pub mod urls;

// Re-export main types
pub use addon::{AddonDescriptor, Dependency, Version};
pub use env::Environment;
pub use error::{Error, Result};
pub use nav::{Display, Interact, ListItem, NavigationState};
pub use repo::{LocalRepo, PackageSource, RemoteRepo};
pub use sandbox::{SandboxInvoker, WorkerPool};
