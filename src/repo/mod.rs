//! Local cache, remote repository client and dependency resolution.

pub mod local;
pub mod remote;
pub mod resolver;

pub use local::LocalRepo;
pub use remote::{CatalogEntry, PackageSource, RemoteRepo};
pub use resolver::{DEFAULT_LANGUAGE_PACK, resolve};
