//! Navigation: results, the interactive loop and terminal output.

pub mod display;
pub mod interact;
pub mod state;

pub use display::Display;
pub use interact::{AddonInvoker, Interact};
pub use state::{ListItem, NavigationState};
