//! Named actions, their registry, and the built-in providers.

pub mod action;
pub mod builtin;
pub mod registry;

pub use action::*;
pub use registry::{ActionDescriptor, ActionProvider, ActionRegistry};
