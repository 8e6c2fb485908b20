//! mailflow: rule-driven mailbox processing.
//!
//! A [`config::Config`] describes thread, message and attachment rules. The
//! [`pipeline::Processor`] matches them against a [`store::MailStore`],
//! substitutes `${...}` placeholders in action arguments, and dispatches
//! actions through the capability-gated [`actions::ActionRegistry`].

pub mod actions;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod model;
pub mod pattern;
pub mod pipeline;
pub mod safety;
pub mod store;

pub use error::{Error, Result};
