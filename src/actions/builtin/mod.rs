//! Built-in actions for threads, messages, and attachments, plus `global.log`.

mod attachment;
mod global;
mod message;
mod thread;

pub use attachment::AttachmentActions;
pub use global::GlobalActions;
pub use message::MessageActions;
pub use thread::ThreadActions;

use crate::actions::registry::ActionRegistry;

impl ActionRegistry {
    /// A registry with the `global`, `thread`, `message` and `attachment` providers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_action_provider("global", &GlobalActions);
        registry.register_action_provider("thread", &ThreadActions);
        registry.register_action_provider("message", &MessageActions);
        registry.register_action_provider("attachment", &AttachmentActions);
        tracing::debug!(count = registry.count(), "Registered built-in actions");
        registry
    }
}
