//! `thread.*` actions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::action::{Action, ActionArgs, Capability, require_thread};
use crate::actions::registry::ActionProvider;
use crate::context::EvalContext;
use crate::error::ActionError;
use crate::store::ThreadUpdate;

#[derive(Debug, Clone, Copy)]
enum ThreadOp {
    MarkRead,
    MarkUnread,
    MarkImportant,
    MarkUnimportant,
    MoveToArchive,
    MoveToInbox,
    MoveToTrash,
    AddLabel,
    RemoveLabel,
}

impl ThreadOp {
    const ALL: [ThreadOp; 9] = [
        Self::MarkRead,
        Self::MarkUnread,
        Self::MarkImportant,
        Self::MarkUnimportant,
        Self::MoveToArchive,
        Self::MoveToInbox,
        Self::MoveToTrash,
        Self::AddLabel,
        Self::RemoveLabel,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::MarkRead => "markRead",
            Self::MarkUnread => "markUnread",
            Self::MarkImportant => "markImportant",
            Self::MarkUnimportant => "markUnimportant",
            Self::MoveToArchive => "moveToArchive",
            Self::MoveToInbox => "moveToInbox",
            Self::MoveToTrash => "moveToTrash",
            Self::AddLabel => "addLabel",
            Self::RemoveLabel => "removeLabel",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::MarkRead => "Mark the thread as read.",
            Self::MarkUnread => "Mark the thread as unread.",
            Self::MarkImportant => "Mark the thread as important.",
            Self::MarkUnimportant => "Mark the thread as not important.",
            Self::MoveToArchive => "Move the thread to the archive.",
            Self::MoveToInbox => "Move the thread back to the inbox.",
            Self::MoveToTrash => "Move the thread to the trash.",
            Self::AddLabel => "Add the label `label` to the thread.",
            Self::RemoveLabel => "Remove the label `label` from the thread.",
        }
    }

    fn capability(self) -> Capability {
        match self {
            Self::MoveToTrash => Capability::Destructive,
            _ => Capability::Write,
        }
    }

    fn update(self, args: &ActionArgs) -> Result<ThreadUpdate, ActionError> {
        let label = || {
            args.require_str(self.name(), "label")
                .map(str::to_string)
        };
        Ok(match self {
            Self::MarkRead => ThreadUpdate::MarkRead,
            Self::MarkUnread => ThreadUpdate::MarkUnread,
            Self::MarkImportant => ThreadUpdate::MarkImportant,
            Self::MarkUnimportant => ThreadUpdate::MarkUnimportant,
            Self::MoveToArchive => ThreadUpdate::MoveToArchive,
            Self::MoveToInbox => ThreadUpdate::MoveToInbox,
            Self::MoveToTrash => ThreadUpdate::MoveToTrash,
            Self::AddLabel => ThreadUpdate::AddLabel(label()?),
            Self::RemoveLabel => ThreadUpdate::RemoveLabel(label()?),
        })
    }
}

struct ThreadAction(ThreadOp);

#[async_trait]
impl Action for ThreadAction {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn description(&self) -> &str {
        self.0.description()
    }

    fn capability(&self) -> Capability {
        self.0.capability()
    }

    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError> {
        let thread_ctx = require_thread(ctx, self.name())?;
        let update = self.0.update(args)?;
        ctx.proc()
            .mail
            .update_thread(&thread_ctx.thread, update)
            .await?;
        Ok(serde_json::json!({ "thread": thread_ctx.thread.id }))
    }
}

/// Thread mutations, registered under `thread`.
pub struct ThreadActions;

impl ActionProvider for ThreadActions {
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        ThreadOp::ALL
            .into_iter()
            .map(|op| Arc::new(ThreadAction(op)) as Arc<dyn Action>)
            .collect()
    }
}
