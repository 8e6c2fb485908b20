//! `message.*` actions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::action::{Action, ActionArgs, Capability, require_message};
use crate::actions::registry::ActionProvider;
use crate::context::EvalContext;
use crate::error::ActionError;
use crate::store::{ConflictStrategy, FileContent, MessageUpdate};

/// Simple state changes on a single message.
struct UpdateMessage {
    name: &'static str,
    description: &'static str,
    capability: Capability,
    update: MessageUpdate,
}

#[async_trait]
impl Action for UpdateMessage {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn capability(&self) -> Capability {
        self.capability
    }

    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        _args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError> {
        let message_ctx = require_message(ctx, self.name)?;
        ctx.proc()
            .mail
            .update_message(&message_ctx.message, self.update)
            .await?;
        Ok(serde_json::json!({ "message": message_ctx.message.id }))
    }
}

/// Forward the message to `to`.
struct Forward;

#[async_trait]
impl Action for Forward {
    fn name(&self) -> &str {
        "forward"
    }

    fn description(&self) -> &str {
        "Forward the message to the address in `to`."
    }

    fn capability(&self) -> Capability {
        Capability::Write
    }

    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError> {
        let message_ctx = require_message(ctx, self.name())?;
        let to = args.require_str(self.name(), "to")?;
        ctx.proc()
            .mail
            .forward_message(&message_ctx.message, to)
            .await?;
        Ok(serde_json::json!({ "message": message_ctx.message.id, "to": to }))
    }
}

/// Render the message as PDF and store it at `location`.
struct StorePdf;

#[async_trait]
impl Action for StorePdf {
    fn name(&self) -> &str {
        "storePDF"
    }

    fn description(&self) -> &str {
        "Store the message as a PDF document at `location`."
    }

    fn capability(&self) -> Capability {
        Capability::Write
    }

    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError> {
        let message_ctx = require_message(ctx, self.name())?;
        let location = args.require_str(self.name(), "location")?;
        let strategy: ConflictStrategy = args
            .get_as(self.name(), "conflictStrategy")?
            .unwrap_or_default();
        let skip_header = args.get_bool("skipHeader").unwrap_or(false);
        let proc = ctx.proc();

        let data = proc
            .mail
            .message_as_pdf(&message_ctx.message, skip_header)
            .await?;
        let content = FileContent {
            data,
            mime_type: "application/pdf".to_string(),
            description: args.get_str("description").unwrap_or_default().to_string(),
            to_mime_type: None,
        };
        let file = proc.files.create_file(location, content, strategy).await?;
        Ok(serde_json::json!({ "file": file }))
    }
}

/// Message mutations, registered under `message`.
pub struct MessageActions;

impl ActionProvider for MessageActions {
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        let update = |name: &'static str,
                      description: &'static str,
                      capability: Capability,
                      update: MessageUpdate|
         -> Arc<dyn Action> {
            Arc::new(UpdateMessage {
                name,
                description,
                capability,
                update,
            })
        };
        vec![
            Arc::new(Forward) as Arc<dyn Action>,
            update(
                "markRead",
                "Mark the message as read.",
                Capability::Write,
                MessageUpdate::MarkRead,
            ),
            update(
                "markUnread",
                "Mark the message as unread.",
                Capability::Write,
                MessageUpdate::MarkUnread,
            ),
            update(
                "moveToTrash",
                "Move the message to the trash.",
                Capability::Destructive,
                MessageUpdate::MoveToTrash,
            ),
            update(
                "star",
                "Star the message.",
                Capability::Write,
                MessageUpdate::Star,
            ),
            Arc::new(StorePdf) as Arc<dyn Action>,
            update(
                "unstar",
                "Remove the star from the message.",
                Capability::Write,
                MessageUpdate::Unstar,
            ),
        ]
    }
}
