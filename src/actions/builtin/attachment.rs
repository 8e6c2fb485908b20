//! `attachment.*` actions.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::action::{Action, ActionArgs, Capability, require_attachment};
use crate::actions::registry::ActionProvider;
use crate::context::EvalContext;
use crate::error::ActionError;
use crate::store::{ConflictStrategy, FileContent};

/// Store the attachment content at `location`.
struct Store;

#[async_trait]
impl Action for Store {
    fn name(&self) -> &str {
        "store"
    }

    fn description(&self) -> &str {
        "Store the attachment at `location`, optionally converted to `toMimeType`."
    }

    fn capability(&self) -> Capability {
        Capability::Write
    }

    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError> {
        let attachment_ctx = require_attachment(ctx, self.name())?;
        let location = args.require_str(self.name(), "location")?;
        let strategy: ConflictStrategy = args
            .get_as(self.name(), "conflictStrategy")?
            .unwrap_or_default();
        let attachment = &attachment_ctx.attachment;
        let proc = ctx.proc();

        let data = proc.mail.attachment_content(attachment).await?;
        let content = FileContent {
            data,
            mime_type: attachment.content_type.clone(),
            description: args.get_str("description").unwrap_or_default().to_string(),
            to_mime_type: args
                .get_str("toMimeType")
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        };
        let file = proc.files.create_file(location, content, strategy).await?;
        tracing::debug!(
            attachment = %attachment.name,
            size = attachment.size,
            location = %file.location,
            "Stored attachment"
        );
        Ok(serde_json::json!({ "file": file }))
    }
}

/// Attachment storage, registered under `attachment`.
pub struct AttachmentActions;

impl ActionProvider for AttachmentActions {
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![Arc::new(Store) as Arc<dyn Action>]
    }
}
