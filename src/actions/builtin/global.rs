//! `global.*` actions, usable at any context level.

use std::sync::Arc;

use async_trait::async_trait;

use crate::actions::action::{Action, ActionArgs, Capability};
use crate::actions::registry::ActionProvider;
use crate::context::EvalContext;
use crate::error::ActionError;

/// Emit `message` as a tracing event at `level` (default `info`).
struct Log;

#[async_trait]
impl Action for Log {
    fn name(&self) -> &str {
        "log"
    }

    fn description(&self) -> &str {
        "Log `message` at `level` (error, warn, info, debug or trace)."
    }

    fn capability(&self) -> Capability {
        Capability::Read
    }

    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError> {
        let message = args.require_str(self.name(), "message")?;
        let level = args.get_str("level").unwrap_or("info");
        let entity = ctx.entity_id().unwrap_or_default();
        let level = match level.to_ascii_lowercase().as_str() {
            "error" => {
                tracing::error!(entity = %entity, "{message}");
                "error"
            }
            "warn" | "warning" => {
                tracing::warn!(entity = %entity, "{message}");
                "warn"
            }
            "info" => {
                tracing::info!(entity = %entity, "{message}");
                "info"
            }
            "debug" => {
                tracing::debug!(entity = %entity, "{message}");
                "debug"
            }
            "trace" => {
                tracing::trace!(entity = %entity, "{message}");
                "trace"
            }
            other => {
                return Err(ActionError::InvalidParameters {
                    name: self.name().to_string(),
                    reason: format!("unknown log level '{other}'"),
                });
            }
        };
        Ok(serde_json::json!({ "level": level, "message": message }))
    }
}

/// Context-independent actions, registered under `global`.
pub struct GlobalActions;

impl ActionProvider for GlobalActions {
    fn actions(&self) -> Vec<Arc<dyn Action>> {
        vec![Arc::new(Log) as Arc<dyn Action>]
    }
}
