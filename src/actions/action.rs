//! Action abstraction: named operations dispatched against a context.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::context::{AttachmentContext, EvalContext, Level, MessageContext, ThreadContext};
use crate::error::ActionError;

/// What an action may do to external state. Drives dry-run gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Destructive,
}

impl Capability {
    /// Whether the action mutates external state.
    pub fn mutates(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Resolved action arguments.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs(serde_json::Map<String, serde_json::Value>);

impl ActionArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument.
    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    /// Get a required, non-empty string argument.
    pub fn require_str(&self, action: &str, key: &str) -> Result<&str, ActionError> {
        match self.get_str(key) {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ActionError::InvalidParameters {
                name: action.to_string(),
                reason: format!("missing '{key}' parameter"),
            }),
        }
    }

    /// Deserialize an optional argument into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, action: &str, key: &str) -> Result<Option<T>, ActionError> {
        self.0
            .get(key)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| ActionError::InvalidParameters {
                    name: action.to_string(),
                    reason: format!("invalid '{key}' parameter: {e}"),
                })
            })
            .transpose()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ActionArgs {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// An action callable from configuration.
#[async_trait]
pub trait Action: Send + Sync {
    /// Name within its provider namespace, e.g. `markRead`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Run the action body. Only ever called through the registry's dispatcher.
    async fn execute(
        &self,
        ctx: &EvalContext<'_>,
        args: &ActionArgs,
    ) -> Result<serde_json::Value, ActionError>;
}

/// How a single invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed { result: serde_json::Value },
    /// Suppressed by the capability gate; the body never ran.
    Skipped { reason: String },
    Failed { error: String },
}

impl ActionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Executed { .. } => "executed",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Uniform result of a dispatched action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionReturn {
    /// Qualified action name.
    pub action: String,
    pub capability: Capability,
    pub outcome: ActionOutcome,
    #[serde(rename = "duration_ms", serialize_with = "duration_ms")]
    pub duration: Duration,
}

fn duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

// ── Context helpers ─────────────────────────────────────────────────

fn wrong_context(action: &str, required: Level, actual: Level) -> ActionError {
    ActionError::WrongContext {
        name: action.to_string(),
        required: required.to_string(),
        actual: actual.to_string(),
    }
}

/// The thread context of `ctx`, or a `WrongContext` error.
pub fn require_thread<'a>(
    ctx: &EvalContext<'a>,
    action: &str,
) -> Result<&'a ThreadContext<'a>, ActionError> {
    ctx.thread()
        .ok_or_else(|| wrong_context(action, Level::Thread, ctx.level()))
}

/// The message context of `ctx`, or a `WrongContext` error.
pub fn require_message<'a>(
    ctx: &EvalContext<'a>,
    action: &str,
) -> Result<&'a MessageContext<'a>, ActionError> {
    ctx.message()
        .ok_or_else(|| wrong_context(action, Level::Message, ctx.level()))
}

/// The attachment context of `ctx`, or a `WrongContext` error.
pub fn require_attachment<'a>(
    ctx: &EvalContext<'a>,
    action: &str,
) -> Result<&'a AttachmentContext<'a>, ActionError> {
    ctx.attachment()
        .ok_or_else(|| wrong_context(action, Level::Attachment, ctx.level()))
}
