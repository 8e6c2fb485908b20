//! Action registry and the single dispatch chokepoint.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::actions::action::{Action, ActionArgs, ActionOutcome, ActionReturn, Capability};
use crate::context::EvalContext;
use crate::error::ActionError;
use crate::safety::{CapabilityGate, GateDecision};

/// A group of actions registered under one namespace, e.g. `message`.
pub trait ActionProvider: Send + Sync {
    fn actions(&self) -> Vec<Arc<dyn Action>>;
}

/// A registered action under its qualified name.
#[derive(Clone)]
pub struct ActionDescriptor {
    /// `<namespace>.<action>`.
    pub name: String,
    pub description: String,
    pub capability: Capability,
    pub action: Arc<dyn Action>,
}

impl std::fmt::Debug for ActionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// Registry of available actions, keyed by qualified name.
#[derive(Debug, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionDescriptor>,
}

impl ActionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every action of `provider` under `namespace`.
    pub fn register_action_provider(&mut self, namespace: &str, provider: &dyn ActionProvider) {
        for action in provider.actions() {
            self.register(namespace, action);
        }
    }

    /// Register a single action. Replaces any action already under the same name.
    pub fn register(&mut self, namespace: &str, action: Arc<dyn Action>) {
        let name = format!("{namespace}.{}", action.name());
        let descriptor = ActionDescriptor {
            name: name.clone(),
            description: action.description().to_string(),
            capability: action.capability(),
            action,
        };
        if self.actions.insert(name.clone(), descriptor).is_some() {
            tracing::debug!(action = %name, "Replaced action registration");
        } else {
            tracing::debug!(action = %name, "Registered action");
        }
    }

    pub fn get_actions(&self) -> &BTreeMap<String, ActionDescriptor> {
        &self.actions
    }

    pub fn get(&self, name: &str) -> Option<&ActionDescriptor> {
        self.actions.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Qualified names in sorted order.
    pub fn list(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn count(&self) -> usize {
        self.actions.len()
    }

    /// Dispatch an action. Every invocation goes through here.
    ///
    /// Only an unknown name is an `Err`; gated skips and body failures are
    /// reported in the returned outcome.
    pub async fn execute_action(
        &self,
        ctx: &EvalContext<'_>,
        name: &str,
        args: &ActionArgs,
    ) -> Result<ActionReturn, ActionError> {
        let descriptor = self.get(name).ok_or_else(|| ActionError::NotFound {
            name: name.to_string(),
        })?;
        let started = Instant::now();
        let entity = ctx.entity_id().unwrap_or_default();

        let outcome = match CapabilityGate::for_run(ctx.proc()).check(descriptor.capability) {
            GateDecision::Skip { reason } => {
                tracing::warn!(
                    action = %name,
                    entity = %entity,
                    reason = %reason,
                    "Skipped action"
                );
                ActionOutcome::Skipped { reason }
            }
            GateDecision::Execute => match descriptor.action.execute(ctx, args).await {
                Ok(result) => {
                    tracing::info!(action = %name, entity = %entity, "Executed action");
                    ActionOutcome::Executed { result }
                }
                Err(e) => {
                    tracing::error!(
                        action = %name,
                        entity = %entity,
                        error = %e,
                        "Action failed"
                    );
                    ActionOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            },
        };

        Ok(ActionReturn {
            action: descriptor.name.clone(),
            capability: descriptor.capability,
            outcome,
            duration: started.elapsed(),
        })
    }
}
