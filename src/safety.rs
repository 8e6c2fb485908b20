//! Capability gate: decides whether an action body may run in the current run mode.
//!
//! | mode      | read | write | destructive                        |
//! |-----------|------|-------|------------------------------------|
//! | normal    | run  | run   | run unless destructive is disabled |
//! | dry-run   | run  | skip  | skip                               |
//! | dangerous | run  | run   | run                                |

use crate::actions::Capability;
use crate::config::RunMode;
use crate::context::ProcessingContext;

/// Verdict for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Execute,
    Skip { reason: String },
}

/// Run-wide gate policy.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityGate {
    run_mode: RunMode,
    destructive_disabled: bool,
}

impl CapabilityGate {
    pub fn new(run_mode: RunMode, destructive_disabled: bool) -> Self {
        Self {
            run_mode,
            destructive_disabled,
        }
    }

    /// Gate for the run rooted at `proc`.
    pub fn for_run(proc: &ProcessingContext) -> Self {
        Self::new(proc.run_mode, proc.settings.disable_destructive_actions)
    }

    /// Check an action's capability against the policy.
    pub fn check(&self, capability: Capability) -> GateDecision {
        if !capability.mutates() {
            return GateDecision::Execute;
        }
        match self.run_mode {
            RunMode::Dangerous => GateDecision::Execute,
            RunMode::DryRun => GateDecision::Skip {
                reason: format!("{capability:?} action skipped in dry-run mode").to_lowercase(),
            },
            RunMode::Normal
                if capability == Capability::Destructive && self.destructive_disabled =>
            {
                GateDecision::Skip {
                    reason: "destructive actions are disabled".into(),
                }
            }
            RunMode::Normal => GateDecision::Execute,
        }
    }
}
