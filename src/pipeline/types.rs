//! Types for a processing run report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::actions::{ActionOutcome, ActionReturn};
use crate::config::{ProcessingStage, RunMode};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped scheduling threads after `settings.maxRuntime`; results are partial.
    DeadlineExceeded,
}

/// One dispatched action, whatever its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    /// Rule path, e.g. `threads[0].messages[1].actions[0]`.
    pub location: String,
    pub entity: Option<String>,
    pub stage: ProcessingStage,
    #[serde(flatten)]
    pub result: ActionReturn,
}

/// A failure recorded against one rule or entity. Never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingError {
    pub location: String,
    pub entity: Option<String>,
    pub message: String,
}

/// Report of a processing run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub run_id: Uuid,
    pub run_mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed_threads: usize,
    pub processed_messages: usize,
    pub processed_attachments: usize,
    pub actions: Vec<ActionRecord>,
    pub errors: Vec<ProcessingError>,
}

impl ProcessingResult {
    pub fn new(run_mode: RunMode, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_mode,
            status: RunStatus::Completed,
            started_at,
            finished_at: None,
            processed_threads: 0,
            processed_messages: 0,
            processed_attachments: 0,
            actions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Record a failure. Logged here so every recorded error shows up once.
    pub fn record_error(
        &mut self,
        location: impl Into<String>,
        entity: Option<String>,
        error: impl std::fmt::Display,
    ) {
        let location = location.into();
        let message = error.to_string();
        tracing::error!(
            location = %location,
            entity = entity.as_deref().unwrap_or("-"),
            error = %message,
            "Processing error"
        );
        self.errors.push(ProcessingError {
            location,
            entity,
            message,
        });
    }

    /// Record a dispatched action; a failed outcome is also recorded as an error.
    pub fn record_action(
        &mut self,
        location: String,
        entity: Option<String>,
        stage: ProcessingStage,
        result: ActionReturn,
    ) {
        if let ActionOutcome::Failed { error } = &result.outcome {
            self.errors.push(ProcessingError {
                location: location.clone(),
                entity: entity.clone(),
                message: format!("{}: {error}", result.action),
            });
        }
        self.actions.push(ActionRecord {
            location,
            entity,
            stage,
            result,
        });
    }

    /// Actions with the given outcome label (`executed`, `skipped`, `failed`).
    pub fn actions_with(&self, label: &str) -> impl Iterator<Item = &ActionRecord> {
        self.actions
            .iter()
            .filter(move |a| a.result.outcome.label() == label)
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Capability;
    use std::time::Duration;

    fn action(outcome: ActionOutcome) -> ActionReturn {
        ActionReturn {
            action: "message.star".into(),
            capability: Capability::Write,
            outcome,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn failed_action_adds_one_error() {
        let mut result = ProcessingResult::new(RunMode::Normal, Utc::now());
        result.record_action(
            "threads[0].messages[0].actions[0]".into(),
            Some("m1".into()),
            ProcessingStage::Main,
            action(ActionOutcome::Failed {
                error: "boom".into(),
            }),
        );
        result.record_action(
            "threads[0].messages[0].actions[1]".into(),
            Some("m1".into()),
            ProcessingStage::Main,
            action(ActionOutcome::Executed {
                result: serde_json::Value::Null,
            }),
        );

        assert_eq!(result.actions.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "message.star: boom");
        assert_eq!(result.actions_with("executed").count(), 1);
    }

    #[test]
    fn serializes_report() {
        let mut result = ProcessingResult::new(RunMode::DryRun, Utc::now());
        result.record_action(
            "threads[0].actions[0]".into(),
            Some("t1".into()),
            ProcessingStage::PostMain,
            action(ActionOutcome::Skipped {
                reason: "write action skipped in dry-run mode".into(),
            }),
        );
        result.finish();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["run_mode"], "dry-run");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["actions"][0]["action"], "message.star");
        assert_eq!(json["actions"][0]["stage"], "post-main");
        assert_eq!(json["actions"][0]["outcome"]["status"], "skipped");
        assert_eq!(json["actions"][0]["duration_ms"], 3);
        assert!(json["finished_at"].is_string());
    }
}
