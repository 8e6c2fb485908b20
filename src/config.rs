//! Configuration types.
//!
//! A configuration is a rule tree: thread rules contain message rules, which
//! contain attachment rules. Every rule carries an optional match block and an
//! ordered list of actions. Field names follow the camelCase JSON format.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Execution policy for a run. Chosen once and passed down explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Normal,
    /// Read-only: writing and destructive actions are skipped.
    DryRun,
    /// No gating at all, destructive actions always execute.
    Dangerous,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "dry-run" => Ok(Self::DryRun),
            "dangerous" => Ok(Self::Dangerous),
            other => Err(ConfigError::InvalidValue {
                key: "runMode".into(),
                message: format!("unknown run mode '{other}'"),
            }),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::DryRun => "dry-run",
            Self::Dangerous => "dangerous",
        };
        f.write_str(s)
    }
}

/// How processed mail is flagged so it is not picked up again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkProcessedMethod {
    /// Dispatch `message.markRead` after each processed message.
    #[default]
    MarkRead,
    /// Dispatch `thread.addLabel` with `markProcessedLabel` after each processed thread.
    AddLabel,
    None,
}

/// Run-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Maximum number of threads fetched per thread rule.
    pub max_batch_size: usize,
    /// Run deadline in seconds, checked before each thread.
    pub max_runtime: u64,
    /// IANA timezone used for date rendering.
    pub timezone: String,
    pub mark_processed_method: MarkProcessedMethod,
    pub mark_processed_label: String,
    /// Skip destructive actions in normal mode.
    pub disable_destructive_actions: bool,
}

impl Settings {
    /// The run deadline as a duration.
    pub fn max_runtime(&self) -> Duration {
        Duration::from_secs(self.max_runtime)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_runtime: 280,
            timezone: "UTC".to_string(),
            mark_processed_method: MarkProcessedMethod::MarkRead,
            mark_processed_label: String::new(),
            disable_destructive_actions: false,
        }
    }
}

/// When an action runs relative to the processing of child entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessingStage {
    PreMain,
    #[default]
    Main,
    PostMain,
}

/// A single action invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionConfig {
    /// Qualified action name, e.g. `attachment.store`.
    pub name: String,
    /// Arguments; string values are template-substituted before dispatch.
    pub args: serde_json::Map<String, serde_json::Value>,
    pub processing_stage: ProcessingStage,
}

impl ActionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.to_string(), value.into());
        self
    }

    pub fn with_stage(mut self, stage: ProcessingStage) -> Self {
        self.processing_stage = stage;
        self
    }
}

/// Thread selection criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadMatchConfig {
    /// Mail search query; supports placeholders from the meta namespaces.
    pub query: String,
    /// Relative age limit such as `1d`, appended as `newer_than:`.
    pub newer_than: String,
    pub min_message_count: i64,
    /// `-1` disables the limit.
    pub max_message_count: i64,
}

impl Default for ThreadMatchConfig {
    fn default() -> Self {
        Self {
            query: String::new(),
            newer_than: String::new(),
            min_message_count: 1,
            max_message_count: -1,
        }
    }
}

/// Message flags usable in a message match block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFlag {
    Read,
    Unread,
    Starred,
    Unstarred,
}

/// Message selection criteria. Each regex is matched against the attribute of
/// the same name; capture groups become `${message.<attr>.match.<key>}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageMatchConfig {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub is: Vec<MessageFlag>,
}

/// Attachment selection criteria.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttachmentMatchConfig {
    pub name: String,
    pub content_type: String,
    /// Only attachments larger than this many bytes; `-1` disables.
    pub larger_than: i64,
    /// Only attachments smaller than this many bytes; `-1` disables.
    pub smaller_than: i64,
    /// Match regular (non-inline) attachments.
    pub include_attachments: bool,
    /// Match inline images embedded in the message body.
    pub include_inline_images: bool,
}

impl Default for AttachmentMatchConfig {
    fn default() -> Self {
        Self {
            name: "(.*)".to_string(),
            content_type: ".*".to_string(),
            larger_than: -1,
            smaller_than: -1,
            include_attachments: true,
            include_inline_images: true,
        }
    }
}

/// Attachment rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AttachmentConfig {
    pub description: String,
    #[serde(rename = "match")]
    pub match_: AttachmentMatchConfig,
    pub actions: Vec<ActionConfig>,
}

/// Message rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageConfig {
    pub description: String,
    #[serde(rename = "match")]
    pub match_: MessageMatchConfig,
    pub actions: Vec<ActionConfig>,
    pub attachments: Vec<AttachmentConfig>,
}

/// Thread rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadConfig {
    pub description: String,
    #[serde(rename = "match")]
    pub match_: ThreadMatchConfig,
    pub actions: Vec<ActionConfig>,
    pub messages: Vec<MessageConfig>,
    /// Attachment rules applied to every message of the thread.
    pub attachments: Vec<AttachmentConfig>,
}

impl ThreadConfig {
    /// Message rules to evaluate, including the implicit catch-all rule that
    /// carries thread-level attachment rules.
    pub fn effective_messages(&self) -> Vec<MessageConfig> {
        let mut messages = self.messages.clone();
        if !self.attachments.is_empty() {
            messages.push(MessageConfig {
                description: "implicit message rule for thread attachments".into(),
                attachments: self.attachments.clone(),
                ..Default::default()
            });
        }
        messages
    }
}

/// Rules applied in addition to every thread rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    pub thread: ThreadConfig,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub description: String,
    pub settings: Settings,
    /// User-defined values available as `${globals.<key>}`.
    pub globals: std::collections::BTreeMap<String, String>,
    pub global: GlobalConfig,
    pub threads: Vec<ThreadConfig>,
}

impl Config {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}
