//! Evaluation contexts: the per-level view a rule and its actions run against.
//!
//! Contexts form a one-directional chain: an attachment context borrows its
//! message context, which borrows its thread context, which borrows the
//! run-wide [`ProcessingContext`] root. Parents never know about children.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::{Captures, Regex};

use crate::config::{AttachmentConfig, MessageConfig, RunMode, Settings, ThreadConfig};
use crate::error::ConfigError;
use crate::format::{Value, parse_timezone};
use crate::model::{Attachment, Message, Thread};
use crate::store::{FileStore, MailStore};

/// Capture groups keyed by group name or stringified index (`"0"` = full match).
pub type CaptureGroups = BTreeMap<String, String>;

/// Outcome of matching one regex against one attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub matched: bool,
    pub groups: CaptureGroups,
}

impl MatchResult {
    /// Match `regex` against `haystack`, collecting numbered and named groups.
    /// Groups that did not participate are left out.
    pub fn evaluate(regex: &Regex, haystack: &str) -> Self {
        match regex.captures(haystack) {
            Some(caps) => Self {
                matched: true,
                groups: collect_groups(regex, &caps),
            },
            None => Self::default(),
        }
    }
}

fn collect_groups(regex: &Regex, caps: &Captures<'_>) -> CaptureGroups {
    let mut groups = CaptureGroups::new();
    for (i, m) in caps.iter().enumerate() {
        if let Some(m) = m {
            groups.insert(i.to_string(), m.as_str().to_string());
        }
    }
    for name in regex.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            groups.insert(name.to_string(), m.as_str().to_string());
        }
    }
    groups
}

/// Capture groups recorded at one context level, per matched attribute.
///
/// Attributes keep the order they were recorded in. Matchers record in
/// criteria order (`name` before `contentType`, `from` before `subject`), so
/// that order decides which match a bare `${<ns>.match.<key>}` reads.
#[derive(Debug, Clone, Default)]
pub struct Matches {
    by_attribute: Vec<(String, CaptureGroups)>,
}

impl Matches {
    /// Record the groups of a match. A later match of the same attribute
    /// replaces it in place.
    pub fn record(&mut self, attribute: &str, groups: CaptureGroups) {
        match self.by_attribute.iter_mut().find(|(a, _)| a == attribute) {
            Some((_, existing)) => *existing = groups,
            None => self.by_attribute.push((attribute.to_string(), groups)),
        }
    }

    /// Group `key` of the match on `attribute`.
    pub fn group(&self, attribute: &str, key: &str) -> Option<&str> {
        self.by_attribute
            .iter()
            .find(|(a, _)| a == attribute)
            .and_then(|(_, g)| g.get(key))
            .map(String::as_str)
    }

    /// Group `key` of the first recorded match that has it.
    pub fn any_group(&self, key: &str) -> Option<&str> {
        self.by_attribute
            .iter()
            .find_map(|(_, g)| g.get(key))
            .map(String::as_str)
    }
}

/// The level of a context in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Run,
    Thread,
    Message,
    Attachment,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Run => "run",
            Self::Thread => "thread",
            Self::Message => "message",
            Self::Attachment => "attachment",
        };
        f.write_str(s)
    }
}

// ── Root ────────────────────────────────────────────────────────────

/// Run-wide root of every context chain.
pub struct ProcessingContext {
    pub mail: Arc<dyn MailStore>,
    pub files: Arc<dyn FileStore>,
    pub run_mode: RunMode,
    pub settings: Settings,
    /// Parsed `settings.timezone`.
    pub timezone: Tz,
    pub user_email: String,
    pub globals: BTreeMap<String, String>,
    /// Run start, exposed as `${date.now}`.
    pub now: DateTime<Utc>,
}

impl ProcessingContext {
    /// Create a root context. Fails if the configured timezone is unknown.
    pub fn new(
        mail: Arc<dyn MailStore>,
        files: Arc<dyn FileStore>,
        run_mode: RunMode,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        let timezone = parse_timezone(&settings.timezone)?;
        let user_email = mail.user_email();
        Ok(Self {
            mail,
            files,
            run_mode,
            settings,
            timezone,
            user_email,
            globals: BTreeMap::new(),
            now: Utc::now(),
        })
    }

    pub fn with_globals(mut self, globals: BTreeMap<String, String>) -> Self {
        self.globals = globals;
        self
    }

    /// Pin `${date.now}` to a fixed instant.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

impl fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("run_mode", &self.run_mode)
            .field("timezone", &self.timezone)
            .field("user_email", &self.user_email)
            .finish_non_exhaustive()
    }
}

// ── Levels ──────────────────────────────────────────────────────────

/// Context for one thread matched by a thread rule.
#[derive(Debug)]
pub struct ThreadContext<'a> {
    pub proc: &'a ProcessingContext,
    pub config: &'a ThreadConfig,
    pub thread: Thread,
    /// 0-based position in the store's result list.
    pub index: usize,
    /// 0-based position of the rule in the configuration.
    pub config_index: usize,
    pub matches: Matches,
}

impl<'a> ThreadContext<'a> {
    pub fn new(
        proc: &'a ProcessingContext,
        config: &'a ThreadConfig,
        thread: Thread,
        config_index: usize,
        index: usize,
    ) -> Self {
        Self {
            proc,
            config,
            thread,
            index,
            config_index,
            matches: Matches::default(),
        }
    }

    pub fn eval(&self) -> EvalContext<'_> {
        EvalContext::Thread(self)
    }
}

/// Context for one message matched by a message rule.
#[derive(Debug)]
pub struct MessageContext<'a> {
    pub thread_ctx: &'a ThreadContext<'a>,
    pub config: &'a MessageConfig,
    pub message: Message,
    pub index: usize,
    pub config_index: usize,
    pub matches: Matches,
}

impl<'a> MessageContext<'a> {
    pub fn new(
        thread_ctx: &'a ThreadContext<'a>,
        config: &'a MessageConfig,
        message: Message,
        config_index: usize,
        index: usize,
    ) -> Self {
        Self {
            thread_ctx,
            config,
            message,
            index,
            config_index,
            matches: Matches::default(),
        }
    }

    pub fn eval(&self) -> EvalContext<'_> {
        EvalContext::Message(self)
    }
}

/// Context for one attachment matched by an attachment rule.
#[derive(Debug)]
pub struct AttachmentContext<'a> {
    pub message_ctx: &'a MessageContext<'a>,
    pub config: &'a AttachmentConfig,
    pub attachment: Attachment,
    pub index: usize,
    pub config_index: usize,
    pub matches: Matches,
}

impl<'a> AttachmentContext<'a> {
    pub fn new(
        message_ctx: &'a MessageContext<'a>,
        config: &'a AttachmentConfig,
        attachment: Attachment,
        config_index: usize,
        index: usize,
    ) -> Self {
        Self {
            message_ctx,
            config,
            attachment,
            index,
            config_index,
            matches: Matches::default(),
        }
    }

    pub fn eval(&self) -> EvalContext<'_> {
        EvalContext::Attachment(self)
    }
}

// ── Resolution ──────────────────────────────────────────────────────

/// Result of resolving a placeholder path.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    /// The namespace is not one this engine knows; the placeholder stays verbatim.
    UnknownNamespace,
}

/// A borrowed handle on the innermost context of a chain.
#[derive(Debug, Clone, Copy)]
pub enum EvalContext<'a> {
    Run(&'a ProcessingContext),
    Thread(&'a ThreadContext<'a>),
    Message(&'a MessageContext<'a>),
    Attachment(&'a AttachmentContext<'a>),
}

impl<'a> EvalContext<'a> {
    pub fn level(&self) -> Level {
        match *self {
            Self::Run(_) => Level::Run,
            Self::Thread(_) => Level::Thread,
            Self::Message(_) => Level::Message,
            Self::Attachment(_) => Level::Attachment,
        }
    }

    /// The root of the chain.
    pub fn proc(&self) -> &'a ProcessingContext {
        match *self {
            Self::Run(p) => p,
            Self::Thread(t) => t.proc,
            Self::Message(m) => m.thread_ctx.proc,
            Self::Attachment(a) => a.message_ctx.thread_ctx.proc,
        }
    }

    pub fn thread(&self) -> Option<&'a ThreadContext<'a>> {
        match *self {
            Self::Run(_) => None,
            Self::Thread(t) => Some(t),
            Self::Message(m) => Some(m.thread_ctx),
            Self::Attachment(a) => Some(a.message_ctx.thread_ctx),
        }
    }

    pub fn message(&self) -> Option<&'a MessageContext<'a>> {
        match *self {
            Self::Message(m) => Some(m),
            Self::Attachment(a) => Some(a.message_ctx),
            _ => None,
        }
    }

    pub fn attachment(&self) -> Option<&'a AttachmentContext<'a>> {
        match *self {
            Self::Attachment(a) => Some(a),
            _ => None,
        }
    }

    /// Short description of the innermost entity for logs and reports.
    pub fn entity_id(&self) -> Option<String> {
        match *self {
            Self::Run(_) => None,
            Self::Thread(t) => Some(t.thread.id.clone()),
            Self::Message(m) => Some(m.message.id.clone()),
            Self::Attachment(a) => Some(format!(
                "{}#{}",
                a.message_ctx.message.id,
                a.index + 1
            )),
        }
    }

    /// Resolve a dotted placeholder path such as `message.subject.match.1`.
    pub fn resolve(&self, path: &str) -> Result<Lookup, ConfigError> {
        let (namespace, rest) = path.split_once('.').unwrap_or((path, ""));
        let proc = self.proc();
        let unresolved = || ConfigError::UnresolvedReference {
            path: path.to_string(),
        };
        let unavailable = || ConfigError::NamespaceUnavailable {
            namespace: namespace.to_string(),
            level: self.level().to_string(),
        };

        match namespace {
            "thread" => {
                let ctx = self.thread().ok_or_else(unavailable)?;
                lookup_entity(path, rest, ctx.index, &ctx.matches, |a| {
                    ctx.thread.attribute(a)
                })
            }
            "message" => {
                let ctx = self.message().ok_or_else(unavailable)?;
                lookup_entity(path, rest, ctx.index, &ctx.matches, |a| {
                    ctx.message.attribute(a)
                })
            }
            "attachment" => {
                let ctx = self.attachment().ok_or_else(unavailable)?;
                lookup_entity(path, rest, ctx.index, &ctx.matches, |a| {
                    ctx.attachment.attribute(a)
                })
            }
            "date" => match rest {
                "now" => Ok(Lookup::Found(Value::Date(proc.now))),
                _ => Err(unresolved()),
            },
            "user" => match rest {
                "email" => Ok(Lookup::Found(Value::Str(proc.user_email.clone()))),
                _ => Err(unresolved()),
            },
            "globals" => proc
                .globals
                .get(rest)
                .map(|v| Lookup::Found(Value::Str(v.clone())))
                .ok_or_else(unresolved),
            _ => Ok(Lookup::UnknownNamespace),
        }
    }
}

impl<'a> From<&'a ProcessingContext> for EvalContext<'a> {
    fn from(ctx: &'a ProcessingContext) -> Self {
        Self::Run(ctx)
    }
}

/// Resolve the part of a path after an entity namespace.
///
/// Order: `index`, then `<attr>.match.<key>` / `match.<key>`, then plain attributes.
fn lookup_entity(
    path: &str,
    rest: &str,
    index: usize,
    matches: &Matches,
    attribute: impl Fn(&str) -> Option<Value>,
) -> Result<Lookup, ConfigError> {
    let unresolved = || ConfigError::UnresolvedReference {
        path: path.to_string(),
    };
    let group = |g: Option<&str>| Lookup::Found(g.map_or(Value::Missing, |s| Value::Str(s.into())));

    if rest == "index" {
        return Ok(Lookup::Found(Value::Int(index as i64 + 1)));
    }
    if let Some(key) = rest.strip_prefix("match.") {
        return Ok(group(matches.any_group(key)));
    }
    if let Some((attr, key)) = rest.split_once(".match.") {
        attribute(attr).ok_or_else(unresolved)?;
        return Ok(group(matches.group(attr, key)));
    }
    attribute(rest).map(Lookup::Found).ok_or_else(unresolved)
}
