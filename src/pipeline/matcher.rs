//! Compiled rule matchers for threads, messages and attachments.
//!
//! Regexes are compiled once per run. A match records its capture groups per
//! attribute so actions can refer to them as `${<ns>.<attr>.match.<key>}`.

use regex::Regex;

use crate::config::{AttachmentMatchConfig, MessageFlag, MessageMatchConfig, ThreadMatchConfig};
use crate::context::{MatchResult, Matches};
use crate::error::ConfigError;
use crate::model::{Attachment, Message, Thread};

fn compile(field: &str, pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
        field: field.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Match every regex against its attribute; all must match.
fn match_all<'r>(
    regexes: impl IntoIterator<Item = (&'static str, &'r Regex, &'r str)>,
) -> Option<Matches> {
    let mut matches = Matches::default();
    for (attribute, regex, haystack) in regexes {
        let result = MatchResult::evaluate(regex, haystack);
        if !result.matched {
            return None;
        }
        matches.record(attribute, result.groups);
    }
    Some(matches)
}

// ── Threads ─────────────────────────────────────────────────────────

/// Thread selection: a store query plus message-count bounds.
#[derive(Debug, Clone)]
pub struct ThreadMatcher {
    query: String,
    min_message_count: i64,
    max_message_count: i64,
}

impl ThreadMatcher {
    /// Combine the global match block with a rule's own.
    ///
    /// Queries are joined with a space; the rule's `newerThan` wins over the
    /// global one and is appended as `newer_than:<value>`.
    pub fn new(global: &ThreadMatchConfig, rule: &ThreadMatchConfig) -> Self {
        let newer_than = if rule.newer_than.is_empty() {
            &global.newer_than
        } else {
            &rule.newer_than
        };
        let mut parts: Vec<String> = [global.query.trim(), rule.query.trim()]
            .into_iter()
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();
        if !newer_than.is_empty() {
            parts.push(format!("newer_than:{newer_than}"));
        }
        Self {
            query: parts.join(" "),
            min_message_count: rule.min_message_count,
            max_message_count: rule.max_message_count,
        }
    }

    /// Query template; may still contain placeholders.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Message-count bounds. `-1` disables a bound.
    pub fn matches(&self, thread: &Thread) -> bool {
        let count = thread.message_count;
        (self.min_message_count < 0 || count >= self.min_message_count)
            && (self.max_message_count < 0 || count <= self.max_message_count)
    }
}

// ── Messages ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MessageMatcher {
    from: Option<Regex>,
    to: Option<Regex>,
    subject: Option<Regex>,
    body: Option<Regex>,
    flags: Vec<MessageFlag>,
}

impl MessageMatcher {
    pub fn compile(config: &MessageMatchConfig) -> Result<Self, ConfigError> {
        let opt = |field: &str, pattern: &Option<String>| {
            pattern.as_deref().map(|p| compile(field, p)).transpose()
        };
        Ok(Self {
            from: opt("from", &config.from)?,
            to: opt("to", &config.to)?,
            subject: opt("subject", &config.subject)?,
            body: opt("body", &config.body)?,
            flags: config.is.clone(),
        })
    }

    /// Captures of a matching message, `None` if it does not match.
    pub fn evaluate(&self, message: &Message) -> Option<Matches> {
        let flags_ok = self.flags.iter().all(|flag| match flag {
            MessageFlag::Read => !message.is_unread,
            MessageFlag::Unread => message.is_unread,
            MessageFlag::Starred => message.is_starred,
            MessageFlag::Unstarred => !message.is_starred,
        });
        if !flags_ok {
            return None;
        }

        let body = message.body.as_deref().unwrap_or_default();
        let candidates = [
            ("from", self.from.as_ref(), message.from.as_str()),
            ("to", self.to.as_ref(), message.to.as_str()),
            ("subject", self.subject.as_ref(), message.subject.as_str()),
            ("body", self.body.as_ref(), body),
        ];
        match_all(
            candidates
                .into_iter()
                .filter_map(|(attr, re, hay)| re.map(|re| (attr, re, hay))),
        )
    }
}

// ── Attachments ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AttachmentMatcher {
    name: Regex,
    content_type: Regex,
    larger_than: i64,
    smaller_than: i64,
    include_attachments: bool,
    include_inline_images: bool,
}

impl AttachmentMatcher {
    pub fn compile(config: &AttachmentMatchConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            name: compile("name", &config.name)?,
            content_type: compile("contentType", &config.content_type)?,
            larger_than: config.larger_than,
            smaller_than: config.smaller_than,
            include_attachments: config.include_attachments,
            include_inline_images: config.include_inline_images,
        })
    }

    pub fn evaluate(&self, attachment: &Attachment) -> Option<Matches> {
        let included = if attachment.is_inline {
            self.include_inline_images
        } else {
            self.include_attachments
        };
        if !included {
            return None;
        }
        let size = attachment.size;
        if self.larger_than >= 0 && size <= self.larger_than {
            return None;
        }
        if self.smaller_than >= 0 && size >= self.smaller_than {
            return None;
        }
        match_all([
            ("name", &self.name, attachment.name.as_str()),
            (
                "contentType",
                &self.content_type,
                attachment.content_type.as_str(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_query_merges_global_and_rule() {
        let global = ThreadMatchConfig {
            query: "has:attachment -in:trash".into(),
            newer_than: "1d".into(),
            ..Default::default()
        };
        let rule = ThreadMatchConfig {
            query: "from:billing@example.com".into(),
            ..Default::default()
        };
        assert_eq!(
            ThreadMatcher::new(&global, &rule).query(),
            "has:attachment -in:trash from:billing@example.com newer_than:1d"
        );

        let rule = ThreadMatchConfig {
            newer_than: "2w".into(),
            ..Default::default()
        };
        assert_eq!(
            ThreadMatcher::new(&global, &rule).query(),
            "has:attachment -in:trash newer_than:2w"
        );
        assert_eq!(
            ThreadMatcher::new(&ThreadMatchConfig::default(), &ThreadMatchConfig::default())
                .query(),
            ""
        );
    }

    #[test]
    fn thread_message_count_bounds() {
        let rule = ThreadMatchConfig {
            min_message_count: 2,
            max_message_count: 3,
            ..Default::default()
        };
        let matcher = ThreadMatcher::new(&ThreadMatchConfig::default(), &rule);
        let thread = |n| Thread {
            message_count: n,
            ..Default::default()
        };
        assert!(!matcher.matches(&thread(1)));
        assert!(matcher.matches(&thread(2)));
        assert!(matcher.matches(&thread(3)));
        assert!(!matcher.matches(&thread(4)));

        let unlimited = ThreadMatcher::new(&ThreadMatchConfig::default(), &Default::default());
        assert!(unlimited.matches(&thread(500)));
        assert!(!unlimited.matches(&thread(0)));
    }

    #[test]
    fn message_regexes_record_captures() {
        let matcher = MessageMatcher::compile(&MessageMatchConfig {
            from: Some(r"(.+)@example\.com".into()),
            subject: Some(r"Message (?P<num>[0-9]+): (.*)".into()),
            ..Default::default()
        })
        .unwrap();
        let message = Message {
            from: "alice@example.com".into(),
            subject: "Message 01: Some more text".into(),
            ..Default::default()
        };
        let matches = matcher.evaluate(&message).unwrap();
        assert_eq!(matches.group("from", "1"), Some("alice"));
        assert_eq!(matches.group("subject", "num"), Some("01"));
        assert_eq!(matches.group("subject", "2"), Some("Some more text"));

        let other = Message {
            from: "bob@elsewhere.org".into(),
            ..message
        };
        assert!(matcher.evaluate(&other).is_none());
    }

    #[test]
    fn message_flags() {
        let unread_starred = MessageMatcher::compile(&MessageMatchConfig {
            is: vec![MessageFlag::Unread, MessageFlag::Starred],
            ..Default::default()
        })
        .unwrap();
        let message = Message {
            is_unread: true,
            is_starred: true,
            ..Default::default()
        };
        assert!(unread_starred.evaluate(&message).is_some());
        let read = Message {
            is_unread: false,
            ..message.clone()
        };
        assert!(unread_starred.evaluate(&read).is_none());

        // No criteria matches everything, with no captures.
        let any = MessageMatcher::compile(&MessageMatchConfig::default()).unwrap();
        assert_eq!(any.evaluate(&read).unwrap().any_group("0"), None);
    }

    #[test]
    fn invalid_regex_is_config_error() {
        let err = MessageMatcher::compile(&MessageMatchConfig {
            subject: Some("(unclosed".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { ref field, .. } if field == "subject"));
    }

    #[test]
    fn attachment_name_type_and_size() {
        let matcher = AttachmentMatcher::compile(&AttachmentMatchConfig {
            name: r"^(.+)\.png$".into(),
            content_type: "image/.*".into(),
            larger_than: 100,
            smaller_than: 1000,
            ..Default::default()
        })
        .unwrap();
        let attachment = Attachment {
            name: "scan.png".into(),
            content_type: "image/png".into(),
            size: 500,
            ..Default::default()
        };
        let matches = matcher.evaluate(&attachment).unwrap();
        assert_eq!(matches.group("name", "1"), Some("scan"));

        let tiny = Attachment {
            size: 100,
            ..attachment.clone()
        };
        assert!(matcher.evaluate(&tiny).is_none());
        let huge = Attachment {
            size: 1000,
            ..attachment.clone()
        };
        assert!(matcher.evaluate(&huge).is_none());
        let pdf = Attachment {
            content_type: "application/pdf".into(),
            ..attachment
        };
        assert!(matcher.evaluate(&pdf).is_none());
    }

    #[test]
    fn default_attachment_match_captures_whole_name() {
        let matcher = AttachmentMatcher::compile(&AttachmentMatchConfig::default()).unwrap();
        let attachment = Attachment {
            name: "a.txt".into(),
            ..Default::default()
        };
        let matches = matcher.evaluate(&attachment).unwrap();
        assert_eq!(matches.group("name", "1"), Some("a.txt"));
    }

    #[test]
    fn bare_attachment_match_reads_the_name() {
        let matcher = AttachmentMatcher::compile(&AttachmentMatchConfig::default()).unwrap();
        let attachment = Attachment {
            name: "scan.png".into(),
            content_type: "image/png".into(),
            ..Default::default()
        };
        let matches = matcher.evaluate(&attachment).unwrap();
        assert_eq!(matches.any_group("0"), Some("scan.png"));
    }

    #[test]
    fn inline_and_regular_attachments_can_be_excluded() {
        let regular = Attachment {
            name: "report.pdf".into(),
            ..Default::default()
        };
        let inline = Attachment {
            name: "logo.png".into(),
            is_inline: true,
            ..Default::default()
        };

        let both = AttachmentMatcher::compile(&AttachmentMatchConfig::default()).unwrap();
        assert!(both.evaluate(&regular).is_some());
        assert!(both.evaluate(&inline).is_some());

        let no_inline = AttachmentMatcher::compile(&AttachmentMatchConfig {
            include_inline_images: false,
            ..Default::default()
        })
        .unwrap();
        assert!(no_inline.evaluate(&regular).is_some());
        assert!(no_inline.evaluate(&inline).is_none());

        let only_inline = AttachmentMatcher::compile(&AttachmentMatchConfig {
            include_attachments: false,
            ..Default::default()
        })
        .unwrap();
        assert!(only_inline.evaluate(&regular).is_none());
        assert!(only_inline.evaluate(&inline).is_some());
    }
}
