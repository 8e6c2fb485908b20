//! Mailbox entity snapshots: threads, messages and attachments.
//!
//! Store adapters convert their native objects into these structs. They are
//! immutable for the duration of a pass; mutations go through the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::Value;

/// Opaque reference to attachment content held by the mail store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHandle(pub String);

/// A conversation thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    /// Labels in store order (duplicates already removed by the adapter).
    pub labels: Vec<String>,
    pub message_count: i64,
    pub has_starred_messages: bool,
    pub is_important: bool,
    pub is_in_priority_inbox: bool,
    pub permalink: String,
    pub first_message_subject: String,
    pub last_message_date: Option<DateTime<Utc>>,
}

impl Thread {
    /// Look up a template attribute by name. `None` means unknown attribute.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let value: Value = match name {
            "id" => self.id.as_str().into(),
            "labels" => self.labels.clone().into(),
            "messageCount" => self.message_count.into(),
            "hasStarredMessages" => self.has_starred_messages.into(),
            "isImportant" => self.is_important.into(),
            "isInPriorityInbox" => self.is_in_priority_inbox.into(),
            "permalink" => self.permalink.as_str().into(),
            "firstMessageSubject" => self.first_message_subject.as_str().into(),
            "lastMessageDate" => self.last_message_date.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// A single message within a thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub body: Option<String>,
    pub is_starred: bool,
    pub is_unread: bool,
}

impl Message {
    /// Look up a template attribute by name. `None` means unknown attribute.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let value: Value = match name {
            "id" => self.id.as_str().into(),
            "from" => self.from.as_str().into(),
            "to" => self.to.as_str().into(),
            "cc" => self.cc.clone().into(),
            "bcc" => self.bcc.clone().into(),
            "replyTo" => self.reply_to.clone().into(),
            "subject" => self.subject.as_str().into(),
            "date" => self.date.into(),
            "body" => self.body.clone().into(),
            "isStarred" => self.is_starred.into(),
            "isUnread" => self.is_unread.into(),
            _ => return None,
        };
        Some(value)
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub hash: String,
    pub is_google_type: bool,
    /// Embedded in the body rather than attached.
    pub is_inline: bool,
    pub content: ContentHandle,
}

impl Attachment {
    /// Look up a template attribute by name. `None` means unknown attribute.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        let value: Value = match name {
            "name" => self.name.as_str().into(),
            "contentType" => self.content_type.as_str().into(),
            "size" => self.size.into(),
            "hash" => self.hash.as_str().into(),
            "isGoogleType" => self.is_google_type.into(),
            "isInline" => self.is_inline.into(),
            _ => return None,
        };
        Some(value)
    }
}
