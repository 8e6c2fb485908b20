//! Store capability traits: the only interface to external mail and file systems.
//!
//! Adapters implement these; the engine never talks to a mailbox or drive
//! directly. Every call is awaited sequentially and retries are the adapter's
//! concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{Attachment, Message, Thread};

/// What to do when a file already exists at the target location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Create the new file next to the existing one.
    #[default]
    Keep,
    /// Leave the existing file and return it.
    Skip,
    /// Delete existing files, then create.
    Replace,
    /// Fail with `StoreError::Conflict`.
    Error,
}

/// Content and metadata of a file to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub description: String,
    /// Ask the store to convert the content to this MIME type on write.
    pub to_mime_type: Option<String>,
}

/// A file created (or kept) by the file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub location: String,
}

/// Thread mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadUpdate {
    MarkRead,
    MarkUnread,
    MarkImportant,
    MarkUnimportant,
    MoveToArchive,
    MoveToInbox,
    MoveToTrash,
    AddLabel(String),
    RemoveLabel(String),
}

/// Message mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageUpdate {
    MarkRead,
    MarkUnread,
    Star,
    Unstar,
    MoveToTrash,
}

/// Mailbox access.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Address of the mailbox owner, exposed as `${user.email}`.
    fn user_email(&self) -> String;

    /// Search threads, returning at most `max` in store order.
    async fn list_threads(&self, query: &str, max: usize) -> Result<Vec<Thread>, StoreError>;

    /// Messages of a thread in store order.
    async fn list_messages(&self, thread: &Thread) -> Result<Vec<Message>, StoreError>;

    /// Attachments of a message in store order.
    async fn list_attachments(&self, message: &Message) -> Result<Vec<Attachment>, StoreError>;

    async fn update_thread(&self, thread: &Thread, update: ThreadUpdate) -> Result<(), StoreError>;

    async fn update_message(
        &self,
        message: &Message,
        update: MessageUpdate,
    ) -> Result<(), StoreError>;

    /// Forward a message to `to`.
    async fn forward_message(&self, message: &Message, to: &str) -> Result<(), StoreError>;

    /// Render a message as PDF bytes.
    async fn message_as_pdf(&self, message: &Message, skip_header: bool)
    -> Result<Vec<u8>, StoreError>;

    /// Raw bytes of an attachment.
    async fn attachment_content(&self, attachment: &Attachment) -> Result<Vec<u8>, StoreError>;
}

/// File storage access.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create a file at `location` (folder path + file name), creating folders
    /// as needed and resolving conflicts per `strategy`.
    async fn create_file(
        &self,
        location: &str,
        content: FileContent,
        strategy: ConflictStrategy,
    ) -> Result<StoredFile, StoreError>;
}
