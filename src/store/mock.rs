//! Recording in-memory store for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Attachment, Message, Thread};
use crate::store::traits::{
    ConflictStrategy, FileContent, FileStore, MailStore, MessageUpdate, StoredFile, ThreadUpdate,
};

/// Serves a fixed mailbox and records every mutating call.
#[derive(Default)]
pub(crate) struct MockStore {
    pub threads: Vec<Thread>,
    /// Messages keyed by thread id.
    pub messages: HashMap<String, Vec<Message>>,
    /// Attachments keyed by message id.
    pub attachments: HashMap<String, Vec<Attachment>>,
    /// `create_file` fails for locations containing any of these.
    pub fail_locations: Vec<String>,
    queries: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
    files: Mutex<Vec<(String, FileContent)>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a thread with its messages and their attachments.
    pub fn with_thread(mut self, thread: Thread, messages: Vec<(Message, Vec<Attachment>)>) -> Self {
        let mut msgs = Vec::with_capacity(messages.len());
        for (message, attachments) in messages {
            self.attachments.insert(message.id.clone(), attachments);
            msgs.push(message);
        }
        self.messages.insert(thread.id.clone(), msgs);
        self.threads.push(thread);
        self
    }

    pub fn failing_on(mut self, location_fragment: &str) -> Self {
        self.fail_locations.push(location_fragment.to_string());
        self
    }

    /// Mutating calls in order, e.g. `create_file:/a/b.png`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Thread queries in order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Created files with their content, in order.
    pub fn files(&self) -> Vec<(String, FileContent)> {
        self.files.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MailStore for MockStore {
    fn user_email(&self) -> String {
        "me@example.com".to_string()
    }

    async fn list_threads(&self, query: &str, max: usize) -> Result<Vec<Thread>, StoreError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.threads.iter().take(max).cloned().collect())
    }

    async fn list_messages(&self, thread: &Thread) -> Result<Vec<Message>, StoreError> {
        Ok(self.messages.get(&thread.id).cloned().unwrap_or_default())
    }

    async fn list_attachments(&self, message: &Message) -> Result<Vec<Attachment>, StoreError> {
        Ok(self.attachments.get(&message.id).cloned().unwrap_or_default())
    }

    async fn update_thread(&self, thread: &Thread, update: ThreadUpdate) -> Result<(), StoreError> {
        self.record(format!("update_thread:{}:{:?}", thread.id, update));
        Ok(())
    }

    async fn update_message(
        &self,
        message: &Message,
        update: MessageUpdate,
    ) -> Result<(), StoreError> {
        self.record(format!("update_message:{}:{:?}", message.id, update));
        Ok(())
    }

    async fn forward_message(&self, message: &Message, to: &str) -> Result<(), StoreError> {
        self.record(format!("forward_message:{}:{}", message.id, to));
        Ok(())
    }

    async fn message_as_pdf(
        &self,
        message: &Message,
        skip_header: bool,
    ) -> Result<Vec<u8>, StoreError> {
        Ok(format!("PDF {} {}", message.id, skip_header).into_bytes())
    }

    async fn attachment_content(&self, attachment: &Attachment) -> Result<Vec<u8>, StoreError> {
        Ok(attachment.content.0.clone().into_bytes())
    }
}

#[async_trait]
impl FileStore for MockStore {
    async fn create_file(
        &self,
        location: &str,
        content: FileContent,
        _strategy: ConflictStrategy,
    ) -> Result<StoredFile, StoreError> {
        if self.fail_locations.iter().any(|f| location.contains(f.as_str())) {
            return Err(StoreError::RequestFailed {
                operation: "create_file".into(),
                reason: format!("cannot write {location}"),
            });
        }
        self.record(format!("create_file:{location}"));
        self.files
            .lock()
            .unwrap()
            .push((location.to_string(), content));
        Ok(StoredFile {
            id: format!("file-{}", self.calls.lock().unwrap().len()),
            location: location.to_string(),
        })
    }
}
