//! External store capabilities: mailbox and file storage interfaces.

#[cfg(test)]
pub(crate) mod mock;
pub mod traits;

pub use traits::{
    ConflictStrategy, FileContent, FileStore, MailStore, MessageUpdate, StoredFile, ThreadUpdate,
};
