//! Rule processing pipeline.
//!
//! Every run flows through:
//! 1. `ThreadMatcher`: store query and message-count bounds
//! 2. `MessageMatcher` / `AttachmentMatcher`: regex and flag matching with captures
//! 3. `Processor`: stage-ordered action dispatch through the `ActionRegistry`
//!
//! Mutations only ever happen through the registry's capability gate.

pub mod matcher;
pub mod processor;
pub mod types;

pub use processor::Processor;
pub use types::{ActionRecord, ProcessingError, ProcessingResult, RunStatus};
