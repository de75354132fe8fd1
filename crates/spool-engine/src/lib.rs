pub mod compactor;
pub mod error;
pub mod policy;
pub mod service;

pub use error::EngineError;
pub use service::{CompactionOutcome, ContextService, ContextStatus, SkipReason};
