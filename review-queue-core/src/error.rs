use thiserror::Error;

/// Failures of queue transitions and encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No active entry carries the requested index. Callers treat this as a
    /// benign no-op: a concurrent removal may already have taken it.
    #[error("no active queue entry with index {index}")]
    NotFound { index: u32 },

    /// The encoded message would exceed the platform's block limit.
    #[error("queue message needs {count} blocks but the limit is {limit}")]
    TooManyBlocks { count: usize, limit: usize },
}
