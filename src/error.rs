//! Structured error kinds for the rendering core.
//!
//! The API is predominantly non-throwing: most factories return `Option<T>`
//! and log a diagnostic on failure, matching the source library's
//! null-return idiom. `RhiError` is reserved for call sites where the
//! caller plausibly needs the failure reason (device/pipeline/view
//! creation, submission).

use crate::device::QueueFamily;

#[derive(Debug, thiserror::Error)]
pub enum RhiError {
    #[error("invalid handle: {0}")]
    InvalidHandle(&'static str),

    #[error("queue family {requested:?} is not available on this device")]
    InvalidQueueFamily { requested: QueueFamily },

    #[error("range out of bounds: offset {offset} + size {size} > capacity {capacity}")]
    RangeOutOfBounds {
        offset: u64,
        size: u64,
        capacity: u64,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("incompatible image view: {0}")]
    IncompatibleView(String),

    #[error("compile failure ({stage}): {message}")]
    CompileFailure { stage: &'static str, message: String },

    #[error("command recorder state violation: expected {expected}, was in {actual}")]
    RecorderStateViolation {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("descriptor pool exhausted for type {0:?}")]
    DescriptorPoolExhausted(crate::descriptor::DescriptorType),

    #[error("pop on an empty state stack")]
    EmptyStack,

    #[error("present failed: {0}")]
    PresentFailure(String),
}

pub type Result<T> = std::result::Result<T, RhiError>;
