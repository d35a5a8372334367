//! Cloud layer error types.

use std::time::Duration;

use nodescale_core::{GroupId, ParseError, ResourceRef};
use thiserror::Error;

pub type CloudResult<T> = Result<T, CloudError>;

/// Errors returned by backends, node groups, and the membership cache.
#[derive(Debug, Clone, Error)]
pub enum CloudError {
    /// A call to the cloud control plane failed.
    #[error("{backend} api error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("group {0} not found")]
    UnknownGroup(String),

    #[error("group {0} configured more than once")]
    DuplicateGroup(String),

    #[error("cannot delete instances which don't belong to the same group: {member} is not in {group}")]
    MixedGroups { group: GroupId, member: ResourceRef },

    #[error("{member} belongs to a different group than {group}")]
    ForeignMember { group: String, member: ResourceRef },

    #[error("{0} doesn't belong to a known group")]
    NotManaged(ResourceRef),

    #[error("size increase must be positive, got {0}")]
    InvalidDelta(i64),

    #[error("size increase too large - desired:{desired} max:{max}")]
    MaxSizeExceeded { desired: i64, max: u32 },

    #[error("min size reached for {group}, nodes will not be deleted (size {size}, min {min}, removing {removing})")]
    MinSizeReached {
        group: String,
        size: u32,
        min: u32,
        removing: usize,
    },

    #[error("operation {operation} did not finish within {timeout:?}")]
    OperationTimeout { operation: String, timeout: Duration },

    #[error("operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },
}

impl CloudError {
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}
