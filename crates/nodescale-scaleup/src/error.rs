use nodescale_cloud::CloudError;
use thiserror::Error;

/// A scale-up cycle that could not complete.
///
/// Per-group failures while building options are not errors; the group is
/// skipped. Only failures that leave the cycle without a sound decision
/// surface here.
#[derive(Debug, Error)]
pub enum ScaleUpError {
    #[error("node group discovery failed for {backend} provider: {source}")]
    Discovery {
        backend: &'static str,
        #[source]
        source: CloudError,
    },

    #[error("failed to read current size of {group}: {source}")]
    GroupSize {
        group: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to resize {group} to {target}: {source}")]
    Resize {
        group: String,
        target: u32,
        #[source]
        source: CloudError,
    },
}

pub type ScaleUpResult<T> = Result<T, ScaleUpError>;
