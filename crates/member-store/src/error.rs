//! Member store errors

use thiserror::Error;

/// Errors that can occur when reading or writing member records
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API request failed
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Replace carried a stale resourceVersion
    #[error("Conflict writing {0}: object was modified")]
    Conflict(String),

    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The reconcile pass ran out of time
    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),

    /// Record cannot be written as given (e.g. replace without resourceVersion)
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    /// Maps a kube error for `name`, turning 404 and 409 into their own variants.
    pub(crate) fn from_kube(name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(e) if e.code == 404 => Self::NotFound(name.to_string()),
            kube::Error::Api(e) if e.code == 409 => Self::Conflict(name.to_string()),
            other => Self::Kube(other),
        }
    }
}
