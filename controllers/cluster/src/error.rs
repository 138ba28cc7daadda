//! Controller-specific error types.
//!
//! Errors from the crds and member-store crates are wrapped here, optionally
//! annotated with the rack or member they occurred for.

use crds::ProtocolViolation;
use kube::Error as KubeError;
use member_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the cluster controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error outside the member store (status patches, watches)
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Member store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An intent could not be applied
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Error while syncing one rack
    #[error("rack {rack}: {source}")]
    Rack {
        rack: String,
        #[source]
        source: Box<ControllerError>,
    },

    /// Error while syncing one member
    #[error("member {member}: {source}")]
    Member {
        member: String,
        #[source]
        source: Box<ControllerError>,
    },

    /// The cluster object lacks name or namespace
    #[error("ScyllaCluster is missing {0}")]
    MissingMetadata(&'static str),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Webhook server failed
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),

    /// The webhook certificate or key could not be loaded
    #[error("TLS error: {0}")]
    Tls(String),

    /// Metrics could not be registered or rendered
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl ControllerError {
    /// Annotates `self` with the rack it occurred in.
    pub fn in_rack(self, rack: &str) -> Self {
        Self::Rack {
            rack: rack.to_string(),
            source: Box::new(self),
        }
    }

    /// Annotates `self` with the member it occurred for.
    pub fn for_member(self, member: &str) -> Self {
        Self::Member {
            member: member.to_string(),
            source: Box::new(self),
        }
    }

    /// Whether requeueing the object can make the error go away.
    ///
    /// Store and API failures are transient. A protocol violation or a bad
    /// record needs a human and is not retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Watch(_) | Self::Server(_) => true,
            Self::Store(e) => !matches!(e, StoreError::InvalidRecord(_)),
            Self::Rack { source, .. } | Self::Member { source, .. } => source.is_retryable(),
            Self::Protocol(_)
            | Self::MissingMetadata(_)
            | Self::InvalidConfig(_)
            | Self::Tls(_)
            | Self::Metrics(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotations_keep_retryability() {
        let err = ControllerError::from(StoreError::Conflict("m-0".to_string()))
            .for_member("m-0")
            .in_rack("rack-a");
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "rack rack-a: member m-0: Store error: Conflict writing m-0: object was modified"
        );

        let err = ControllerError::from(ProtocolViolation::LastSeed {
            member: "m-0".to_string(),
            rack: "rack-a".to_string(),
        })
        .in_rack("rack-a");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_deadline_is_retryable() {
        assert!(ControllerError::from(StoreError::DeadlineExceeded("list pods")).is_retryable());
        assert!(!ControllerError::from(StoreError::InvalidRecord("x".to_string())).is_retryable());
    }
}
