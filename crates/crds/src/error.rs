//! Errors raised by the pure spec checks and the intent protocol.

use thiserror::Error;

use crate::intent::{Actor, Workflow};

/// A single `ScyllaClusterSpec` is internally inconsistent.
///
/// Never retried: the spec has to be corrected and resubmitted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rack names must be unique, {0:?} is declared more than once")]
    DuplicateRackName(String),

    #[error("repair task {task:?} has invalid intensity {intensity:?}, expected an integer or decimal multiplier")]
    InvalidIntensity { task: String, intensity: String },

    #[error("task names must be unique across repairs and backups, {0:?} is used more than once")]
    DuplicateTaskName(String),

    #[error("multi datacenter seeds require host networking to be enabled")]
    MultiDcRequiresHostNetworking,
}

/// A spec update changes a field that may not change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{path} is immutable")]
    Immutable { path: String },

    #[error("rack {rack:?} cannot be removed")]
    RackRemoved { rack: String },

    #[error("rack count cannot decrease from {old} to {new}")]
    RackCountDecreased { old: usize, new: usize },

    #[error("{path} cannot decrease from {old} to {new}")]
    ScaleDown { path: String, old: i32, new: i32 },
}

impl TransitionError {
    /// Path of the offending field.
    pub fn field_path(&self) -> String {
        match self {
            Self::Immutable { path } | Self::ScaleDown { path, .. } => path.clone(),
            Self::RackRemoved { rack } => format!("spec.datacenter.racks[{rack}]"),
            Self::RackCountDecreased { .. } => "spec.datacenter.racks".to_string(),
        }
    }
}

/// An intent cannot be applied safely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("{actor} does not own the {label} label")]
    NotOwner { actor: Actor, label: &'static str },

    #[error("{workflow} reported finished but was never requested")]
    CompletionWithoutRequest { workflow: Workflow },

    #[error("member {member} is the last seed of rack {rack} and cannot be decommissioned")]
    LastSeed { member: String, rack: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("name {0:?} has no ordinal suffix")]
    MissingOrdinal(String),
}
