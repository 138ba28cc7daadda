//! Scylla Operator CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the Scylla cluster controller,
//! together with the pure checks that gate every spec change:
//! - `validation`: static correctness of a single `ScyllaClusterSpec`
//! - `transition`: what may change between two versions of a spec
//! - `intent`: the label protocol shared by the controller and member agents

pub mod cluster;
pub mod error;
pub mod intent;
pub mod labels;
pub mod naming;
pub mod rack;
pub mod tasks;
pub mod transition;
pub mod validation;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;

pub use cluster::*;
pub use error::{NamingError, ProtocolViolation, TransitionError, ValidationError};
pub use intent::{Actor, Applied, Intent, IntentConsumer, IntentMessage, MemberIntents, Phase, Workflow};
pub use rack::*;
pub use tasks::*;
pub use transition::{ScaleDownPolicy, TransitionGuard, validate_transition};
pub use validation::validate;
