//! Member Store
//!
//! Access to the pods and member Services of a Scylla cluster.
//!
//! The controller only talks to the [`MemberStore`] trait. [`KubeMemberStore`]
//! implements it over the Kubernetes API and, with the `test-util` feature,
//! [`MockMemberStore`] implements it in memory for unit tests.
//!
//! Writes are optimistic: a Service is replaced with the resourceVersion it
//! was read at, and a concurrent write in between surfaces as
//! [`StoreError::Conflict`].

pub mod client;
pub mod deadline;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod member_store;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeMemberStore;
pub use deadline::with_deadline;
pub use error::StoreError;
pub use member_store::MemberStore;
pub use models::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockMemberStore, Write};
