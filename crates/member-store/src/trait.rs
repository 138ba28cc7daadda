//! MemberStore trait for mocking
//!
//! This trait abstracts the Kubernetes API so the reconciler can be unit tested
//! against an in-memory store. `KubeMemberStore` implements it over the real API.

use crate::error::StoreError;
use crate::models::{PodRecord, ServiceRecord};

/// Operations the controller needs on pods and member Services.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Selectors use the Kubernetes equality form `k=v,k=v`.
#[async_trait::async_trait]
pub trait MemberStore: Send + Sync {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodRecord>, StoreError>;

    /// Returns `None` when the Service does not exist.
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<ServiceRecord>, StoreError>;
    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<ServiceRecord>, StoreError>;
    /// Fails with `Conflict` when a Service with the same name already exists.
    async fn create_service(&self, namespace: &str, service: &ServiceRecord) -> Result<ServiceRecord, StoreError>;
    /// Writes `service` if its `resource_version` is still current, otherwise fails with `Conflict`.
    async fn replace_service(&self, namespace: &str, service: &ServiceRecord) -> Result<ServiceRecord, StoreError>;
    /// Deleting a missing Service succeeds.
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
