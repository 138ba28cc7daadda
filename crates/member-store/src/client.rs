//! Kubernetes-backed member store
//!
//! Reads pods and reads/writes member Services through the Kubernetes API.
//! Only the fields modelled in [`ServiceRecord`] are written; the rest of an
//! existing Service (cluster IP, session affinity, ...) is kept as stored.

use k8s_openapi::api::core::v1::{Pod, Service, ServicePort as KubeServicePort};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Client;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use tracing::debug;

use crate::error::StoreError;
use crate::member_store::MemberStore;
use crate::models::{OwnerRef, PodRecord, ServicePort, ServiceRecord};

/// Member store over the Kubernetes API
#[derive(Clone)]
pub struct KubeMemberStore {
    client: Client,
}

impl std::fmt::Debug for KubeMemberStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeMemberStore").finish_non_exhaustive()
    }
}

impl KubeMemberStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl MemberStore for KubeMemberStore {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodRecord>, StoreError> {
        debug!(namespace, selector, "Listing pods");
        let pods = self.pods(namespace).list(&ListParams::default().labels(selector)).await?;
        Ok(pods.items.iter().map(pod_record).collect())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<ServiceRecord>, StoreError> {
        let service = self.services(namespace).get_opt(name).await?;
        Ok(service.as_ref().map(service_record))
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<ServiceRecord>, StoreError> {
        debug!(namespace, selector, "Listing services");
        let services = self.services(namespace).list(&ListParams::default().labels(selector)).await?;
        Ok(services.items.iter().map(service_record).collect())
    }

    async fn create_service(&self, namespace: &str, service: &ServiceRecord) -> Result<ServiceRecord, StoreError> {
        let mut object = Service::default();
        write_record(&mut object, service);
        object.metadata.resource_version = None;

        debug!(namespace, service = %service.name, "Creating service");
        let created = self
            .services(namespace)
            .create(&PostParams::default(), &object)
            .await
            .map_err(|e| StoreError::from_kube(&service.name, e))?;
        Ok(service_record(&created))
    }

    async fn replace_service(&self, namespace: &str, service: &ServiceRecord) -> Result<ServiceRecord, StoreError> {
        let Some(expected) = service.resource_version.as_deref() else {
            return Err(StoreError::InvalidRecord(format!(
                "replace of {} without resourceVersion",
                service.name
            )));
        };

        let api = self.services(namespace);
        let mut object = api
            .get(&service.name)
            .await
            .map_err(|e| StoreError::from_kube(&service.name, e))?;
        if object.metadata.resource_version.as_deref() != Some(expected) {
            return Err(StoreError::Conflict(service.name.clone()));
        }
        write_record(&mut object, service);

        debug!(namespace, service = %service.name, resource_version = expected, "Replacing service");
        // The API server re-checks resourceVersion, so a write racing this one still conflicts.
        let replaced = api
            .replace(&service.name, &PostParams::default(), &object)
            .await
            .map_err(|e| StoreError::from_kube(&service.name, e))?;
        Ok(service_record(&replaced))
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!(namespace, service = name, "Deleting service");
        match self.services(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(StoreError::from_kube(name, e)),
        }
    }
}

pub(crate) fn pod_record(pod: &Pod) -> PodRecord {
    let status = pod.status.as_ref();
    PodRecord {
        name: pod.metadata.name.clone().unwrap_or_default(),
        labels: pod.metadata.labels.clone().unwrap_or_default(),
        address: status
            .and_then(|s| s.pod_ip.clone())
            .filter(|ip| !ip.is_empty()),
        ready: status
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Ready" && c.status == "True")
            }),
    }
}

pub(crate) fn service_record(service: &Service) -> ServiceRecord {
    let spec = service.spec.as_ref();
    ServiceRecord {
        name: service.metadata.name.clone().unwrap_or_default(),
        labels: service.metadata.labels.clone().unwrap_or_default(),
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
        ports: spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePort {
                        name: p.name.clone().unwrap_or_default(),
                        port: p.port,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        owner: service
            .metadata
            .owner_references
            .as_ref()
            .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)).or(refs.first()))
            .map(|r| OwnerRef {
                api_version: r.api_version.clone(),
                kind: r.kind.clone(),
                name: r.name.clone(),
                uid: r.uid.clone(),
            }),
        resource_version: service.metadata.resource_version.clone(),
    }
}

/// Copies the modelled fields of `record` onto `service`.
pub(crate) fn write_record(service: &mut Service, record: &ServiceRecord) {
    service.metadata.name = Some(record.name.clone());
    service.metadata.labels = Some(record.labels.clone());
    service.metadata.resource_version = record.resource_version.clone();
    service.metadata.owner_references = record.owner.as_ref().map(|owner| {
        vec![OwnerReference {
            api_version: owner.api_version.clone(),
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]
    });

    let spec = service.spec.get_or_insert_with(Default::default);
    if record.selector.is_empty() {
        spec.selector = None;
    } else {
        spec.selector = Some(record.selector.clone());
        // Members must be resolvable before they report ready.
        spec.publish_not_ready_addresses = Some(true);
    }
    spec.ports = Some(
        record
            .ports
            .iter()
            .map(|p| KubeServicePort {
                name: Some(p.name.clone()),
                port: p.port,
                target_port: Some(IntOrString::Int(p.port)),
                ..Default::default()
            })
            .collect(),
    );
}
