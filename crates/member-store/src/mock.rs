//! Mock MemberStore for unit testing
//!
//! Stores pods and Services in memory, keyed by namespace and name, and hands
//! out monotonically increasing resourceVersions the way the API server does.
//! Tests can inject a failing pod list or a concurrent write racing the next
//! replace of a Service, and count the writes the controller issued.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::member_store::MemberStore;
use crate::models::{PodRecord, ServiceRecord};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// Kind of write recorded by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Create(String),
    Replace(String),
    Delete(String),
}

/// Mock MemberStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockMemberStore {
    pub(crate) pods: Arc<Mutex<HashMap<Key, PodRecord>>>,
    pub(crate) services: Arc<Mutex<HashMap<Key, ServiceRecord>>>,
    pub(crate) writes: Arc<Mutex<Vec<Write>>>,
    /// Label changes a simulated agent applies right before upcoming replaces, one per replace
    pub(crate) racing_writes: Arc<Mutex<HashMap<String, Vec<(String, String)>>>>,
    /// Selectors whose pod list fails
    pub(crate) failing_selectors: Arc<Mutex<Vec<String>>>,
    pub(crate) next_version: Arc<Mutex<u64>>,
}

impl MockMemberStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a pod (for test setup)
    pub fn add_pod(&self, namespace: &str, pod: PodRecord) {
        self.pods.lock().unwrap().insert(key(namespace, &pod.name), pod);
    }

    /// Remove a pod, as when its StatefulSet scales down
    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods.lock().unwrap().remove(&key(namespace, name));
    }

    /// Store a Service directly, without counting it as a controller write
    pub fn add_service(&self, namespace: &str, mut service: ServiceRecord) {
        service.resource_version = Some(self.next_version());
        self.services.lock().unwrap().insert(key(namespace, &service.name), service);
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<ServiceRecord> {
        self.services.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// All Services of `namespace`, sorted by name
    pub fn services(&self, namespace: &str) -> Vec<ServiceRecord> {
        let mut services: Vec<_> = self
            .services
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, s)| s.clone())
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    /// Sets a label on a stored Service as an agent would, bumping its resourceVersion
    pub fn set_service_label(&self, namespace: &str, name: &str, label: &str, value: &str) {
        let version = self.next_version();
        if let Some(service) = self.services.lock().unwrap().get_mut(&key(namespace, name)) {
            service.labels.insert(label.to_string(), value.to_string());
            service.resource_version = Some(version);
        }
    }

    /// Queues an agent write of `label` racing one upcoming replace of `name`
    pub fn race_next_replace(&self, name: &str, label: &str, value: &str) {
        self.racing_writes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push((label.to_string(), value.to_string()));
    }

    /// Makes every pod list with exactly `selector` fail
    pub fn fail_pod_list(&self, selector: &str) {
        self.failing_selectors.lock().unwrap().push(selector.to_string());
    }

    /// Writes issued through the trait, in order
    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub(crate) fn next_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }

    fn record(&self, write: Write) {
        self.writes.lock().unwrap().push(write);
    }
}

/// Parses a `k=v,k=v` equality selector.
fn parse_selector(selector: &str) -> BTreeMap<&str, &str> {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .filter_map(|term| term.split_once('='))
        .collect()
}

fn matches(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    parse_selector(selector)
        .into_iter()
        .all(|(k, v)| labels.get(k).is_some_and(|value| value == v))
}

#[async_trait::async_trait]
impl MemberStore for MockMemberStore {
    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<PodRecord>, StoreError> {
        if self.failing_selectors.lock().unwrap().iter().any(|s| s == selector) {
            return Err(StoreError::Kube(kube::Error::Service(
                std::io::Error::other("etcdserver: request timed out").into(),
            )));
        }
        let mut pods: Vec<_> = self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), pod)| ns == namespace && matches(&pod.labels, selector))
            .map(|(_, pod)| pod.clone())
            .collect();
        pods.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(pods)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<ServiceRecord>, StoreError> {
        Ok(self.service(namespace, name))
    }

    async fn list_services(&self, namespace: &str, selector: &str) -> Result<Vec<ServiceRecord>, StoreError> {
        Ok(self
            .services(namespace)
            .into_iter()
            .filter(|s| matches(&s.labels, selector))
            .collect())
    }

    async fn create_service(&self, namespace: &str, service: &ServiceRecord) -> Result<ServiceRecord, StoreError> {
        let version = self.next_version();
        let mut services = self.services.lock().unwrap();
        let k = key(namespace, &service.name);
        if services.contains_key(&k) {
            return Err(StoreError::Conflict(service.name.clone()));
        }
        let mut stored = service.clone();
        stored.resource_version = Some(version);
        services.insert(k, stored.clone());
        drop(services);

        self.record(Write::Create(service.name.clone()));
        Ok(stored)
    }

    async fn replace_service(&self, namespace: &str, service: &ServiceRecord) -> Result<ServiceRecord, StoreError> {
        let Some(expected) = service.resource_version.clone() else {
            return Err(StoreError::InvalidRecord(format!(
                "replace of {} without resourceVersion",
                service.name
            )));
        };

        let racing = self
            .racing_writes
            .lock()
            .unwrap()
            .get_mut(&service.name)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));
        if let Some((label, value)) = racing {
            self.set_service_label(namespace, &service.name, &label, &value);
        }

        let version = self.next_version();
        let mut services = self.services.lock().unwrap();
        let Some(current) = services.get_mut(&key(namespace, &service.name)) else {
            return Err(StoreError::NotFound(service.name.clone()));
        };
        if current.resource_version.as_deref() != Some(expected.as_str()) {
            return Err(StoreError::Conflict(service.name.clone()));
        }
        let mut stored = service.clone();
        stored.resource_version = Some(version);
        *current = stored.clone();
        drop(services);

        self.record(Write::Replace(service.name.clone()));
        Ok(stored)
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.services.lock().unwrap().remove(&key(namespace, name));
        self.record(Write::Delete(name.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> ServiceRecord {
        ServiceRecord {
            name: name.to_string(),
            labels: BTreeMap::from([("scylla/cluster".to_string(), "c".to_string())]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let store = MockMemberStore::new();
        let created = store.create_service("ns", &service("m-0")).await.unwrap();

        store.set_service_label("ns", "m-0", "scylla/decommissioned", "true");

        let err = store.replace_service("ns", &created).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(name) if name == "m-0"));
        assert_eq!(store.writes(), [Write::Create("m-0".to_string())]);
    }

    #[tokio::test]
    async fn test_racing_write_lands_before_replace() {
        let store = MockMemberStore::new();
        let created = store.create_service("ns", &service("m-0")).await.unwrap();
        store.race_next_replace("m-0", "scylla/replace", "true");

        assert!(store.replace_service("ns", &created).await.is_err());
        let stored = store.service("ns", "m-0").unwrap();
        assert_eq!(stored.label("scylla/replace"), Some("true"));

        // The race is consumed; a fresh read replaces cleanly.
        assert!(store.replace_service("ns", &stored).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_pods_filters_by_selector() {
        let store = MockMemberStore::new();
        for (name, rack) in [("c-dc-a-0", "a"), ("c-dc-b-0", "b")] {
            store.add_pod(
                "ns",
                PodRecord {
                    name: name.to_string(),
                    labels: BTreeMap::from([("scylla/rack".to_string(), rack.to_string())]),
                    ..Default::default()
                },
            );
        }

        let pods = store.list_pods("ns", "scylla/rack=a").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(pods[0].name, "c-dc-a-0");
        assert!(store.list_pods("other", "scylla/rack=a").await.unwrap().is_empty());

        store.fail_pod_list("scylla/rack=a");
        assert!(matches!(
            store.list_pods("ns", "scylla/rack=a").await,
            Err(StoreError::Kube(_))
        ));
    }
}
