//! Store-level views of pods and member Services.
//!
//! These carry only the fields the controller reads or owns. Everything else on
//! the underlying Kubernetes objects is preserved by the store on write.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A Scylla pod as seen by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRecord {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Pod IP, once assigned
    pub address: Option<String>,
    /// `Ready` condition is true
    #[serde(default)]
    pub ready: bool,
}

/// Owner of a Service, always the `ScyllaCluster` it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: i32,
}

/// A member identity or multi-dc seed Service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Pod selector, empty for selector-less seed Services
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    pub owner: Option<OwnerRef>,
    /// Concurrency token; `None` until the record has been stored
    pub resource_version: Option<String>,
}

impl ServiceRecord {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Whether `other` has the same content, ignoring the concurrency token.
    pub fn same_content(&self, other: &ServiceRecord) -> bool {
        self.name == other.name
            && self.labels == other.labels
            && self.selector == other.selector
            && self.ports == other.ports
            && self.owner == other.owner
    }
}
