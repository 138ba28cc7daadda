//! ScyllaCluster CRD
//!
//! Declares a single-datacenter Scylla cluster made of racks.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::rack::RackSpec;
use crate::tasks::{BackupTaskSpec, RepairTaskSpec};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "scylla.scylladb.com",
    version = "v1",
    kind = "ScyllaCluster",
    plural = "scyllaclusters",
    shortname = "sc",
    namespaced,
    status = "ScyllaClusterStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Datacenter", "type":"string", "jsonPath":".spec.datacenter.name"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ScyllaClusterSpec {
    /// Scylla image version (tag). Mutable across major, minor and patch releases.
    pub version: String,

    /// Image repository (defaults to the upstream repository when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Scylla Manager agent version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,

    /// Run Scylla in developer mode (relaxed resource checks)
    #[serde(default)]
    pub developer_mode: bool,

    /// Pin Scylla shards to dedicated cores
    #[serde(default)]
    pub cpuset: bool,

    /// Remove nodes that no longer back any member from the ring
    #[serde(default)]
    pub automatic_orphaned_node_cleanup: bool,

    /// Networking options
    #[serde(default)]
    pub network: NetworkSpec,

    /// The datacenter this cluster object manages
    pub datacenter: DatacenterSpec,

    /// Scheduled repair tasks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<RepairTaskSpec>,

    /// Scheduled backup tasks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<BackupTaskSpec>,

    /// Seeds of remote datacenters this datacenter bootstraps from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_dc_cluster: Option<MultiDcClusterSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Members use the node's network namespace and address
    #[serde(default)]
    pub host_networking: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterSpec {
    /// Datacenter name. Immutable once the cluster exists.
    pub name: String,

    /// Racks of the datacenter, each mapped to a failure domain
    #[serde(default)]
    pub racks: Vec<RackSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MultiDcClusterSpec {
    /// Externally reachable seed addresses of remote datacenters
    #[serde(default)]
    pub seeds: Vec<String>,
}

impl ScyllaClusterSpec {
    /// Seeds of remote datacenters, empty when multi-dc is not configured.
    pub fn multi_dc_seeds(&self) -> &[String] {
        self.multi_dc_cluster
            .as_ref()
            .map(|m| m.seeds.as_slice())
            .unwrap_or_default()
    }

    /// Looks up a rack by name.
    pub fn rack(&self, name: &str) -> Option<&RackSpec> {
        self.datacenter.racks.iter().find(|r| r.name == name)
    }
}

/// ScyllaClusterStatus defines the observed state of a cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScyllaClusterStatus {
    /// Per-rack member accounting, keyed by rack name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub racks: BTreeMap<String, RackStatus>,

    /// Conditions of the latest reconciliation pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ClusterCondition>,

    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RackStatus {
    /// Members with an identity record
    pub members: i32,

    /// Members reporting ready
    pub ready_members: i32,

    /// Members carrying the seed label
    pub seeds: i32,

    /// Members with a pending decommission request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decommissioning: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: ConditionType,

    /// Whether the condition holds
    pub status: ConditionStatus,

    /// Machine readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human readable details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the status last flipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    /// Every rack has its identity records in place
    Available,
    /// The stored spec passes validation
    SpecValid,
    /// An agent cannot safely act on an intent; operator action required
    ProtocolViolation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl ScyllaClusterStatus {
    /// Returns the condition of the given type, if recorded.
    pub fn condition(&self, type_: ConditionType) -> Option<&ClusterCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Sets a condition, keeping `last_transition_time` when the status did not flip.
    pub fn set_condition(&mut self, mut condition: ClusterCondition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
        self.conditions.sort_by_key(|c| c.type_);
    }
}
