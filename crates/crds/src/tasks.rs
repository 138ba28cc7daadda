//! Scylla Manager task definitions
//!
//! Tasks are only declared here; scheduling and execution belong to
//! Scylla Manager.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerTaskSpec {
    /// Task name, unique across repairs and backups
    pub name: String,

    /// Start date in RFC3339 or `now[+duration]` form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// Repeat interval, e.g. "7d"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Retries on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_retries: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepairTaskSpec {
    #[serde(flatten)]
    pub scheduler: SchedulerTaskSpec,

    /// Throughput multiplier: a plain integer or decimal, never a size
    #[serde(default = "default_intensity")]
    pub intensity: String,

    /// Ranges repaired in parallel (0 = maximum)
    #[serde(default)]
    pub parallel: i64,

    /// Tables below this size are repaired in one go
    #[serde(default = "default_small_table_threshold")]
    pub small_table_threshold: String,

    /// Stop on the first error
    #[serde(default)]
    pub fail_fast: bool,

    /// Datacenter glob patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dc: Vec<String>,

    /// Keyspace/table glob patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyspace: Vec<String>,
}

fn default_intensity() -> String {
    "1".to_string()
}

fn default_small_table_threshold() -> String {
    "1GiB".to_string()
}

impl Default for RepairTaskSpec {
    fn default() -> Self {
        Self {
            scheduler: SchedulerTaskSpec::default(),
            intensity: default_intensity(),
            parallel: 0,
            small_table_threshold: default_small_table_threshold(),
            fail_fast: false,
            dc: Vec::new(),
            keyspace: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BackupTaskSpec {
    #[serde(flatten)]
    pub scheduler: SchedulerTaskSpec,

    /// Backup locations in `[dc:]provider:bucket` form
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<String>,

    /// Snapshots kept per location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<i64>,

    /// Upload rate limits per datacenter
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rate_limit: Vec<String>,

    /// Datacenter glob patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dc: Vec<String>,

    /// Keyspace/table glob patterns
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyspace: Vec<String>,
}

impl RepairTaskSpec {
    pub fn name(&self) -> &str {
        &self.scheduler.name
    }
}

impl BackupTaskSpec {
    pub fn name(&self) -> &str {
        &self.scheduler.name
    }
}
