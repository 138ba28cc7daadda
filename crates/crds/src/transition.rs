//! Rules for what may change between two versions of a cluster spec.
//!
//! Mutability is declared per field in [`CLUSTER_FIELDS`] and [`RACK_FIELDS`].
//! A field missing from the tables is neither checked nor protected, so a new
//! spec field must be added here with the mutability it needs.

use std::cmp::Ordering;

use crate::cluster::ScyllaClusterSpec;
use crate::error::TransitionError;
use crate::rack::RackSpec;

/// How a field may change across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Any change is accepted.
    Mutable,
    /// Any change is rejected.
    Immutable,
    /// Growth is accepted; shrinking is governed by [`ScaleDownPolicy`].
    GrowOnly,
}

/// Whether member counts may shrink between versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleDownPolicy {
    /// Shrinking a rack is rejected at admission.
    #[default]
    Reject,
    /// Shrinking a rack is accepted; members are decommissioned one by one.
    Allow,
}

/// Observed difference of one field between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    Grew { old: i32, new: i32 },
    Shrank { old: i32, new: i32 },
    Modified,
}

/// One row of a mutability table.
pub struct FieldRule<T: 'static> {
    /// Field path relative to its owner, e.g. `version` or `storage`
    pub field: &'static str,
    pub mutability: Mutability,
    pub diff: fn(&T, &T) -> Change,
}

fn equality<V: PartialEq>(old: &V, new: &V) -> Change {
    if old == new { Change::Unchanged } else { Change::Modified }
}

fn count(old: i32, new: i32) -> Change {
    match new.cmp(&old) {
        Ordering::Equal => Change::Unchanged,
        Ordering::Greater => Change::Grew { old, new },
        Ordering::Less => Change::Shrank { old, new },
    }
}

/// Cluster-level fields, paths relative to `spec`.
pub const CLUSTER_FIELDS: &[FieldRule<ScyllaClusterSpec>] = &[
    FieldRule {
        field: "version",
        mutability: Mutability::Mutable,
        diff: |o, n| equality(&o.version, &n.version),
    },
    FieldRule {
        field: "repository",
        mutability: Mutability::Mutable,
        diff: |o, n| equality(&o.repository, &n.repository),
    },
    FieldRule {
        field: "repairs",
        mutability: Mutability::Mutable,
        diff: |o, n| equality(&o.repairs, &n.repairs),
    },
    FieldRule {
        field: "backups",
        mutability: Mutability::Mutable,
        diff: |o, n| equality(&o.backups, &n.backups),
    },
    // The datacenter name is baked into every member's ring topology.
    FieldRule {
        field: "datacenter.name",
        mutability: Mutability::Immutable,
        diff: |o, n| equality(&o.datacenter.name, &n.datacenter.name),
    },
];

/// Rack-level fields, paths relative to `spec.datacenter.racks[<name>]`.
pub const RACK_FIELDS: &[FieldRule<RackSpec>] = &[
    FieldRule {
        field: "members",
        mutability: Mutability::GrowOnly,
        diff: |o, n| count(o.members, n.members),
    },
    // Placement, storage and resources are fixed into the StatefulSet template
    // and its volume claims, which cannot be edited in place.
    FieldRule {
        field: "placement",
        mutability: Mutability::Immutable,
        diff: |o, n| equality(&o.placement, &n.placement),
    },
    FieldRule {
        field: "storage",
        mutability: Mutability::Immutable,
        diff: |o, n| equality(&o.storage, &n.storage),
    },
    FieldRule {
        field: "resources",
        mutability: Mutability::Immutable,
        diff: |o, n| equality(&o.resources, &n.resources),
    },
];

/// Compares spec versions against the mutability tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionGuard {
    pub scale_down: ScaleDownPolicy,
}

impl TransitionGuard {
    pub fn new(scale_down: ScaleDownPolicy) -> Self {
        Self { scale_down }
    }

    /// Validates the move from `old` to `new`, returning the first violation.
    ///
    /// Racks are matched by name. Every rack of `old` has to survive into
    /// `new`; racks only present in `new` are additions and always accepted.
    pub fn validate_transition(
        &self,
        old: &ScyllaClusterSpec,
        new: &ScyllaClusterSpec,
    ) -> Result<(), TransitionError> {
        for rule in CLUSTER_FIELDS {
            self.check(rule, old, new, &format!("spec.{}", rule.field))?;
        }

        let (old_racks, new_racks) = (&old.datacenter.racks, &new.datacenter.racks);
        for old_rack in old_racks {
            let Some(new_rack) = new.rack(&old_rack.name) else {
                return Err(TransitionError::RackRemoved {
                    rack: old_rack.name.clone(),
                });
            };
            for rule in RACK_FIELDS {
                let path = format!("spec.datacenter.racks[{}].{}", old_rack.name, rule.field);
                self.check(rule, old_rack, new_rack, &path)?;
            }
        }

        if new_racks.len() < old_racks.len() {
            return Err(TransitionError::RackCountDecreased {
                old: old_racks.len(),
                new: new_racks.len(),
            });
        }
        Ok(())
    }

    fn check<T>(
        &self,
        rule: &FieldRule<T>,
        old: &T,
        new: &T,
        path: &str,
    ) -> Result<(), TransitionError> {
        let change = (rule.diff)(old, new);
        match (rule.mutability, change) {
            (_, Change::Unchanged) | (Mutability::Mutable, _) | (Mutability::GrowOnly, Change::Grew { .. }) => Ok(()),
            (Mutability::GrowOnly, Change::Shrank { old, new }) => match self.scale_down {
                ScaleDownPolicy::Allow => Ok(()),
                ScaleDownPolicy::Reject => Err(TransitionError::ScaleDown {
                    path: path.to_string(),
                    old,
                    new,
                }),
            },
            (Mutability::Immutable | Mutability::GrowOnly, _) => Err(TransitionError::Immutable {
                path: path.to_string(),
            }),
        }
    }
}

/// Validates a transition with the default guard, which rejects scale-down.
pub fn validate_transition(
    old: &ScyllaClusterSpec,
    new: &ScyllaClusterSpec,
) -> Result<(), TransitionError> {
    TransitionGuard::default().validate_transition(old, new)
}

#[cfg(test)]
#[path = "transition_test.rs"]
mod transition_test;
