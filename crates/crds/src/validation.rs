//! Static validation of a single cluster spec.
//!
//! Used by the admission webhook before a spec is persisted and again by the
//! reconciler before acting on it.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::cluster::ScyllaClusterSpec;
use crate::error::ValidationError;

/// Repair intensity is a dimensionless multiplier, so size suffixes are rejected.
#[allow(clippy::expect_used, reason = "the pattern is a literal")]
static INTENSITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("intensity pattern compiles")
});

/// Validates `spec`, failing on the first violation.
///
/// Checks run in a fixed order:
/// 1. rack names are unique
/// 2. every repair intensity is an integer or decimal
/// 3. task names are unique across repairs and backups
/// 4. multi-dc seeds are only used with host networking
pub fn validate(spec: &ScyllaClusterSpec) -> Result<(), ValidationError> {
    check_rack_names(spec)?;
    check_repair_intensity(spec)?;
    check_task_names(spec)?;
    check_multi_dc(spec)?;
    Ok(())
}

fn check_rack_names(spec: &ScyllaClusterSpec) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for rack in &spec.datacenter.racks {
        if !seen.insert(rack.name.as_str()) {
            return Err(ValidationError::DuplicateRackName(rack.name.clone()));
        }
    }
    Ok(())
}

fn check_repair_intensity(spec: &ScyllaClusterSpec) -> Result<(), ValidationError> {
    match spec
        .repairs
        .iter()
        .find(|r| !is_valid_intensity(&r.intensity))
    {
        Some(repair) => Err(ValidationError::InvalidIntensity {
            task: repair.name().to_string(),
            intensity: repair.intensity.clone(),
        }),
        None => Ok(()),
    }
}

fn check_task_names(spec: &ScyllaClusterSpec) -> Result<(), ValidationError> {
    let names = spec
        .repairs
        .iter()
        .map(|r| r.name())
        .chain(spec.backups.iter().map(|b| b.name()));

    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateTaskName(name.to_string()));
        }
    }
    Ok(())
}

fn check_multi_dc(spec: &ScyllaClusterSpec) -> Result<(), ValidationError> {
    if !spec.multi_dc_seeds().is_empty() && !spec.network.host_networking {
        return Err(ValidationError::MultiDcRequiresHostNetworking);
    }
    Ok(())
}

/// Whether `intensity` is a plain integer or decimal.
pub fn is_valid_intensity(intensity: &str) -> bool {
    INTENSITY_PATTERN.is_match(intensity)
}

#[cfg(test)]
#[path = "validation_test.rs"]
mod validation_test;
