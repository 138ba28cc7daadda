//! Deterministic object names.

use crate::error::NamingError;

/// Name of the StatefulSet backing a rack. Its pods are `{name}-{ordinal}`.
pub fn rack_stateful_set_name(cluster: &str, datacenter: &str, rack: &str) -> String {
    format!("{cluster}-{datacenter}-{rack}")
}

/// Name of the member Service acting as the identity of a pod.
pub fn member_service_name(pod_name: &str) -> String {
    pod_name.to_string()
}

/// Name of the Service published for the `index`-th remote seed.
pub fn multi_dc_seed_service_name(cluster: &str, datacenter: &str, index: usize) -> String {
    format!("{cluster}-{datacenter}-multi-dc-seed-{index}")
}

/// Extracts the StatefulSet ordinal from a pod or member Service name.
///
/// The suffix after the last `-` must be plain decimal digits.
pub fn index_from_name(name: &str) -> Result<i32, NamingError> {
    name.rsplit_once('-')
        .map(|(_, suffix)| suffix)
        .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|suffix| suffix.parse::<i32>().ok())
        .ok_or_else(|| NamingError::MissingOrdinal(name.to_string()))
}
