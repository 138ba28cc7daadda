//! Prints the ScyllaCluster CRD as YAML.
//!
//! With a path argument the CRD is written to that file instead:
//! `cargo run -p crds --bin crdgen -- config/crd/scyllacluster.yaml`

use anyhow::{Context, Result};
use crds::ScyllaCluster;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crd = ScyllaCluster::crd();
    let yaml = serde_yaml::to_string(&crd).context("error serializing ScyllaCluster CRD to yaml")?;

    match std::env::args().nth(1) {
        Some(path) => {
            std::fs::write(&path, &yaml).with_context(|| format!("error writing ScyllaCluster CRD to {path:?}"))?;
            eprintln!("ScyllaCluster CRD written to {path:?}");
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
