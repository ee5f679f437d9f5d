//! The collaborators the orchestrator drives.
//!
//! Provisioning and parameterization mutate the cluster or the local
//! manifests; the reader only observes. Each seam is a trait so a run can be
//! exercised end to end without a cluster.

use std::path::Path;

use async_trait::async_trait;

use crate::{
    experiment::{PodObservation, Selector},
    manifest::Substitution,
    poller::ProbeError,
    verdict::ChaosResult,
};

pub mod client;
pub mod kubectl;

/// Applies declarative manifests to the cluster.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Install the RBAC objects an experiment runs with, and confirm they
    /// exist.
    async fn apply_rbac(
        &self,
        source: &str,
        namespace: &str,
        experiment_name: &str,
    ) -> crate::Result<()>;

    /// Fetch a manifest from `source` into `local`.
    async fn fetch_manifest(&self, local: &Path, source: &str) -> crate::Result<()>;

    /// Apply the manifest at `path` into `namespace`.
    async fn apply_manifest(&self, path: &Path, namespace: &str) -> crate::Result<()>;
}

/// Rewrites manifest fields before submission.
#[async_trait]
pub trait Parameterizer: Send + Sync {
    /// Replace `old` with `new` anywhere in the manifest.
    async fn parameterize(&self, path: &Path, old: &str, new: &str) -> crate::Result<Substitution>;

    /// Replace `old` with `new` on the value line of the `field_key` entry.
    async fn parameterize_value(
        &self,
        path: &Path,
        field_key: &str,
        old: &str,
        new: &str,
    ) -> crate::Result<Substitution>;
}

/// Reads the cluster state a run depends on.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// List the pods matching `selector`. An empty list is not an error.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PodObservation>, ProbeError>;

    /// The UID of the named Chaos Engine, which the runner stamps on the
    /// job pods it spawns.
    async fn engine_uid(&self, namespace: &str, name: &str) -> crate::Result<String>;

    /// Read the complete logs of a pod.
    async fn pod_logs(&self, namespace: &str, pod: &str) -> crate::Result<String>;

    /// Fetch a Chaos Result by name. A missing result is an error.
    async fn chaos_result(&self, namespace: &str, name: &str) -> crate::Result<ChaosResult>;
}
