//! Provisioning through `kubectl`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use k8s_test_framework::{Framework, Interface};
use snafu::{ResultExt, Snafu};

use super::Provisioner;
use crate::manifest::{self, Substitution, DEFAULT_NAMESPACE};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unable to fetch {}: {}", url, source))]
    FetchRequest { url: String, source: reqwest::Error },

    #[snafu(display("unable to read {:?}: {}", path, source))]
    ReadSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("unable to write {:?}: {}", path, source))]
    WriteManifest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("kubectl {} failed: {}", operation, source))]
    Kubectl {
        operation: &'static str,
        source: crate::Error,
    },

    #[snafu(display("no RBAC objects found for experiment {:?}", experiment))]
    RbacMissing { experiment: String },
}

/// Provisions manifests with `kubectl`, fetching remote ones over HTTP.
#[derive(Debug, Clone)]
pub struct KubectlProvisioner {
    framework: Framework,
    http: reqwest::Client,
}

impl KubectlProvisioner {
    pub fn new(interface: Interface) -> Self {
        Self {
            framework: Framework::new(interface),
            http: reqwest::Client::new(),
        }
    }

    /// Read a manifest from a URL or a local path.
    async fn read_source(&self, source: &str) -> Result<String, Error> {
        if is_remote(source) {
            self.http
                .get(source)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .context(FetchRequestSnafu { url: source })?
                .text()
                .await
                .context(FetchRequestSnafu { url: source })
        } else {
            tokio::fs::read_to_string(source)
                .await
                .context(ReadSourceSnafu { path: source })
        }
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[async_trait]
impl Provisioner for KubectlProvisioner {
    async fn apply_rbac(
        &self,
        source: &str,
        namespace: &str,
        experiment_name: &str,
    ) -> crate::Result<()> {
        let text = self.read_source(source).await?;
        let (text, substitution) =
            manifest::substitute(&text, DEFAULT_NAMESPACE, &format!("namespace: {}", namespace));
        if substitution == Substitution::Missing {
            debug!(message = "RBAC manifest has no default namespace.", %source);
        }

        let file = self
            .framework
            .apply_str(namespace, &text)
            .await
            .context(KubectlSnafu { operation: "apply" })?;
        let objects = self
            .framework
            .get(namespace, file.path())
            .await
            .context(KubectlSnafu { operation: "get" })?;
        if objects.is_empty() {
            return Err(Error::RbacMissing {
                experiment: experiment_name.to_owned(),
            }
            .into());
        }

        info!(message = "RBAC objects in place.", experiment = %experiment_name, ?objects);
        Ok(())
    }

    async fn fetch_manifest(&self, local: &Path, source: &str) -> crate::Result<()> {
        let text = self.read_source(source).await?;
        tokio::fs::write(local, text)
            .await
            .context(WriteManifestSnafu { path: local })?;
        debug!(message = "Manifest fetched.", %source, path = ?local);
        Ok(())
    }

    async fn apply_manifest(&self, path: &Path, namespace: &str) -> crate::Result<()> {
        self.framework
            .apply(namespace, path)
            .await
            .context(KubectlSnafu { operation: "apply" })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_sources() {
        assert!(is_remote("https://hub.litmuschaos.io/api/chaos/master?file=rbac.yaml"));
        assert!(is_remote("http://localhost:8080/engine.yaml"));
        assert!(!is_remote("/tmp/engine.yaml"));
        assert!(!is_remote("manifests/engine.yaml"));
    }

    #[tokio::test]
    async fn fetches_local_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.yaml");
        let local = dir.path().join("pod-delete.yaml");
        std::fs::write(&source, "kind: ChaosExperiment\n").unwrap();

        let provisioner = KubectlProvisioner::new(Interface::default());
        provisioner
            .fetch_manifest(&local, source.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&local).unwrap(),
            "kind: ChaosExperiment\n"
        );
    }

    #[tokio::test]
    async fn missing_local_manifest_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = KubectlProvisioner::new(Interface::default());
        let error = provisioner
            .fetch_manifest(&dir.path().join("out.yaml"), "/nonexistent/engine.yaml")
            .await
            .unwrap_err();
        assert!(error.to_string().starts_with("unable to read"));
    }

    #[tokio::test]
    async fn failing_kubectl_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "kind: ChaosEngine\n").unwrap();

        let provisioner = KubectlProvisioner::new(Interface::new("false"));
        let error = provisioner.apply_manifest(&path, "litmus").await.unwrap_err();
        assert!(error.to_string().starts_with("kubectl apply failed"));
    }
}
