//! Cluster reads through the Kubernetes API.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{ApiResource, DynamicObject, ListParams, LogParams},
    config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
    core::GroupVersionKind,
    Api, Client,
};
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use super::ClusterReader;
use crate::{
    experiment::{PodObservation, PodPhase, Selector},
    poller::ProbeError,
    verdict::{ChaosResult, ChaosResultStatus},
};

const CHAOS_GROUP: &str = "litmuschaos.io";
const CHAOS_VERSION: &str = "v1alpha1";
const CHAOS_RESULT_KIND: &str = "ChaosResult";
const CHAOS_RESULT_PLURAL: &str = "chaosresults";
const CHAOS_ENGINE_KIND: &str = "ChaosEngine";
const CHAOS_ENGINE_PLURAL: &str = "chaosengines";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unable to read kubeconfig {:?}: {}", path, source))]
    ReadKubeconfig {
        path: PathBuf,
        source: KubeconfigError,
    },

    #[snafu(display("unable to load kubeconfig: {}", source))]
    LoadKubeconfig { source: KubeconfigError },

    #[snafu(display("unable to infer cluster configuration: {}", source))]
    InferConfig { source: kube::config::InferConfigError },

    #[snafu(display("unable to build the API client: {}", source))]
    BuildClient { source: kube::Error },

    #[snafu(display("chaos engine {:?} has no UID", name))]
    MissingUid { name: String },

    #[snafu(display("chaos result {:?} has a malformed status: {}", name, source))]
    MalformedStatus {
        name: String,
        source: serde_json::Error,
    },
}

/// Observes pods and Chaos Results through the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
    chaos_engine: ApiResource,
    chaos_result: ApiResource,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        let resource = |kind, plural| {
            let gvk = GroupVersionKind::gvk(CHAOS_GROUP, CHAOS_VERSION, kind);
            ApiResource::from_gvk_with_plural(&gvk, plural)
        };
        Self {
            client,
            chaos_engine: resource(CHAOS_ENGINE_KIND, CHAOS_ENGINE_PLURAL),
            chaos_result: resource(CHAOS_RESULT_KIND, CHAOS_RESULT_PLURAL),
        }
    }

    /// Connect with the kubeconfig at `path`, or with the inferred
    /// configuration when there is no such file.
    pub async fn connect(path: Option<&Path>) -> Result<Self, Error> {
        let config = match path.filter(|path| path.exists()) {
            Some(path) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).context(ReadKubeconfigSnafu { path })?;
                kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context(LoadKubeconfigSnafu)?
            }
            None => kube::Config::infer().await.context(InferConfigSnafu)?,
        };
        info!(message = "Connecting to cluster.", cluster_url = %config.cluster_url);
        let client = Client::try_from(config).context(BuildClientSnafu)?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn dynamic(&self, namespace: &str, resource: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }
}

impl std::fmt::Debug for KubeClusterReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterReader")
            .field("chaos_engine", &self.chaos_engine.kind)
            .field("chaos_result", &self.chaos_result.kind)
            .finish_non_exhaustive()
    }
}

/// Requests the API server rejected outright won't succeed on retry;
/// everything else (not found yet, throttling, server or transport errors)
/// might.
fn classify(error: kube::Error) -> ProbeError {
    let rejected = matches!(
        &error,
        kube::Error::Api(response) if matches!(response.code, 400 | 401 | 403 | 422)
    );
    if rejected {
        ProbeError::permanent(error)
    } else {
        ProbeError::transient(error)
    }
}

fn observe(pod: Pod) -> PodObservation {
    let phase = pod
        .status
        .and_then(|status| status.phase)
        .map_or(PodPhase::Unknown(String::new()), |phase| PodPhase::parse(&phase));
    PodObservation::new(pod.metadata.name.unwrap_or_default(), phase)
}

fn uid_of(object: DynamicObject) -> Result<String, Error> {
    let name = object.metadata.name.unwrap_or_default();
    object
        .metadata
        .uid
        .filter(|uid| !uid.is_empty())
        .ok_or(Error::MissingUid { name })
}

fn chaos_result_from(object: DynamicObject) -> Result<ChaosResult, Error> {
    let name = object.metadata.name.unwrap_or_default();
    let status = match object.data.get("status") {
        Some(status) => ChaosResultStatus::deserialize(status)
            .context(MalformedStatusSnafu { name: name.clone() })?,
        None => ChaosResultStatus::default(),
    };
    Ok(ChaosResult { name, status })
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PodObservation>, ProbeError> {
        let params = ListParams::default().labels(selector.as_str());
        let pods = self.pods(namespace).list(&params).await.map_err(classify)?;
        Ok(pods.items.into_iter().map(observe).collect())
    }

    async fn engine_uid(&self, namespace: &str, name: &str) -> crate::Result<String> {
        let object = self.dynamic(namespace, &self.chaos_engine).get(name).await?;
        Ok(uid_of(object)?)
    }

    async fn pod_logs(&self, namespace: &str, pod: &str) -> crate::Result<String> {
        let logs = self
            .pods(namespace)
            .logs(pod, &LogParams::default())
            .await?;
        Ok(logs)
    }

    async fn chaos_result(&self, namespace: &str, name: &str) -> crate::Result<ChaosResult> {
        let object = self.dynamic(namespace, &self.chaos_result).get(name).await?;
        Ok(chaos_result_from(object)?)
    }
}
