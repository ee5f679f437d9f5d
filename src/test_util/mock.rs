//! An in-memory cluster standing in for every collaborator.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    cluster::{ClusterReader, Parameterizer, Provisioner},
    experiment::{PodObservation, Selector},
    manifest::Substitution,
    poller::ProbeError,
    verdict::ChaosResult,
};

/// A collaborator call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ApplyRbac {
        source: String,
        namespace: String,
        experiment: String,
    },
    FetchManifest {
        path: PathBuf,
        source: String,
    },
    ApplyManifest {
        path: PathBuf,
        namespace: String,
    },
    Parameterize {
        path: PathBuf,
        key: Option<String>,
        old: String,
        new: String,
    },
    ListPods {
        selector: String,
    },
    EngineUid {
        name: String,
    },
    PodLogs {
        pod: String,
    },
    ChaosResult {
        name: String,
    },
}

/// The UID the fake cluster assigns to the engine `name`.
pub fn engine_uid(name: &str) -> String {
    format!("uid-{}", name)
}

#[derive(Debug, Clone)]
enum Listing {
    Pods(Vec<PodObservation>),
    Transient(String),
    Permanent(String),
}

impl From<Result<Vec<PodObservation>, ProbeError>> for Listing {
    fn from(result: Result<Vec<PodObservation>, ProbeError>) -> Self {
        match result {
            Ok(pods) => Listing::Pods(pods),
            Err(ProbeError::Transient { source }) => Listing::Transient(source.to_string()),
            Err(ProbeError::Permanent { source }) => Listing::Permanent(source.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<Call>,
    manifests: HashMap<String, String>,
    submitted: HashMap<PathBuf, String>,
    listings: HashMap<String, Vec<Listing>>,
    logs: HashMap<String, String>,
    chaos_result: Option<ChaosResult>,
    fail_apply_rbac: bool,
    fail_apply: HashSet<PathBuf>,
    fail_logs: bool,
}

/// Scripted cluster shared between clones.
///
/// Pod listings are answered from a per-selector script, one entry per
/// query, with the last entry repeating forever. Unscripted selectors list
/// no pods.
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    inner: Arc<Mutex<Inner>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Serve `content` when `source` is fetched.
    pub fn manifest(&self, source: &str, content: &str) {
        self.lock()
            .manifests
            .insert(source.to_owned(), content.to_owned());
    }

    /// Fetching `source` succeeds but writes nothing.
    pub fn forget_manifest(&self, source: &str) {
        self.lock().manifests.remove(source);
    }

    pub fn pods(&self, selector: &str, script: Vec<Result<Vec<PodObservation>, ProbeError>>) {
        let script = script.into_iter().map(Listing::from).collect();
        self.lock().listings.insert(selector.to_owned(), script);
    }

    pub fn logs(&self, pod: &str, logs: &str) {
        self.lock().logs.insert(pod.to_owned(), logs.to_owned());
    }

    pub fn set_chaos_result(&self, result: ChaosResult) {
        self.lock().chaos_result = Some(result);
    }

    pub fn no_chaos_result(&self) {
        self.lock().chaos_result = None;
    }

    pub fn fail_apply_rbac(&self) {
        self.lock().fail_apply_rbac = true;
    }

    pub fn fail_apply(&self, path: &Path) {
        self.lock().fail_apply.insert(path.to_owned());
    }

    pub fn fail_logs(&self) {
        self.lock().fail_logs = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// The content of the manifest at `path` when it was applied.
    pub fn submitted(&self, path: &Path) -> Option<String> {
        self.lock().submitted.get(path).cloned()
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl Provisioner for FakeCluster {
    async fn apply_rbac(
        &self,
        source: &str,
        namespace: &str,
        experiment_name: &str,
    ) -> crate::Result<()> {
        self.record(Call::ApplyRbac {
            source: source.to_owned(),
            namespace: namespace.to_owned(),
            experiment: experiment_name.to_owned(),
        });
        if self.lock().fail_apply_rbac {
            return Err(format!("no RBAC objects found for {}", experiment_name).into());
        }
        Ok(())
    }

    async fn fetch_manifest(&self, local: &Path, source: &str) -> crate::Result<()> {
        self.record(Call::FetchManifest {
            path: local.to_owned(),
            source: source.to_owned(),
        });
        let content = self.lock().manifests.get(source).cloned();
        if let Some(content) = content {
            tokio::fs::write(local, content).await?;
        }
        Ok(())
    }

    async fn apply_manifest(&self, path: &Path, namespace: &str) -> crate::Result<()> {
        self.record(Call::ApplyManifest {
            path: path.to_owned(),
            namespace: namespace.to_owned(),
        });
        if self.lock().fail_apply.contains(path) {
            return Err(format!("admission webhook denied {:?}", path).into());
        }
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            self.lock().submitted.insert(path.to_owned(), content);
        }
        Ok(())
    }
}

#[async_trait]
impl Parameterizer for FakeCluster {
    async fn parameterize(&self, path: &Path, old: &str, new: &str) -> crate::Result<Substitution> {
        self.record(Call::Parameterize {
            path: path.to_owned(),
            key: None,
            old: old.to_owned(),
            new: new.to_owned(),
        });
        Ok(Substitution::Replaced(1))
    }

    async fn parameterize_value(
        &self,
        path: &Path,
        field_key: &str,
        old: &str,
        new: &str,
    ) -> crate::Result<Substitution> {
        self.record(Call::Parameterize {
            path: path.to_owned(),
            key: Some(field_key.to_owned()),
            old: old.to_owned(),
            new: new.to_owned(),
        });
        Ok(Substitution::Replaced(1))
    }
}

#[async_trait]
impl ClusterReader for FakeCluster {
    async fn list_pods(
        &self,
        _namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PodObservation>, ProbeError> {
        self.record(Call::ListPods {
            selector: selector.to_string(),
        });
        let listing = {
            let mut inner = self.lock();
            match inner.listings.get_mut(selector.as_str()) {
                Some(script) if script.len() > 1 => Some(script.remove(0)),
                Some(script) => script.first().cloned(),
                None => None,
            }
        };
        match listing {
            Some(Listing::Pods(pods)) => Ok(pods),
            Some(Listing::Transient(message)) => Err(ProbeError::transient(message)),
            Some(Listing::Permanent(message)) => Err(ProbeError::permanent(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn engine_uid(&self, _namespace: &str, name: &str) -> crate::Result<String> {
        self.record(Call::EngineUid {
            name: name.to_owned(),
        });
        Ok(engine_uid(name))
    }

    async fn pod_logs(&self, _namespace: &str, pod: &str) -> crate::Result<String> {
        self.record(Call::PodLogs {
            pod: pod.to_owned(),
        });
        let inner = self.lock();
        if inner.fail_logs {
            return Err(format!("container in pod {} is waiting to start", pod).into());
        }
        Ok(inner.logs.get(pod).cloned().unwrap_or_default())
    }

    async fn chaos_result(&self, _namespace: &str, name: &str) -> crate::Result<ChaosResult> {
        self.record(Call::ChaosResult {
            name: name.to_owned(),
        });
        self.lock()
            .chaos_result
            .clone()
            .filter(|result| result.name == name)
            .ok_or_else(|| format!("chaosresults.litmuschaos.io {:?} not found", name).into())
    }
}
