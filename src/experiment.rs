//! The data model shared by every phase of a run.

use std::{
    fmt,
    path::{Path, PathBuf},
};

/// A chaos experiment definition and the namespace it runs in.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Experiment {
    name: String,
    namespace: String,
    workdir: PathBuf,
}

impl Experiment {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            workdir: workdir.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Where the experiment definition is fetched to.
    pub fn manifest_path(&self) -> PathBuf {
        self.workdir.join(format!("{}.yaml", self.name))
    }

    /// Where the engine template is fetched to and parameterized in place.
    pub fn engine_manifest_path(&self) -> PathBuf {
        self.workdir.join(format!("{}-ce.yaml", self.name))
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// The tunable parameters bound into an engine instance.
///
/// Every field is mandatory, so an engine can never be submitted with only
/// part of its parameters applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    /// The engine instance name.
    pub engine_name: String,
    /// The namespace of the targeted application.
    pub app_namespace: String,
    /// The label selecting the targeted application, e.g. `app=nginx`.
    pub app_label: String,
    /// Whether the operator only targets annotated applications.
    pub annotation_check: bool,
    /// Total chaos duration, in seconds.
    pub total_chaos_duration: u64,
    /// Interval between successive chaos injections, in seconds.
    pub chaos_interval: u64,
    /// Force-delete the target pods.
    pub force: bool,
}

/// A binding of an [`Experiment`] to a target workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInstance {
    experiment: Experiment,
    params: EngineParams,
}

impl EngineInstance {
    pub fn new(experiment: Experiment, params: EngineParams) -> Self {
        Self { experiment, params }
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn name(&self) -> &str {
        &self.params.engine_name
    }

    pub fn namespace(&self) -> &str {
        self.experiment.namespace()
    }

    /// Selects the runner pod the operator creates for this engine.
    pub fn runner_selector(&self) -> Selector {
        Selector::label("app", self.name())
    }

    /// Selects the job pods the runner spawns for the experiment on behalf
    /// of the engine whose UID is `engine_uid`.
    ///
    /// The runner stamps every job pod with the engine UID, so pods left by
    /// earlier runs or by other engines of the same experiment never match.
    pub fn job_selector(&self, engine_uid: &str) -> Selector {
        Selector::label("name", self.experiment.name()).and("chaosUID", engine_uid)
    }

    /// The key of the Chaos Result this engine produces.
    pub fn result_key(&self) -> String {
        result_key(self.name(), self.experiment.name())
    }
}

/// The Chaos Result name is derived from the engine and experiment names
/// alone, so each engine maps to exactly one result.
pub fn result_key(engine_name: &str, experiment_name: &str) -> String {
    format!("{}-{}", engine_name, experiment_name)
}

/// An equality-based label selector, as understood by the Kubernetes API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector(String);

impl Selector {
    pub fn label(key: &str, value: &str) -> Self {
        Self(format!("{}={}", key, value))
    }

    /// Also require `key=value`.
    pub fn and(mut self, key: &str, value: &str) -> Self {
        self.0.push_str(&format!(",{}={}", key, value));
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The lifecycle phase of a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown(String),
}

impl PodPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            other => Self::Unknown(other.to_owned()),
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Running => f.write_str("Running"),
            Self::Succeeded => f.write_str("Succeeded"),
            Self::Failed => f.write_str("Failed"),
            Self::Unknown(phase) => write!(f, "Unknown({})", phase),
        }
    }
}

/// A single observation of a pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    pub name: String,
    pub phase: PodPhase,
}

impl PodObservation {
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            phase,
        }
    }
}
