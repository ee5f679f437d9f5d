//! Run configuration.
//!
//! Built once at startup from defaults, an optional YAML file and the
//! environment, then handed to the orchestrator by value.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    experiment::{EngineInstance, EngineParams, Experiment},
    poller::{duration_serde, Backoff, PollPolicy},
};

/// Environment variable naming an optional YAML configuration file.
pub const CONFIG_PATH_ENV: &str = "CHAOS_VERIFY_CONFIG";

const HUB_URL: &str = "https://hub.litmuschaos.io/api/chaos/master?file=charts/generic";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("unable to read configuration file {:?}: {}", path, source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("unable to parse configuration file {:?}: {}", path, source))]
    ParseFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("invalid value {:?} for {}: {}", value, var, reason))]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[snafu(display("invalid {}: {}", field, reason))]
    Invalid { field: &'static str, reason: String },
}

/// Where each manifest is fetched from: an HTTP(S) URL or a local path.
///
/// Empty sources resolve to the chart hub entry of the experiment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ManifestSources {
    pub rbac: String,
    pub experiment: String,
    pub engine: String,
}

/// Parameters bound into the engine manifest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    /// Namespace of the target application, defaults to the chaos namespace.
    pub app_namespace: Option<String>,
    pub app_label: String,
    pub annotation_check: bool,
    /// Seconds.
    pub total_chaos_duration: u64,
    /// Seconds.
    pub chaos_interval: u64,
    pub force: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_namespace: None,
            app_label: "app=nginx".to_owned(),
            annotation_check: false,
            total_chaos_duration: 15,
            chaos_interval: 5,
            force: false,
        }
    }
}

/// Bounds of the cluster waits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PollingConfig {
    /// Grace delay between engine submission and the first runner probe.
    #[serde(with = "duration_serde")]
    pub initial_delay: Duration,
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    pub backoff: Backoff,
    #[serde(with = "duration_serde")]
    pub runner_timeout: Duration,
    #[serde(with = "duration_serde")]
    pub job_timeout: Duration,
    /// Number of job pods that must reach a terminal phase.
    pub expected_job_pods: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            interval: Duration::from_secs(5),
            backoff: Backoff::Fixed,
            runner_timeout: Duration::from_secs(180),
            job_timeout: Duration::from_secs(900),
            expected_job_pods: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Namespace the experiment, engine and results live in.
    pub namespace: String,
    pub experiment_name: String,
    pub engine_name: String,
    pub sources: ManifestSources,
    /// Directory fetched manifests are written to.
    pub workdir: PathBuf,
    pub engine: EngineConfig,
    pub polling: PollingConfig,
    /// Abort when an engine override finds neither its default nor its
    /// value in the template.
    pub strict_overrides: bool,
    pub kubeconfig: Option<PathBuf>,
    pub kubectl: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "litmus".to_owned(),
            experiment_name: "pod-delete".to_owned(),
            engine_name: "engine1".to_owned(),
            sources: ManifestSources::default(),
            workdir: PathBuf::from("."),
            engine: EngineConfig::default(),
            polling: PollingConfig::default(),
            strict_overrides: true,
            kubeconfig: None,
            kubectl: "kubectl".to_owned(),
        }
    }
}

impl Config {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::load(|var| std::env::var(var).ok())
    }

    /// Load the configuration, reading variables through `lookup`.
    pub fn load(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let base = match lookup(CONFIG_PATH_ENV).filter(|path| !path.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        let config = base.with_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        serde_yaml::from_str(&text).context(ParseFileSnafu { path })
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |name: &'static str| lookup(name).filter(|value| !value.is_empty());

        if let Some(value) = var("CHAOS_NAMESPACE") {
            self.namespace = value;
        }
        if let Some(value) = var("EXPERIMENT_NAME") {
            self.experiment_name = value;
        }
        if let Some(value) = var("ENGINE_NAME") {
            self.engine_name = value;
        }
        if let Some(value) = var("RBAC_SOURCE") {
            self.sources.rbac = value;
        }
        if let Some(value) = var("EXPERIMENT_SOURCE") {
            self.sources.experiment = value;
        }
        if let Some(value) = var("ENGINE_SOURCE") {
            self.sources.engine = value;
        }
        if let Some(value) = var("WORKDIR") {
            self.workdir = value.into();
        }
        if let Some(value) = var("APP_NS") {
            self.engine.app_namespace = Some(value);
        }
        if let Some(value) = var("APP_LABEL") {
            self.engine.app_label = value;
        }
        if let Some(value) = var("ANNOTATION_CHECK") {
            self.engine.annotation_check = parse_bool("ANNOTATION_CHECK", value)?;
        }
        if let Some(value) = var("TOTAL_CHAOS_DURATION") {
            self.engine.total_chaos_duration = parse_seconds("TOTAL_CHAOS_DURATION", value)?;
        }
        if let Some(value) = var("CHAOS_INTERVAL") {
            self.engine.chaos_interval = parse_seconds("CHAOS_INTERVAL", value)?;
        }
        if let Some(value) = var("FORCE") {
            self.engine.force = parse_bool("FORCE", value)?;
        }
        if let Some(value) = var("STRICT_OVERRIDES") {
            self.strict_overrides = parse_bool("STRICT_OVERRIDES", value)?;
        }
        if let Some(value) = var("POLL_INTERVAL") {
            self.polling.interval = parse_duration("POLL_INTERVAL", value)?;
        }
        if let Some(value) = var("RUNNER_TIMEOUT") {
            self.polling.runner_timeout = parse_duration("RUNNER_TIMEOUT", value)?;
        }
        if let Some(value) = var("JOB_TIMEOUT") {
            self.polling.job_timeout = parse_duration("JOB_TIMEOUT", value)?;
        }
        if let Some(value) = var("KUBECTL") {
            self.kubectl = value;
        }
        if let Some(value) = var("KUBECONFIG") {
            self.kubeconfig = Some(value.into());
        } else if self.kubeconfig.is_none() {
            self.kubeconfig = var("HOME").map(|home| Path::new(&home).join(".kube").join("config"));
        }

        Ok(self)
    }

    pub fn validate(&self) -> Result<(), Error> {
        validate_name("namespace", &self.namespace)?;
        validate_name("experiment_name", &self.experiment_name)?;
        validate_name("engine_name", &self.engine_name)?;
        if let Some(app_namespace) = &self.engine.app_namespace {
            validate_name("engine.app_namespace", app_namespace)?;
        }

        let polling = &self.polling;
        for (field, value) in [
            ("polling.interval", polling.interval),
            ("polling.runner_timeout", polling.runner_timeout),
            ("polling.job_timeout", polling.job_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Invalid {
                    field,
                    reason: "must be greater than zero".to_owned(),
                });
            }
        }
        if polling.expected_job_pods == 0 {
            return Err(Error::Invalid {
                field: "polling.expected_job_pods",
                reason: "must be at least one".to_owned(),
            });
        }
        if let Backoff::Exponential { factor, .. } = polling.backoff {
            if factor < 2 {
                return Err(Error::Invalid {
                    field: "polling.backoff.factor",
                    reason: "must be at least two".to_owned(),
                });
            }
        }
        Ok(())
    }

    pub fn rbac_source(&self) -> String {
        self.source_or_hub(&self.sources.rbac, "rbac.yaml")
    }

    pub fn experiment_source(&self) -> String {
        self.source_or_hub(&self.sources.experiment, "experiment.yaml")
    }

    pub fn engine_source(&self) -> String {
        self.source_or_hub(&self.sources.engine, "engine.yaml")
    }

    fn source_or_hub(&self, source: &str, file: &str) -> String {
        if source.is_empty() {
            format!("{}/{}/{}", HUB_URL, self.experiment_name, file)
        } else {
            source.to_owned()
        }
    }

    pub fn engine_instance(&self) -> EngineInstance {
        let experiment = Experiment::new(&self.experiment_name, &self.namespace, &self.workdir);
        let params = EngineParams {
            engine_name: self.engine_name.clone(),
            app_namespace: self
                .engine
                .app_namespace
                .clone()
                .unwrap_or_else(|| self.namespace.clone()),
            app_label: self.engine.app_label.clone(),
            annotation_check: self.engine.annotation_check,
            total_chaos_duration: self.engine.total_chaos_duration,
            chaos_interval: self.engine.chaos_interval,
            force: self.engine.force,
        };
        EngineInstance::new(experiment, params)
    }

    pub fn runner_policy(&self) -> PollPolicy {
        PollPolicy::new(self.polling.runner_timeout, self.polling.interval)
            .with_initial_delay(self.polling.initial_delay)
            .with_backoff(self.polling.backoff)
    }

    pub fn job_policy(&self) -> PollPolicy {
        PollPolicy::new(self.polling.job_timeout, self.polling.interval)
            .with_backoff(self.polling.backoff)
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, Error> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::InvalidVar {
            var,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

fn parse_seconds(var: &'static str, value: String) -> Result<u64, Error> {
    value.parse().map_err(|error: std::num::ParseIntError| Error::InvalidVar {
        var,
        reason: error.to_string(),
        value,
    })
}

fn parse_duration(var: &'static str, value: String) -> Result<Duration, Error> {
    humantime::parse_duration(&value).map_err(|error| Error::InvalidVar {
        var,
        reason: error.to_string(),
        value,
    })
}

/// Names must be valid RFC 1123 labels, as Kubernetes requires.
fn validate_name(field: &'static str, name: &str) -> Result<(), Error> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');
    if name.is_empty() || name.len() > 63 || !valid_chars || !valid_edges {
        return Err(Error::Invalid {
            field,
            reason: format!("{:?} is not a valid RFC 1123 label", name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use indoc::indoc;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::load(env(&[])).unwrap();
        assert_eq!(config.namespace, "litmus");
        assert_eq!(config.experiment_name, "pod-delete");
        assert!(config.strict_overrides);
        assert!(config.kubeconfig.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = Config::load(env(&[
            ("CHAOS_NAMESPACE", "chaos"),
            ("ENGINE_NAME", "engine2"),
            ("FORCE", "true"),
            ("TOTAL_CHAOS_DURATION", "60"),
            ("RUNNER_TIMEOUT", "2m"),
            ("HOME", "/home/tester"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "chaos");
        assert_eq!(config.engine_name, "engine2");
        assert!(config.engine.force);
        assert_eq!(config.engine.total_chaos_duration, 60);
        assert_eq!(config.polling.runner_timeout, Duration::from_secs(120));
        assert_eq!(
            config.kubeconfig.as_deref(),
            Some(Path::new("/home/tester/.kube/config"))
        );
    }

    #[test]
    fn explicit_kubeconfig_wins_over_home() {
        let config = Config::load(env(&[
            ("KUBECONFIG", "/etc/kube/admin.conf"),
            ("HOME", "/home/tester"),
        ]))
        .unwrap();
        assert_eq!(
            config.kubeconfig.as_deref(),
            Some(Path::new("/etc/kube/admin.conf"))
        );
    }

    #[test]
    fn huge_timeouts_load_and_build_policies() {
        let config = Config::load(env(&[("JOB_TIMEOUT", "300000000000years")])).unwrap();
        assert!(config.job_policy().timeout > Duration::from_secs(9_000_000_000_000_000_000));
    }

    #[test]
    fn empty_force_keeps_default() {
        let config = Config::load(env(&[("FORCE", "")])).unwrap();
        assert!(!config.engine.force);
    }

    #[test]
    fn rejects_malformed_variables() {
        let error = Config::load(env(&[("FORCE", "maybe")])).unwrap_err();
        assert!(matches!(error, Error::InvalidVar { var: "FORCE", .. }));

        let error = Config::load(env(&[("JOB_TIMEOUT", "soon")])).unwrap_err();
        assert!(matches!(error, Error::InvalidVar { var: "JOB_TIMEOUT", .. }));
    }

    #[test]
    fn rejects_invalid_names() {
        for name in ["Engine1", "-engine", "engine_1", ""] {
            let config = Config {
                engine_name: name.to_owned(),
                ..Config::default()
            };
            assert!(config.validate().is_err(), "{:?} accepted", name);
        }
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut config = Config::default();
        config.polling.runner_timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(Error::Invalid {
                field: "polling.runner_timeout",
                ..
            })
        ));
    }

    #[test]
    fn reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaos.yaml");
        std::fs::write(
            &path,
            indoc! {"
                namespace: chaos
                engine:
                  app_label: run=nginx
                  force: true
                polling:
                  interval: 3s
                  backoff:
                    strategy: exponential
                    factor: 2
                    max: 30s
            "},
        )
        .unwrap();

        let config = Config::load(env(&[
            (CONFIG_PATH_ENV, path.to_str().unwrap()),
            ("APP_LABEL", "app=web"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "chaos");
        assert_eq!(config.engine.app_label, "app=web");
        assert!(config.engine.force);
        assert_eq!(config.polling.interval, Duration::from_secs(3));
        assert_eq!(
            config.polling.backoff,
            Backoff::Exponential {
                factor: 2,
                max: Duration::from_secs(30)
            }
        );
        assert_eq!(config.experiment_name, "pod-delete");
    }

    #[test]
    fn unknown_file_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chaos.yaml");
        std::fs::write(&path, "namespace: chaos\nnamspace: typo\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(Error::ParseFile { .. })
        ));
    }

    #[test]
    fn sources_default_to_hub() {
        let config = Config::default();
        assert_eq!(
            config.rbac_source(),
            "https://hub.litmuschaos.io/api/chaos/master?file=charts/generic/pod-delete/rbac.yaml"
        );

        let config = Config {
            sources: ManifestSources {
                engine: "/srv/engine.yaml".to_owned(),
                ..ManifestSources::default()
            },
            ..Config::default()
        };
        assert_eq!(config.engine_source(), "/srv/engine.yaml");
    }

    #[test]
    fn engine_instance_defaults_app_namespace() {
        let engine = Config::default().engine_instance();
        assert_eq!(engine.params().app_namespace, "litmus");
        assert_eq!(engine.result_key(), "engine1-pod-delete");
    }

    #[test]
    fn runner_wait_has_grace_delay() {
        let config = Config::default();
        assert_eq!(config.runner_policy().initial_delay, Duration::from_secs(2));
        assert_eq!(config.job_policy().initial_delay, Duration::ZERO);
    }
}
