//! The experiment lifecycle state machine.
//!
//! A run walks the states below strictly in order. Each transition performs
//! one phase of work against the collaborators and either yields the next
//! state or aborts the whole run with an [`Error`] naming the phase.
//!
//! ```text
//! Pending -> RbacReady -> ExperimentDefined -> EngineParameterized
//!         -> EngineSubmitted -> RunnerRunning -> JobCompleted -> VerdictRetrieved
//! ```

use std::{fmt, ops::ControlFlow, time::Duration};

use snafu::ResultExt;
use tokio::time::Instant;

use crate::{
    cluster::{ClusterReader, Parameterizer, Provisioner},
    config::Config,
    experiment::{EngineInstance, PodObservation, PodPhase},
    internal_events::{
        JobLogsReceived, JobLogsUnavailable, OverrideAlreadyApplied, OverrideApplied,
        OverrideMissing, PhaseCompleted, PhaseFailed, PhaseStarted, VerdictEvaluated,
    },
    manifest::{engine_overrides, Substitution},
    poller,
    verdict::{self, ChaosResult, Outcome},
};

mod error;

pub use self::error::Error;
use self::error::{
    OverrideMissingSnafu, ParameterizationFailedSnafu, ProvisioningFailedSnafu, QueryFailedSnafu,
    VerdictUnavailableSnafu,
};

/// A unit of work between two states, named after the state it reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    RbacReady,
    ExperimentDefined,
    EngineParameterized,
    EngineSubmitted,
    RunnerRunning,
    JobCompleted,
    VerdictRetrieved,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::RbacReady,
        Phase::ExperimentDefined,
        Phase::EngineParameterized,
        Phase::EngineSubmitted,
        Phase::RunnerRunning,
        Phase::JobCompleted,
        Phase::VerdictRetrieved,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::RbacReady => "rbac_ready",
            Phase::ExperimentDefined => "experiment_defined",
            Phase::EngineParameterized => "engine_parameterized",
            Phase::EngineSubmitted => "engine_submitted",
            Phase::RunnerRunning => "runner_running",
            Phase::JobCompleted => "job_completed",
            Phase::VerdictRetrieved => "verdict_retrieved",
        }
    }

    pub(crate) const fn timeout_reason(self) -> &'static str {
        match self {
            Phase::RunnerRunning => "runner pod not ready",
            Phase::JobCompleted => "experiment job not completed",
            _ => "timed out",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::RbacReady => "RbacReady",
            Phase::ExperimentDefined => "ExperimentDefined",
            Phase::EngineParameterized => "EngineParameterized",
            Phase::EngineSubmitted => "EngineSubmitted",
            Phase::RunnerRunning => "RunnerRunning",
            Phase::JobCompleted => "JobCompleted",
            Phase::VerdictRetrieved => "VerdictRetrieved",
        };
        f.write_str(name)
    }
}

/// Where a run stands. Only ever moves forward.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Pending,
    RbacReady,
    ExperimentDefined,
    EngineParameterized,
    EngineSubmitted,
    RunnerRunning,
    JobCompleted,
    VerdictRetrieved { result: ChaosResult },
}

impl State {
    /// The phase leading out of this state, or the retrieved result once
    /// the run is over.
    pub fn next(self) -> ControlFlow<ChaosResult, Phase> {
        match self {
            State::Pending => ControlFlow::Continue(Phase::RbacReady),
            State::RbacReady => ControlFlow::Continue(Phase::ExperimentDefined),
            State::ExperimentDefined => ControlFlow::Continue(Phase::EngineParameterized),
            State::EngineParameterized => ControlFlow::Continue(Phase::EngineSubmitted),
            State::EngineSubmitted => ControlFlow::Continue(Phase::RunnerRunning),
            State::RunnerRunning => ControlFlow::Continue(Phase::JobCompleted),
            State::JobCompleted => ControlFlow::Continue(Phase::VerdictRetrieved),
            State::VerdictRetrieved { result } => ControlFlow::Break(result),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub elapsed: Duration,
}

/// Logs of one experiment job pod, or why they could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLog {
    pub pod: String,
    pub logs: Result<String, String>,
}

/// What a completed run observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub result: ChaosResult,
    pub phases: Vec<PhaseTiming>,
    pub jobs: Vec<JobLog>,
}

impl RunReport {
    /// `Fail` and `Indeterminate` both count as a failed test.
    pub const fn is_success(&self) -> bool {
        self.outcome.is_pass()
    }
}

#[derive(Debug, Default)]
struct RunRecord {
    phases: Vec<PhaseTiming>,
    jobs: Vec<JobLog>,
}

/// Drives one experiment run through every [`Phase`].
#[derive(Debug)]
pub struct Orchestrator<P, M, R> {
    config: Config,
    engine: EngineInstance,
    provisioner: P,
    parameterizer: M,
    reader: R,
}

impl<P, M, R> Orchestrator<P, M, R>
where
    P: Provisioner,
    M: Parameterizer,
    R: ClusterReader,
{
    pub fn new(config: Config, provisioner: P, parameterizer: M, reader: R) -> Self {
        let engine = config.engine_instance();
        Self {
            config,
            engine,
            provisioner,
            parameterizer,
            reader,
        }
    }

    pub fn engine(&self) -> &EngineInstance {
        &self.engine
    }

    /// Run every phase and evaluate the verdict.
    ///
    /// A verdict other than `Pass` is reported through [`RunReport::outcome`],
    /// not as an error.
    pub async fn run(&self) -> Result<RunReport, Error> {
        let mut record = RunRecord::default();
        let mut state = State::Pending;

        let result = loop {
            state = match state.next() {
                ControlFlow::Continue(phase) => self.step(phase, &mut record).await?,
                ControlFlow::Break(result) => break result,
            };
        };

        let outcome = verdict::evaluate(&result);
        emit!(VerdictEvaluated {
            result: &result.name,
            verdict: &result.status.experiment_status.verdict,
            outcome,
        });

        Ok(RunReport {
            outcome,
            result,
            phases: record.phases,
            jobs: record.jobs,
        })
    }

    async fn step(&self, phase: Phase, record: &mut RunRecord) -> Result<State, Error> {
        emit!(PhaseStarted { phase });
        let started = Instant::now();
        match self.transition(phase, record).await {
            Ok(next) => {
                let elapsed = started.elapsed();
                emit!(PhaseCompleted { phase, elapsed });
                record.phases.push(PhaseTiming { phase, elapsed });
                Ok(next)
            }
            Err(error) => {
                emit!(PhaseFailed {
                    phase,
                    error: &error,
                });
                Err(error)
            }
        }
    }

    /// Perform `phase` and return the state it reaches.
    async fn transition(&self, phase: Phase, record: &mut RunRecord) -> Result<State, Error> {
        let experiment = self.engine.experiment();
        let namespace = self.engine.namespace();

        match phase {
            Phase::RbacReady => {
                self.provisioner
                    .apply_rbac(&self.config.rbac_source(), namespace, experiment.name())
                    .await
                    .context(ProvisioningFailedSnafu { phase })?;
                Ok(State::RbacReady)
            }
            Phase::ExperimentDefined => {
                let path = experiment.manifest_path();
                self.provisioner
                    .fetch_manifest(&path, &self.config.experiment_source())
                    .await
                    .context(ProvisioningFailedSnafu { phase })?;
                self.provisioner
                    .apply_manifest(&path, namespace)
                    .await
                    .context(ProvisioningFailedSnafu { phase })?;
                Ok(State::ExperimentDefined)
            }
            Phase::EngineParameterized => {
                self.parameterize_engine(phase).await?;
                Ok(State::EngineParameterized)
            }
            Phase::EngineSubmitted => {
                self.provisioner
                    .apply_manifest(&experiment.engine_manifest_path(), namespace)
                    .await
                    .context(ProvisioningFailedSnafu { phase })?;
                Ok(State::EngineSubmitted)
            }
            Phase::RunnerRunning => {
                let selector = self.engine.runner_selector();
                poller::await_condition(
                    "runner pod",
                    &self.config.runner_policy(),
                    || self.reader.list_pods(namespace, &selector),
                    |pods: &Vec<PodObservation>| {
                        pods.iter().any(|pod| pod.phase == PodPhase::Running)
                    },
                )
                .await
                .map_err(|error| Error::from_poll(phase, error))?;
                Ok(State::RunnerRunning)
            }
            Phase::JobCompleted => {
                let engine_uid = self
                    .reader
                    .engine_uid(namespace, self.engine.name())
                    .await
                    .context(QueryFailedSnafu { phase })?;
                let selector = self.engine.job_selector(&engine_uid);
                let expected = self.config.polling.expected_job_pods;
                let pods = poller::await_condition(
                    "experiment job",
                    &self.config.job_policy(),
                    || self.reader.list_pods(namespace, &selector),
                    |pods: &Vec<PodObservation>| {
                        pods.iter().filter(|pod| pod.phase.is_terminal()).count() >= expected
                    },
                )
                .await
                .map_err(|error| Error::from_poll(phase, error))?;

                for pod in pods.iter().filter(|pod| pod.phase.is_terminal()) {
                    record.jobs.push(self.collect_logs(&pod.name).await);
                }
                Ok(State::JobCompleted)
            }
            Phase::VerdictRetrieved => {
                let key = self.engine.result_key();
                let result = self
                    .reader
                    .chaos_result(namespace, &key)
                    .await
                    .context(VerdictUnavailableSnafu { phase, result: key })?;
                Ok(State::VerdictRetrieved { result })
            }
        }
    }

    /// Fetch the engine template and bind every parameter into it. The
    /// engine is only submitted once this returns successfully.
    async fn parameterize_engine(&self, phase: Phase) -> Result<(), Error> {
        let path = self.engine.experiment().engine_manifest_path();
        self.provisioner
            .fetch_manifest(&path, &self.config.engine_source())
            .await
            .context(ProvisioningFailedSnafu { phase })?;

        let strict = self.config.strict_overrides;
        for item in engine_overrides(self.engine.namespace(), self.engine.params()) {
            let substitution = item
                .apply(&self.parameterizer, &path)
                .await
                .context(ParameterizationFailedSnafu {
                    phase,
                    field: item.field,
                })?;

            match substitution {
                Substitution::Replaced(replaced) => emit!(OverrideApplied {
                    field: item.field,
                    replaced,
                }),
                Substitution::AlreadyApplied => emit!(OverrideAlreadyApplied { field: item.field }),
                Substitution::Missing => {
                    emit!(OverrideMissing {
                        field: item.field,
                        old: &item.old,
                        strict,
                    });
                    if strict {
                        return OverrideMissingSnafu {
                            phase,
                            field: item.field,
                            old: item.old,
                            new: item.new,
                        }
                        .fail();
                    }
                }
            }
        }
        Ok(())
    }

    async fn collect_logs(&self, pod: &str) -> JobLog {
        let logs = match self.reader.pod_logs(self.engine.namespace(), pod).await {
            Ok(logs) => {
                emit!(JobLogsReceived { pod, logs: &logs });
                Ok(logs)
            }
            Err(error) => {
                emit!(JobLogsUnavailable { error: &error });
                Err(error.to_string())
            }
        };
        JobLog {
            pod: pod.to_owned(),
            logs,
        }
    }
}
