use std::time::Duration;

use metrics::{counter, histogram};

use super::InternalEvent;
use crate::{lifecycle::Phase, verdict::Outcome};

#[derive(Debug)]
pub struct PhaseStarted {
    pub phase: Phase,
}

impl InternalEvent for PhaseStarted {
    fn emit(self) {
        info!(message = "Entering phase.", phase = %self.phase);
    }
}

#[derive(Debug)]
pub struct PhaseCompleted {
    pub phase: Phase,
    pub elapsed: Duration,
}

impl InternalEvent for PhaseCompleted {
    fn emit(self) {
        info!(
            message = "Phase completed.",
            phase = %self.phase,
            elapsed = ?self.elapsed,
        );
        counter!("lifecycle_phases_total", "phase" => self.phase.as_str(), "result" => "ok")
            .increment(1);
        histogram!("lifecycle_phase_duration_seconds", "phase" => self.phase.as_str())
            .record(self.elapsed);
    }
}

#[derive(Debug)]
pub struct PhaseFailed<'a> {
    pub phase: Phase,
    pub error: &'a crate::lifecycle::Error,
}

impl InternalEvent for PhaseFailed<'_> {
    fn emit(self) {
        error!(
            message = "Phase failed, aborting run.",
            phase = %self.phase,
            error = %self.error,
            error_code = self.error.code(),
        );
        counter!("lifecycle_phases_total", "phase" => self.phase.as_str(), "result" => "error")
            .increment(1);
        counter!(
            "component_errors_total",
            "error_code" => self.error.code(),
            "stage" => self.phase.as_str(),
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct JobLogsReceived<'a> {
    pub pod: &'a str,
    pub logs: &'a str,
}

impl InternalEvent for JobLogsReceived<'_> {
    fn emit(self) {
        for line in self.logs.lines() {
            info!(message = %line, pod = %self.pod, source = "job");
        }
        counter!("job_log_lines_total").increment(self.logs.lines().count() as u64);
    }
}

#[derive(Debug)]
pub struct JobLogsUnavailable<'a> {
    pub error: &'a crate::Error,
}

impl InternalEvent for JobLogsUnavailable<'_> {
    fn emit(self) {
        warn!(
            message = "Unable to read experiment job logs, continuing.",
            error = %self.error,
        );
        counter!("job_logs_unavailable_total").increment(1);
    }
}

#[derive(Debug)]
pub struct VerdictEvaluated<'a> {
    pub result: &'a str,
    pub verdict: &'a str,
    pub outcome: Outcome,
}

impl InternalEvent for VerdictEvaluated<'_> {
    fn emit(self) {
        match self.outcome {
            Outcome::Pass => info!(
                message = "Experiment passed.",
                result = %self.result,
                verdict = %self.verdict,
            ),
            Outcome::Fail => warn!(
                message = "Experiment failed its hypothesis.",
                result = %self.result,
                verdict = %self.verdict,
            ),
            Outcome::Indeterminate => warn!(
                message = "Experiment never reached a final verdict.",
                result = %self.result,
                verdict = %self.verdict,
            ),
        }
        counter!("experiment_outcomes_total", "outcome" => self.outcome.as_str()).increment(1);
    }
}
