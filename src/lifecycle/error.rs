use std::time::Duration;

use snafu::Snafu;

use super::Phase;
use crate::poller;

/// Why a run was aborted. Every variant names the phase that failed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)))]
pub enum Error {
    #[snafu(display("{}: provisioning failed: {}", phase, source))]
    ProvisioningFailed { phase: Phase, source: crate::Error },

    #[snafu(display("{}: unable to override {} in the engine manifest: {}", phase, field, source))]
    ParameterizationFailed {
        phase: Phase,
        field: &'static str,
        source: crate::Error,
    },

    #[snafu(display(
        "{}: engine manifest has neither {:?} nor {:?} for {}",
        phase,
        old,
        new,
        field
    ))]
    OverrideMissing {
        phase: Phase,
        field: &'static str,
        old: String,
        new: String,
    },

    #[snafu(display(
        "{}: {} after {} ({} attempts), last observed: {}",
        phase,
        phase.timeout_reason(),
        humantime::format_duration(*waited),
        attempts,
        last_observed.as_deref().unwrap_or("nothing")
    ))]
    Timeout {
        phase: Phase,
        waited: Duration,
        attempts: usize,
        last_observed: Option<String>,
    },

    #[snafu(display("{}: cluster query failed: {}", phase, source))]
    QueryFailed { phase: Phase, source: crate::Error },

    #[snafu(display("{}: chaos result {:?} unavailable: {}", phase, result, source))]
    VerdictUnavailable {
        phase: Phase,
        result: String,
        source: crate::Error,
    },
}

impl Error {
    pub(super) fn from_poll(phase: Phase, error: poller::Error) -> Self {
        match error {
            poller::Error::Timeout {
                waited,
                attempts,
                last_observed,
            } => Self::Timeout {
                phase,
                waited,
                attempts,
                last_observed,
            },
            poller::Error::Permanent { source } => Self::QueryFailed { phase, source },
        }
    }

    /// The phase the run was aborted in.
    pub const fn phase(&self) -> Phase {
        match self {
            Self::ProvisioningFailed { phase, .. }
            | Self::ParameterizationFailed { phase, .. }
            | Self::OverrideMissing { phase, .. }
            | Self::Timeout { phase, .. }
            | Self::QueryFailed { phase, .. }
            | Self::VerdictUnavailable { phase, .. } => *phase,
        }
    }

    /// A stable identifier for logs and metrics.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ProvisioningFailed { .. } => "provisioning_failed",
            Self::ParameterizationFailed { .. } | Self::OverrideMissing { .. } => {
                "parameterization_failed"
            }
            Self::Timeout {
                phase: Phase::RunnerRunning,
                ..
            } => "runner_not_ready",
            Self::Timeout { .. } => "timeout",
            Self::QueryFailed { .. } => "query_failed",
            Self::VerdictUnavailable { .. } => "verdict_unavailable",
        }
    }
}
