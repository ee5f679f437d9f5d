//! Chaos Result model and the Verdict Evaluator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The verdict recorded on a Chaos Result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The runner has not finalized the result yet.
    Awaited,
    Pass,
    Fail,
    /// Anything else the operator wrote.
    Other(String),
}

impl Verdict {
    pub fn parse(verdict: &str) -> Self {
        match verdict {
            "Awaited" => Self::Awaited,
            "Pass" => Self::Pass,
            "Fail" => Self::Fail,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Awaited => f.write_str("Awaited"),
            Self::Pass => f.write_str("Pass"),
            Self::Fail => f.write_str("Fail"),
            Self::Other(verdict) => f.write_str(verdict),
        }
    }
}

/// The `ChaosResult` custom resource, reduced to what the verdict needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChaosResult {
    /// The resource name, `{engine}-{experiment}`.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: ChaosResultStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChaosResultStatus {
    #[serde(rename = "experimentstatus", default)]
    pub experiment_status: ExperimentStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExperimentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Raw verdict string, see [`ChaosResult::verdict`].
    #[serde(default)]
    pub verdict: String,
    #[serde(rename = "failStep", default, skip_serializing_if = "Option::is_none")]
    pub fail_step: Option<String>,
}

impl ChaosResult {
    pub fn new(name: impl Into<String>, verdict: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ChaosResultStatus {
                experiment_status: ExperimentStatus {
                    verdict: verdict.into(),
                    ..Default::default()
                },
            },
        }
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::parse(&self.status.experiment_status.verdict)
    }
}

/// What a finished run means for the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The experiment ran and its hypothesis held.
    Pass,
    /// The experiment ran and its hypothesis did not hold.
    Fail,
    /// The experiment never reached a final verdict.
    Indeterminate,
}

impl Outcome {
    /// Collapses [`Outcome::Fail`] and [`Outcome::Indeterminate`] for callers
    /// that only need a boolean.
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interprets a Chaos Result.
///
/// Only the verdict string is consulted, so the same verdict always yields
/// the same outcome.
pub fn evaluate(result: &ChaosResult) -> Outcome {
    match result.verdict() {
        Verdict::Pass => Outcome::Pass,
        Verdict::Fail => Outcome::Fail,
        Verdict::Awaited | Verdict::Other(_) => Outcome::Indeterminate,
    }
}
