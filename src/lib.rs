#![recursion_limit = "256"]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

//! Runs a chaos experiment against a Kubernetes workload and derives a
//! single pass/fail verdict from the cluster's eventually consistent state.

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_events;

pub mod cluster;
pub mod config;
pub mod experiment;
pub mod lifecycle;
pub mod manifest;
pub mod poller;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_util;
pub mod trace;
pub mod verdict;

pub use lifecycle::{Orchestrator, RunReport};
pub use verdict::Outcome;

/// The type-erased error used at collaborator seams.
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The result type used at collaborator seams.
pub type Result<T> = std::result::Result<T, Error>;

/// The package version as reported by Cargo.
pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
