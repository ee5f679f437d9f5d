//! Kubernetes test framework.
//!
//! The main goal of the design is to make the `kubectl` interactions a chaos
//! test needs (apply a manifest, confirm the objects exist)
//! available as plain async functions, and to keep the process plumbing out
//! of the test logic.

#![deny(missing_debug_implementations)]

pub mod apply;
pub mod framework;
pub mod get;
pub mod interface;
mod resource_file;
mod util;

pub use framework::Framework;
pub use interface::Interface;
pub use resource_file::ResourceFile;

type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type used by the framework.
pub type Result<T> = std::result::Result<T, Error>;
