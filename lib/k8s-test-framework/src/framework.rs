//! The test framework main entry point.

use std::path::Path;

use super::{apply, get, Interface, ResourceFile, Result};

/// Framework wraps the interface to the system with an easy-to-use rust API
/// optimized for driving chaos experiments.
#[derive(Debug, Clone)]
pub struct Framework {
    interface: Interface,
}

impl Framework {
    /// Create a new [`Framework`] powered by the passed interface.
    pub fn new(interface: Interface) -> Self {
        Self { interface }
    }

    /// Apply the manifest stored at `file` into a `namespace`.
    pub async fn apply(&self, namespace: &str, file: &Path) -> Result<()> {
        apply::run(
            &self.interface.kubectl_command,
            namespace,
            file,
            std::iter::empty::<&str>(),
        )
        .await
    }

    /// Apply an in-memory manifest into a `namespace`.
    ///
    /// The manifest is written to a [`ResourceFile`] for the duration of the
    /// call and returned so the caller can confirm it afterwards.
    pub async fn apply_str(&self, namespace: &str, manifest: &str) -> Result<ResourceFile> {
        let file = ResourceFile::new(manifest)?;
        self.apply(namespace, file.path()).await?;
        Ok(file)
    }

    /// Confirm every object declared in `file` exists in a `namespace`,
    /// returning their names.
    pub async fn get(&self, namespace: &str, file: &Path) -> Result<Vec<String>> {
        get::from_file(&self.interface.kubectl_command, namespace, file).await
    }
}
