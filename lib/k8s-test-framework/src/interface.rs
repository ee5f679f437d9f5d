//! The interface to the system the framework talks to.

/// Parameters required to reach the cluster.
#[derive(Debug, Clone)]
pub struct Interface {
    /// The command used to invoke `kubectl`.
    pub kubectl_command: String,
}

impl Interface {
    /// Create an [`Interface`] with an explicit `kubectl` command.
    pub fn new(kubectl_command: impl Into<String>) -> Self {
        Self {
            kubectl_command: kubectl_command.into(),
        }
    }
}

impl Default for Interface {
    fn default() -> Self {
        Self::new("kubectl")
    }
}
