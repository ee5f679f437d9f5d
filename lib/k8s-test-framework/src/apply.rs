//! Apply a manifest file.

use std::{ffi::OsStr, process::Stdio};

use tokio::process::Command;

use super::Result;
use crate::util::run_command;

/// Apply the manifest at `file` within a `namespace` via the specified
/// `kubectl_command`.
/// Use `extra` to pass additional arguments to `kubectl`.
pub async fn run<Cmd, NS, F, Ex>(
    kubectl_command: Cmd,
    namespace: NS,
    file: F,
    extra: impl IntoIterator<Item = Ex>,
) -> Result<()>
where
    Cmd: AsRef<OsStr>,
    NS: AsRef<OsStr>,
    F: AsRef<OsStr>,
    Ex: AsRef<OsStr>,
{
    let mut command = Command::new(kubectl_command);

    command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    command.arg("apply");
    command.arg("-f").arg(file);
    command.arg("-n").arg(namespace);
    command.args(extra);

    run_command(command).await?;
    Ok(())
}
