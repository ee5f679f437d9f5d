//! Query the objects declared in a manifest file.

use std::{ffi::OsStr, process::Stdio};

use tokio::process::Command;

use super::Result;
use crate::util::run_command_output;

/// Get the objects declared in the manifest at `file` within a `namespace`
/// via the specified `kubectl_command`, returning the names `kubectl`
/// printed.
///
/// Fails if any of the declared objects does not exist.
pub async fn from_file<Cmd, NS, F>(kubectl_command: Cmd, namespace: NS, file: F) -> Result<Vec<String>>
where
    Cmd: AsRef<OsStr>,
    NS: AsRef<OsStr>,
    F: AsRef<OsStr>,
{
    let mut command = Command::new(kubectl_command);

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    command.arg("get");
    command.arg("-f").arg(file);
    command.arg("-n").arg(namespace);
    command.arg("-o").arg("name");

    let output = run_command_output(command).await?;
    Ok(output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect())
}
