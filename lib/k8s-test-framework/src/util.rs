use crate::Result;

pub async fn run_command(mut command: tokio::process::Command) -> Result<()> {
    let exit_status = command.spawn()?.wait().await?;
    if !exit_status.success() {
        return Err(format!("exec failed: {:?}", command).into());
    }
    Ok(())
}

pub async fn run_command_output(mut command: tokio::process::Command) -> Result<String> {
    let output = command.spawn()?.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("exec failed: {:?}: {}", command, stderr.trim()).into());
    }

    let output = String::from_utf8(output.stdout)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn captures_stdout() {
        let mut command = Command::new("echo");
        command.arg("hello").stdout(Stdio::piped());
        let output = run_command_output(command).await.unwrap();
        assert_eq!(output, "hello\n");
    }

    #[tokio::test]
    async fn failing_command_is_an_error() {
        let command = Command::new("false");
        assert!(run_command(command).await.is_err());
    }
}
