use async_trait::async_trait;
use tokio::process::Command;

use crate::contract::{CommandOutput, CommandRunner};

/// Runs programs on the local machine, capturing stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, std::io::Error> {
        tracing::debug!(program, ?args, "Launching external command");
        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        let result = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(
            program,
            status = ?result.status,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "External command finished"
        );
        Ok(result)
    }
}
