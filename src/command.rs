//! External process execution.
//!
//! Every collaborator (systemctl, tailscale, kubectl, ip, dhclient) is driven
//! through its command-line contract. Output is captured combined so a failed
//! command carries everything it printed in the returned error.

use tokio::process::Command;
use tracing::debug;

use crate::error::BootstrapError;

/// Run a command and capture its combined output.
///
/// Returns the trimmed stdout on success. On a non-zero exit the error
/// carries stdout and stderr joined, which is usually the only diagnostic
/// the underlying tool provides.
pub async fn run(program: &str, args: &[&str]) -> Result<String, BootstrapError> {
    run_with_env(program, args, &[]).await
}

/// Same as [`run`], with extra environment variables for the child process.
pub async fn run_with_env(
    program: &str,
    args: &[&str],
    envs: &[(&str, &str)],
) -> Result<String, BootstrapError> {
    let rendered = render(program, args);
    debug!(command = %rendered, "Executing command");

    let mut cmd = Command::new(program);
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }

    let output = cmd.output().await.map_err(|source| BootstrapError::CommandSpawn {
        command: rendered.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        Ok(stdout.trim().to_string())
    } else {
        let mut combined = String::new();
        combined.push_str(stdout.trim());
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr.trim());
        }
        Err(BootstrapError::CommandFailed {
            command: rendered,
            status: output.status,
            output: combined,
        })
    }
}

fn render(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run("echo", &["hello"]).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_run_reports_failure_with_output() {
        let err = run("sh", &["-c", "echo boom >&2; exit 3"]).await.unwrap_err();
        match err {
            BootstrapError::CommandFailed { command, output, .. } => {
                assert!(command.starts_with("sh -c"));
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary_is_spawn_error() {
        let err = run("definitely-not-a-binary", &[]).await.unwrap_err();
        assert!(matches!(err, BootstrapError::CommandSpawn { .. }));
    }

    #[tokio::test]
    async fn test_run_with_env_passes_variables() {
        let out = run_with_env("sh", &["-c", "printf %s \"$NODEUP_TEST_VAR\""], &[(
            "NODEUP_TEST_VAR",
            "value",
        )])
        .await
        .unwrap();
        assert_eq!(out, "value");
    }
}
