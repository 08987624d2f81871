//! Process execution collaborator
//!
//! All compiler, package-manager and installer invocations go through
//! [`run_process`]. Environment variables for a build are passed via an
//! explicit [`BuildEnvironment`], never by mutating the ambient process
//! environment, so repeated builds in one process do not bleed flags
//! between runs.

use crate::builder::env::BuildEnvironment;
use crate::error::{PyforgeError, PyforgeResult};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Options for one process invocation
#[derive(Debug, Default)]
pub struct ExecOptions<'a> {
    /// Working directory (inherited when `None`)
    pub cwd: Option<&'a Path>,
    /// Extra environment for this invocation
    pub env: Option<&'a BuildEnvironment>,
    /// Capture stdout/stderr instead of inheriting the terminal
    pub capture: bool,
    /// Treat a non-zero exit code as success
    pub ignore_failure: bool,
}

/// Result of a completed process
#[derive(Debug)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Captured stdout with surrounding whitespace removed
    pub fn stdout_trimmed(&self) -> String {
        self.stdout.trim().to_string()
    }
}

/// Run a process to completion.
///
/// Fails with [`PyforgeError::CommandExecution`] when the exit code is
/// non-zero and `ignore_failure` is not set, and with
/// [`PyforgeError::CommandFailed`] when the process cannot be spawned.
pub async fn run_process(
    program: &str,
    args: &[&str],
    opts: ExecOptions<'_>,
) -> PyforgeResult<ExecOutput> {
    let cmdline = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };
    debug!("Executing: {cmdline}");

    let mut command = Command::new(program);
    command.args(args);
    if let Some(cwd) = opts.cwd {
        command.current_dir(cwd);
    }
    if let Some(env) = opts.env {
        for (key, value) in env.iter() {
            command.env(key, value);
        }
    }

    let (code, stdout, stderr) = if opts.capture {
        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PyforgeError::command_failed(&cmdline, e))?;
        (
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    } else {
        let status = command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| PyforgeError::command_failed(&cmdline, e))?;
        (status.code().unwrap_or(-1), String::new(), String::new())
    };

    if code != 0 && !opts.ignore_failure {
        return Err(PyforgeError::command_exec(&cmdline, stderr));
    }

    Ok(ExecOutput {
        code,
        stdout,
        stderr,
    })
}

/// Run a build-pipeline step, mapping a non-zero exit to
/// [`PyforgeError::BuildStep`] so callers can distinguish toolchain
/// failures from spawn failures.
pub async fn run_build_step(
    step: &str,
    program: &str,
    args: &[&str],
    opts: ExecOptions<'_>,
) -> PyforgeResult<ExecOutput> {
    let cmdline = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };
    let opts = ExecOptions {
        ignore_failure: true,
        ..opts
    };
    let output = run_process(program, args, opts).await?;
    if !output.success() {
        return Err(PyforgeError::build_step(step, cmdline, output.code));
    }
    Ok(output)
}

/// Run a command and return its trimmed stdout (e.g. `brew --prefix`)
pub async fn capture_stdout(program: &str, args: &[&str]) -> PyforgeResult<String> {
    let output = run_process(
        program,
        args,
        ExecOptions {
            capture: true,
            ..Default::default()
        },
    )
    .await?;
    Ok(output.stdout_trimmed())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let output = run_process(
            "echo",
            &["hello"],
            ExecOptions {
                capture: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_error() {
        let result = run_process(
            "sh",
            &["-c", "exit 3"],
            ExecOptions {
                capture: true,
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(PyforgeError::CommandExecution { .. })
        ));
    }

    #[tokio::test]
    async fn ignore_failure_returns_code() {
        let output = run_process(
            "sh",
            &["-c", "exit 3"],
            ExecOptions {
                capture: true,
                ignore_failure: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(output.code, 3);
    }

    #[tokio::test]
    async fn build_step_failure_maps_to_build_step_error() {
        let result = run_build_step(
            "configure",
            "sh",
            &["-c", "exit 2"],
            ExecOptions {
                capture: true,
                ..Default::default()
            },
        )
        .await;
        match result {
            Err(PyforgeError::BuildStep { step, code, .. }) => {
                assert_eq!(step, "configure");
                assert_eq!(code, 2);
            }
            other => panic!("expected BuildStep, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_reports_full_command_line() {
        let result = run_process(
            "sh",
            &["-c", "exit 1"],
            ExecOptions {
                capture: true,
                ..Default::default()
            },
        )
        .await;
        match result {
            Err(PyforgeError::CommandExecution { command, .. }) => {
                assert_eq!(command, "sh -c exit 1");
            }
            other => panic!("expected CommandExecution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_failure_is_command_failed() {
        let result = run_process(
            "definitely-not-a-real-binary-pyforge",
            &[],
            ExecOptions {
                capture: true,
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(PyforgeError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn env_vars_passed_through() {
        let mut env = BuildEnvironment::new();
        env.set("PYFORGE_TEST_VAR", "42");
        let output = run_process(
            "sh",
            &["-c", "echo $PYFORGE_TEST_VAR"],
            ExecOptions {
                capture: true,
                env: Some(&env),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(output.stdout_trimmed(), "42");
    }
}
