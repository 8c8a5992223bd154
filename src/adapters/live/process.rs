//! Live process runner using `tokio::process`.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::ports::process::{ProcessFuture, ProcessOutput, ProcessRequest, ProcessRunner};

/// How often a running child is checked for cancellation and timeout.
const WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Live process runner that spawns real child processes.
pub struct LiveProcessRunner;

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Interrupted(String),
}

impl ProcessRunner for LiveProcessRunner {
    fn run(&self, request: &ProcessRequest) -> ProcessFuture<'_> {
        let request = request.clone();
        Box::pin(async move {
            let mut command = Command::new(&request.program);
            command
                .args(&request.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            if let Some(dir) = &request.working_dir {
                command.current_dir(dir);
            }
            for (key, value) in &request.env {
                command.env(key, value);
            }

            let mut child = command.spawn().map_err(
                |e| -> Box<dyn std::error::Error + Send + Sync> {
                    format!("failed to spawn {}: {e}", request.program).into()
                },
            )?;

            // Drain pipes concurrently; dotnet test output can exceed the
            // pipe buffer long before the process exits.
            let stdout_task = tokio::spawn(drain(child.stdout.take()));
            let stderr_task = tokio::spawn(drain(child.stderr.take()));

            let outcome = tokio::select! {
                status = child.wait() => WaitOutcome::Exited(status),
                reason = watch_limits(&request) => WaitOutcome::Interrupted(reason),
            };

            match outcome {
                WaitOutcome::Exited(status) => {
                    let status = status.map_err(
                        |e| -> Box<dyn std::error::Error + Send + Sync> {
                            format!("failed to wait on {}: {e}", request.program).into()
                        },
                    )?;
                    Ok(ProcessOutput {
                        exit_code: status.code().unwrap_or(-1),
                        stdout: stdout_task.await.unwrap_or_default(),
                        stderr: stderr_task.await.unwrap_or_default(),
                    })
                }
                WaitOutcome::Interrupted(reason) => {
                    let _ = child.kill().await;
                    Err(reason.into())
                }
            }
        })
    }
}

/// Resolves only when the request is cancelled or its timeout elapses,
/// with the reason text.
async fn watch_limits(request: &ProcessRequest) -> String {
    let started = tokio::time::Instant::now();
    let mut watch = tokio::time::interval(WATCH_INTERVAL);
    loop {
        watch.tick().await;
        if request.cancel.is_cancelled() {
            return format!("{} cancelled", request.program);
        }
        if let Some(limit) = request.timeout {
            if started.elapsed() >= limit {
                return format!(
                    "{} timed out after {}s",
                    request.program,
                    limit.as_secs()
                );
            }
        }
    }
}

async fn drain(pipe: Option<impl AsyncReadExt + Unpin>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = LiveProcessRunner;
        let request = ProcessRequest::new("sh", vec!["-c".into(), "echo hello".into()]);

        let output = runner.run(&request).await.unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hello");
        assert!(output.stderr.is_empty());
    }

    #[tokio::test]
    async fn reports_nonzero_exit_as_data() {
        let runner = LiveProcessRunner;
        let request = ProcessRequest::new("sh", vec!["-c".into(), "exit 42".into()]);

        let output = runner.run(&request).await.unwrap();
        assert_eq!(output.exit_code, 42);
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let runner = LiveProcessRunner;
        let request = ProcessRequest::new("definitely-not-a-real-program", vec![]);

        assert!(runner.run(&request).await.is_err());
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let runner = LiveProcessRunner;
        let mut request = ProcessRequest::new("sh", vec!["-c".into(), "sleep 30".into()]);
        request.timeout = Some(Duration::from_millis(200));

        let err = runner.run(&request).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child() {
        let cancel = CancellationToken::new();
        let mut request = ProcessRequest::new("sh", vec!["-c".into(), "sleep 30".into()]);
        request.cancel = cancel.clone();

        let task = tokio::spawn(async move { LiveProcessRunner.run(&request).await });
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
