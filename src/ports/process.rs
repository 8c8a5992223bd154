//! Process runner port for driving external toolchains.

use std::collections::BTreeMap;
use std::error::Error;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use crate::cancel::CancellationToken;

/// Boxed future type alias used by [`ProcessRunner`] to keep the trait
/// dyn-compatible.
pub type ProcessFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ProcessOutput, Box<dyn Error + Send + Sync>>> + Send + 'a>>;

/// One external command invocation.
///
/// Arguments are passed verbatim, never through a shell, so test project
/// paths with spaces survive intact.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// Program to execute, e.g. `dotnet` or `git`.
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
    /// Working directory; the runner's current directory when `None`.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables for the child.
    pub env: BTreeMap<String, String>,
    /// Hard wall-clock limit; exceeding it kills the child.
    pub timeout: Option<Duration>,
    /// Cancellation signal; observed while the child runs.
    pub cancel: CancellationToken,
}

impl ProcessRequest {
    /// Builds a request with no working directory, environment, timeout,
    /// or cancellation wired up.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            env: BTreeMap::new(),
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// The captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Runs external commands and captures their output.
///
/// A spawn failure (program not found) is an error; a non-zero exit is
/// data and comes back in [`ProcessOutput`].
pub trait ProcessRunner: Send + Sync {
    /// Runs the command to completion, honoring the request's timeout and
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned, times out, or is
    /// cancelled before it finishes.
    fn run(&self, request: &ProcessRequest) -> ProcessFuture<'_>;
}
