//! Command dispatch and handlers.

pub mod batch;
pub mod report;
pub mod synth;

use crate::cli::Command;
use crate::error::Result;

/// Dispatch a parsed command to its handler.
///
/// # Errors
///
/// Returns an error if the selected command handler fails.
pub async fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Synth(args) => synth::run(args).await,
        Command::Batch(args) => batch::run(args).await,
        Command::Report(args) => report::run(&args.run),
    }
}
