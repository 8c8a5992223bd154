//! `darner batch` command.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use crate::batch::{load_batch_config, run_batch};
use crate::cli::BatchArgs;
use crate::context::ServiceContext;
use crate::error::Result;
use crate::generate::GenerationOptions;

/// Execute the `batch` command against the real toolchain.
///
/// # Errors
///
/// Returns an error when the config file is missing or malformed, or the
/// batch report cannot be written. Individual project failures are
/// recorded in the report instead.
pub async fn run(args: BatchArgs) -> Result<()> {
    let generation = GenerationOptions {
        provider: args.provider,
        model: args.model,
        base_url: args.endpoint,
        ..GenerationOptions::default()
    };
    let ctx = Arc::new(ServiceContext::live(
        Path::new("."),
        &generation.test_framework,
        &generation.mocking,
    ));
    let mut stdout = io::stdout();
    run_with_context(ctx, &args.config, generation, &mut stdout).await
}

/// Execute the `batch` command with the given service context.
///
/// # Errors
///
/// Same contract as [`run`].
pub async fn run_with_context<W: Write>(
    ctx: Arc<ServiceContext>,
    config_path: &Path,
    generation: GenerationOptions,
    writer: &mut W,
) -> Result<()> {
    let config = load_batch_config(ctx.fs.as_ref(), config_path)?;
    let output_directory = config.output_directory.clone();
    run_batch(ctx, config, generation, writer).await?;
    writeln!(
        writer,
        "Batch report: {}",
        output_directory.join("batch-report.json").display()
    )?;
    Ok(())
}
