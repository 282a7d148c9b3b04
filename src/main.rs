use std::error::Error as _;
use std::process;

use pulse::{config, infra::telemetry};
use tracing::{dispatcher, error};

mod commands;

use commands::{CliError, Context};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_error(&error);
        process::exit(1);
    }
}

/// Print the error and its causes to stderr, and log it once telemetry is up.
fn report_error(error: &CliError) {
    eprintln!("error: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }

    if dispatcher::has_been_set() {
        error!(error = %error, "command failed");
    }
}

async fn run() -> Result<(), CliError> {
    let (cli_args, settings) = config::load_with_cli()?;
    telemetry::init(&settings.logging)?;

    let ctx = Context::connect(&settings).await?;
    commands::dispatch(&ctx, cli_args.command).await
}
