use anyhow::Result;
use clap::Parser;
use cli::{
    tui::{handle_run_command, handle_shell_command},
    Cli, Commands, RunArgs,
};
use common::util::trace::initialize_tracing;
use std::{process::ExitCode, time::Instant};
use tracing::trace;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    initialize_tracing()?;

    let start = Instant::now();
    let args = Cli::parse();
    trace!(?args, "Parsed CLI arguments in {:?}", start.elapsed());

    match args.command() {
        None => {
            // bare invocation: run a script from stdin
            handle_run_command(&RunArgs::builder().script(None).config(None).build()).await?;
        }
        Some(command) => match command {
            Commands::Run(args) => {
                handle_run_command(args).await?;
            }
            Commands::Shell(args) => {
                handle_shell_command(args).await?;
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
