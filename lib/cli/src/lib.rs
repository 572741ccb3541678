use clap::{command, Args, Parser, Subcommand};
use getset::Getters;
use std::path::PathBuf;
use typed_builder::TypedBuilder;

pub mod tui;

/// repldb: a replicated-data transaction manager
#[derive(Debug, Parser, Getters)]
#[command(name = "repldb")]
#[command(about = "repldb: serializable transactions over replicated sites", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    #[getset(get = "pub")]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a command script (file, or stdin when omitted / `-`)
    Run(RunArgs),
    /// Start an interactive command shell
    Shell(ShellArgs),
}

#[derive(Debug, Args, Getters, TypedBuilder)]
pub struct RunArgs {
    /// Path to a command script, `-` for stdin
    #[getset(get = "pub")]
    script: Option<PathBuf>,
    /// Optional topology configuration file (TOML)
    #[arg(short, long)]
    #[getset(get = "pub")]
    config: Option<PathBuf>,
}

#[derive(Debug, Args, Getters, TypedBuilder)]
pub struct ShellArgs {
    /// Optional topology configuration file (TOML)
    #[arg(short, long)]
    #[getset(get = "pub")]
    config: Option<PathBuf>,
}
