use crate::{RunArgs, ShellArgs};
use anyhow::{Context, Result};
use common::util::time::format_duration;
use common::SystemConfig;
use compile::diagnostics::report_errors;
use compile::parse_line;
use driver::shell::Shell;
use driver::{shared_manager, TransactionManager};
use std::io::Read;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Feed a whole script through one manager session, line by line.
///
/// Malformed lines are reported to stderr and skipped; semantic errors
/// (unknown transaction, duplicate begin, ...) are logged and skipped. Either
/// way the rest of the script keeps executing, so the observable output stays
/// a prefix-closed protocol stream.
pub async fn handle_run_command(args: &RunArgs) -> Result<()> {
    let start = Instant::now();
    let config = load_config(args.config())?;
    debug!(?config, "session configuration");
    let mut manager = TransactionManager::new(config);

    let source = match args.script() {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read script from stdin")?;
            buffer
        }
    };

    for line in source.lines() {
        match parse_line(line) {
            Ok(Some(command)) => {
                if let Err(e) = manager.dispatch(command) {
                    warn!("{e}; line ignored");
                }
            }
            Ok(None) => {}
            Err(error) => report_errors(&mut std::io::stderr(), line, &[error]),
        }
    }

    info!(
        "script processed in {}",
        format_duration(start.elapsed())
    );
    Ok(())
}

/// Start the interactive shell against a fresh session.
pub async fn handle_shell_command(args: &ShellArgs) -> Result<()> {
    let config = load_config(args.config())?;
    let manager = shared_manager(config);
    Shell::new(manager).run().await
}

fn load_config(path: &Option<PathBuf>) -> Result<SystemConfig> {
    match path {
        Some(path) => Ok(SystemConfig::load_from_file_and_env(
            &path.to_string_lossy(),
        )?),
        None => Ok(SystemConfig::default()),
    }
}
