use self::{highlighter::CommandHighlighter, prompt::CommandPrompt};
use crate::ManagerRef;
use anyhow::Result;
use compile::diagnostics::report_errors;
use compile::parse_line;
use nu_ansi_term::{Color, Style};
use owo_colors::OwoColorize;
use prettytable::{row, Table};
use reedline::{DefaultHinter, FileBackedHistory, Reedline, Signal};
use storage::SiteStatus;
use tracing::warn;
use typed_builder::TypedBuilder;

mod highlighter;
mod prompt;

/// Interactive command shell: one transaction-manager session fed line by
/// line, with history and highlighting for the command language.
#[derive(TypedBuilder)]
pub struct Shell {
    manager: ManagerRef,
    prompt: CommandPrompt,
    line_editor: Reedline,
    bail_on_error: bool,
}

impl Shell {
    pub fn new(manager: ManagerRef) -> Self {
        let prompt = CommandPrompt::default();
        let highlighter = CommandHighlighter::new();
        let history = FileBackedHistory::with_file(100, "history.txt".into())
            .expect("Unable to create history file");
        let hinter =
            DefaultHinter::default().with_style(Style::new().italic().fg(Color::LightGray));

        let line_editor = Reedline::create()
            .with_highlighter(Box::new(highlighter))
            .with_history(Box::new(history))
            .with_hinter(Box::new(hinter));

        Shell::builder()
            .manager(manager)
            .prompt(prompt)
            .line_editor(line_editor)
            .bail_on_error(false)
            .build()
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            let input = self.line_editor.read_line(&self.prompt)?;
            match input {
                Signal::Success(buffer) => {
                    self.prompt.increment_line_count();

                    if buffer.trim().is_empty() {
                        continue;
                    }

                    if let Err(e) = self.process_command(buffer.trim()) {
                        if self.bail_on_error {
                            return Err(e);
                        }
                    }
                }
                Signal::CtrlC | Signal::CtrlD => {
                    println!("Goodbye!");
                    break;
                }
            }
        }
        Ok(())
    }

    fn process_command(&mut self, command: &str) -> Result<()> {
        if command.starts_with('.') {
            return self.handle_dot_command(command);
        }

        match parse_line(command) {
            Ok(Some(parsed)) => {
                if let Err(e) = self.manager.lock().dispatch(parsed) {
                    warn!("{}", e);
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => {
                report_errors(&mut std::io::stderr(), command, &[error.clone()]);
                Err(anyhow::anyhow!("{}", error.0))
            }
        }
    }

    fn handle_dot_command(&mut self, command: &str) -> Result<()> {
        match command.split_whitespace().collect::<Vec<&str>>().as_slice() {
            [".bail"] => {
                println!(
                    "{}",
                    format!(
                        "Error stop mode is {}",
                        if self.bail_on_error {
                            "on".green().to_string()
                        } else {
                            "off".red().to_string()
                        }
                    )
                    .purple()
                );
                Ok(())
            }
            [".bail", "on"] => {
                self.bail_on_error = true;
                Ok(())
            }
            [".bail", "off"] => {
                self.bail_on_error = false;
                Ok(())
            }
            [".exit"] => {
                println!("Goodbye!");
                std::process::exit(0);
            }
            [".exit", code] => {
                println!("Goodbye!");
                std::process::exit(code.parse::<i32>().unwrap_or(0));
            }
            [".help"] => {
                self.show_help();
                Ok(())
            }
            [".quit"] => {
                println!("Goodbye!");
                std::process::exit(0);
            }
            [".sites"] => {
                self.show_sites();
                Ok(())
            }
            _ => {
                println!(
                    "{}{}{}{}{}",
                    "Unrecognized dot command".purple(),
                    ":".black(),
                    " `".red(),
                    command.yellow(),
                    "`".red(),
                );
                Ok(())
            }
        }
    }

    fn show_sites(&self) {
        let mut table = Table::new();
        table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
        table.set_titles(row!["Site", "Status"]);
        for (site, status) in self.manager.lock().site_overview() {
            let status = match status {
                SiteStatus::Available => "available".green().to_string(),
                SiteStatus::Failed => "failed".red().to_string(),
            };
            table.add_row(row![site, status]);
        }
        table.printstd();
    }

    fn show_help(&self) {
        let mut table = Table::new();

        table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        table.set_titles(row![
            "Command language",
            "One command per line, executed immediately",
        ]);

        table.add_row(row!["begin(T1) / beginRO(T1)", "Start a RW / RO transaction"]);
        table.add_row(row!["R(T1, x4)", "Read variable x4 in T1"]);
        table.add_row(row!["W(T1, x4, 42)", "Write 42 to x4 in T1"]);
        table.add_row(row!["end(T1)", "Commit (or abort) T1"]);
        table.add_row(row!["fail(s3) / recover(s3)", "Crash / recover site 3"]);
        table.add_row(row![
            "dump() / dump(s1, s2)",
            "Print committed values on all / listed sites"
        ]);

        table.printstd();

        let mut table = Table::new();

        println!();
        println!("Available dot commands:");

        table.set_format(*prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE);

        table.set_titles(row!["Command", "Description"]);

        table.add_row(row![".bail [on|off]", "Stop on the first malformed line"]);
        table.add_row(row![
            ".exit [CODE]",
            "Exit this program with return-code [CODE]"
        ]);
        table.add_row(row![".help", "Show this help information"]);
        table.add_row(row![".quit", "Exit this program (with return-code 0)"]);
        table.add_row(row![".sites", "Show site availability"]);

        table.printstd();
    }
}
