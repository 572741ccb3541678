use nu_ansi_term::{Color, Style};
use reedline::{Highlighter, StyledText};

pub(crate) struct CommandHighlighter;

impl CommandHighlighter {
    pub(crate) fn new() -> Self {
        CommandHighlighter
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current_token = String::new();

    for ch in line.chars() {
        match ch {
            ' ' | ',' | '(' | ')' => {
                if !current_token.is_empty() {
                    tokens.push(current_token.clone());
                    current_token.clear();
                }
                tokens.push(ch.to_string());
            }
            _ => current_token.push(ch),
        }
    }

    if !current_token.is_empty() {
        tokens.push(current_token);
    }

    tokens
}

impl Highlighter for CommandHighlighter {
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let mut styled_text = StyledText::new();

        for token in tokenize(line) {
            let style = if is_command_keyword(&token) {
                Style::new().fg(Color::Green)
            } else if is_operation_keyword(&token) {
                Style::new().fg(Color::LightCyan)
            } else if is_txn_ref(&token) {
                Style::new().fg(Color::LightBlue)
            } else if is_var_ref(&token) || is_site_ref(&token) || is_numeric(&token) {
                Style::new().fg(Color::Yellow)
            } else if is_punctuation(&token) {
                Style::new().fg(Color::DarkGray)
            } else {
                Style::new().fg(Color::White)
            };

            styled_text.push((style, token));
        }

        styled_text
    }
}

fn is_command_keyword(word: &str) -> bool {
    ["begin", "beginRO", "end", "fail", "recover", "dump"].contains(&word)
}

fn is_operation_keyword(word: &str) -> bool {
    ["R", "W"].contains(&word)
}

fn is_txn_ref(word: &str) -> bool {
    word.strip_prefix('T')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn is_var_ref(word: &str) -> bool {
    word.strip_prefix('x')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn is_site_ref(word: &str) -> bool {
    word.strip_prefix('s')
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

fn is_numeric(word: &str) -> bool {
    word.parse::<i64>().is_ok()
}

fn is_punctuation(word: &str) -> bool {
    [",", "(", ")"].contains(&word)
}
