use crate::lexer::LexerError;
use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFile,
    term::{
        self,
        termcolor::{self, WriteColor},
    },
};
use std::{io, ops::Range};
use thiserror::Error;

pub type Spanned<T> = (T, Span);
pub type Span = Range<usize>;

pub type LocatableError = Spanned<CompileError>;
pub type LocatableResult<T, E = LocatableError> = std::result::Result<T, E>;

macro_rules! impl_from {
    ($($error:tt),+) => {$(
        impl From<$error> for CompileError {
            fn from(e: $error) -> Self {
                CompileError::$error(e)
            }
        }
    )+};
}

impl_from!(LexerError, SyntaxError);

pub trait ToDiagnostic {
    fn to_diagnostic(&self, span: &Span) -> Diagnostic<()>;
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum CompileError {
    #[error("LexerError: {0}")]
    LexerError(LexerError),
    #[error("SyntaxError: {0}")]
    SyntaxError(SyntaxError),
}

impl ToDiagnostic for CompileError {
    fn to_diagnostic(&self, span: &Span) -> Diagnostic<()> {
        match self {
            CompileError::LexerError(e) => Diagnostic::error()
                .with_code("Lexer Error: ")
                .with_message(e.to_string())
                .with_labels(vec![Label::primary((), span.clone())]),
            CompileError::SyntaxError(e) => e.to_diagnostic(span),
        }
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SyntaxError {
    #[error("unexpected token: {token:?} expected: {expected:?}")]
    UnexpectedToken {
        token: String,
        expected: Vec<String>,
    },
    #[error("unexpected end of line")]
    UnexpectedEol { expected: Vec<String> },
}

impl ToDiagnostic for SyntaxError {
    fn to_diagnostic(&self, span: &Span) -> Diagnostic<()> {
        let mut diagnostic = Diagnostic::error()
            .with_code("Syntax Error: ")
            .with_message(self.to_string())
            .with_labels(vec![Label::primary((), span.clone())]);
        match self {
            SyntaxError::UnexpectedEol { expected, .. }
            | SyntaxError::UnexpectedToken { expected, .. } => {
                diagnostic = diagnostic.with_notes(vec![format!("expected: {}", one_of(expected))]);
            }
        };
        diagnostic
    }
}

fn one_of(strings: &[String]) -> String {
    let mut result = String::new();
    for (i, string) in strings.iter().enumerate() {
        if i > 0 {
            result.push_str(", ");
        }

        if i == strings.len() - 1 && strings.len() > 1 {
            result.push_str("or ");
        }
        result.push_str(string);
    }
    result
}

pub fn report_errors(writer: &mut impl io::Write, source: &str, errors: &[LocatableError]) {
    let mut buffer = termcolor::Buffer::ansi();
    for err in errors {
        report_error(&mut buffer, source, err);
    }
    writer
        .write_all(buffer.as_slice())
        .expect("failed to write to output");
}

pub fn report_error(writer: &mut impl WriteColor, source: &str, (error, span): &LocatableError) {
    let file = SimpleFile::new("<command>", source);
    let config = term::Config::default();
    let diagnostic = error.to_diagnostic(span);

    term::emit(writer, &config, &file, &diagnostic).expect("failed to emit diagnostic");
}
