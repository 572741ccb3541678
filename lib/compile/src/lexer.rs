use logos::{Lexer, Logos};
use thiserror::Error;

#[derive(Debug, Default, Error, PartialEq, Clone)]
pub enum LexerError {
    #[error("Unknown token")]
    #[default]
    UnknownToken,
    #[error("Invalid integer literal")]
    ParseInt,
}

impl From<std::num::ParseIntError> for LexerError {
    fn from(_: std::num::ParseIntError) -> Self {
        LexerError::ParseInt
    }
}

fn tagged_id(lex: &mut Lexer<TokenKind>) -> Option<u32> {
    // slice is e.g. "T12", "x4", "s10"; the tag is a single ascii char
    lex.slice()[1..].parse::<u32>().ok()
}

/// Tokens of the command language (`begin(T1)`, `W(T1, x6, 66)`, `dump()`, ...).
/// Keywords are case-sensitive; `T`/`x`/`s`-tagged ids carry their number.
#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexerError)]
pub enum TokenKind {
    #[regex(r"[ \n\t\r\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Ignored,

    #[token("beginRO")]
    BeginRo,
    #[token("begin")]
    Begin,
    #[token("end")]
    End,
    #[token("fail")]
    Fail,
    #[token("recover")]
    Recover,
    #[token("dump")]
    Dump,
    #[token("R")]
    Read,
    #[token("W")]
    Write,

    #[regex(r"T[0-9]+", tagged_id)]
    TxnRef(u32),
    #[regex(r"x[0-9]+", tagged_id)]
    VarRef(u32),
    #[regex(r"s[0-9]+", tagged_id)]
    SiteRef(u32),
    #[regex("-?[0-9]+", |lex| lex.slice().parse())]
    Integer(i64),

    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

impl TokenKind {
    /// Human-readable token name used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ignored => "whitespace".to_string(),
            TokenKind::BeginRo => "beginRO".to_string(),
            TokenKind::Begin => "begin".to_string(),
            TokenKind::End => "end".to_string(),
            TokenKind::Fail => "fail".to_string(),
            TokenKind::Recover => "recover".to_string(),
            TokenKind::Dump => "dump".to_string(),
            TokenKind::Read => "R".to_string(),
            TokenKind::Write => "W".to_string(),
            TokenKind::TxnRef(id) => format!("T{}", id),
            TokenKind::VarRef(id) => format!("x{}", id),
            TokenKind::SiteRef(id) => format!("s{}", id),
            TokenKind::Integer(v) => v.to_string(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
        }
    }
}

#[cfg(test)]
mod command_lines {
    use super::*;
    use pretty_assertions_sorted::assert_eq;
    use TokenKind::*;

    #[test]
    fn test_begin() {
        let lexer = TokenKind::lexer("begin(T1)");

        let tokens = lexer.spanned().collect::<Vec<_>>();

        assert_eq!(
            tokens,
            &[
                (Ok(Begin), 0..5),
                (Ok(LParen), 5..6),
                (Ok(TxnRef(1)), 6..8),
                (Ok(RParen), 8..9),
            ],
        );
    }

    #[test]
    fn test_begin_ro_is_not_begin() {
        let lexer = TokenKind::lexer("beginRO(T12)");

        let tokens = lexer.spanned().collect::<Vec<_>>();

        assert_eq!(
            tokens,
            &[
                (Ok(BeginRo), 0..7),
                (Ok(LParen), 7..8),
                (Ok(TxnRef(12)), 8..11),
                (Ok(RParen), 11..12),
            ],
        );
    }

    #[test]
    fn test_write_with_spaces() {
        let lexer = TokenKind::lexer("W(T1, x6, 66)");

        let tokens = lexer.spanned().collect::<Vec<_>>();

        assert_eq!(
            tokens,
            &[
                (Ok(Write), 0..1),
                (Ok(LParen), 1..2),
                (Ok(TxnRef(1)), 2..4),
                (Ok(Comma), 4..5),
                (Ok(VarRef(6)), 6..8),
                (Ok(Comma), 8..9),
                (Ok(Integer(66)), 10..12),
                (Ok(RParen), 12..13),
            ],
        );
    }

    #[test]
    fn test_negative_write_value() {
        let lexer = TokenKind::lexer("W(T3, x2, -7)");

        let tokens = lexer.spanned().collect::<Vec<_>>();

        assert_eq!(
            tokens,
            &[
                (Ok(Write), 0..1),
                (Ok(LParen), 1..2),
                (Ok(TxnRef(3)), 2..4),
                (Ok(Comma), 4..5),
                (Ok(VarRef(2)), 6..8),
                (Ok(Comma), 8..9),
                (Ok(Integer(-7)), 10..12),
                (Ok(RParen), 12..13),
            ],
        );
    }

    #[test]
    fn test_dump_with_site_refs_and_bare_integers() {
        let lexer = TokenKind::lexer("dump(s1, 3)");

        let tokens = lexer.spanned().collect::<Vec<_>>();

        assert_eq!(
            tokens,
            &[
                (Ok(Dump), 0..4),
                (Ok(LParen), 4..5),
                (Ok(SiteRef(1)), 5..7),
                (Ok(Comma), 7..8),
                (Ok(Integer(3)), 9..10),
                (Ok(RParen), 10..11),
            ],
        );
    }

    #[test]
    fn test_comment_is_skipped() {
        let lexer = TokenKind::lexer("end(T2) // commit the writer");

        let tokens = lexer.spanned().collect::<Vec<_>>();

        assert_eq!(
            tokens,
            &[
                (Ok(End), 0..3),
                (Ok(LParen), 3..4),
                (Ok(TxnRef(2)), 4..6),
                (Ok(RParen), 6..7),
            ],
        );
    }
}
