use crate::diagnostics::{LocatableResult, Span, SyntaxError};
use crate::lexer::TokenKind;
use common::{SiteId, TxnId, VariableId};
use logos::Logos;

/// A parsed command line, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Begin { txn: TxnId },
    BeginRo { txn: TxnId },
    Read { txn: TxnId, var: VariableId },
    Write { txn: TxnId, var: VariableId, value: i64 },
    End { txn: TxnId },
    Fail { site: SiteId },
    Recover { site: SiteId },
    Dump { sites: Vec<SiteId> },
}

/// Parse one line of the command language.
///
/// Returns `Ok(None)` for blank or comment-only lines. Malformed lines yield a
/// spanned [`crate::diagnostics::CompileError`] which the caller renders as a
/// diagnostic and otherwise ignores.
pub fn parse_line(line: &str) -> LocatableResult<Option<Command>> {
    let mut tokens = Vec::new();
    for (token, span) in TokenKind::lexer(line).spanned() {
        match token {
            Ok(token) => tokens.push((token, span)),
            Err(e) => return Err((e.into(), span)),
        }
    }

    if tokens.is_empty() {
        return Ok(None);
    }

    let mut parser = LineParser {
        tokens,
        pos: 0,
        eol: line.len(),
    };
    let command = parser.command()?;
    parser.expect_end()?;
    Ok(Some(command))
}

struct LineParser {
    tokens: Vec<(TokenKind, Span)>,
    pos: usize,
    eol: usize,
}

impl LineParser {
    fn command(&mut self) -> LocatableResult<Command> {
        const COMMANDS: &[&str] = &[
            "begin", "beginRO", "R", "W", "end", "fail", "recover", "dump",
        ];

        let (head, span) = self.bump(COMMANDS)?;
        match head {
            TokenKind::Begin => {
                let txn = self.parenthesized_txn()?;
                Ok(Command::Begin { txn })
            }
            TokenKind::BeginRo => {
                let txn = self.parenthesized_txn()?;
                Ok(Command::BeginRo { txn })
            }
            TokenKind::End => {
                let txn = self.parenthesized_txn()?;
                Ok(Command::End { txn })
            }
            TokenKind::Read => {
                self.expect_lparen()?;
                let txn = self.txn_ref()?;
                self.expect_comma()?;
                let var = self.var_ref()?;
                self.expect_rparen()?;
                Ok(Command::Read { txn, var })
            }
            TokenKind::Write => {
                self.expect_lparen()?;
                let txn = self.txn_ref()?;
                self.expect_comma()?;
                let var = self.var_ref()?;
                self.expect_comma()?;
                let value = self.integer()?;
                self.expect_rparen()?;
                Ok(Command::Write { txn, var, value })
            }
            TokenKind::Fail => {
                let site = self.parenthesized_site()?;
                Ok(Command::Fail { site })
            }
            TokenKind::Recover => {
                let site = self.parenthesized_site()?;
                Ok(Command::Recover { site })
            }
            TokenKind::Dump => {
                let sites = self.dump_sites()?;
                Ok(Command::Dump { sites })
            }
            other => Err(unexpected(&other, span, COMMANDS)),
        }
    }

    fn parenthesized_txn(&mut self) -> LocatableResult<TxnId> {
        self.expect_lparen()?;
        let txn = self.txn_ref()?;
        self.expect_rparen()?;
        Ok(txn)
    }

    fn parenthesized_site(&mut self) -> LocatableResult<SiteId> {
        self.expect_lparen()?;
        let site = self.site_ref()?;
        self.expect_rparen()?;
        Ok(site)
    }

    /// `dump()` dumps everything; `dump(s1, 3)` dumps the listed sites.
    fn dump_sites(&mut self) -> LocatableResult<Vec<SiteId>> {
        self.expect_lparen()?;
        let mut sites = Vec::new();
        if matches!(self.peek(), Some(TokenKind::RParen)) {
            self.expect_rparen()?;
            return Ok(sites);
        }
        loop {
            sites.push(self.site_ref()?);
            match self.bump(&[",", ")"])? {
                (TokenKind::Comma, _) => continue,
                (TokenKind::RParen, _) => break,
                (other, span) => return Err(unexpected(&other, span, &[",", ")"])),
            }
        }
        Ok(sites)
    }

    fn txn_ref(&mut self) -> LocatableResult<TxnId> {
        match self.bump(&["T<id>"])? {
            (TokenKind::TxnRef(id), _) => Ok(TxnId::new(id)),
            (other, span) => Err(unexpected(&other, span, &["T<id>"])),
        }
    }

    fn var_ref(&mut self) -> LocatableResult<VariableId> {
        match self.bump(&["x<id>"])? {
            (TokenKind::VarRef(id), _) => Ok(VariableId::new(id)),
            (other, span) => Err(unexpected(&other, span, &["x<id>"])),
        }
    }

    /// Site arguments come tagged (`s3`) or bare (`3`), matching the scripts in
    /// the wild.
    fn site_ref(&mut self) -> LocatableResult<SiteId> {
        match self.bump(&["s<id>", "<id>"])? {
            (TokenKind::SiteRef(id), _) => Ok(SiteId::new(id)),
            (TokenKind::Integer(id), span) => {
                u32::try_from(id)
                    .map(SiteId::new)
                    .map_err(|_| unexpected(&TokenKind::Integer(id), span, &["s<id>", "<id>"]))
            }
            (other, span) => Err(unexpected(&other, span, &["s<id>", "<id>"])),
        }
    }

    fn integer(&mut self) -> LocatableResult<i64> {
        match self.bump(&["<value>"])? {
            (TokenKind::Integer(v), _) => Ok(v),
            (other, span) => Err(unexpected(&other, span, &["<value>"])),
        }
    }

    fn expect_lparen(&mut self) -> LocatableResult<()> {
        match self.bump(&["("])? {
            (TokenKind::LParen, _) => Ok(()),
            (other, span) => Err(unexpected(&other, span, &["("])),
        }
    }

    fn expect_rparen(&mut self) -> LocatableResult<()> {
        match self.bump(&[")"])? {
            (TokenKind::RParen, _) => Ok(()),
            (other, span) => Err(unexpected(&other, span, &[")"])),
        }
    }

    fn expect_comma(&mut self) -> LocatableResult<()> {
        match self.bump(&[","])? {
            (TokenKind::Comma, _) => Ok(()),
            (other, span) => Err(unexpected(&other, span, &[","])),
        }
    }

    fn expect_end(&mut self) -> LocatableResult<()> {
        match self.tokens.get(self.pos) {
            None => Ok(()),
            Some((token, span)) => Err(unexpected(token, span.clone(), &["end of line"])),
        }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn bump(&mut self, expected: &[&str]) -> LocatableResult<(TokenKind, Span)> {
        match self.tokens.get(self.pos) {
            Some((token, span)) => {
                self.pos += 1;
                Ok((token.clone(), span.clone()))
            }
            None => Err((
                SyntaxError::UnexpectedEol {
                    expected: expected.iter().map(|s| s.to_string()).collect(),
                }
                .into(),
                self.eol..self.eol,
            )),
        }
    }
}

fn unexpected(
    token: &TokenKind,
    span: Span,
    expected: &[&str],
) -> (crate::diagnostics::CompileError, Span) {
    (
        SyntaxError::UnexpectedToken {
            token: token.describe(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
        }
        .into(),
        span,
    )
}

#[cfg(test)]
mod accepted_lines {
    use super::*;
    use pretty_assertions_sorted::assert_eq;

    #[test]
    fn test_begin_and_begin_ro() {
        assert_eq!(
            parse_line("begin(T1)").unwrap(),
            Some(Command::Begin { txn: TxnId::new(1) })
        );
        assert_eq!(
            parse_line("beginRO(T4)").unwrap(),
            Some(Command::BeginRo { txn: TxnId::new(4) })
        );
    }

    #[test]
    fn test_read_write_end() {
        assert_eq!(
            parse_line("R(T2, x14)").unwrap(),
            Some(Command::Read {
                txn: TxnId::new(2),
                var: VariableId::new(14),
            })
        );
        assert_eq!(
            parse_line("W(T1, x6, 66)").unwrap(),
            Some(Command::Write {
                txn: TxnId::new(1),
                var: VariableId::new(6),
                value: 66,
            })
        );
        assert_eq!(
            parse_line("end(T1)").unwrap(),
            Some(Command::End { txn: TxnId::new(1) })
        );
    }

    #[test]
    fn test_site_commands_accept_both_spellings() {
        assert_eq!(
            parse_line("fail(3)").unwrap(),
            Some(Command::Fail { site: SiteId::new(3) })
        );
        assert_eq!(
            parse_line("fail(s3)").unwrap(),
            Some(Command::Fail { site: SiteId::new(3) })
        );
        assert_eq!(
            parse_line("recover(s10)").unwrap(),
            Some(Command::Recover {
                site: SiteId::new(10),
            })
        );
    }

    #[test]
    fn test_dump_variants() {
        assert_eq!(
            parse_line("dump()").unwrap(),
            Some(Command::Dump { sites: vec![] })
        );
        assert_eq!(
            parse_line("dump(s1, 3, s5)").unwrap(),
            Some(Command::Dump {
                sites: vec![SiteId::new(1), SiteId::new(3), SiteId::new(5)],
            })
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   \t").unwrap(), None);
        assert_eq!(parse_line("// a whole-line comment").unwrap(), None);
        assert_eq!(
            parse_line("W(T1,x2,5) // trailing comment").unwrap(),
            Some(Command::Write {
                txn: TxnId::new(1),
                var: VariableId::new(2),
                value: 5,
            })
        );
    }
}

#[cfg(test)]
mod rejected_lines {
    use super::*;

    #[test]
    fn test_bare_integer_is_not_a_transaction() {
        assert!(parse_line("begin(1)").is_err());
    }

    #[test]
    fn test_missing_write_value() {
        assert!(parse_line("W(T1, x2)").is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(parse_line("end(T1) end(T2)").is_err());
    }

    #[test]
    fn test_unknown_command_word() {
        assert!(parse_line("commit(T1)").is_err());
    }

    #[test]
    fn test_negative_site_id() {
        assert!(parse_line("fail(-2)").is_err());
    }

    #[test]
    fn test_unterminated_call() {
        assert!(parse_line("dump(").is_err());
    }
}
