//! Parser module for Workshell
//!
//! Implements a recursive descent parser over the token stream produced by
//! [`lexer::tokenize`].

mod ast;
mod lexer;
mod tokens;
mod word;

pub use ast::*;
pub use lexer::{is_name, tokenize};
pub use tokens::{Operator, RedirectOp, Token, TokenKind};

use crate::error::{Error, Result};

/// Deepest nesting of compound commands and command substitutions.
pub(crate) const MAX_NESTING_DEPTH: usize = 64;

/// Keywords that close or continue a compound command.
const CLOSERS: &[&str] = &["then", "elif", "else", "fi", "do", "done"];

/// Tokenize and parse a script.
pub fn parse_script(source: &str) -> Result<Vec<Statement>> {
    let tokens = tokenize(source)?;
    tracing::trace!(tokens = tokens.len(), "tokenized script");
    Parser::new(tokens).parse()
}

/// Parser for shell scripts.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Create a new parser over a token stream.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::nested(tokens, 0)
    }

    /// Parser for a substitution body `depth` levels down.
    pub(crate) fn nested(tokens: Vec<Token>, depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
        }
    }

    /// Parse the whole token stream.
    pub fn parse(mut self) -> Result<Vec<Statement>> {
        let statements = self.parse_compound_list(&[])?;
        if let Some(token) = self.current() {
            return Err(self.unexpected(token));
        }
        tracing::trace!(statements = statements.len(), "parsed script");
        Ok(statements)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.current().is_some_and(|t| t.is_keyword(kw))
    }

    fn at_operator(&self, op: Operator) -> bool {
        self.current().is_some_and(|t| t.is_operator(op))
    }

    fn at_closer(&self) -> bool {
        CLOSERS.iter().any(|kw| self.at_keyword(kw))
    }

    fn at_newline(&self) -> bool {
        self.current().is_some_and(|t| t.kind == TokenKind::Newline)
    }

    fn skip_newlines(&mut self) {
        while self.at_newline() {
            self.pos += 1;
        }
    }

    /// Line of the current token, or of the last token at end of input.
    fn line(&self) -> usize {
        self.current()
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn unexpected(&self, token: &Token) -> Error {
        Error::parse_at(
            format!("syntax error near unexpected token '{}'", token),
            token.line,
            token.column,
        )
    }

    fn unexpected_here(&self) -> Error {
        match self.current() {
            Some(token) => self.unexpected(token),
            None => Error::parse_at("syntax error: unexpected end of file", self.line(), 1),
        }
    }

    /// Consume keyword `kw` or fail naming it with the line of `opener`.
    fn expect_keyword(&mut self, kw: &str, opener: &Token) -> Result<()> {
        if self.at_keyword(kw) {
            self.pos += 1;
            return Ok(());
        }
        Err(Error::parse_at(
            format!("expected '{}' to close '{}'", kw, opener.text),
            opener.line,
            opener.column,
        ))
    }

    /// Statements up to one of `stop` (not consumed) or end of input.
    fn parse_compound_list(&mut self, stop: &[&str]) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            if self.current().is_none() || stop.iter().any(|kw| self.at_keyword(kw)) {
                break;
            }
            if self.at_closer() {
                return Err(self.unexpected_here());
            }
            statements.push(self.parse_sequence()?);
            if self.current().is_some() && !self.at_newline() && !self.at_closer() {
                return Err(self.unexpected_here());
            }
        }
        Ok(statements)
    }

    /// Pipelines joined by `;`, `&&`, `||`.
    fn parse_sequence(&mut self) -> Result<Statement> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();

        loop {
            let joiner = if self.at_operator(Operator::Semi) {
                self.pos += 1;
                // A trailing `;` ends the list
                if self.current().is_none() || self.at_newline() || self.at_closer() {
                    break;
                }
                Joiner::Semicolon
            } else if self.at_operator(Operator::AndIf) {
                self.pos += 1;
                self.skip_newlines();
                Joiner::And
            } else if self.at_operator(Operator::OrIf) {
                self.pos += 1;
                self.skip_newlines();
                Joiner::Or
            } else {
                break;
            };

            if self.current().is_none() || self.at_closer() {
                return Err(self.unexpected_here());
            }
            rest.push((joiner, self.parse_pipeline()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Statement::Sequence(Sequence {
                first: Box::new(first),
                rest,
            }))
        }
    }

    fn at_compound_start(&self) -> bool {
        ["if", "for", "while", "until"]
            .iter()
            .any(|kw| self.at_keyword(kw))
    }

    /// Simple commands joined by `|`, or a single compound command.
    fn parse_pipeline(&mut self) -> Result<Statement> {
        let negated = self.at_keyword("!");
        if negated {
            self.pos += 1;
        }

        if self.at_compound_start() {
            if negated {
                return Err(self.compound_error("negated"));
            }
            let statement = self.parse_compound()?;
            if self.at_operator(Operator::Pipe) {
                return Err(self.compound_error("used as pipeline stages"));
            }
            if matches!(self.current(), Some(t) if matches!(t.kind, TokenKind::Redirect(_))) {
                return Err(self.compound_error("redirected"));
            }
            return Ok(statement);
        }

        let mut stages = vec![self.parse_simple_command()?];
        while self.at_operator(Operator::Pipe) {
            self.pos += 1;
            self.skip_newlines();
            if self.at_compound_start() {
                return Err(self.compound_error("used as pipeline stages"));
            }
            stages.push(self.parse_simple_command()?);
        }

        if stages.len() == 1 && !negated {
            if let Some(cmd) = stages.pop() {
                return Ok(Statement::Simple(cmd));
            }
        }
        Ok(Statement::Pipeline(Pipeline { negated, stages }))
    }

    fn compound_error(&self, what: &str) -> Error {
        Error::parse_at(
            format!("compound commands cannot be {}", what),
            self.line(),
            self.current().map_or(1, |t| t.column),
        )
    }

    fn parse_compound(&mut self) -> Result<Statement> {
        let Some(opener) = self.advance() else {
            return Err(self.unexpected_here());
        };
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(Error::parse_at("nesting too deep", opener.line, opener.column));
        }
        self.depth += 1;
        let statement = match opener.text.as_str() {
            "if" => self.parse_if(opener),
            "for" => self.parse_for(opener),
            "while" => self.parse_while(opener, false),
            "until" => self.parse_while(opener, true),
            _ => Err(self.unexpected(&opener)),
        };
        self.depth -= 1;
        statement
    }

    fn word(&self, token: &Token) -> Result<Word> {
        Word::parse_nested_in(&token.text, token.line, self.depth)
    }

    /// A condition list as a single statement.
    fn parse_condition(&mut self, stop: &str, opener: &Token) -> Result<Box<Statement>> {
        let mut statements = self.parse_compound_list(&[stop])?;
        if statements.is_empty() {
            return Err(match self.current() {
                Some(token) => self.unexpected(token),
                None => Error::parse_at(
                    format!("expected '{}' to close '{}'", stop, opener.text),
                    opener.line,
                    opener.column,
                ),
            });
        }
        let first = statements.remove(0);
        if statements.is_empty() {
            return Ok(Box::new(first));
        }
        Ok(Box::new(Statement::Sequence(Sequence {
            first: Box::new(first),
            rest: statements
                .into_iter()
                .map(|s| (Joiner::Semicolon, s))
                .collect(),
        })))
    }

    fn parse_if(&mut self, opener: Token) -> Result<Statement> {
        let mut branches = Vec::new();
        let mut else_body = None;

        let condition = self.parse_condition("then", &opener)?;
        self.expect_keyword("then", &opener)?;
        let body = self.parse_compound_list(&["elif", "else", "fi"])?;
        branches.push((condition, body));

        loop {
            if self.at_keyword("elif") {
                self.pos += 1;
                let condition = self.parse_condition("then", &opener)?;
                self.expect_keyword("then", &opener)?;
                let body = self.parse_compound_list(&["elif", "else", "fi"])?;
                branches.push((condition, body));
            } else if self.at_keyword("else") {
                self.pos += 1;
                else_body = Some(self.parse_compound_list(&["fi"])?);
                self.expect_keyword("fi", &opener)?;
                break;
            } else {
                self.expect_keyword("fi", &opener)?;
                break;
            }
        }

        Ok(Statement::If(IfStatement {
            branches,
            else_body,
        }))
    }

    fn parse_for(&mut self, opener: Token) -> Result<Statement> {
        let var = match self.advance() {
            Some(t) if t.kind == TokenKind::Word && !t.quoted && is_name(&t.text) => t.text,
            Some(t) => {
                return Err(Error::parse_at(
                    format!("'{}': not a valid loop variable name", t.text),
                    t.line,
                    t.column,
                ));
            }
            None => return Err(self.unexpected_here()),
        };

        self.skip_newlines();
        let words = if self.at_keyword("in") {
            self.pos += 1;
            let mut words = Vec::new();
            while let Some(token) = self.current() {
                match token.kind {
                    TokenKind::Word | TokenKind::Assignment => {
                        words.push(self.word(token)?);
                        self.pos += 1;
                    }
                    TokenKind::Operator(Operator::Semi) | TokenKind::Newline => break,
                    _ => return Err(self.unexpected(token)),
                }
            }
            Some(words)
        } else {
            None
        };

        if self.at_operator(Operator::Semi) {
            self.pos += 1;
        }
        self.skip_newlines();
        self.expect_keyword("do", &opener)?;
        let body = self.parse_compound_list(&["done"])?;
        self.expect_keyword("done", &opener)?;

        Ok(Statement::For(ForLoop { var, words, body }))
    }

    fn parse_while(&mut self, opener: Token, until: bool) -> Result<Statement> {
        let condition = self.parse_condition("do", &opener)?;
        self.expect_keyword("do", &opener)?;
        let body = self.parse_compound_list(&["done"])?;
        self.expect_keyword("done", &opener)?;

        Ok(Statement::While(WhileLoop {
            condition,
            body,
            until,
        }))
    }

    fn parse_simple_command(&mut self) -> Result<SimpleCommand> {
        let line = self.line();
        let mut words = Vec::new();
        let mut assignments = Vec::new();
        let mut redirects: Vec<Redirection> = Vec::new();

        while let Some(token) = self.current().cloned() {
            match token.kind {
                TokenKind::Assignment if words.is_empty() => {
                    assignments.push(parse_assignment(&token, self.depth)?);
                    self.pos += 1;
                }
                TokenKind::Word | TokenKind::Assignment => {
                    words.push(self.word(&token)?);
                    self.pos += 1;
                }
                TokenKind::Redirect(op) => {
                    self.pos += 1;
                    if redirects.last().is_some_and(|r| r.mode.is_combined()) {
                        return Err(Error::parse_at(
                            "a combined redirection (&> or &>>) must be the last redirection of its command",
                            token.line,
                            token.column,
                        ));
                    }
                    let target = if op.takes_target() {
                        match self.advance() {
                            Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::Assignment) => {
                                Some(self.word(&t)?)
                            }
                            _ => {
                                return Err(Error::parse_at(
                                    format!("expected a filename after '{}'", token.text),
                                    token.line,
                                    token.column,
                                ));
                            }
                        }
                    } else {
                        None
                    };
                    redirects.push(build_redirection(op, target));
                }
                _ => break,
            }
        }

        if words.is_empty() && assignments.is_empty() && redirects.is_empty() {
            return Err(self.unexpected_here());
        }

        Ok(SimpleCommand {
            words,
            assignments,
            redirects,
            line,
        })
    }
}

fn parse_assignment(token: &Token, depth: usize) -> Result<Assignment> {
    let Some(eq) = token.text.find('=') else {
        return Err(Error::Internal(format!(
            "assignment token without '=': {}",
            token.text
        )));
    };
    let (name, append) = match token.text[..eq].strip_suffix('+') {
        Some(name) => (name, true),
        None => (&token.text[..eq], false),
    };
    Ok(Assignment {
        name: name.to_string(),
        value: Word::parse_nested_in(&token.text[eq + 1..], token.line, depth)?,
        append,
    })
}

fn build_redirection(op: RedirectOp, target: Option<Word>) -> Redirection {
    let is_null = target
        .as_ref()
        .and_then(Word::literal_text)
        .is_some_and(|t| t == "/dev/null");
    let path = |word: Option<Word>| RedirectTarget::Path(word.unwrap_or_else(|| Word::literal("")));

    match op {
        RedirectOp::Out { fd } | RedirectOp::Append { fd } if is_null => Redirection {
            fd,
            mode: RedirectMode::Null,
            target: path(target),
        },
        RedirectOp::Out { fd } => Redirection {
            fd,
            mode: RedirectMode::Truncate,
            target: path(target),
        },
        RedirectOp::Append { fd } => Redirection {
            fd,
            mode: RedirectMode::Append,
            target: path(target),
        },
        RedirectOp::In { fd } => Redirection {
            fd,
            mode: RedirectMode::Input,
            target: path(target),
        },
        RedirectOp::Dup { fd, target: to } => Redirection {
            fd,
            mode: RedirectMode::Dup,
            target: RedirectTarget::Fd(to),
        },
        RedirectOp::OutAll => Redirection {
            fd: 1,
            mode: RedirectMode::CombinedTruncate,
            target: path(target),
        },
        RedirectOp::AppendAll => Redirection {
            fd: 1,
            mode: RedirectMode::CombinedAppend,
            target: path(target),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Statement {
        let mut statements = parse_script(source).unwrap();
        assert_eq!(statements.len(), 1, "expected one statement in {source:?}");
        statements.remove(0)
    }

    fn simple(statement: &Statement) -> &SimpleCommand {
        match statement {
            Statement::Simple(cmd) => cmd,
            other => panic!("expected simple command, got {other:?}"),
        }
    }

    fn raw_words(cmd: &SimpleCommand) -> Vec<&str> {
        cmd.words.iter().map(|w| w.raw.as_str()).collect()
    }

    #[test]
    fn test_parse_simple_command() {
        let statement = parse_one("echo hello world");
        assert_eq!(raw_words(simple(&statement)), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_parse_assignments() {
        let statement = parse_one("A=1 B+=x env C=3");
        let cmd = simple(&statement);
        assert_eq!(cmd.assignments.len(), 2);
        assert_eq!(cmd.assignments[0].name, "A");
        assert!(!cmd.assignments[0].append);
        assert_eq!(cmd.assignments[1].name, "B");
        assert!(cmd.assignments[1].append);
        assert_eq!(raw_words(cmd), vec!["env", "C=3"]);
    }

    #[test]
    fn test_newlines_separate_statements() {
        let statements = parse_script("echo a\n\necho b\n").unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_parse_sequence() {
        let statement = parse_one("a; b && c || d;");
        let Statement::Sequence(seq) = statement else {
            panic!("expected sequence");
        };
        let joiners: Vec<_> = seq.rest.iter().map(|(j, _)| *j).collect();
        assert_eq!(joiners, vec![Joiner::Semicolon, Joiner::And, Joiner::Or]);
    }

    #[test]
    fn test_parse_pipeline() {
        let statement = parse_one("! cat f | grep x");
        let Statement::Pipeline(pipeline) = statement else {
            panic!("expected pipeline");
        };
        assert!(pipeline.negated);
        assert_eq!(pipeline.stages.len(), 2);
    }

    #[test]
    fn test_parse_if_elif_else() {
        let statement =
            parse_one("if false; then echo a\nelif true\nthen echo b; else\n echo c\n echo d\nfi");
        let Statement::If(stmt) = statement else {
            panic!("expected if");
        };
        assert_eq!(stmt.branches.len(), 2);
        assert_eq!(stmt.else_body.map(|b| b.len()), Some(2));
    }

    #[test]
    fn test_parse_for() {
        let Statement::For(for_loop) = parse_one("for x in a \"b c\" $d; do echo $x; done") else {
            panic!("expected for");
        };
        assert_eq!(for_loop.var, "x");
        assert_eq!(for_loop.words.map(|w| w.len()), Some(3));
        assert_eq!(for_loop.body.len(), 1);

        let Statement::For(for_loop) = parse_one("for arg\ndo\necho $arg\ndone") else {
            panic!("expected for");
        };
        assert!(for_loop.words.is_none());
    }

    #[test]
    fn test_parse_while_and_until() {
        let Statement::While(w) = parse_one("while test -f x; do rm x; done") else {
            panic!("expected while");
        };
        assert!(!w.until);
        let Statement::While(w) = parse_one("until true\ndo\n:\ndone") else {
            panic!("expected until");
        };
        assert!(w.until);
    }

    #[test]
    fn test_keywords_only_in_command_position() {
        let statement = parse_one("echo if then fi done");
        assert_eq!(simple(&statement).words.len(), 5);

        let statement = parse_one("'if' x");
        assert_eq!(simple(&statement).words.len(), 2);
    }

    #[test]
    fn test_redirections_keep_order() {
        let statement = parse_one("cmd > out 2>&1 < in >> log 2>/dev/null");
        let modes: Vec<_> = simple(&statement).redirects.iter().map(|r| r.mode).collect();
        assert_eq!(
            modes,
            vec![
                RedirectMode::Truncate,
                RedirectMode::Dup,
                RedirectMode::Input,
                RedirectMode::Append,
                RedirectMode::Null,
            ]
        );
        assert_eq!(simple(&statement).redirects[1].target, RedirectTarget::Fd(1));
        assert_eq!(simple(&statement).redirects[4].fd, 2);
    }

    #[test]
    fn test_combined_redirection_must_be_last() {
        assert!(parse_script("cmd &>> log").is_ok());
        assert!(parse_script("cmd 2>err &> log").is_ok());
        let err = parse_script("cmd &>> log 2>&1").unwrap_err();
        assert!(err.message().contains("must be the last redirection"));
    }

    #[test]
    fn test_missing_closer_reports_opener_line() {
        let err = parse_script("echo start\nif true; then\n  echo x\n").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.message().contains("expected 'fi'"));

        let err = parse_script("for x in a b\ndo echo $x").unwrap_err();
        assert!(err.message().contains("expected 'done'"));
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_script("fi").is_err());
        assert!(parse_script("| echo").is_err());
        assert!(parse_script("echo a &&").is_err());
        assert!(parse_script("echo >").is_err());
        assert!(parse_script("if then fi").is_err());
        assert!(parse_script("for 1x in a; do :; done").is_err());
    }

    #[test]
    fn test_compound_cannot_be_pipeline_stage() {
        assert!(parse_script("if true; then echo a; fi | cat").is_err());
        assert!(parse_script("echo a | while true; do :; done").is_err());
    }

    #[test]
    fn test_nested_compound_commands() {
        let source = "for i in 1 2; do\n  while false; do :; done\n  if true; then echo $i; fi\ndone";
        let Statement::For(for_loop) = parse_one(source) else {
            panic!("expected for");
        };
        assert_eq!(for_loop.body.len(), 2);
    }

    #[test]
    fn test_empty_script() {
        assert!(parse_script("").unwrap().is_empty());
        assert!(parse_script("# just a comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_nesting_too_deep() {
        let deep = format!("{}echo x{}", "if true; then ".repeat(300), "; fi".repeat(300));
        let err = parse_script(&deep).unwrap_err();
        assert_eq!(err.message(), "nesting too deep");
        assert_eq!(err.line(), Some(1));

        let loops = "while true; do\n".repeat(100) + &"done\n".repeat(100);
        assert!(parse_script(&loops).unwrap_err().message().contains("nesting too deep"));

        let fine = format!("{}echo x{}", "if true; then ".repeat(40), "; fi".repeat(40));
        assert!(parse_script(&fine).is_ok());
    }

    #[test]
    fn test_substitution_depth_adds_to_compound_depth() {
        let inner = format!("{}echo x{}", "if true; then ".repeat(40), "; fi".repeat(40));
        let source = format!("{}{}{}", "echo $(".repeat(30), inner, ")".repeat(30));
        assert_eq!(parse_script(&source).unwrap_err().message(), "nesting too deep");
    }
}
