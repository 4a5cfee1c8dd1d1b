//! Lexer for shell scripts
//!
//! Turns script text into a flat token stream with line/column tracking.
//! Words keep their raw text (quotes, escapes, `$(...)` and friends) so the
//! parser can split them into parts; the lexer only has to know where each
//! word ends.

use super::tokens::{Operator, RedirectOp, Token, TokenKind};
use crate::error::{Error, Result};

/// Tokenize a whole script.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

/// Lexer for shell scripts.
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    /// Create a new lexer for the given input.
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    /// Consume characters up to (not including) index `end` into `buf`.
    fn take_until(&mut self, end: usize, buf: &mut String) {
        while self.pos < end {
            match self.advance() {
                Some(c) => buf.push(c),
                None => break,
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::parse_at(message, self.line, self.column)
    }

    /// Get the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>> {
        self.skip_blanks();
        let (line, column) = (self.line, self.column);
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let make = |kind: TokenKind, text: &str| Token {
            kind,
            text: text.to_string(),
            quoted: false,
            line,
            column,
        };

        let token = match ch {
            '\n' => {
                self.advance();
                make(TokenKind::Newline, "\n")
            }
            '|' => {
                self.advance();
                if self.peek() == Some('|') {
                    self.advance();
                    make(TokenKind::Operator(Operator::OrIf), "||")
                } else {
                    make(TokenKind::Operator(Operator::Pipe), "|")
                }
            }
            ';' => {
                if self.peek_at(1) == Some(';') {
                    return Err(self.error("syntax error near unexpected token ';;'"));
                }
                self.advance();
                make(TokenKind::Operator(Operator::Semi), ";")
            }
            '&' => match (self.peek_at(1), self.peek_at(2)) {
                (Some('&'), _) => {
                    self.pos_skip(2);
                    make(TokenKind::Operator(Operator::AndIf), "&&")
                }
                (Some('>'), Some('>')) => {
                    self.pos_skip(3);
                    make(TokenKind::Redirect(RedirectOp::AppendAll), "&>>")
                }
                (Some('>'), _) => {
                    self.pos_skip(2);
                    make(TokenKind::Redirect(RedirectOp::OutAll), "&>")
                }
                _ => return Err(self.error("background jobs (&) are not supported")),
            },
            '>' | '<' => self.read_redirect(None, line, column)?,
            '(' | ')' => {
                return Err(self.error(format!(
                    "syntax error near unexpected token '{}': subshells are not supported",
                    ch
                )));
            }
            c if c.is_ascii_digit() && self.fd_redirect_ahead() => {
                let start = self.pos;
                let mut digits = String::new();
                while let Some(d) = self.peek().filter(char::is_ascii_digit) {
                    digits.push(d);
                    self.advance();
                }
                let fd = digits
                    .parse::<i32>()
                    .map_err(|_| self.error(format!("{}: bad file descriptor", digits)))?;
                let mut token = self.read_redirect(Some(fd), line, column)?;
                token.text = self.chars[start..self.pos].iter().collect();
                token
            }
            _ => self.read_word(line, column)?,
        };

        Ok(Some(token))
    }

    fn pos_skip(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    /// Skip spaces, tabs, line continuations and comments.
    fn skip_blanks(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => {
                    self.advance();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.pos_skip(2);
                }
                Some('#') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    /// Digits immediately followed by `>` or `<`, e.g. `2>` or `10>>`.
    fn fd_redirect_ahead(&self) -> bool {
        let mut i = self.pos;
        while self.chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        matches!(self.chars.get(i), Some('>') | Some('<'))
    }

    fn read_redirect(&mut self, fd: Option<i32>, line: usize, column: usize) -> Result<Token> {
        let start = self.pos;
        let op = match self.advance() {
            Some('>') => match self.peek() {
                Some('>') => {
                    self.advance();
                    RedirectOp::Append { fd: fd.unwrap_or(1) }
                }
                Some('&') => {
                    self.advance();
                    let mut digits = String::new();
                    while let Some(d) = self.peek().filter(char::is_ascii_digit) {
                        digits.push(d);
                        self.advance();
                    }
                    if digits.is_empty() {
                        return Err(self.error("'>&' must be followed by a file descriptor number"));
                    }
                    let target = digits
                        .parse::<i32>()
                        .map_err(|_| self.error(format!("{}: bad file descriptor", digits)))?;
                    RedirectOp::Dup {
                        fd: fd.unwrap_or(1),
                        target,
                    }
                }
                Some('|') => {
                    self.advance();
                    RedirectOp::Out { fd: fd.unwrap_or(1) }
                }
                _ => RedirectOp::Out { fd: fd.unwrap_or(1) },
            },
            Some('<') => match self.peek() {
                Some('<') => return Err(self.error("here-documents are not supported")),
                Some('&') | Some('>') => {
                    return Err(self.error(format!(
                        "syntax error near unexpected token '<{}'",
                        self.peek().unwrap_or_default()
                    )));
                }
                _ => RedirectOp::In { fd: fd.unwrap_or(0) },
            },
            _ => return Err(Error::Internal("redirect lexed at non-redirect".into())),
        };

        Ok(Token {
            kind: TokenKind::Redirect(op),
            text: self.chars[start..self.pos].iter().collect(),
            quoted: false,
            line,
            column,
        })
    }

    fn read_word(&mut self, line: usize, column: usize) -> Result<Token> {
        let mut text = String::new();
        let mut quoted = false;

        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\n' | '|' | ';' | '&' | '<' | '>' | '(' | ')' => break,
                '\\' => {
                    if self.peek_at(1) == Some('\n') {
                        self.pos_skip(2);
                        continue;
                    }
                    quoted = true;
                    self.advance();
                    text.push('\\');
                    if let Some(next) = self.advance() {
                        text.push(next);
                    }
                }
                '\'' => {
                    quoted = true;
                    let end = find_single_quote_end(&self.chars, self.pos + 1)
                        .ok_or_else(|| self.error("unterminated single quote"))?;
                    self.take_until(end + 1, &mut text);
                }
                '"' => {
                    quoted = true;
                    let end = find_double_quote_end(&self.chars, self.pos + 1)
                        .ok_or_else(|| self.error("unterminated double quote"))?;
                    self.take_until(end + 1, &mut text);
                }
                '`' => {
                    let end = find_backtick_end(&self.chars, self.pos + 1)
                        .ok_or_else(|| self.error("unterminated backquote"))?;
                    self.take_until(end + 1, &mut text);
                }
                '$' if self.peek_at(1) == Some('(') => {
                    let what = if self.peek_at(2) == Some('(') {
                        "unterminated arithmetic expansion"
                    } else {
                        "unterminated command substitution"
                    };
                    let end = find_paren_end(&self.chars, self.pos + 2)
                        .ok_or_else(|| self.error(what))?;
                    self.take_until(end + 1, &mut text);
                }
                '$' if self.peek_at(1) == Some('{') => {
                    let end = find_brace_end(&self.chars, self.pos + 2)
                        .ok_or_else(|| self.error("unterminated parameter expansion"))?;
                    self.take_until(end + 1, &mut text);
                }
                _ => {
                    self.advance();
                    text.push(ch);
                }
            }
        }

        let kind = if is_assignment_word(&text) {
            TokenKind::Assignment
        } else {
            TokenKind::Word
        };
        Ok(Token {
            kind,
            text,
            quoted,
            line,
            column,
        })
    }
}

/// Whether `s` is a valid variable name.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn is_assignment_word(text: &str) -> bool {
    let Some(eq) = text.find('=') else {
        return false;
    };
    let name = &text[..eq];
    is_name(name.strip_suffix('+').unwrap_or(name))
}

// Scanners shared with word parsing. Each takes the index just past the
// opening delimiter and returns the index of the closing one.

/// Deepest interleaving of quotes and `$(` the scanners follow.
const MAX_SCAN_DEPTH: usize = 1024;

pub(super) fn find_single_quote_end(chars: &[char], start: usize) -> Option<usize> {
    (start..chars.len()).find(|&i| chars[i] == '\'')
}

pub(super) fn find_double_quote_end(chars: &[char], start: usize) -> Option<usize> {
    double_quote_end(chars, start, 0)
}

fn double_quote_end(chars: &[char], start: usize, depth: usize) -> Option<usize> {
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '"' => return Some(i),
            '`' => i = find_backtick_end(chars, i + 1)? + 1,
            '$' if chars.get(i + 1) == Some(&'(') => i = paren_end(chars, i + 2, depth + 1)? + 1,
            '$' if chars.get(i + 1) == Some(&'{') => i = find_brace_end(chars, i + 2)? + 1,
            _ => i += 1,
        }
    }
    None
}

pub(super) fn find_backtick_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

pub(super) fn find_brace_end(chars: &[char], start: usize) -> Option<usize> {
    (start..chars.len()).find(|&i| chars[i] == '}')
}

/// Matching `)` for a `$(` or `$((`, skipping over quoted text.
pub(super) fn find_paren_end(chars: &[char], start: usize) -> Option<usize> {
    paren_end(chars, start, 0)
}

fn paren_end(chars: &[char], start: usize, depth: usize) -> Option<usize> {
    // Too deep reads as unterminated
    if depth > MAX_SCAN_DEPTH {
        return None;
    }
    let mut open = 1usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\'' => i = find_single_quote_end(chars, i + 1)? + 1,
            '"' => i = double_quote_end(chars, i + 1, depth + 1)? + 1,
            '`' => i = find_backtick_end(chars, i + 1)? + 1,
            '(' => {
                open += 1;
                i += 1;
            }
            ')' => {
                open -= 1;
                if open == 0 {
                    return Some(i);
                }
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn texts(source: &str) -> Vec<String> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect()
    }

    #[test]
    fn test_simple_words() {
        assert_eq!(texts("echo hello world"), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn test_quoted_words_keep_raw_text() {
        let tokens = tokenize("echo 'a b' \"c $d\" e\\ f plain").unwrap();
        assert_eq!(tokens[1].text, "'a b'");
        assert!(tokens[1].quoted);
        assert_eq!(tokens[2].text, "\"c $d\"");
        assert_eq!(tokens[3].text, "e\\ f");
        assert!(tokens[3].quoted);
        assert!(!tokens[4].quoted);
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("a | b && c || d; e").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Word,
                TokenKind::Operator(Operator::Pipe),
                TokenKind::Word,
                TokenKind::Operator(Operator::AndIf),
                TokenKind::Word,
                TokenKind::Operator(Operator::OrIf),
                TokenKind::Word,
                TokenKind::Operator(Operator::Semi),
                TokenKind::Word,
            ]
        );
    }

    #[test]
    fn test_redirects() {
        let tokens = tokenize("a > b >> c < d 2> e 2>&1 &> f &>> g").unwrap();
        let ops: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::Redirect(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(
            ops,
            vec![
                RedirectOp::Out { fd: 1 },
                RedirectOp::Append { fd: 1 },
                RedirectOp::In { fd: 0 },
                RedirectOp::Out { fd: 2 },
                RedirectOp::Dup { fd: 2, target: 1 },
                RedirectOp::OutAll,
                RedirectOp::AppendAll,
            ]
        );
        assert_eq!(tokens[9].text, "2>&1");
    }

    #[test]
    fn test_digits_inside_word_are_not_fd() {
        assert_eq!(texts("echo a2>f"), vec!["echo", "a2", ">", "f"]);
        assert_eq!(texts("echo 42"), vec!["echo", "42"]);
    }

    #[test]
    fn test_comment() {
        assert_eq!(texts("echo a # comment\necho b#c"), vec!["echo", "a", "\n", "echo", "b#c"]);
    }

    #[test]
    fn test_line_continuation() {
        assert_eq!(texts("echo a \\\n  b"), vec!["echo", "a", "b"]);
    }

    #[test]
    fn test_substitutions_stay_in_one_word() {
        assert_eq!(
            texts("echo \"$(echo \"a b\")\" $((1 + (2 * 3))) ${x}y `date`"),
            vec!["echo", "\"$(echo \"a b\")\"", "$((1 + (2 * 3)))", "${x}y", "`date`"]
        );
    }

    #[test]
    fn test_assignment_detection() {
        let tokens = tokenize("A=1 B+=2 =x 1A=3 \"C=4\"").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Assignment);
        assert_eq!(tokens[1].kind, TokenKind::Assignment);
        assert_eq!(tokens[2].kind, TokenKind::Word);
        assert_eq!(tokens[3].kind, TokenKind::Word);
        assert_eq!(tokens[4].kind, TokenKind::Word);
    }

    #[test]
    fn test_line_numbers() {
        let tokens = tokenize("a\n\nb c").unwrap();
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[3].line, 3);
        assert_eq!(tokens[4].column, 3);
    }

    #[test]
    fn test_unterminated_quote_reports_start_line() {
        let err = tokenize("echo ok\necho 'oops\nmore").unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.message().contains("unterminated single quote"));

        let err = tokenize("echo $(echo").unwrap_err();
        assert!(err.message().contains("command substitution"));
    }

    #[test]
    fn test_unsupported_syntax() {
        assert!(tokenize("sleep 1 &").unwrap_err().message().contains("background"));
        assert!(tokenize("cat <<EOF").unwrap_err().message().contains("here-documents"));
        assert!(tokenize("(echo a)").unwrap_err().message().contains("subshells"));
        assert!(tokenize("echo a >&").is_err());
        assert!(tokenize("a;;").is_err());
    }
}
