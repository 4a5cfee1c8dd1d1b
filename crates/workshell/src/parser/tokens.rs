//! Token types produced by the lexer

use std::fmt;

/// A lexed token with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw source text. For words this keeps quote characters, escapes and
    /// substitution syntax; expansion happens later.
    pub text: String,
    /// Whether any quoting or backslash escaping appeared in the word
    pub quoted: bool,
    /// 1-based line the token starts on
    pub line: usize,
    /// 1-based column the token starts on
    pub column: usize,
}

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A word (command name, argument, redirection target)
    Word,
    /// A word of the form `NAME=value` or `NAME+=value`
    Assignment,
    /// A control operator
    Operator(Operator),
    /// A redirection operator
    Redirect(RedirectOp),
    /// Newline
    Newline,
}

/// Control operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `|`
    Pipe,
    /// `;`
    Semi,
    /// `&&`
    AndIf,
    /// `||`
    OrIf,
}

/// Redirection operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    /// `>` or `N>`
    Out { fd: i32 },
    /// `>>` or `N>>`
    Append { fd: i32 },
    /// `<` or `N<`
    In { fd: i32 },
    /// `>&M` or `N>&M`
    Dup { fd: i32, target: i32 },
    /// `&>`
    OutAll,
    /// `&>>`
    AppendAll,
}

impl RedirectOp {
    /// Whether the operator needs a filename word after it.
    pub fn takes_target(&self) -> bool {
        !matches!(self, RedirectOp::Dup { .. })
    }
}

impl Token {
    /// Whether this token is the unquoted word `kw`.
    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Word && !self.quoted && self.text == kw
    }

    pub fn is_operator(&self, op: Operator) -> bool {
        self.kind == TokenKind::Operator(op)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline => f.write_str("newline"),
            _ => f.write_str(&self.text),
        }
    }
}
