//! Word structure
//!
//! A word's raw text is split into parts at parse time. Command substitution
//! bodies are parsed here too, so a syntax error inside `$(...)` fails the
//! whole script before anything runs.

use super::ast::Statement;
use super::lexer::{
    find_backtick_end, find_brace_end, find_double_quote_end, find_paren_end,
    find_single_quote_end, is_name, tokenize,
};
use super::{MAX_NESTING_DEPTH, Parser};
use crate::error::{Error, Result};

/// A shell word: the raw source text plus its parsed parts.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub raw: String,
    pub parts: Vec<WordPart>,
}

/// Parts of a word. `quoted` is true inside double quotes (or for
/// single-quoted and escaped text); quoted parts are never field-split.
#[derive(Debug, Clone, PartialEq)]
pub enum WordPart {
    Literal { text: String, quoted: bool },
    Param { param: Param, quoted: bool },
    CommandSubst { body: Vec<Statement>, quoted: bool },
    Arithmetic { expr: String, quoted: bool },
}

/// Parameter references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// `$NAME` / `${NAME}`
    Named(String),
    /// `$0`..`$9`, `${10}`
    Positional(usize),
    /// `$@`
    All,
    /// `$*`
    Star,
    /// `$#`
    Count,
    /// `$?`
    Status,
}

impl WordPart {
    pub fn is_quoted(&self) -> bool {
        match self {
            WordPart::Literal { quoted, .. }
            | WordPart::Param { quoted, .. }
            | WordPart::CommandSubst { quoted, .. }
            | WordPart::Arithmetic { quoted, .. } => *quoted,
        }
    }
}

impl Word {
    /// Parse the raw text of a word token found on `line`.
    pub fn parse(raw: &str, line: usize) -> Result<Self> {
        Self::parse_nested_in(raw, line, 0)
    }

    /// Parse a word that sits `depth` compound or substitution levels deep.
    pub(super) fn parse_nested_in(raw: &str, line: usize, depth: usize) -> Result<Self> {
        let chars: Vec<char> = raw.chars().collect();
        let mut builder = PartsBuilder::default();
        let mut i = 0;

        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    if let Some(&c) = chars.get(i + 1) {
                        builder.literal(c, true);
                    }
                    i += 2;
                }
                '\'' => {
                    let end = find_single_quote_end(&chars, i + 1).ok_or_else(|| unterminated(line))?;
                    builder.quoted_text(chars[i + 1..end].iter().collect());
                    i = end + 1;
                }
                '"' => {
                    let end = find_double_quote_end(&chars, i + 1).ok_or_else(|| unterminated(line))?;
                    // `""` still produces a (possibly empty) quoted field
                    builder.quoted_text(String::new());
                    parse_double_quoted(&chars[i + 1..end], line, depth, &mut builder)?;
                    i = end + 1;
                }
                '`' => {
                    i = parse_backticks(&chars, i, line, depth, false, &mut builder)?;
                }
                '$' => {
                    i = parse_dollar(&chars, i, line, depth, false, &mut builder)?;
                }
                c => {
                    builder.literal(c, false);
                    i += 1;
                }
            }
        }

        Ok(Word {
            raw: raw.to_string(),
            parts: builder.finish(),
        })
    }

    /// Word made of a single literal.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        Word {
            raw: text.clone(),
            parts: vec![WordPart::Literal {
                text,
                quoted: false,
            }],
        }
    }

    /// The word's value if it contains no expansions.
    pub fn literal_text(&self) -> Option<String> {
        self.parts
            .iter()
            .map(|part| match part {
                WordPart::Literal { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .map(|texts| texts.concat())
    }
}

fn unterminated(line: usize) -> Error {
    Error::parse_at("unterminated quote", line, 1)
}

#[derive(Default)]
struct PartsBuilder {
    parts: Vec<WordPart>,
}

impl PartsBuilder {
    fn literal(&mut self, c: char, quoted: bool) {
        if let Some(WordPart::Literal { text, quoted: q }) = self.parts.last_mut() {
            if *q == quoted {
                text.push(c);
                return;
            }
        }
        self.parts.push(WordPart::Literal {
            text: c.to_string(),
            quoted,
        });
    }

    fn quoted_text(&mut self, text: String) {
        if let Some(WordPart::Literal { text: last, quoted: true }) = self.parts.last_mut() {
            last.push_str(&text);
            return;
        }
        self.parts.push(WordPart::Literal { text, quoted: true });
    }

    fn push(&mut self, part: WordPart) {
        self.parts.push(part);
    }

    fn finish(self) -> Vec<WordPart> {
        self.parts
    }
}

/// Contents between double quotes: only `$`, backquotes and a few escapes
/// are special.
fn parse_double_quoted(
    chars: &[char],
    line: usize,
    depth: usize,
    builder: &mut PartsBuilder,
) -> Result<()> {
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => match chars.get(i + 1) {
                Some(&c) if matches!(c, '$' | '`' | '"' | '\\') => {
                    builder.literal(c, true);
                    i += 2;
                }
                Some('\n') => i += 2,
                _ => {
                    builder.literal('\\', true);
                    i += 1;
                }
            },
            '`' => i = parse_backticks(chars, i, line, depth, true, builder)?,
            '$' => i = parse_dollar(chars, i, line, depth, true, builder)?,
            c => {
                builder.literal(c, true);
                i += 1;
            }
        }
    }
    Ok(())
}

/// `` `...` `` starting at `start`; returns the index after the closing quote.
fn parse_backticks(
    chars: &[char],
    start: usize,
    line: usize,
    depth: usize,
    quoted: bool,
    builder: &mut PartsBuilder,
) -> Result<usize> {
    let end = find_backtick_end(chars, start + 1)
        .ok_or_else(|| Error::parse_at("unterminated backquote", line, 1))?;

    let mut body = String::new();
    let mut i = start + 1;
    while i < end {
        if chars[i] == '\\' && matches!(chars.get(i + 1), Some('$' | '`' | '\\')) {
            i += 1;
        }
        body.push(chars[i]);
        i += 1;
    }

    builder.push(WordPart::CommandSubst {
        body: parse_nested(&body, line, depth)?,
        quoted,
    });
    Ok(end + 1)
}

/// A `$` expansion starting at `start`; returns the index after it.
fn parse_dollar(
    chars: &[char],
    start: usize,
    line: usize,
    depth: usize,
    quoted: bool,
    builder: &mut PartsBuilder,
) -> Result<usize> {
    let next = chars.get(start + 1).copied();
    match next {
        Some('(') if chars.get(start + 2) == Some(&'(') => {
            let (expr, after) = arithmetic_body(chars, start + 3, line)?;
            builder.push(WordPart::Arithmetic { expr, quoted });
            Ok(after)
        }
        Some('(') => {
            let end = find_paren_end(chars, start + 2)
                .ok_or_else(|| Error::parse_at("unterminated command substitution", line, 1))?;
            let body: String = chars[start + 2..end].iter().collect();
            builder.push(WordPart::CommandSubst {
                body: parse_nested(&body, line, depth)?,
                quoted,
            });
            Ok(end + 1)
        }
        Some('{') => {
            let end = find_brace_end(chars, start + 2)
                .ok_or_else(|| Error::parse_at("unterminated parameter expansion", line, 1))?;
            let inner: String = chars[start + 2..end].iter().collect();
            let param = braced_param(&inner)
                .ok_or_else(|| Error::parse_at(format!("${{{}}}: bad substitution", inner), line, 1))?;
            builder.push(WordPart::Param { param, quoted });
            Ok(end + 1)
        }
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            let mut end = start + 1;
            while chars
                .get(end)
                .is_some_and(|c| *c == '_' || c.is_ascii_alphanumeric())
            {
                end += 1;
            }
            let name: String = chars[start + 1..end].iter().collect();
            builder.push(WordPart::Param {
                param: Param::Named(name),
                quoted,
            });
            Ok(end)
        }
        Some(c) if c.is_ascii_digit() => {
            let n = c.to_digit(10).map_or(0, |d| d as usize);
            builder.push(WordPart::Param {
                param: Param::Positional(n),
                quoted,
            });
            Ok(start + 2)
        }
        Some(c @ ('@' | '*' | '#' | '?')) => {
            let param = match c {
                '@' => Param::All,
                '*' => Param::Star,
                '#' => Param::Count,
                _ => Param::Status,
            };
            builder.push(WordPart::Param { param, quoted });
            Ok(start + 2)
        }
        _ => {
            builder.literal('$', quoted);
            Ok(start + 1)
        }
    }
}

/// Body of `$((...))`; `start` is just past `$((`.
fn arithmetic_body(chars: &[char], start: usize, line: usize) -> Result<(String, usize)> {
    let mut depth = 0usize;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            ')' if chars.get(i + 1) == Some(&')') => {
                return Ok((chars[start..i].iter().collect(), i + 2));
            }
            ')' => break,
            _ => {}
        }
        i += 1;
    }
    Err(Error::parse_at(
        "unterminated arithmetic expansion",
        line,
        1,
    ))
}

fn braced_param(inner: &str) -> Option<Param> {
    match inner {
        "@" => Some(Param::All),
        "*" => Some(Param::Star),
        "#" => Some(Param::Count),
        "?" => Some(Param::Status),
        _ if is_name(inner) => Some(Param::Named(inner.to_string())),
        _ if !inner.is_empty() && inner.chars().all(|c| c.is_ascii_digit()) => {
            inner.parse().ok().map(Param::Positional)
        }
        _ => None,
    }
}

/// Parse a substitution body, shifting error lines to the enclosing script.
fn parse_nested(body: &str, line: usize, depth: usize) -> Result<Vec<Statement>> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(Error::parse_at("nesting too deep", line, 1));
    }
    tokenize(body)
        .and_then(|tokens| Parser::nested(tokens, depth + 1).parse())
        .map_err(|err| match err {
            Error::ParseAt {
                message,
                line: inner,
                column,
            } => Error::ParseAt {
                message,
                line: line + inner - 1,
                column,
            },
            other => other,
        })
}
