//! Arithmetic expansion `$((expr))`
//!
//! Integer-only (i64, wrapping) recursive descent evaluator. Precedence from
//! low to high: `||`, `&&`, `== !=`, `< <= > >=`, `+ -`, `* / %`, unary
//! `+ - !`, then numbers, variables and parentheses.

use super::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::parser::is_name;

/// Deepest nesting of parentheses and unary operators in one expression.
const MAX_EXPR_DEPTH: usize = 128;

/// Evaluate an arithmetic expression against the context's variables.
pub fn evaluate(expr: &str, ctx: &ExecutionContext) -> Result<i64> {
    let fail = |msg: String| Error::Expansion(format!("{}: {}", expr.trim(), msg));

    let tokens = tokenize(expr, ctx).map_err(fail)?;
    if tokens.is_empty() {
        return Ok(0);
    }

    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.parse_or().map_err(fail)?;
    if parser.pos < tokens.len() {
        return Err(fail("syntax error in expression".to_string()));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(i64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    LParen,
    RParen,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

/// Turn a variable's value into an operand; unset and empty are 0.
fn operand(value: Option<&String>) -> std::result::Result<i64, String> {
    let Some(value) = value else {
        return Ok(0);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|_| format!("{}: invalid arithmetic operand", trimmed))
}

fn lookup(name: &str, ctx: &ExecutionContext) -> std::result::Result<i64, String> {
    if let Ok(index) = name.parse::<usize>() {
        return operand(ctx.positional.get(index));
    }
    match name {
        "#" => Ok(ctx.arg_count() as i64),
        "?" => Ok(i64::from(ctx.last_exit_code)),
        _ => operand(ctx.env.get(name)),
    }
}

fn tokenize(expr: &str, ctx: &ExecutionContext) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    let take_name = |start: usize| -> usize {
        let mut end = start;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        end
    };

    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse()
                    .map_err(|_| format!("{}: value too great for base", text))?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let end = take_name(i);
                let name: String = chars[i..end].iter().collect();
                tokens.push(Token::Number(lookup(&name, ctx)?));
                i = end;
            }
            '$' => {
                let (name, end) = match next {
                    Some('{') => {
                        let close = chars[i + 2..]
                            .iter()
                            .position(|&c| c == '}')
                            .map(|p| i + 2 + p)
                            .ok_or_else(|| "missing '}'".to_string())?;
                        (chars[i + 2..close].iter().collect::<String>(), close + 1)
                    }
                    Some(c) if c.is_ascii_digit() || c == '#' || c == '?' => {
                        (c.to_string(), i + 2)
                    }
                    _ => {
                        let end = take_name(i + 1);
                        (chars[i + 1..end].iter().collect::<String>(), end)
                    }
                };
                let positional = !name.is_empty() && name.chars().all(|c| c.is_ascii_digit());
                if !(is_name(&name) || positional || name == "#" || name == "?") {
                    return Err("operand expected".to_string());
                }
                tokens.push(Token::Number(lookup(&name, ctx)?));
                i = end;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            c => return Err(format!("syntax error: invalid arithmetic operator (error token is \"{}\")", c)),
        }
    }

    Ok(tokens)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

fn truth(value: bool) -> i64 {
    i64::from(value)
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn parse_or(&mut self) -> std::result::Result<i64, String> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = truth(left != 0 || right != 0);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> std::result::Result<i64, String> {
        let mut left = self.parse_equality()?;
        while self.peek() == Some(Token::And) {
            self.pos += 1;
            let right = self.parse_equality()?;
            left = truth(left != 0 && right != 0);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> std::result::Result<i64, String> {
        let mut left = self.parse_comparison()?;
        while let Some(tok @ (Token::Eq | Token::Ne)) = self.peek() {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = truth((left == right) == (tok == Token::Eq));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> std::result::Result<i64, String> {
        let mut left = self.parse_additive()?;
        while let Some(tok @ (Token::Lt | Token::Gt | Token::Le | Token::Ge)) = self.peek() {
            self.pos += 1;
            let right = self.parse_additive()?;
            left = truth(match tok {
                Token::Lt => left < right,
                Token::Gt => left > right,
                Token::Le => left <= right,
                _ => left >= right,
            });
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> std::result::Result<i64, String> {
        let mut left = self.parse_multiplicative()?;
        while let Some(tok @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = if tok == Token::Plus {
                left.wrapping_add(right)
            } else {
                left.wrapping_sub(right)
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> std::result::Result<i64, String> {
        let mut left = self.parse_unary()?;
        while let Some(tok @ (Token::Star | Token::Slash | Token::Percent)) = self.peek() {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = match tok {
                Token::Star => left.wrapping_mul(right),
                _ if right == 0 => return Err("division by 0".to_string()),
                Token::Slash => left.wrapping_div(right),
                _ => left.wrapping_rem(right),
            };
        }
        Ok(left)
    }

    /// Run `inner` one nesting level deeper.
    fn nested(
        &mut self,
        inner: impl FnOnce(&mut Self) -> std::result::Result<i64, String>,
    ) -> std::result::Result<i64, String> {
        if self.depth >= MAX_EXPR_DEPTH {
            return Err("nesting too deep".to_string());
        }
        self.depth += 1;
        let value = inner(self);
        self.depth -= 1;
        value
    }

    fn parse_unary(&mut self) -> std::result::Result<i64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(self.nested(Self::parse_unary)?.wrapping_neg())
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::parse_unary)
            }
            Some(Token::Not) => {
                self.pos += 1;
                Ok(truth(self.nested(Self::parse_unary)? == 0))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> std::result::Result<i64, String> {
        match self.peek() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.nested(Self::parse_or)?;
                if self.peek() != Some(Token::RParen) {
                    return Err("missing ')'".to_string());
                }
                self.pos += 1;
                Ok(value)
            }
            _ => Err("syntax error: operand expected".to_string()),
        }
    }
}
