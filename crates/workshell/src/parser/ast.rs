//! AST types for parsed scripts

pub use super::word::{Param, Word, WordPart};

/// A statement in a script or block.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A simple command (e.g., `echo hello`)
    Simple(SimpleCommand),

    /// A pipeline (e.g., `cat f | grep foo`), possibly negated with `!`
    Pipeline(Pipeline),

    /// A list joined by `;`, `&&` or `||`
    Sequence(Sequence),

    /// `if ... then ... elif ... else ... fi`
    If(IfStatement),

    /// `for NAME [in WORDS]; do ... done`
    For(ForLoop),

    /// `while` / `until` loops
    While(WhileLoop),
}

/// A simple command with arguments, assignments and redirections.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommand {
    /// Command name followed by its arguments (empty for assignment-only commands)
    pub words: Vec<Word>,
    /// Variable assignments before the command
    pub assignments: Vec<Assignment>,
    /// Redirections and fd duplications, in source order
    pub redirects: Vec<Redirection>,
    /// Source line of the command
    pub line: usize,
}

/// A pipeline of simple commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    /// Whether the pipeline is negated (!)
    pub negated: bool,
    pub stages: Vec<SimpleCommand>,
}

/// A list of statements with operators.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub first: Box<Statement>,
    pub rest: Vec<(Joiner, Statement)>,
}

/// Operators joining the items of a [`Sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joiner {
    /// `;` (or a newline inside a block): always run the next item
    Semicolon,
    /// `&&`: run the next item if the previous one succeeded
    And,
    /// `||`: run the next item if the previous one failed
    Or,
}

/// Conditional. Each branch pairs a condition with its body; `elif` adds
/// branches.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub branches: Vec<(Box<Statement>, Vec<Statement>)>,
    pub else_body: Option<Vec<Statement>>,
}

/// For loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub var: String,
    /// `None` iterates the positional parameters
    pub words: Option<Vec<Word>>,
    pub body: Vec<Statement>,
}

/// While loop; `until` inverts the condition.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    pub condition: Box<Statement>,
    pub body: Vec<Statement>,
    pub until: bool,
}

/// `NAME=value` or `NAME+=value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Word,
    pub append: bool,
}

/// A redirection attached to a simple command.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirection {
    /// Descriptor being redirected (ignored for combined modes)
    pub fd: i32,
    pub mode: RedirectMode,
    pub target: RedirectTarget,
}

/// Redirection modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`
    Truncate,
    /// `>>`
    Append,
    /// `<`
    Input,
    /// Output to a literal `/dev/null`
    Null,
    /// `N>&M`
    Dup,
    /// `&>`
    CombinedTruncate,
    /// `&>>`
    CombinedAppend,
}

impl RedirectMode {
    pub fn is_combined(&self) -> bool {
        matches!(
            self,
            RedirectMode::CombinedTruncate | RedirectMode::CombinedAppend
        )
    }
}

/// Redirection targets.
#[derive(Debug, Clone, PartialEq)]
pub enum RedirectTarget {
    Path(Word),
    Fd(i32),
}
