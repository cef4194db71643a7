//! The scene scripting language.
//!
//! Scripts use a small Python-like syntax. They are parsed into an [`ast`]
//! once, checked by the sanitizer, and then run by the [`interp`] module
//! against a fixed namespace: the `scene` capability module, `math`,
//! `mathutils`, `random`, a handful of builtins, `render_and_save` and
//! `OUTPUT_DIR`. Nothing outside that namespace is reachable.
//!
//! # Examples
//!
//! ```
//! use scene_bridge::script::{parse, strip_code_fences};
//!
//! let source = strip_code_fences("```python\nimport scene\nscene.add_box('A')\n```");
//! assert_eq!(source, "import scene\nscene.add_box('A')");
//! let program = parse(&source).unwrap();
//! assert_eq!(program.body.len(), 2);
//! ```

pub mod ast;
pub mod interp;
pub mod lexer;
pub mod parser;
mod value;

use thiserror::Error;

pub use interp::{Interpreter, ScriptOutcome};
pub use parser::parse;

/// Deepest nesting of brackets, unary operators and blocks a script may use.
pub const MAX_NESTING: usize = 64;

/// Tallest expression tree the parser builds. Long operator chains such as
/// `1 + 1 + ...` count one level per operator.
pub const MAX_EXPR_DEPTH: usize = 100;

/// Errors raised while parsing or running a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// The source text is not a valid script.
    #[error("line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Execution failed at `line`.
    #[error("line {line}: {message}")]
    Runtime { line: usize, message: String },
}

impl ScriptError {
    pub(crate) fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn runtime(line: usize, message: impl Into<String>) -> Self {
        Self::Runtime {
            line,
            message: message.into(),
        }
    }

    /// Whether this is a parse failure.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. })
    }
}

/// Remove a surrounding Markdown code fence, if the text starts with one.
///
/// The first line is dropped when it opens a fence (with or without a
/// language tag) and the last line is dropped when it closes one. Text that
/// does not start with a fence is returned unchanged.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return text.to_string();
    }
    let mut lines: Vec<&str> = trimmed.split('\n').collect();
    if lines.first().is_some_and(|l| l.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.starts_with("```")) {
        lines.pop();
    }
    lines.join("\n")
}
