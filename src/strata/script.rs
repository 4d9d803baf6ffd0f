//! Embedded statement and expression language
//!
//!     Expression and statement tags hold code in a small language of their own. Code is
//!     tokenized with logos ([lexer]), parsed by recursive descent ([parser]) and evaluated
//!     against a [Scope] ([eval]). The runtime only ever talks to this module through
//!     [parse_expression], [parse_statement] and [evaluate].
//!
//!     Expressions:
//!         nil true false 42 4.2 "text" 'text' [a, b] {key: a, "other key": b}
//!         name  a.b  a[i]  -a  not a  !a
//!         * / %   + -   == != < <= > >=   and &&   or ||      (lowest last)
//!         len(x) range(n) range(a, b) upper(s) lower(s) escape(s) join(list[, sep])
//!         str(x) default(x, fallback)
//!
//!     Statements:
//!         if e | elsif e | else | end (endif, endfor)
//!         for x in e | for k, v in e
//!         name = e
//!         include e [, key: e]*
//!         e                          evaluated, result discarded
//!
//!     Values are serde_json values.

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOp, Expr, Statement, UnaryOp};
pub use eval::{evaluate, is_truthy, render_value, Scope};
pub use parser::{parse_expression, parse_statement};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("syntax error: {0}")]
    Parse(String),
    #[error("undefined variable '{0}'")]
    Missing(String),
    #[error("{0}")]
    Eval(String),
}
