//! An interpreter for a small single-type imperative language: `integer`
//! variables, `if`/`while` with parenthesized guards, `begin … end` blocks
//! and `write`/`writeln` output.
//!
//! The default dialect faithfully reproduces some unusual semantics of the
//! system it reimplements: `*` adds, comments close at the last `$` in the
//! file, and guards decide values rather than execution. [`Options`] turns
//! each of those into conventional behavior separately.

pub mod eval;
pub mod lex;
pub mod parse;

pub use eval::{ControlMode, Environment, Interpreter, Options, StarMode};
pub use lex::{CommentMode, Lexer};
pub use parse::Parser;
