use std::collections::HashMap;
use std::io::{self, Write};

use log::{debug, trace};
use miette::{Diagnostic, Error, IntoDiagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::lex::{CommentMode, Eof};
use crate::parse::{BinOp, Cond, Expr, Parser, RelOp, Stmt};

#[derive(Error, Debug, Diagnostic)]
#[error("Name {name} not defined")]
#[diagnostic(help("declare it first: `integer {name};`"))]
pub struct UndefinedNameError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this name")]
    bad_bit: SourceSpan,

    pub name: String,
}

impl UndefinedNameError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_bit.offset()].lines().count()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("Name {name} has no value")]
#[diagnostic(help("assign to it before reading it: `{name} = 0;`"))]
pub struct UninitializedNameError {
    #[source_code]
    src: NamedSource<String>,

    #[label("declared but never assigned")]
    bad_bit: SourceSpan,

    pub name: String,
}

impl UninitializedNameError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_bit.offset()].lines().count()
    }
}

/// Arithmetic faults carry no span: they surface from folded values, not
/// from a single place in the source.
#[derive(Error, Debug, Diagnostic)]
pub enum ArithmeticError {
    #[error("division by zero")]
    #[diagnostic(help("the right operand of `/` evaluated to zero"))]
    DivisionByZero,

    #[error("integer overflow evaluating `{op}`")]
    #[diagnostic(help("operands and results are 64-bit signed integers"))]
    Overflow { op: BinOp },
}

/// How guards relate to the statements under them.
///
/// `SinglePass` reproduces the behavior this interpreter was built to match:
/// every body runs exactly once whatever the guard says, and the guard only
/// decides the *value* of the construct. `Gated` is conventional control
/// flow: `if` runs one branch, `while` re-tests and repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlMode {
    #[default]
    SinglePass,
    Gated,
}

/// What `*` does. `Sum` adds its operands, `Product` multiplies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StarMode {
    #[default]
    Sum,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    pub comments: CommentMode,
    pub control: ControlMode,
    pub star: StarMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub ty: Type,
    pub value: Option<i64>,
}

#[derive(Debug, Default)]
pub struct Environment<'de> {
    entries: HashMap<&'de str, Entry>,
}

impl<'de> Environment<'de> {
    pub fn new() -> Self {
        Environment {
            entries: HashMap::new(),
        }
    }

    /// Declares `name` with no value yet. Redeclaration silently replaces
    /// the entry, any previous value included.
    pub fn declare(&mut self, name: &'de str, ty: Type) {
        self.entries.insert(name, Entry { ty, value: None });
    }

    pub fn declare_with_value(&mut self, name: &'de str, ty: Type, value: i64) {
        self.entries.insert(
            name,
            Entry {
                ty,
                value: Some(value),
            },
        );
    }

    /// Stores `value` under an already declared name. Returns `false` when
    /// the name was never declared.
    pub fn assign(&mut self, name: &str, value: i64) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }
}

pub struct Interpreter<'de, W = io::Stdout> {
    parser: Parser<'de>,
    environment: Environment<'de>,
    options: Options,
    out: W,
}

impl<'de> Interpreter<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Self::with_output(filename, whole, io::stdout())
    }
}

impl<'de, W: Write> Interpreter<'de, W> {
    pub fn with_output(filename: Option<&'de str>, whole: &'de str, out: W) -> Self {
        Interpreter {
            parser: Parser::new(filename, whole),
            environment: Environment::new(),
            options: Options::default(),
            out,
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.parser.lexer.comments = options.comments;
        self.options = options;
        self
    }

    pub fn environment(&self) -> &Environment<'de> {
        &self.environment
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Parses and evaluates the whole input, stopping at the first fault.
    /// Output emitted before the fault has already been written. An input
    /// with no statements at all is itself a fault.
    pub fn run(&mut self) -> Result<(), Error> {
        let mut statements = 0usize;
        while let Some(result) = self.next() {
            result?;
            statements += 1;
        }
        if statements == 0 {
            return Err(Eof::build(&self.parser.lexer).into());
        }
        debug!("program complete after {statements} statement(s)");
        Ok(())
    }

    fn eval_statement(&mut self, statement: &Stmt<'de>) -> Result<i64, Error> {
        match statement {
            Stmt::Attribution {
                name,
                offset,
                value,
            } => {
                let value = self.eval_expression(value)?;
                if !self.environment.assign(name, value) {
                    return Err(self.undefined(name, *offset));
                }
                Ok(value)
            }
            Stmt::If { guard, body } => match self.options.control {
                ControlMode::SinglePass => {
                    let taken = self.eval_cond(guard)?;
                    let value = self.eval_block(body)?;
                    Ok(if taken { value } else { 0 })
                }
                ControlMode::Gated => {
                    if self.eval_cond(guard)? {
                        self.eval_block(body)
                    } else {
                        Ok(0)
                    }
                }
            },
            Stmt::IfElse {
                guard,
                then_body,
                else_body,
            } => match self.options.control {
                ControlMode::SinglePass => {
                    let taken = self.eval_cond(guard)?;
                    let then_value = self.eval_block(then_body)?;
                    let else_value = self.eval_block(else_body)?;
                    Ok(if taken { then_value } else { else_value })
                }
                ControlMode::Gated => {
                    if self.eval_cond(guard)? {
                        self.eval_block(then_body)
                    } else {
                        self.eval_block(else_body)
                    }
                }
            },
            Stmt::Expression(expr) => self.eval_expression(expr),
            Stmt::Declaration { name, init } => match init {
                Some(init) => {
                    let value = self.eval_expression(init)?;
                    self.environment
                        .declare_with_value(*name, Type::Integer, value);
                    Ok(value)
                }
                None => {
                    self.environment.declare(*name, Type::Integer);
                    Ok(0)
                }
            },
            Stmt::While { guard, body } => match self.options.control {
                ControlMode::SinglePass => {
                    // One pass over the body, guard or no guard. The guard
                    // still evaluates, so its faults still surface.
                    self.eval_cond(guard)?;
                    self.eval_block(body)
                }
                ControlMode::Gated => {
                    let mut value = 0;
                    while self.eval_cond(guard)? {
                        value = self.eval_block(body)?;
                    }
                    Ok(value)
                }
            },
            Stmt::Write(expr) => {
                let value = self.eval_expression(expr)?;
                write!(self.out, "{value}").into_diagnostic()?;
                self.out.flush().into_diagnostic()?;
                Ok(value)
            }
            Stmt::Writeln(expr) => {
                let value = self.eval_expression(expr)?;
                writeln!(self.out, "{value}").into_diagnostic()?;
                Ok(value)
            }
        }
    }

    fn eval_block(&mut self, body: &[Stmt<'de>]) -> Result<i64, Error> {
        let mut value = 0;
        for statement in body {
            value = self.eval_statement(statement)?;
        }
        Ok(value)
    }

    fn eval_cond(&mut self, guard: &Cond<'de>) -> Result<bool, Error> {
        let lhs = self.eval_expression(&guard.lhs)?;
        let rhs = self.eval_expression(&guard.rhs)?;
        Ok(match guard.op {
            RelOp::Less => lhs < rhs,
            RelOp::LessEqual => lhs <= rhs,
            RelOp::Greater => lhs > rhs,
            RelOp::GreaterEqual => lhs >= rhs,
            RelOp::Equal => lhs == rhs,
            RelOp::NotEqual => lhs != rhs,
        })
    }

    fn eval_expression(&mut self, expr: &Expr<'de>) -> Result<i64, Error> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Ident { name, offset } => {
                let Some(entry) = self.environment.get(name) else {
                    return Err(self.undefined(name, *offset));
                };
                match entry.value {
                    Some(value) => Ok(value),
                    None => Err(UninitializedNameError {
                        src: self.source(),
                        bad_bit: SourceSpan::from(*offset - name.len()..*offset),
                        name: name.to_string(),
                    }
                    .into()),
                }
            }
            Expr::Group(inner) => self.eval_expression(inner),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expression(lhs)?;
                let rhs = self.eval_expression(rhs)?;
                apply(*op, lhs, rhs, self.options.star)
            }
        }
    }

    fn undefined(&self, name: &str, offset: usize) -> Error {
        UndefinedNameError {
            src: self.source(),
            bad_bit: SourceSpan::from(offset - name.len()..offset),
            name: name.to_string(),
        }
        .into()
    }

    fn source(&self) -> NamedSource<String> {
        NamedSource::new(
            self.parser.filename.unwrap_or("<input>"),
            self.parser.whole.to_string(),
        )
    }
}

/// Statement-at-a-time execution: each `next` parses one statement and
/// evaluates it immediately, yielding the statement's value.
impl<'de, W: Write> Iterator for Interpreter<'de, W> {
    type Item = Result<i64, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let statement = match self.parser.next()? {
            Ok(statement) => statement,
            Err(e) => return Some(Err(e)),
        };
        trace!("eval {statement}");
        Some(self.eval_statement(&statement))
    }
}

fn apply(op: BinOp, lhs: i64, rhs: i64, star: StarMode) -> Result<i64, Error> {
    let value = match op {
        BinOp::Plus => lhs.checked_add(rhs),
        BinOp::Minus => lhs.checked_sub(rhs),
        BinOp::Or => Some(lhs | rhs),
        BinOp::Star => match star {
            StarMode::Sum => lhs.checked_add(rhs),
            StarMode::Product => lhs.checked_mul(rhs),
        },
        BinOp::Slash => {
            if rhs == 0 {
                return Err(ArithmeticError::DivisionByZero.into());
            }
            floor_div(lhs, rhs)
        }
        BinOp::And => Some(lhs & rhs),
    };
    value.ok_or_else(|| ArithmeticError::Overflow { op }.into())
}

/// Integer division rounding toward negative infinity.
fn floor_div(lhs: i64, rhs: i64) -> Option<i64> {
    let quotient = lhs.checked_div(rhs)?;
    let remainder = lhs.checked_rem(rhs)?;
    if remainder != 0 && (remainder < 0) != (rhs < 0) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(7, 2, 3)]
    #[case(-7, 2, -4)]
    #[case(7, -2, -4)]
    #[case(-7, -2, 3)]
    #[case(6, 3, 2)]
    #[case(-6, 3, -2)]
    #[case(0, 5, 0)]
    fn division_rounds_toward_negative_infinity(
        #[case] lhs: i64,
        #[case] rhs: i64,
        #[case] expected: i64,
    ) {
        assert_eq!(floor_div(lhs, rhs), Some(expected));
    }

    #[test]
    fn division_overflow_is_detected() {
        assert_eq!(floor_div(i64::MIN, -1), None);
    }

    #[test]
    fn star_adds_unless_told_otherwise() {
        assert_eq!(apply(BinOp::Star, 2, 3, StarMode::Sum).unwrap(), 5);
        assert_eq!(apply(BinOp::Star, 2, 3, StarMode::Product).unwrap(), 6);
    }

    #[test]
    fn or_and_and_are_bitwise() {
        assert_eq!(apply(BinOp::Or, 1, 2, StarMode::Sum).unwrap(), 3);
        assert_eq!(apply(BinOp::And, 3, 1, StarMode::Sum).unwrap(), 1);
        assert_eq!(apply(BinOp::And, 2, 1, StarMode::Sum).unwrap(), 0);
    }

    #[test]
    fn addition_overflow_is_a_fault() {
        let err = apply(BinOp::Plus, i64::MAX, 1, StarMode::Sum).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ArithmeticError>(),
            Some(ArithmeticError::Overflow { op: BinOp::Plus })
        ));
    }

    #[test]
    fn environment_contract() {
        let mut environment = Environment::new();
        assert!(environment.get("x").is_none());
        assert!(!environment.assign("x", 1));

        environment.declare("x", Type::Integer);
        assert_eq!(environment.get("x").expect("declared").value, None);

        assert!(environment.assign("x", 7));
        assert_eq!(environment.get("x").expect("declared").value, Some(7));

        // Redeclaration silently resets the entry.
        environment.declare("x", Type::Integer);
        assert_eq!(environment.get("x").expect("declared").value, None);

        environment.declare_with_value("y", Type::Integer, 3);
        assert_eq!(environment.get("y").expect("declared").value, Some(3));
    }

    #[test]
    fn statement_values_follow_the_guard() {
        let source = "integer x = 1; \
                      if (1 < 2) then begin x = 5; end; \
                      if (2 < 1) then begin x = 9; end;";
        let mut interpreter = Interpreter::with_output(None, source, Vec::new());
        let values: Vec<i64> = interpreter
            .by_ref()
            .collect::<Result<_, _>>()
            .expect("program should run");
        assert_eq!(values, vec![1, 5, 0]);
        // The untaken body still ran.
        assert_eq!(
            interpreter.environment().get("x").expect("declared").value,
            Some(9)
        );
    }

    #[test]
    fn if_else_value_selects_a_branch_but_both_run() {
        let source = "integer x = 1; \
                      if (2 < 1) then begin x = 5; end else begin x = 7; end;";
        let mut interpreter = Interpreter::with_output(None, source, Vec::new());
        let values: Vec<i64> = interpreter
            .by_ref()
            .collect::<Result<_, _>>()
            .expect("program should run");
        assert_eq!(values, vec![1, 7]);
        assert_eq!(
            interpreter.environment().get("x").expect("declared").value,
            Some(7)
        );
    }

    #[test]
    fn bare_declaration_has_value_zero() {
        let values: Vec<i64> = Interpreter::with_output(None, "integer x; x = 2; x + 1;", Vec::new())
            .collect::<Result<_, _>>()
            .expect("program should run");
        assert_eq!(values, vec![0, 2, 3]);
    }

    #[test]
    fn reading_a_declared_but_unassigned_name_is_a_fault() {
        let err = Interpreter::with_output(None, "integer x; writeln(x);", Vec::new())
            .run()
            .expect_err("read should fault");
        let err = err
            .downcast_ref::<UninitializedNameError>()
            .expect("uninitialized name error");
        assert_eq!(err.name, "x");
        assert_eq!(err.to_string(), "Name x has no value");
    }

    #[test]
    fn empty_input_is_a_fault() {
        let err = Interpreter::with_output(None, "", Vec::new())
            .run()
            .expect_err("empty input should fault");
        assert!(err.downcast_ref::<Eof>().is_some());
    }

    #[test]
    fn comment_only_input_is_a_fault() {
        let err = Interpreter::with_output(None, "$ nothing here $", Vec::new())
            .run()
            .expect_err("comment-only input should fault");
        assert!(err.downcast_ref::<Eof>().is_some());
    }
}
