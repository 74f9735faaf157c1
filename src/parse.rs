use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

use crate::lex::{CommentMode, Eof, Lexer, Token, TokenKind};

/// An unexpected token. The message names the token by its wire name and,
/// for identifiers, quotes the identifier text.
#[derive(Error, Debug, Diagnostic)]
#[error("Syntax error at {kind} {text}")]
pub struct SyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this token was not expected here")]
    bad_bit: SourceSpan,

    #[help]
    advice: Option<String>,

    pub kind: &'static str,
    pub text: String,
}

impl SyntaxError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_bit.offset()].lines().count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<'de> {
    Attribution {
        name: &'de str,
        offset: usize,
        value: Expr<'de>,
    },
    If {
        guard: Cond<'de>,
        body: Vec<Stmt<'de>>,
    },
    IfElse {
        guard: Cond<'de>,
        then_body: Vec<Stmt<'de>>,
        else_body: Vec<Stmt<'de>>,
    },
    Expression(Expr<'de>),
    Declaration {
        name: &'de str,
        init: Option<Expr<'de>>,
    },
    While {
        guard: Cond<'de>,
        body: Vec<Stmt<'de>>,
    },
    Write(Expr<'de>),
    Writeln(Expr<'de>),
}

/// A guard. Relational operators only appear here, never inside expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond<'de> {
    pub lhs: Expr<'de>,
    pub op: RelOp,
    pub rhs: Expr<'de>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'de> {
    Number(i64),
    Ident { name: &'de str, offset: usize },
    Group(Box<Expr<'de>>),
    Binary {
        op: BinOp,
        lhs: Box<Expr<'de>>,
        rhs: Box<Expr<'de>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Plus,
    Minus,
    Or,
    Star,
    Slash,
    And,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOp::Plus => write!(f, "+"),
            BinOp::Minus => write!(f, "-"),
            BinOp::Or => write!(f, "or"),
            BinOp::Star => write!(f, "*"),
            BinOp::Slash => write!(f, "/"),
            BinOp::And => write!(f, "and"),
        }
    }
}

impl Display for RelOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelOp::Less => write!(f, "<"),
            RelOp::LessEqual => write!(f, "<="),
            RelOp::Greater => write!(f, ">"),
            RelOp::GreaterEqual => write!(f, ">="),
            RelOp::Equal => write!(f, "=="),
            RelOp::NotEqual => write!(f, "!="),
        }
    }
}

impl Display for Expr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Ident { name, .. } => write!(f, "{name}"),
            Expr::Group(inner) => write!(f, "(group {inner})"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({op} {lhs} {rhs})"),
        }
    }
}

impl Display for Cond<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} {} {})", self.op, self.lhs, self.rhs)
    }
}

impl Display for Stmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stmt::Attribution { name, value, .. } => write!(f, "(= {name} {value})"),
            Stmt::If { guard, body } => {
                write!(f, "(if {guard} ")?;
                fmt_block(f, body)?;
                write!(f, ")")
            }
            Stmt::IfElse {
                guard,
                then_body,
                else_body,
            } => {
                write!(f, "(if {guard} ")?;
                fmt_block(f, then_body)?;
                write!(f, " ")?;
                fmt_block(f, else_body)?;
                write!(f, ")")
            }
            Stmt::Expression(expr) => write!(f, "{expr}"),
            Stmt::Declaration { name, init: None } => write!(f, "(integer {name})"),
            Stmt::Declaration {
                name,
                init: Some(init),
            } => write!(f, "(integer {name} {init})"),
            Stmt::While { guard, body } => {
                write!(f, "(while {guard} ")?;
                fmt_block(f, body)?;
                write!(f, ")")
            }
            Stmt::Write(expr) => write!(f, "(write {expr})"),
            Stmt::Writeln(expr) => write!(f, "(writeln {expr})"),
        }
    }
}

fn fmt_block(f: &mut std::fmt::Formatter<'_>, body: &[Stmt<'_>]) -> std::fmt::Result {
    write!(f, "(begin")?;
    for stmt in body {
        write!(f, " {stmt}")?;
    }
    write!(f, ")")
}

pub struct Parser<'de> {
    pub(crate) filename: Option<&'de str>,
    pub(crate) whole: &'de str,
    pub(crate) lexer: Lexer<'de>,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Parser {
            filename,
            whole,
            lexer: Lexer::new(filename, whole),
        }
    }

    pub fn comment_mode(mut self, mode: CommentMode) -> Self {
        self.lexer = self.lexer.comment_mode(mode);
        self
    }

    fn syntax_error(&self, token: &Token<'de>, advice: impl Into<String>) -> Error {
        let text = match token.kind {
            TokenKind::Ident => token.literal.to_string(),
            _ => String::new(),
        };
        SyntaxError {
            src: NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string()),
            bad_bit: SourceSpan::from(self.lexer.byte - token.literal.len()..self.lexer.byte),
            advice: Some(advice.into()),
            kind: token.kind.name(),
            text,
        }
        .into()
    }

    fn advance(&mut self) -> Result<Option<Token<'de>>, Error> {
        self.lexer.next().transpose()
    }

    fn expect(&mut self, expected: TokenKind, advice: &str) -> Result<Token<'de>, Error> {
        self.expect_where(|token| token.kind == expected, advice)
    }

    fn expect_where(
        &mut self,
        mut check: impl FnMut(&Token<'de>) -> bool,
        advice: &str,
    ) -> Result<Token<'de>, Error> {
        match self.lexer.next() {
            Some(Ok(token)) if check(&token) => Ok(token),
            Some(Ok(token)) => Err(self.syntax_error(&token, advice)),
            Some(Err(e)) => Err(e),
            None => Err(Eof::build(&self.lexer).into()),
        }
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>, Error> {
        match self.lexer.peek() {
            Some(Ok(token)) => Ok(Some(token.kind)),
            Some(Err(_)) => match self.lexer.next() {
                Some(Err(e)) => Err(e),
                _ => unreachable!("peeked an error"),
            },
            None => Ok(None),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Stmt<'de>, Error> {
        let stmt = match self.peek_kind()? {
            Some(TokenKind::Integer) => self.parse_declaration()?,
            Some(TokenKind::If) => self.parse_if()?,
            Some(TokenKind::While) => self.parse_while()?,
            Some(TokenKind::Write) => self.parse_write()?,
            Some(TokenKind::Writeln) => self.parse_writeln()?,
            Some(TokenKind::Ident) => self.parse_attribution_or_expression()?,
            Some(_) => Stmt::Expression(self.parse_expression()?),
            None => return Err(Eof::build(&self.lexer).into()),
        };
        self.expect(TokenKind::Semicolon, "every statement ends with `;`")?;
        Ok(stmt)
    }

    fn parse_declaration(&mut self) -> Result<Stmt<'de>, Error> {
        self.expect(TokenKind::Integer, "expected `integer`")?;
        let name = self.expect(TokenKind::Ident, "expected a variable name after `integer`")?;
        let init = match self.peek_kind()? {
            Some(TokenKind::Equal) => {
                self.advance()?;
                Some(self.parse_expression()?)
            }
            _ => None,
        };
        Ok(Stmt::Declaration {
            name: name.literal,
            init,
        })
    }

    fn parse_if(&mut self) -> Result<Stmt<'de>, Error> {
        self.expect(TokenKind::If, "expected `if`")?;
        self.expect(TokenKind::LeftParen, "the guard of `if` is parenthesized")?;
        let guard = self.parse_rel_expression()?;
        self.expect(TokenKind::RightParen, "the guard of `if` is parenthesized")?;
        self.expect(TokenKind::Then, "expected `then` after the guard")?;
        let body = self.parse_block()?;
        if let Some(TokenKind::Else) = self.peek_kind()? {
            self.advance()?;
            let else_body = self.parse_block()?;
            return Ok(Stmt::IfElse {
                guard,
                then_body: body,
                else_body,
            });
        }
        Ok(Stmt::If { guard, body })
    }

    fn parse_while(&mut self) -> Result<Stmt<'de>, Error> {
        self.expect(TokenKind::While, "expected `while`")?;
        self.expect(TokenKind::LeftParen, "the guard of `while` is parenthesized")?;
        let guard = self.parse_rel_expression()?;
        self.expect(TokenKind::RightParen, "the guard of `while` is parenthesized")?;
        self.expect(TokenKind::Do, "expected `do` after the guard")?;
        let body = self.parse_block()?;
        Ok(Stmt::While { guard, body })
    }

    fn parse_write(&mut self) -> Result<Stmt<'de>, Error> {
        self.expect(TokenKind::Write, "expected `write`")?;
        self.expect(TokenKind::LeftParen, "`write` takes a parenthesized expression")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "`write` takes a parenthesized expression")?;
        Ok(Stmt::Write(value))
    }

    fn parse_writeln(&mut self) -> Result<Stmt<'de>, Error> {
        self.expect(TokenKind::Writeln, "expected `writeln`")?;
        self.expect(
            TokenKind::LeftParen,
            "`writeln` takes a parenthesized expression",
        )?;
        let value = self.parse_expression()?;
        self.expect(
            TokenKind::RightParen,
            "`writeln` takes a parenthesized expression",
        )?;
        Ok(Stmt::Writeln(value))
    }

    /// A statement opening with an identifier is an attribution when `=`
    /// follows and a plain expression otherwise.
    fn parse_attribution_or_expression(&mut self) -> Result<Stmt<'de>, Error> {
        let name = self.expect(TokenKind::Ident, "expected a name")?;
        let offset = self.lexer.byte;
        if let Some(TokenKind::Equal) = self.peek_kind()? {
            self.advance()?;
            let value = self.parse_expression()?;
            return Ok(Stmt::Attribution {
                name: name.literal,
                offset,
                value,
            });
        }
        let lhs = Expr::Ident {
            name: name.literal,
            offset,
        };
        let term = self.parse_term_rest(lhs)?;
        let expr = self.parse_expression_rest(term)?;
        Ok(Stmt::Expression(expr))
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt<'de>>, Error> {
        self.expect(TokenKind::Begin, "blocks open with `begin`")?;
        let mut body = vec![self.parse_statement()?];
        loop {
            match self.peek_kind()? {
                Some(TokenKind::End) => break,
                Some(_) => body.push(self.parse_statement()?),
                None => return Err(Eof::build(&self.lexer).into()),
            }
        }
        self.expect(TokenKind::End, "blocks close with `end`")?;
        Ok(body)
    }

    fn parse_rel_expression(&mut self) -> Result<Cond<'de>, Error> {
        let lhs = self.parse_expression()?;
        let op = self.expect_where(
            |token| {
                matches!(
                    token.kind,
                    TokenKind::Less
                        | TokenKind::LessEqual
                        | TokenKind::Greater
                        | TokenKind::GreaterEqual
                        | TokenKind::EqualEqual
                        | TokenKind::BangEqual
                )
            },
            "a guard compares two expressions with `<`, `<=`, `>`, `>=`, `==` or `!=`",
        )?;
        let op = match op.kind {
            TokenKind::Less => RelOp::Less,
            TokenKind::LessEqual => RelOp::LessEqual,
            TokenKind::Greater => RelOp::Greater,
            TokenKind::GreaterEqual => RelOp::GreaterEqual,
            TokenKind::EqualEqual => RelOp::Equal,
            TokenKind::BangEqual => RelOp::NotEqual,
            _ => unreachable!("expect_where only admits relational operators"),
        };
        let rhs = self.parse_expression()?;
        Ok(Cond { lhs, op, rhs })
    }

    /// `expression := term | term ("+" | "-" | "or") term`. One operator at
    /// most per level, there is no chaining.
    pub fn parse_expression(&mut self) -> Result<Expr<'de>, Error> {
        let first = self.parse_term()?;
        self.parse_expression_rest(first)
    }

    fn parse_expression_rest(&mut self, first: Expr<'de>) -> Result<Expr<'de>, Error> {
        let op = match self.peek_kind()? {
            Some(TokenKind::Plus) => BinOp::Plus,
            Some(TokenKind::Minus) => BinOp::Minus,
            Some(TokenKind::Or) => BinOp::Or,
            _ => return Ok(first),
        };
        self.advance()?;
        let rhs = self.parse_term()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(first),
            rhs: Box::new(rhs),
        })
    }

    fn parse_term(&mut self) -> Result<Expr<'de>, Error> {
        let first = self.parse_factor()?;
        self.parse_term_rest(first)
    }

    fn parse_term_rest(&mut self, first: Expr<'de>) -> Result<Expr<'de>, Error> {
        let op = match self.peek_kind()? {
            Some(TokenKind::Star) => BinOp::Star,
            Some(TokenKind::Slash) => BinOp::Slash,
            Some(TokenKind::And) => BinOp::And,
            _ => return Ok(first),
        };
        self.advance()?;
        let rhs = self.parse_factor()?;
        Ok(Expr::Binary {
            op,
            lhs: Box::new(first),
            rhs: Box::new(rhs),
        })
    }

    fn parse_factor(&mut self) -> Result<Expr<'de>, Error> {
        match self.lexer.next() {
            Some(Ok(token)) => match token.kind {
                TokenKind::Number(n) => Ok(Expr::Number(n)),
                TokenKind::Ident => Ok(Expr::Ident {
                    name: token.literal,
                    offset: self.lexer.byte,
                }),
                TokenKind::LeftParen => {
                    let inner = self.parse_expression()?;
                    self.expect(TokenKind::RightParen, "this group is never closed")?;
                    Ok(Expr::Group(Box::new(inner)))
                }
                _ => Err(self.syntax_error(
                    &token,
                    "expected a number, a name or a parenthesized expression",
                )),
            },
            Some(Err(e)) => Err(e),
            None => Err(Eof::build(&self.lexer).into()),
        }
    }
}

impl<'de> Iterator for Parser<'de> {
    type Item = Result<Stmt<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lexer.peek()?;
        Some(self.parse_statement())
    }
}
