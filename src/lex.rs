use std::fmt::Display;

use miette::{Diagnostic, Error, NamedSource, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
#[error("invalid token `{token}`")]
#[diagnostic(help("remove or correct the character: `{token}`"))]
pub struct SingleTokenError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this character")]
    bad_bit: SourceSpan,

    pub token: char,
}

impl SingleTokenError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_bit.offset()].lines().count()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("unterminated comment")]
#[diagnostic(help("close the comment span with a second `$` marker"))]
pub struct CommentTerminationError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this comment never closes")]
    bad_line: SourceSpan,
}

impl CommentTerminationError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_line.offset()].lines().count()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("numeric literal `{literal}` does not fit in an integer")]
#[diagnostic(help("values must fit a signed 64-bit integer"))]
pub struct NumberOverflowError {
    #[source_code]
    src: NamedSource<String>,

    #[label("this numeric literal")]
    bad_bit: SourceSpan,

    pub literal: String,
}

impl NumberOverflowError {
    pub fn line(&self) -> usize {
        self.src.inner()[..=self.bad_bit.offset()].lines().count()
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("Unexpected end of file")]
#[diagnostic(help("the program ended where a statement or token was still expected"))]
pub struct Eof {
    #[source_code]
    src: NamedSource<String>,

    #[label("Syntax Error: Unexpected end of file")]
    bad_line: SourceSpan,
}

impl Eof {
    pub fn build(lexer: &Lexer<'_>) -> Self {
        Eof {
            src: NamedSource::new(lexer.filename.unwrap_or("<input>"), lexer.whole.to_string()),
            bad_line: SourceSpan::from(lexer.byte.saturating_sub(1)..lexer.byte),
        }
    }
}

/// How a `$ … $` comment span finds its closing marker.
///
/// `Greedy` swallows everything between the first `$` and the *last* `$`
/// remaining in the input, newlines included, so three or more markers in a
/// file fold into one giant comment. `Pairwise` closes at the next marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentMode {
    #[default]
    Greedy,
    Pairwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Equal,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Ident,
    Number(i64),
    And,
    Begin,
    Do,
    Else,
    End,
    If,
    Integer,
    Not,
    Or,
    Program,
    Read,
    Then,
    Var,
    While,
    Write,
    Writeln,
}

impl TokenKind {
    /// The wire name a token reports under in diagnostics and token dumps.
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::LeftParen => "LPAR",
            TokenKind::RightParen => "RPAR",
            TokenKind::Comma => "COMMA",
            TokenKind::Colon => "COL",
            TokenKind::Dot => "DOT",
            TokenKind::Semicolon => "SEMI",
            TokenKind::Equal => "EQU",
            TokenKind::EqualEqual => "DEQU",
            TokenKind::BangEqual => "NEQU",
            TokenKind::Less => "LT",
            TokenKind::LessEqual => "LTE",
            TokenKind::Greater => "GT",
            TokenKind::GreaterEqual => "GTE",
            TokenKind::Plus => "PLUS",
            TokenKind::Minus => "MIN",
            TokenKind::Star => "MULT",
            TokenKind::Slash => "DIV",
            TokenKind::Ident => "IDEN",
            TokenKind::Number(_) => "NUMB",
            TokenKind::And => "AND",
            TokenKind::Begin => "BEGIN",
            TokenKind::Do => "DO",
            TokenKind::Else => "ELSE",
            TokenKind::End => "END",
            TokenKind::If => "IF",
            TokenKind::Integer => "INTEGER",
            TokenKind::Not => "NOT",
            TokenKind::Or => "OR",
            TokenKind::Program => "PROGRAM",
            TokenKind::Read => "READ",
            TokenKind::Then => "THEN",
            TokenKind::Var => "VAR",
            TokenKind::While => "WHILE",
            TokenKind::Write => "WRITE",
            TokenKind::Writeln => "WRITELN",
        }
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::Number(n) => write!(f, "NUMB {lit} {n}"),
            kind => write!(f, "{} {lit} null", kind.name()),
        }
    }
}

pub struct Lexer<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    rest: &'de str,
    pub byte: usize,
    peeked: Option<Result<Token<'de>, Error>>,
    pub(crate) comments: CommentMode,
}

impl<'de> Lexer<'de> {
    pub fn new(filename: Option<&'de str>, input: &'de str) -> Self {
        Lexer {
            filename,
            whole: input,
            rest: input,
            byte: 0,
            peeked: None,
            comments: CommentMode::default(),
        }
    }

    pub fn comment_mode(mut self, mode: CommentMode) -> Self {
        self.comments = mode;
        self
    }

    pub fn peek(&mut self) -> Option<&Result<Token<'de>, Error>> {
        if self.peeked.is_some() {
            return self.peeked.as_ref();
        }
        self.peeked = self.next();
        self.peeked.as_ref()
    }

    fn single_token_error(&self, token: char) -> SingleTokenError {
        SingleTokenError {
            src: NamedSource::new(self.filename.unwrap_or("<input>"), self.whole.to_string()),
            bad_bit: SourceSpan::from(self.byte - token.len_utf8()..self.byte),
            token,
        }
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Result<Token<'de>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(peeked) = self.peeked.take() {
            return Some(peeked);
        }
        loop {
            let mut chars = self.rest.chars();
            let c = chars.next()?;
            let literal = &self.rest[..c.len_utf8()];
            let cur = self.rest;
            self.rest = chars.as_str();
            self.byte += c.len_utf8();

            enum Start {
                Comment,
                Ident,
                Number,
                IfEqualElse(TokenKind, TokenKind),
                MustEqual(TokenKind),
            }

            let process = |kind: TokenKind| Some(Ok(Token { kind, literal }));

            let started = match c {
                '(' => return process(TokenKind::LeftParen),
                ')' => return process(TokenKind::RightParen),
                ',' => return process(TokenKind::Comma),
                ':' => return process(TokenKind::Colon),
                '.' => return process(TokenKind::Dot),
                ';' => return process(TokenKind::Semicolon),
                '+' => return process(TokenKind::Plus),
                '-' => return process(TokenKind::Minus),
                '*' => return process(TokenKind::Star),
                '/' => return process(TokenKind::Slash),
                '$' => Start::Comment,
                '=' => Start::IfEqualElse(TokenKind::EqualEqual, TokenKind::Equal),
                '<' => Start::IfEqualElse(TokenKind::LessEqual, TokenKind::Less),
                '>' => Start::IfEqualElse(TokenKind::GreaterEqual, TokenKind::Greater),
                '!' => Start::MustEqual(TokenKind::BangEqual),
                'a'..='z' | 'A'..='Z' | '_' => Start::Ident,
                '0'..='9' => Start::Number,
                ' ' | '\r' | '\t' | '\n' => continue, // Skip whitespace
                c => {
                    return Some(Err(self.single_token_error(c).into()));
                }
            };

            match started {
                Start::Comment => {
                    let close = match self.comments {
                        CommentMode::Greedy => self.rest.rfind('$'),
                        CommentMode::Pairwise => self.rest.find('$'),
                    };
                    match close {
                        Some(end) => {
                            self.byte += end + 1;
                            self.rest = &self.rest[end + 1..];
                            continue; // Comments are not tokens
                        }
                        None if self.comments == CommentMode::Pairwise => {
                            return Some(Err(CommentTerminationError {
                                src: NamedSource::new(
                                    self.filename.unwrap_or("<input>"),
                                    self.whole.to_string(),
                                ),
                                bad_line: SourceSpan::from(
                                    self.byte - c.len_utf8()..self.whole.len(),
                                ),
                            }
                            .into()));
                        }
                        // With no closing marker the span rule never matches
                        // and the `$` itself is an invalid character.
                        None => {
                            return Some(Err(self.single_token_error(c).into()));
                        }
                    }
                }
                Start::Ident => {
                    let first_non_ident = cur
                        .find(|c| !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_'))
                        .unwrap_or(cur.len());

                    let literal = &cur[..first_non_ident];

                    let extra_bytes = literal.len() - c.len_utf8();
                    self.byte += extra_bytes;
                    self.rest = &self.rest[extra_bytes..];

                    let kind = match literal {
                        "and" => TokenKind::And,
                        "begin" => TokenKind::Begin,
                        "do" => TokenKind::Do,
                        "else" => TokenKind::Else,
                        "end" => TokenKind::End,
                        "if" => TokenKind::If,
                        "integer" => TokenKind::Integer,
                        "not" => TokenKind::Not,
                        "or" => TokenKind::Or,
                        "program" => TokenKind::Program,
                        "read" => TokenKind::Read,
                        "then" => TokenKind::Then,
                        "var" => TokenKind::Var,
                        "while" => TokenKind::While,
                        "write" => TokenKind::Write,
                        "writeln" => TokenKind::Writeln,
                        _ => TokenKind::Ident,
                    };

                    return Some(Ok(Token { kind, literal }));
                }
                Start::Number => {
                    let first_non_digit = cur
                        .find(|c: char| !c.is_ascii_digit())
                        .unwrap_or(cur.len());

                    let literal = &cur[..first_non_digit];

                    let extra_bytes = literal.len() - c.len_utf8();
                    self.byte += extra_bytes;
                    self.rest = &self.rest[extra_bytes..];

                    let n = match literal.parse() {
                        Ok(n) => n,
                        Err(_) => {
                            return Some(Err(NumberOverflowError {
                                src: NamedSource::new(
                                    self.filename.unwrap_or("<input>"),
                                    self.whole.to_string(),
                                ),
                                bad_bit: SourceSpan::from(self.byte - literal.len()..self.byte),
                                literal: literal.to_string(),
                            }
                            .into()));
                        }
                    };

                    return Some(Ok(Token {
                        kind: TokenKind::Number(n),
                        literal,
                    }));
                }
                Start::IfEqualElse(yes, no) => {
                    if self.rest.starts_with('=') {
                        let span = &cur[..c.len_utf8() + 1];
                        self.rest = &self.rest[1..];
                        self.byte += 1;
                        return Some(Ok(Token {
                            kind: yes,
                            literal: span,
                        }));
                    } else {
                        return Some(Ok(Token { kind: no, literal }));
                    }
                }
                Start::MustEqual(yes) => {
                    if self.rest.starts_with('=') {
                        let span = &cur[..c.len_utf8() + 1];
                        self.rest = &self.rest[1..];
                        self.byte += 1;
                        return Some(Ok(Token {
                            kind: yes,
                            literal: span,
                        }));
                    } else {
                        // `!` only exists as half of `!=`
                        return Some(Err(self.single_token_error(c).into()));
                    }
                }
            }
        }
    }
}
