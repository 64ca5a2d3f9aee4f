use std::fmt::{self, Display, Formatter};

use smol_str::SmolStr;

use crate::{number::Number, range::Range};

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    BoolLiteral(bool),
    Comma,
    Comment(String),
    DecimalLiteral(Number, u8),
    Eof,
    Equal,
    Gt,
    Gte,
    Ident(SmolStr),
    IntLiteral(i64),
    LParen,
    Lt,
    Lte,
    Minus,
    NeEq,
    Plus,
    RParen,
    Slash,
    Star,
    StringLiteral(String),
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::BoolLiteral(b) => write!(f, "{}", b),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Comment(comment) => write!(f, "// {}", comment.trim()),
            TokenKind::DecimalLiteral(n, scale) => {
                write!(f, "{:.*}", *scale as usize, n.value())
            }
            TokenKind::Eof => write!(f, ""),
            TokenKind::Equal => write!(f, "="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Gte => write!(f, ">="),
            TokenKind::Ident(ident) => write!(f, "{}", ident),
            TokenKind::IntLiteral(i) => write!(f, "{}", i),
            TokenKind::LParen => write!(f, "("),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Lte => write!(f, "<="),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::NeEq => write!(f, "!="),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::StringLiteral(s) => write!(f, "{}", s),
        }
    }
}
