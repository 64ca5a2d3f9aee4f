pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::bytes::complete::{take_until, take_while};
use nom::combinator::opt;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take_while_m_n},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of},
    combinator::{map, map_opt, map_res, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
};
use nom_locate::position;
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::number::Number;
use crate::range::{Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token {
                range: span.into(),
                kind: $kind,
            })
            .parse(input)
        }
    };
}

pub struct Lexer;

impl Lexer {
    pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
        match tokens(Span::new(input)) {
            Ok((span, tokens)) => {
                let eof: Range = span.into();

                if eof.start == eof.end {
                    Ok([
                        tokens,
                        vec![Token {
                            range: eof,
                            kind: TokenKind::Eof,
                        }],
                    ]
                    .concat())
                } else {
                    Err(LexerError::UnexpectedEOFDetected(eof.start))
                }
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(LexerError::UnexpectedToken(Token {
                    range: e.input.into(),
                    kind: TokenKind::Eof,
                }))
            }
            _ => unreachable!(),
        }
    }
}

fn unicode(input: Span) -> IResult<Span, char> {
    map_opt(
        map_res(
            preceded(
                char('u'),
                delimited(
                    char('{'),
                    take_while_m_n(1, 6, |c: char| c.is_ascii_hexdigit()),
                    char('}'),
                ),
            ),
            |span: Span| u32::from_str_radix(span.fragment(), 16),
        ),
        char::from_u32,
    )
    .parse(input)
}

fn line_comment(input: Span) -> IResult<Span, Token> {
    map(
        preceded(tag("//"), take_while(|c| c != '\n' && c != '\r')),
        |span: Span| Token {
            range: span.into(),
            kind: TokenKind::Comment(span.fragment().to_string()),
        },
    )
    .parse(input)
}

fn block_comment(input: Span) -> IResult<Span, Token> {
    map(
        delimited(tag("/*"), take_until("*/"), tag("*/")),
        |span: Span| Token {
            range: span.into(),
            kind: TokenKind::Comment(span.fragment().to_string()),
        },
    )
    .parse(input)
}

define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(star, "*", TokenKind::Star);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(ne_eq, "!=", TokenKind::NeEq);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(gte, ">=", TokenKind::Gte);
define_token_parser!(gt, ">", TokenKind::Gt);
define_token_parser!(lte, "<=", TokenKind::Lte);
define_token_parser!(lt, "<", TokenKind::Lt);
define_token_parser!(
    empty_single_quoted,
    "''",
    TokenKind::StringLiteral(String::new())
);
define_token_parser!(
    empty_double_quoted,
    "\"\"",
    TokenKind::StringLiteral(String::new())
);

fn punctuations(input: Span) -> IResult<Span, Token> {
    alt((
        l_paren, r_paren, comma, plus, minus, star, slash, ne_eq, equal, gte, gt, lte, lt,
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map_res(
        recognize(pair(digit1, opt(preceded(char('.'), digit1)))),
        |span: Span| {
            let fragment = span.fragment();

            match fragment.split_once('.') {
                Some((_, frac)) => fragment.parse::<f64>().map_err(|_| ()).map(|n| Token {
                    range: span.into(),
                    kind: TokenKind::DecimalLiteral(
                        Number::new(n),
                        frac.len().min(u8::MAX as usize) as u8,
                    ),
                }),
                None => fragment.parse::<i64>().map_err(|_| ()).map(|n| Token {
                    range: span.into(),
                    kind: TokenKind::IntLiteral(n),
                }),
            }
        },
    )
    .parse(input)
}

fn escape_sequences(
    quote: char,
) -> impl for<'a> FnMut(Span<'a>) -> IResult<Span<'a>, char> {
    move |input| {
        alt((
            value('\\', char('\\')),
            value(quote, char(quote)),
            value('\r', char('r')),
            value('\n', char('n')),
            value('\t', char('t')),
            unicode,
        ))
        .parse(input)
    }
}

fn quoted_string(quote: char) -> impl for<'a> FnMut(Span<'a>) -> IResult<Span<'a>, Token> {
    move |input| {
        let (span, start) = position(input)?;
        let (span, s) = delimited(
            char(quote),
            escaped_transform(
                none_of(if quote == '\'' { "'\\" } else { "\"\\" }),
                '\\',
                escape_sequences(quote),
            ),
            char(quote),
        )
        .parse(span)?;
        let (span, end) = position(span)?;

        Ok((
            span,
            Token {
                range: Range {
                    start: start.into(),
                    end: end.into(),
                },
                kind: TokenKind::StringLiteral(s),
            },
        ))
    }
}

fn literals(input: Span) -> IResult<Span, Token> {
    alt((
        number_literal,
        empty_single_quoted,
        empty_double_quoted,
        quoted_string('\''),
        quoted_string('"'),
    ))
    .parse(input)
}

fn ident(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| match *span.fragment() {
            "true" => Token {
                range: span.into(),
                kind: TokenKind::BoolLiteral(true),
            },
            "false" => Token {
                range: span.into(),
                kind: TokenKind::BoolLiteral(false),
            },
            _ => Token {
                range: span.into(),
                kind: TokenKind::Ident(SmolStr::new(span.fragment())),
            },
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((line_comment, block_comment, literals, punctuations, ident)).parse(input)
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    many0(delimited(multispace0, token, multispace0)).parse(input)
}
