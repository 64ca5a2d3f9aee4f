use std::iter::Peekable;

use smol_str::SmolStr;

use crate::lexer::token::{Token, TokenKind};
use crate::number::Number;
use crate::range::{Position, Range};

use super::error::ParseError;
use super::syntax::{BinaryOperator, SyntaxKind, SyntaxNode};

pub struct Parser<'a> {
    tokens: Peekable<std::vec::IntoIter<&'a Token>>,
    last_position: Position,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], max_depth: usize) -> Self {
        Self {
            tokens: tokens
                .iter()
                .filter(|token| !matches!(token.kind, TokenKind::Comment(_)))
                .collect::<Vec<_>>()
                .into_iter()
                .peekable(),
            last_position: Position::default(),
            depth: 0,
            max_depth,
        }
    }

    pub fn parse(&mut self) -> Result<SyntaxNode, ParseError> {
        let node = self.parse_expr()?;

        match self.tokens.next() {
            Some(token) if token.is_eof() => Ok(node),
            Some(token) => Err(ParseError::UnexpectedToken(token.clone())),
            None => Ok(node),
        }
    }

    fn parse_expr(&mut self) -> Result<SyntaxNode, ParseError> {
        let lhs = self.parse_primary_expr()?;
        self.parse_binary_op(1, lhs)
    }

    #[inline(always)]
    fn binary_operator(kind: &TokenKind) -> Option<BinaryOperator> {
        match kind {
            TokenKind::Equal => Some(BinaryOperator::Equal),
            TokenKind::NeEq => Some(BinaryOperator::NotEqual),
            TokenKind::Gt => Some(BinaryOperator::GreaterThan),
            TokenKind::Gte => Some(BinaryOperator::GreaterThanOrEqual),
            TokenKind::Lt => Some(BinaryOperator::LessThan),
            TokenKind::Lte => Some(BinaryOperator::LessThanOrEqual),
            TokenKind::Plus => Some(BinaryOperator::Add),
            TokenKind::Minus => Some(BinaryOperator::Minus),
            TokenKind::Star => Some(BinaryOperator::Multiply),
            TokenKind::Slash => Some(BinaryOperator::Divide),
            _ => None,
        }
    }

    #[inline(always)]
    fn binary_op_precedence(op: BinaryOperator) -> u8 {
        match op {
            BinaryOperator::Equal | BinaryOperator::NotEqual => 1,
            BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqual
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqual => 2,
            BinaryOperator::Add | BinaryOperator::Minus => 3,
            BinaryOperator::Multiply | BinaryOperator::Divide => 4,
        }
    }

    fn parse_binary_op(
        &mut self,
        min_prec: u8,
        mut lhs: SyntaxNode,
    ) -> Result<SyntaxNode, ParseError> {
        while let Some(token) = self.tokens.peek() {
            let op = match Self::binary_operator(&token.kind) {
                Some(op) => op,
                None => break,
            };
            let prec = Self::binary_op_precedence(op);

            if prec < min_prec {
                break;
            }

            self.next_token()?;
            let mut rhs = self.parse_primary_expr()?;

            loop {
                let next_prec = self
                    .tokens
                    .peek()
                    .and_then(|token| Self::binary_operator(&token.kind))
                    .map(Self::binary_op_precedence)
                    .unwrap_or(0);

                if next_prec > prec {
                    rhs = self.parse_binary_op(next_prec, rhs)?;
                } else {
                    break;
                }
            }

            let range = Range {
                start: lhs.range.start.clone(),
                end: rhs.range.end.clone(),
            };
            lhs = SyntaxNode {
                range,
                kind: SyntaxKind::BinaryOp {
                    op,
                    left: Box::new(lhs),
                    right: Box::new(rhs),
                },
            };
        }

        Ok(lhs)
    }

    fn parse_primary_expr(&mut self) -> Result<SyntaxNode, ParseError> {
        let token = self.next_token()?;

        match &token.kind {
            TokenKind::StringLiteral(s) => Ok(SyntaxNode {
                range: token.range.clone(),
                kind: SyntaxKind::StringLiteral(s.clone()),
            }),
            TokenKind::IntLiteral(i) => Ok(SyntaxNode {
                range: token.range.clone(),
                kind: SyntaxKind::IntegerLiteral(*i),
            }),
            TokenKind::DecimalLiteral(n, scale) => Ok(SyntaxNode {
                range: token.range.clone(),
                kind: SyntaxKind::DecimalLiteral {
                    value: *n,
                    scale: *scale,
                },
            }),
            TokenKind::BoolLiteral(b) => Ok(SyntaxNode {
                range: token.range.clone(),
                kind: SyntaxKind::BooleanLiteral(*b),
            }),
            TokenKind::Minus => self.parse_negative_literal(token),
            TokenKind::LParen => {
                self.enter_nested()?;
                let inner = self.parse_expr()?;
                let close = self.next_token()?;
                self.depth -= 1;

                if matches!(close.kind, TokenKind::RParen) {
                    Ok(SyntaxNode {
                        range: Range {
                            start: token.range.start.clone(),
                            end: close.range.end.clone(),
                        },
                        kind: SyntaxKind::Parenthesized(Box::new(inner)),
                    })
                } else {
                    Err(ParseError::ExpectedClosingParen(close.clone()))
                }
            }
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("field") => {
                self.parse_field_reference(token)
            }
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("lookup") => {
                self.parse_lookup_reference(token)
            }
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("field_by_id") => {
                self.parse_field_by_id_reference(token)
            }
            TokenKind::Ident(name) => self.parse_function_call(token, name.clone()),
            TokenKind::Eof => Err(ParseError::UnexpectedEOFDetected(token.range.start.clone())),
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }

    fn parse_negative_literal(&mut self, minus: &'a Token) -> Result<SyntaxNode, ParseError> {
        let token = self.next_token()?;
        let range = Range {
            start: minus.range.start.clone(),
            end: token.range.end.clone(),
        };

        match &token.kind {
            TokenKind::IntLiteral(i) => Ok(SyntaxNode {
                range,
                kind: SyntaxKind::IntegerLiteral(-i),
            }),
            TokenKind::DecimalLiteral(n, scale) => Ok(SyntaxNode {
                range,
                kind: SyntaxKind::DecimalLiteral {
                    value: Number::new(-n.value()),
                    scale: *scale,
                },
            }),
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }

    fn parse_field_reference(&mut self, ident: &'a Token) -> Result<SyntaxNode, ParseError> {
        self.expect_l_paren()?;
        let name = self.expect_string_literal()?;
        let close = self.expect_r_paren()?;

        Ok(SyntaxNode {
            range: Range {
                start: ident.range.start.clone(),
                end: close.range.end.clone(),
            },
            kind: SyntaxKind::FieldReference(name),
        })
    }

    fn parse_lookup_reference(&mut self, ident: &'a Token) -> Result<SyntaxNode, ParseError> {
        self.expect_l_paren()?;
        let through = self.expect_string_literal()?;
        self.expect_comma()?;
        let target = self.expect_string_literal()?;
        let close = self.expect_r_paren()?;

        Ok(SyntaxNode {
            range: Range {
                start: ident.range.start.clone(),
                end: close.range.end.clone(),
            },
            kind: SyntaxKind::LookupReference { through, target },
        })
    }

    fn parse_field_by_id_reference(&mut self, ident: &'a Token) -> Result<SyntaxNode, ParseError> {
        self.expect_l_paren()?;
        let token = self.next_token()?;
        let id = match &token.kind {
            TokenKind::IntLiteral(i) => *i,
            _ => return Err(ParseError::UnexpectedToken(token.clone())),
        };
        let close = self.expect_r_paren()?;

        Ok(SyntaxNode {
            range: Range {
                start: ident.range.start.clone(),
                end: close.range.end.clone(),
            },
            kind: SyntaxKind::FieldByIdReference(id),
        })
    }

    fn parse_function_call(
        &mut self,
        ident: &'a Token,
        name: SmolStr,
    ) -> Result<SyntaxNode, ParseError> {
        self.expect_l_paren()?;
        self.enter_nested()?;

        let mut args = Vec::new();
        let close = loop {
            if let Some(token) = self.tokens.peek() {
                if matches!(token.kind, TokenKind::RParen) && args.is_empty() {
                    break self.next_token()?;
                }
            }

            args.push(self.parse_expr()?);

            let token = self.next_token()?;
            match &token.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => break token,
                _ => return Err(ParseError::ExpectedClosingParen(token.clone())),
            }
        };
        self.depth -= 1;

        Ok(SyntaxNode {
            range: Range {
                start: ident.range.start.clone(),
                end: close.range.end.clone(),
            },
            kind: SyntaxKind::FunctionCall { name, args },
        })
    }

    fn next_token(&mut self) -> Result<&'a Token, ParseError> {
        match self.tokens.next() {
            Some(token) => {
                self.last_position = token.range.end.clone();
                Ok(token)
            }
            None => Err(ParseError::UnexpectedEOFDetected(self.last_position.clone())),
        }
    }

    fn enter_nested(&mut self) -> Result<(), ParseError> {
        self.depth += 1;

        if self.depth > self.max_depth {
            Err(ParseError::FormulaTooLarge)
        } else {
            Ok(())
        }
    }

    fn expect_l_paren(&mut self) -> Result<&'a Token, ParseError> {
        let token = self.next_token()?;
        if matches!(token.kind, TokenKind::LParen) {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken(token.clone()))
        }
    }

    fn expect_r_paren(&mut self) -> Result<&'a Token, ParseError> {
        let token = self.next_token()?;
        if matches!(token.kind, TokenKind::RParen) {
            Ok(token)
        } else {
            Err(ParseError::ExpectedClosingParen(token.clone()))
        }
    }

    fn expect_comma(&mut self) -> Result<&'a Token, ParseError> {
        let token = self.next_token()?;
        if matches!(token.kind, TokenKind::Comma) {
            Ok(token)
        } else {
            Err(ParseError::UnexpectedToken(token.clone()))
        }
    }

    fn expect_string_literal(&mut self) -> Result<SmolStr, ParseError> {
        let token = self.next_token()?;
        match &token.kind {
            TokenKind::StringLiteral(s) => Ok(SmolStr::new(s)),
            _ => Err(ParseError::UnexpectedToken(token.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use rstest::rstest;

    const MAX_DEPTH: usize = 50;

    fn parse(input: &str) -> Result<SyntaxNode, ParseError> {
        let tokens = Lexer::tokenize(input).unwrap();
        Parser::new(&tokens, MAX_DEPTH).parse()
    }

    fn node(kind: SyntaxKind, start: (u32, usize), end: (u32, usize)) -> SyntaxNode {
        SyntaxNode {
            range: Range {
                start: Position::new(start.0, start.1),
                end: Position::new(end.0, end.1),
            },
            kind,
        }
    }

    #[test]
    fn test_parse_binary_precedence() {
        let expected = node(
            SyntaxKind::BinaryOp {
                op: BinaryOperator::Add,
                left: Box::new(node(SyntaxKind::IntegerLiteral(1), (1, 1), (1, 2))),
                right: Box::new(node(
                    SyntaxKind::BinaryOp {
                        op: BinaryOperator::Multiply,
                        left: Box::new(node(SyntaxKind::IntegerLiteral(2), (1, 5), (1, 6))),
                        right: Box::new(node(SyntaxKind::IntegerLiteral(3), (1, 9), (1, 10))),
                    },
                    (1, 5),
                    (1, 10),
                )),
            },
            (1, 1),
            (1, 10),
        );

        assert_eq!(parse("1 + 2 * 3"), Ok(expected));
    }

    #[test]
    fn test_parse_parenthesized_grouping() {
        let inner = node(
            SyntaxKind::BinaryOp {
                op: BinaryOperator::Add,
                left: Box::new(node(SyntaxKind::IntegerLiteral(1), (1, 2), (1, 3))),
                right: Box::new(node(SyntaxKind::IntegerLiteral(2), (1, 6), (1, 7))),
            },
            (1, 2),
            (1, 7),
        );
        let expected = node(
            SyntaxKind::BinaryOp {
                op: BinaryOperator::Multiply,
                left: Box::new(node(
                    SyntaxKind::Parenthesized(Box::new(inner)),
                    (1, 1),
                    (1, 8),
                )),
                right: Box::new(node(SyntaxKind::IntegerLiteral(3), (1, 11), (1, 12))),
            },
            (1, 1),
            (1, 12),
        );

        assert_eq!(parse("(1 + 2) * 3"), Ok(expected));
    }

    #[test]
    fn test_parse_field_reference() {
        let expected = node(
            SyntaxKind::FieldReference(SmolStr::new("Name")),
            (1, 1),
            (1, 14),
        );

        assert_eq!(parse("field('Name')"), Ok(expected));
    }

    #[test]
    fn test_parse_lookup_reference() {
        let expected = node(
            SyntaxKind::LookupReference {
                through: SmolStr::new("Orders"),
                target: SmolStr::new("Total"),
            },
            (1, 1),
            (1, 26),
        );

        assert_eq!(parse("lookup('Orders', 'Total')"), Ok(expected));
    }

    #[test]
    fn test_parse_function_call() {
        let expected = node(
            SyntaxKind::FunctionCall {
                name: SmolStr::new("concat"),
                args: vec![
                    node(SyntaxKind::StringLiteral("a".to_string()), (1, 8), (1, 11)),
                    node(SyntaxKind::StringLiteral("b".to_string()), (1, 13), (1, 16)),
                ],
            },
            (1, 1),
            (1, 17),
        );

        assert_eq!(parse("concat('a', 'b')"), Ok(expected));
    }

    #[test]
    fn test_parse_zero_arg_function_call() {
        let expected = node(
            SyntaxKind::FunctionCall {
                name: SmolStr::new("now"),
                args: vec![],
            },
            (1, 1),
            (1, 6),
        );

        assert_eq!(parse("now()"), Ok(expected));
    }

    #[test]
    fn test_parse_negative_literal() {
        let expected = node(SyntaxKind::IntegerLiteral(-5), (1, 1), (1, 3));

        assert_eq!(parse("-5"), Ok(expected));
    }

    #[rstest]
    #[case("1 +")]
    #[case("")]
    fn test_parse_unexpected_eof(#[case] input: &str) {
        assert!(matches!(
            parse(input),
            Err(ParseError::UnexpectedEOFDetected(_))
        ));
    }

    #[rstest]
    #[case("foo")]
    #[case("1 2")]
    #[case("field(1)")]
    fn test_parse_unexpected_token(#[case] input: &str) {
        assert!(matches!(parse(input), Err(ParseError::UnexpectedToken(_))));
    }

    #[rstest]
    #[case("(1")]
    #[case("upper('a'")]
    fn test_parse_missing_closing_paren(#[case] input: &str) {
        assert!(matches!(
            parse(input),
            Err(ParseError::ExpectedClosingParen(_))
        ));
    }

    #[test]
    fn test_parse_depth_limit() {
        let formula = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));

        assert_eq!(parse(&formula), Err(ParseError::FormulaTooLarge));
    }
}
