use miette::{Diagnostic, SourceOffset, SourceSpan};

use crate::{
    ast::error::ParseError, ast::mapper::MapError, dependencies::DependencyError,
    lexer::error::LexerError, range::Range, typing::TypingError,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InnerError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Typing(#[from] TypingError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// Represents a high-level error with diagnostic information for the user.
#[derive(PartialEq, Debug, thiserror::Error)]
#[error("{cause}")]
pub struct Error {
    /// The underlying cause of the error.
    pub cause: InnerError,
    /// The formula text related to the error.
    pub source_code: String,
    /// The location in the formula text for diagnostics.
    pub location: SourceSpan,
}

impl Error {
    pub fn from_error(source_code: impl Into<String>, cause: InnerError) -> Self {
        let source_code = source_code.into();
        let range = match &cause {
            InnerError::Lexer(LexerError::UnexpectedToken(token)) => Some(token.range.clone()),
            InnerError::Lexer(LexerError::UnexpectedEOFDetected(_)) => None,
            InnerError::Parse(err) => match err {
                ParseError::UnexpectedToken(token) => Some(token.range.clone()),
                ParseError::UnexpectedEOFDetected(_) => None,
                ParseError::ExpectedClosingParen(token) => Some(token.range.clone()),
                ParseError::FormulaTooLarge => None,
            },
            InnerError::Map(err) => match err {
                MapError::UnknownFunction { range, .. } => Some(range.clone()),
                MapError::InvalidArgumentCount { range, .. } => Some(range.clone()),
                MapError::FieldByIdReferencesAreDeprecated(range) => Some(range.clone()),
                MapError::FormulaTooLarge => None,
                MapError::StringLiteralTooLarge { range, .. } => Some(range.clone()),
            },
            InnerError::Typing(_) => None,
            InnerError::Dependency(_) => None,
        };

        match range {
            Some(range) => {
                let location = Self::span_for(&source_code, &range);

                Self {
                    cause,
                    source_code,
                    location,
                }
            }
            None => {
                let is_eof = matches!(
                    &cause,
                    InnerError::Lexer(LexerError::UnexpectedEOFDetected(_))
                        | InnerError::Parse(ParseError::UnexpectedEOFDetected(_))
                );

                let location = if is_eof {
                    let lines = source_code.lines();
                    let loc_line = lines.clone().count().saturating_sub(1);
                    let loc_col = lines.last().map(|line| line.len()).unwrap_or(0);
                    SourceSpan::new(
                        SourceOffset::from_location(&source_code, loc_line, loc_col),
                        1,
                    )
                } else {
                    SourceSpan::new(SourceOffset::from_location(&source_code, 0, 0), 1)
                };

                Self {
                    cause,
                    source_code,
                    location,
                }
            }
        }
    }

    fn span_for(source_code: &str, range: &Range) -> SourceSpan {
        SourceSpan::new(
            SourceOffset::from_location(
                source_code,
                range.start.line as usize,
                range.start.column,
            ),
            std::cmp::max(
                SourceOffset::from_location(source_code, range.end.line as usize, range.end.column)
                    .offset()
                    .saturating_sub(
                        SourceOffset::from_location(
                            source_code,
                            range.start.line as usize,
                            range.start.column,
                        )
                        .offset(),
                    ),
                1,
            ),
        )
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let c = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => "LexerError::UnexpectedToken",
            InnerError::Lexer(LexerError::UnexpectedEOFDetected(_)) => {
                "LexerError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::UnexpectedToken(_)) => "ParseError::UnexpectedToken",
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => {
                "ParseError::UnexpectedEOFDetected"
            }
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                "ParseError::ExpectedClosingParen"
            }
            InnerError::Parse(ParseError::FormulaTooLarge) => "ParseError::FormulaTooLarge",
            InnerError::Map(MapError::UnknownFunction { .. }) => "MapError::UnknownFunction",
            InnerError::Map(MapError::InvalidArgumentCount { .. }) => {
                "MapError::InvalidArgumentCount"
            }
            InnerError::Map(MapError::FieldByIdReferencesAreDeprecated(_)) => {
                "MapError::FieldByIdReferencesAreDeprecated"
            }
            InnerError::Map(MapError::FormulaTooLarge) => "MapError::FormulaTooLarge",
            InnerError::Map(MapError::StringLiteralTooLarge { .. }) => {
                "MapError::StringLiteralTooLarge"
            }
            InnerError::Typing(TypingError::SelfReference) => "TypingError::SelfReference",
            InnerError::Dependency(DependencyError::CircularReference(_)) => {
                "DependencyError::CircularReference"
            }
            InnerError::Dependency(DependencyError::DepthExceeded(_)) => {
                "DependencyError::DepthExceeded"
            }
        };

        Some(Box::new(c))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        let msg = match &self.cause {
            InnerError::Lexer(LexerError::UnexpectedToken(_)) => {
                Some("Check for unexpected or misplaced tokens in your formula.".to_string())
            }
            InnerError::Lexer(LexerError::UnexpectedEOFDetected(_)) => Some(
                "The formula ended unexpectedly. Make sure all expressions are complete."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::UnexpectedToken(_)) => {
                Some("Check for syntax errors or misplaced tokens.".to_string())
            }
            InnerError::Parse(ParseError::UnexpectedEOFDetected(_)) => Some(
                "The formula ended unexpectedly. Check for missing closing parentheses or incomplete expressions."
                    .to_string(),
            ),
            InnerError::Parse(ParseError::ExpectedClosingParen(_)) => {
                Some("Add a closing parenthesis `)` to complete the expression.".to_string())
            }
            InnerError::Parse(ParseError::FormulaTooLarge)
            | InnerError::Map(MapError::FormulaTooLarge) => {
                Some("Split the formula into several smaller formula fields.".to_string())
            }
            InnerError::Map(MapError::UnknownFunction { name, .. }) => {
                Some(format!("'{name}' is not a known function. Check the spelling."))
            }
            InnerError::Map(MapError::InvalidArgumentCount { expected, .. }) => {
                Some(format!("This function must be given {expected}."))
            }
            InnerError::Map(MapError::FieldByIdReferencesAreDeprecated(_)) => {
                Some("Replace field_by_id(...) with field('name').".to_string())
            }
            InnerError::Map(MapError::StringLiteralTooLarge { max, .. }) => {
                Some(format!("Shorten the string literal to at most {max} characters."))
            }
            InnerError::Typing(TypingError::SelfReference) => {
                Some("Remove the reference to the field the formula belongs to.".to_string())
            }
            InnerError::Dependency(DependencyError::CircularReference(name)) => Some(format!(
                "Field '{name}' depends on this field. Break the cycle by removing one of the references."
            )),
            InnerError::Dependency(DependencyError::DepthExceeded(_)) => Some(
                "The chain of formula fields referencing each other is too deep.".to_string(),
            ),
        };

        msg.map(|m| Box::new(m) as Box<dyn std::fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + '_>> {
        Some(Box::new(std::iter::once(
            miette::LabeledSpan::new_with_span(Some(format!("{}", self.cause)), self.location),
        )))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.source_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::token::{Token, TokenKind};
    use crate::range::{Position, Range};

    #[test]
    fn test_from_error_with_eof_error() {
        let cause = InnerError::Parse(ParseError::UnexpectedEOFDetected(Position::default()));
        let error = Error::from_error("field('a') +", cause);

        assert_eq!(error.source_code, "field('a') +");
        assert_eq!(error.location.len(), 1);
    }

    #[test]
    fn test_from_error_with_token() {
        let token = Token {
            range: Range {
                start: Position { line: 1, column: 5 },
                end: Position { line: 1, column: 6 },
            },
            kind: TokenKind::Comma,
        };
        let cause = InnerError::Parse(ParseError::UnexpectedToken(token));
        let error = Error::from_error("1 + ,", cause);

        assert_eq!(error.location.offset(), 4);
        assert_eq!(error.location.len(), 1);
    }

    #[test]
    fn test_from_error_without_location() {
        let cause = InnerError::Typing(TypingError::SelfReference);
        let error = Error::from_error("field('Me')", cause);

        assert_eq!(error.location.offset(), 0);
        assert_eq!(error.cause.to_string(), "a field cannot reference itself");
    }
}
